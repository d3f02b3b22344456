// src/core/snapshot/manager.rs

//! Owns the per-site list snapshot files and the accumulated history files.
//!
//! During a snapshot build the site's polling client is the only writer. A
//! count tag (`NH`/`ND`/`NJ`) copies the current list to its `tmp_` companion
//! and resizes; entry tags fill positions; the end marker commits the build,
//! which for directories and jobs runs the reshuffle against the `old_`
//! history file. Filesystem trouble is never fatal: the site carries on with
//! in-memory state and the next snapshot boundary retries.

use crate::core::FleetMonError;
use crate::core::constants::{DATA_STEP_SIZE, ERROR_HISTORY_LENGTH, WORD_OFFSET};
use crate::core::snapshot::lists::{DirListEntry, HostListEntry, JobListEntry, TypesizeData};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const LIST_FORMAT_VERSION: u8 = 1;

/// Entries that participate in the reshuffle carry a stable id and the time
/// they were first seen.
pub trait ListedEntry {
    fn id(&self) -> u32;
    fn entry_time(&self) -> i64;
}

impl ListedEntry for DirListEntry {
    fn id(&self) -> u32 {
        self.dir_id
    }
    fn entry_time(&self) -> i64 {
        self.entry_time
    }
}

impl ListedEntry for JobListEntry {
    fn id(&self) -> u32 {
        self.job_id
    }
    fn entry_time(&self) -> i64 {
        self.entry_time
    }
}

pub struct SnapshotManager {
    alias: String,
    fifo_dir: PathBuf,
    /// `max_log_files * switch_file_time`: how long an entry outlives its
    /// last sighting before the reshuffle purges it from the history.
    retention: Duration,

    hosts: Vec<HostListEntry>,
    dirs: Vec<DirListEntry>,
    jobs: Vec<JobListEntry>,
    tmp_dirs: Vec<DirListEntry>,
    tmp_jobs: Vec<JobListEntry>,
    typesize: TypesizeData,
}

impl SnapshotManager {
    pub fn new(alias: &str, fifo_dir: &Path, retention: Duration) -> Self {
        Self {
            alias: alias.to_string(),
            fifo_dir: fifo_dir.to_path_buf(),
            retention,
            hosts: Vec::new(),
            dirs: Vec::new(),
            jobs: Vec::new(),
            tmp_dirs: Vec::new(),
            tmp_jobs: Vec::new(),
            typesize: TypesizeData::default(),
        }
    }

    fn path(&self, prefix: &str) -> PathBuf {
        self.fifo_dir.join(format!("{prefix}.{}", self.alias))
    }

    /// Loads whatever snapshot files exist from a previous run.
    pub async fn load(&mut self) {
        self.hosts = read_list(&self.path("host_list")).await.unwrap_or_default();
        self.dirs = read_list(&self.path("dir_list")).await.unwrap_or_default();
        self.jobs = read_list(&self.path("job_list")).await.unwrap_or_default();
        if let Ok(sizes) = read_list::<TypesizeData>(&self.path("typesize")).await {
            if let Some(first) = sizes.into_iter().next() {
                self.typesize = first;
            }
        }
        debug!(
            "Loaded snapshots for '{}': {} host(s), {} dir(s), {} job(s).",
            self.alias,
            self.hosts.len(),
            self.dirs.len(),
            self.jobs.len()
        );
    }

    pub fn hosts(&self) -> &[HostListEntry] {
        &self.hosts
    }

    pub fn dirs(&self) -> &[DirListEntry] {
        &self.dirs
    }

    pub fn jobs(&self) -> &[JobListEntry] {
        &self.jobs
    }

    pub fn typesize(&self) -> &TypesizeData {
        &self.typesize
    }

    /// A new host count starts a host snapshot build.
    pub async fn set_host_count(&mut self, count: usize) {
        self.stash_tmp("tmp_host_list", &self.hosts.clone()).await;
        resize_stepped(&mut self.hosts, count);
    }

    /// A new directory count starts a directory snapshot build.
    pub async fn set_dir_count(&mut self, count: usize) {
        let previous = self.dirs.clone();
        self.stash_tmp("tmp_dir_list", &previous).await;
        self.tmp_dirs = previous;
        resize_stepped(&mut self.dirs, count);
    }

    /// A new job count starts a job snapshot build.
    pub async fn set_job_count(&mut self, count: usize) {
        let previous = self.jobs.clone();
        self.stash_tmp("tmp_job_list", &previous).await;
        self.tmp_jobs = previous;
        resize_stepped(&mut self.jobs, count);
    }

    async fn stash_tmp<T: bincode::Encode>(&self, prefix: &str, entries: &[T]) {
        if let Err(e) = write_list(&self.path(prefix), entries).await {
            warn!("Failed to stash {} for '{}': {e}", prefix, self.alias);
        }
    }

    /// Writes one host row. An index equal to the host count is the end
    /// marker; writing the last position also commits.
    pub async fn write_host(&mut self, pos: usize, entry: HostListEntry) {
        match pos.cmp(&self.hosts.len()) {
            std::cmp::Ordering::Less => {
                self.hosts[pos] = entry;
                if pos + 1 == self.hosts.len() {
                    self.commit_hosts().await;
                }
            }
            std::cmp::Ordering::Equal => self.commit_hosts().await,
            std::cmp::Ordering::Greater => {
                warn!(
                    "'{}' reported host position {pos} beyond the announced count {}, entry dropped",
                    self.alias,
                    self.hosts.len()
                );
            }
        }
    }

    /// Writes one directory row; the last position commits and reshuffles.
    pub async fn write_dir(&mut self, pos: usize, mut entry: DirListEntry, now: i64, last_data_time: i64) {
        if pos >= self.dirs.len() {
            warn!(
                "'{}' reported directory position {pos} beyond the announced count {}, entry dropped",
                self.alias,
                self.dirs.len()
            );
            return;
        }
        // Entries that survived from the previous snapshot keep their
        // original sighting time.
        entry.entry_time = self
            .tmp_dirs
            .iter()
            .find(|d| d.dir_id == entry.dir_id)
            .map(|d| d.entry_time)
            .filter(|&t| t > 0)
            .unwrap_or(now);
        self.dirs[pos] = entry;
        if pos + 1 == self.dirs.len() {
            self.commit_dirs(last_data_time).await;
        }
    }

    /// Writes one job row; the last position commits and reshuffles.
    pub async fn write_job(&mut self, pos: usize, mut entry: JobListEntry, now: i64, last_data_time: i64) {
        if pos >= self.jobs.len() {
            warn!(
                "'{}' reported job position {pos} beyond the announced count {}, entry dropped",
                self.alias,
                self.jobs.len()
            );
            return;
        }
        entry.entry_time = self
            .tmp_jobs
            .iter()
            .find(|j| j.job_id == entry.job_id)
            .map(|j| j.entry_time)
            .filter(|&t| t > 0)
            .unwrap_or(now);
        self.jobs[pos] = entry;
        if pos + 1 == self.jobs.len() {
            self.commit_jobs(last_data_time).await;
        }
    }

    /// Fills the error history of one host row, zeroing the unreported tail.
    pub fn apply_error_history(&mut self, host_pos: usize, history: [u8; ERROR_HISTORY_LENGTH]) {
        match self.hosts.get_mut(host_pos) {
            Some(host) => host.error_history = history,
            None => warn!(
                "'{}' reported error history for host position {host_pos} beyond the list",
                self.alias
            ),
        }
    }

    /// Merges a freshly reported typesize vector and persists it.
    pub async fn set_typesize(&mut self, values: &[u32]) {
        for (slot, value) in self.typesize.values.iter_mut().zip(values) {
            *slot = *value;
        }
        let typesize = self.typesize;
        if let Err(e) = write_list(&self.path("typesize"), &[typesize]).await {
            warn!("Failed to persist typesize for '{}': {e}", self.alias);
        }
    }

    async fn commit_hosts(&mut self) {
        if let Err(e) = write_list(&self.path("host_list"), &self.hosts).await {
            warn!("Failed to persist host list for '{}': {e}", self.alias);
        } else {
            info!(
                "Committed host list for '{}' with {} entries.",
                self.alias,
                self.hosts.len()
            );
        }
    }

    async fn commit_dirs(&mut self, last_data_time: i64) {
        if let Err(e) = write_list(&self.path("dir_list"), &self.dirs).await {
            warn!("Failed to persist directory list for '{}': {e}", self.alias);
        }
        let tmp = std::mem::take(&mut self.tmp_dirs);
        if let Err(e) = reshuffle(
            &self.path("old_dir_list"),
            &tmp,
            &self.dirs,
            last_data_time,
            self.retention,
        )
        .await
        {
            warn!("Directory reshuffle failed for '{}': {e}", self.alias);
        }
    }

    async fn commit_jobs(&mut self, last_data_time: i64) {
        if let Err(e) = write_list(&self.path("job_list"), &self.jobs).await {
            warn!("Failed to persist job list for '{}': {e}", self.alias);
        }
        let tmp = std::mem::take(&mut self.tmp_jobs);
        if let Err(e) = reshuffle(
            &self.path("old_job_list"),
            &tmp,
            &self.jobs,
            last_data_time,
            self.retention,
        )
        .await
        {
            warn!("Job reshuffle failed for '{}': {e}", self.alias);
        }
    }
}

/// Grows or shrinks a list to `count`, reserving capacity in
/// `DATA_STEP_SIZE` blocks so repeated small growths reuse the allocation.
fn resize_stepped<T: Default + Clone>(list: &mut Vec<T>, count: usize) {
    let stepped = count.div_ceil(DATA_STEP_SIZE) * DATA_STEP_SIZE;
    if stepped > list.capacity() {
        list.reserve_exact(stepped - list.len());
    }
    list.resize(count, T::default());
}

/// Merges a finished snapshot build into the accumulated `old_` history.
///
/// Entries whose last sighting is older than the retention window are purged;
/// entries that vanished from the active list (present in `tmp`, absent from
/// `active`) are appended, keyed by id so a re-run of the same merge is a
/// no-op. An empty `tmp` means nothing vanished and the file is left alone.
pub async fn reshuffle<T>(
    old_path: &Path,
    tmp: &[T],
    active: &[T],
    last_data_time: i64,
    retention: Duration,
) -> Result<(), FleetMonError>
where
    T: ListedEntry + bincode::Encode + bincode::Decode<()> + Clone,
{
    if tmp.is_empty() {
        return Ok(());
    }

    let mut old: Vec<T> = read_list(old_path).await.unwrap_or_default();
    let before = old.len();

    let offset_time = retention.as_secs() as i64;
    old.retain(|e| e.entry_time() + offset_time >= last_data_time);

    let active_ids: HashSet<u32> = active.iter().map(|e| e.id()).collect();
    let old_ids: HashSet<u32> = old.iter().map(|e| e.id()).collect();
    for entry in tmp {
        if !active_ids.contains(&entry.id()) && !old_ids.contains(&entry.id()) {
            if old.len() == old.capacity() {
                old.reserve_exact(DATA_STEP_SIZE);
            }
            old.push(entry.clone());
        }
    }

    if old.len() != before {
        debug!(
            "Reshuffled {}: {} -> {} entries.",
            old_path.display(),
            before,
            old.len()
        );
    }
    write_list(old_path, &old).await
}

/// Reads a list snapshot file: a `WORD_OFFSET` header (format version and
/// entry count) followed by the encoded entries.
pub async fn read_list<T: bincode::Decode<()>>(path: &Path) -> Result<Vec<T>, FleetMonError> {
    let bytes = tokio::fs::read(path).await?;
    if bytes.len() < WORD_OFFSET {
        return Err(FleetMonError::SnapshotError(format!(
            "{} is shorter than its header",
            path.display()
        )));
    }
    if bytes[0] != LIST_FORMAT_VERSION {
        return Err(FleetMonError::SnapshotError(format!(
            "{} has unsupported format version {}",
            path.display(),
            bytes[0]
        )));
    }
    let count = u32::from_le_bytes(bytes[4..8].try_into().expect("4-byte count")) as usize;
    let (entries, _): (Vec<T>, usize) =
        bincode::decode_from_slice(&bytes[WORD_OFFSET..], bincode::config::standard()).map_err(
            |e| FleetMonError::SnapshotError(format!("{}: {e}", path.display())),
        )?;
    if entries.len() != count {
        return Err(FleetMonError::SnapshotError(format!(
            "{} header declares {count} entries but payload holds {}",
            path.display(),
            entries.len()
        )));
    }
    Ok(entries)
}

/// Writes a list snapshot file with its `WORD_OFFSET` header.
pub async fn write_list<T: bincode::Encode>(path: &Path, entries: &[T]) -> Result<(), FleetMonError> {
    let payload = bincode::encode_to_vec(entries, bincode::config::standard())
        .map_err(|e| FleetMonError::SnapshotError(format!("{}: {e}", path.display())))?;
    let mut bytes = Vec::with_capacity(WORD_OFFSET + payload.len());
    bytes.push(LIST_FORMAT_VERSION);
    bytes.extend_from_slice(&[0u8; 3]);
    bytes.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&payload);
    tokio::fs::write(path, bytes).await?;
    Ok(())
}
