// src/core/status/area.rs

//! The in-process status area and its on-disk form.
//!
//! Records are fixed-layout so external viewers can seek straight to a site.
//! The file carries a magic/version header, the record count, the records and
//! a CRC-64 trailer; a failed checksum means a torn write and the whole file
//! is ignored. Writes go to a temporary name first and are renamed into
//! place.

use crate::config::{Endpoint, SiteConfig};
use crate::core::FleetMonError;
use crate::core::constants::{
    LOG_FIFO_SIZE, MAX_ALIAS_LENGTH, MAX_LOG_HISTORY, MAX_PATH_LENGTH,
    MAX_REAL_HOSTNAME_LENGTH, MAX_REMOTE_CMD_LENGTH, MAX_TYPESIZE_FIELDS, MAX_VERSION_LENGTH,
    STORAGE_TIME,
};
use crate::core::snapshot::TypesizeData;
use crate::core::status::record::{
    ConnectStatus, CounterRing, SiteOptions, SiteRecord, SpecialFlags, SwitchMode,
};
use bytes::{Buf, BufMut, BytesMut};
use crc::{CRC_64_XZ, Crc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// A swappable handle on the current status area. The supervisor replaces
/// the inner `Arc` when a configuration reload rebuilds the area; long-lived
/// readers such as the publisher always see the current one.
pub type SharedArea = Arc<RwLock<Arc<StatusArea>>>;

const AREA_MAGIC: &[u8] = b"FLEETMON";
const AREA_VERSION: &[u8] = b"0001";

const CHECKSUM_ALGO: Crc<u64> = Crc::<u64>::new(&CRC_64_XZ);

/// Fixed per-record size in the published file.
const RECORD_SIZE: usize = MAX_ALIAS_LENGTH
    + 2 * (MAX_REAL_HOSTNAME_LENGTH + 2)
    + MAX_REMOTE_CMD_LENGTH
    + MAX_VERSION_LENGTH
    + MAX_PATH_LENGTH
    + 1                       // connect_status
    + 3 * 4                   // amg, fd, archive watch
    + 4 + 4                   // max_connections, danger_no_of_jobs
    + 4 + 8 + 8 + 4 + 4       // fc, fs, tr, fr, ec
    + 4 + 4 + 4               // host_error_counter, no_of_transfers, jobs_in_queue
    + 3 * 4                   // no_of_hosts, no_of_dirs, no_of_jobs
    + STORAGE_TIME * 8 + 8    // top_tr
    + STORAGE_TIME * 4 + 8    // top_fr
    + STORAGE_TIME * 4 + 8    // top_no_of_transfers
    + 7 * 6 * 8               // counter rings
    + LOG_FIFO_SIZE + 4       // log fifo, entry counter
    + 3 * MAX_LOG_HISTORY     // log histories
    + 3 * 8                   // history shift markers
    + 4 * 8                   // poll_interval, connect_time, disconnect_time, last_data_time
    + 1 + 1 + 4 + 4 + 1       // failover, toggle, options, capabilities, special flag
    + MAX_TYPESIZE_FIELDS * 4
    + 8; // seqno

/// The shared status area: one lockable record per configured site.
pub struct StatusArea {
    records: Vec<Mutex<SiteRecord>>,
}

impl StatusArea {
    /// Builds the area from the site configuration, carrying history over
    /// from `inherited` records (a previous attach or a previous incarnation
    /// of the area) by alias match.
    pub fn create(sites: &[SiteConfig], inherited: &HashMap<String, SiteRecord>) -> Self {
        let records = sites
            .iter()
            .map(|site| {
                let mut record = SiteRecord::from_config(site);
                if let Some(previous) = inherited.get(&site.alias) {
                    record.inherit(previous);
                }
                Mutex::new(record)
            })
            .collect();
        Self { records }
    }

    /// Attaches the area: reads the previously published file (if any and
    /// valid) and merges its per-alias history into freshly created records.
    pub async fn attach(path: &Path, sites: &[SiteConfig]) -> Self {
        let inherited = match tokio::fs::read(path).await {
            Ok(bytes) => match decode_area(&bytes) {
                Ok(records) => {
                    info!(
                        "Attached status area from {} with {} preserved record(s).",
                        path.display(),
                        records.len()
                    );
                    records
                        .into_iter()
                        .map(|r| (r.alias.clone(), r))
                        .collect()
                }
                Err(e) => {
                    warn!(
                        "Ignoring unreadable status area at {}: {e}",
                        path.display()
                    );
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self::create(sites, &inherited)
    }

    /// Rebuilds the area for a reloaded configuration, preserving records of
    /// sites that survive the reload by alias match.
    pub fn rebuild(&self, sites: &[SiteConfig]) -> Self {
        let inherited: HashMap<String, SiteRecord> = self
            .records
            .iter()
            .map(|record| {
                let record = record.lock().clone();
                (record.alias.clone(), record)
            })
            .collect();
        Self::create(sites, &inherited)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record(&self, index: usize) -> &Mutex<SiteRecord> {
        &self.records[index]
    }

    pub fn records(&self) -> &[Mutex<SiteRecord>] {
        &self.records
    }

    /// Serializes the whole area. Each record is locked just long enough to
    /// be encoded.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(
            AREA_MAGIC.len() + AREA_VERSION.len() + 4 + self.records.len() * RECORD_SIZE + 8,
        );
        buf.put_slice(AREA_MAGIC);
        buf.put_slice(AREA_VERSION);
        buf.put_u32(self.records.len() as u32);
        for record in &self.records {
            encode_record(&record.lock(), &mut buf);
        }
        let crc = CHECKSUM_ALGO.checksum(&buf);
        buf.put_u64(crc);
        buf.to_vec()
    }

    /// Writes the serialized area to `path` via a temporary file and an
    /// atomic rename, so readers never observe a half-written area.
    pub async fn write_to(&self, path: &Path) -> Result<(), FleetMonError> {
        let bytes = self.encode();
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

/// Decodes a published area file into its records.
pub fn decode_area(bytes: &[u8]) -> Result<Vec<SiteRecord>, FleetMonError> {
    let header = AREA_MAGIC.len() + AREA_VERSION.len() + 4;
    if bytes.len() < header + 8 {
        return Err(FleetMonError::StatusAreaError("File too short".into()));
    }
    let (body, trailer) = bytes.split_at(bytes.len() - 8);
    let stored_crc = u64::from_be_bytes(trailer.try_into().expect("8-byte trailer"));
    if CHECKSUM_ALGO.checksum(body) != stored_crc {
        return Err(FleetMonError::StatusAreaError("Checksum mismatch".into()));
    }

    let mut cursor = body;
    if &cursor[..AREA_MAGIC.len()] != AREA_MAGIC {
        return Err(FleetMonError::StatusAreaError("Bad magic".into()));
    }
    cursor.advance(AREA_MAGIC.len());
    if &cursor[..AREA_VERSION.len()] != AREA_VERSION {
        return Err(FleetMonError::StatusAreaError(
            "Unsupported area version".into(),
        ));
    }
    cursor.advance(AREA_VERSION.len());
    let count = cursor.get_u32() as usize;
    if cursor.remaining() != count * RECORD_SIZE {
        return Err(FleetMonError::StatusAreaError(format!(
            "Expected {count} records, found {} trailing bytes",
            cursor.remaining()
        )));
    }

    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        records.push(decode_record(&mut cursor));
    }
    Ok(records)
}

fn put_fixed_str(buf: &mut BytesMut, s: &str, width: usize) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(width);
    buf.put_slice(&bytes[..n]);
    buf.put_bytes(0, width - n);
}

fn get_fixed_str(cursor: &mut &[u8], width: usize) -> String {
    let raw = &cursor[..width];
    let end = raw.iter().position(|&b| b == 0).unwrap_or(width);
    let s = String::from_utf8_lossy(&raw[..end]).into_owned();
    cursor.advance(width);
    s
}

fn encode_record(r: &SiteRecord, buf: &mut BytesMut) {
    put_fixed_str(buf, &r.alias, MAX_ALIAS_LENGTH);
    for endpoint in &r.endpoints {
        put_fixed_str(buf, &endpoint.host, MAX_REAL_HOSTNAME_LENGTH);
        buf.put_u16(endpoint.port);
    }
    put_fixed_str(buf, &r.remote_cmd, MAX_REMOTE_CMD_LENGTH);
    put_fixed_str(buf, &r.remote_version, MAX_VERSION_LENGTH);
    put_fixed_str(buf, &r.remote_work_dir, MAX_PATH_LENGTH);

    buf.put_u8(r.connect_status as u8);
    buf.put_i32(r.amg_status);
    buf.put_i32(r.fd_status);
    buf.put_i32(r.archive_watch_status);
    buf.put_u32(r.max_connections);
    buf.put_u32(r.danger_no_of_jobs);
    buf.put_u32(r.fc);
    buf.put_u64(r.fs);
    buf.put_u64(r.tr);
    buf.put_u32(r.fr);
    buf.put_u32(r.ec);
    buf.put_u32(r.host_error_counter);
    buf.put_u32(r.no_of_transfers);
    buf.put_u32(r.jobs_in_queue);
    buf.put_u32(r.no_of_hosts);
    buf.put_u32(r.no_of_dirs);
    buf.put_u32(r.no_of_jobs);

    for v in r.top_tr {
        buf.put_u64(v);
    }
    buf.put_i64(r.top_tr_time);
    for v in r.top_fr {
        buf.put_u32(v);
    }
    buf.put_i64(r.top_fr_time);
    for v in r.top_no_of_transfers {
        buf.put_u32(v);
    }
    buf.put_i64(r.top_transfer_time);

    for ring in [
        &r.files_send,
        &r.bytes_send,
        &r.files_received,
        &r.bytes_received,
        &r.connections,
        &r.total_errors,
        &r.log_bytes_received,
    ] {
        for slot in ring.slots {
            buf.put_u64(slot);
        }
    }

    buf.put_slice(&r.log_fifo);
    buf.put_u32(r.log_entry_counter);
    for history in &r.log_history {
        buf.put_slice(history);
    }
    for marker in r.last_history_shift {
        buf.put_i64(marker);
    }

    buf.put_u64(r.poll_interval);
    buf.put_u64(r.connect_time);
    buf.put_u64(r.disconnect_time);
    buf.put_i64(r.last_data_time);

    buf.put_u8(match r.failover {
        SwitchMode::None => 0,
        SwitchMode::Auto => 1,
        SwitchMode::User => 2,
    });
    buf.put_u8(r.toggle as u8);
    buf.put_u32(r.options.bits());
    buf.put_u32(r.log_capabilities.bits());
    buf.put_u8(r.special_flag.bits());

    for v in r.typesize.values {
        buf.put_u32(v);
    }
    buf.put_u64(r.seqno);
}

fn decode_record(cursor: &mut &[u8]) -> SiteRecord {
    let alias = get_fixed_str(cursor, MAX_ALIAS_LENGTH);
    let mut endpoints = [Endpoint::default(), Endpoint::default()];
    for endpoint in &mut endpoints {
        endpoint.host = get_fixed_str(cursor, MAX_REAL_HOSTNAME_LENGTH);
        endpoint.port = cursor.get_u16();
    }
    let remote_cmd = get_fixed_str(cursor, MAX_REMOTE_CMD_LENGTH);
    let remote_version = get_fixed_str(cursor, MAX_VERSION_LENGTH);
    let remote_work_dir = get_fixed_str(cursor, MAX_PATH_LENGTH);

    let connect_status = ConnectStatus::from_repr(cursor.get_u8())
        .unwrap_or(ConnectStatus::Disconnected);
    let amg_status = cursor.get_i32();
    let fd_status = cursor.get_i32();
    let archive_watch_status = cursor.get_i32();
    let max_connections = cursor.get_u32();
    let danger_no_of_jobs = cursor.get_u32();
    let fc = cursor.get_u32();
    let fs = cursor.get_u64();
    let tr = cursor.get_u64();
    let fr = cursor.get_u32();
    let ec = cursor.get_u32();
    let host_error_counter = cursor.get_u32();
    let no_of_transfers = cursor.get_u32();
    let jobs_in_queue = cursor.get_u32();
    let no_of_hosts = cursor.get_u32();
    let no_of_dirs = cursor.get_u32();
    let no_of_jobs = cursor.get_u32();

    let mut top_tr = [0u64; STORAGE_TIME];
    for slot in &mut top_tr {
        *slot = cursor.get_u64();
    }
    let top_tr_time = cursor.get_i64();
    let mut top_fr = [0u32; STORAGE_TIME];
    for slot in &mut top_fr {
        *slot = cursor.get_u32();
    }
    let top_fr_time = cursor.get_i64();
    let mut top_no_of_transfers = [0u32; STORAGE_TIME];
    for slot in &mut top_no_of_transfers {
        *slot = cursor.get_u32();
    }
    let top_transfer_time = cursor.get_i64();

    let mut rings = [CounterRing::default(); 7];
    for ring in &mut rings {
        for slot in &mut ring.slots {
            *slot = cursor.get_u64();
        }
    }

    let mut log_fifo = [0u8; LOG_FIFO_SIZE];
    cursor.copy_to_slice(&mut log_fifo);
    let log_entry_counter = cursor.get_u32();
    let mut log_history = [[0u8; MAX_LOG_HISTORY]; 3];
    for history in &mut log_history {
        cursor.copy_to_slice(history);
    }
    let mut last_history_shift = [0i64; 3];
    for marker in &mut last_history_shift {
        *marker = cursor.get_i64();
    }

    let poll_interval = cursor.get_u64();
    let connect_time = cursor.get_u64();
    let disconnect_time = cursor.get_u64();
    let last_data_time = cursor.get_i64();

    let failover = match cursor.get_u8() {
        1 => SwitchMode::Auto,
        2 => SwitchMode::User,
        _ => SwitchMode::None,
    };
    let toggle = cursor.get_u8() as usize;
    let options = SiteOptions::from_bits_truncate(cursor.get_u32());
    let log_capabilities =
        crate::core::status::record::LogCapabilities::from_bits_truncate(cursor.get_u32());
    let special_flag = SpecialFlags::from_bits_truncate(cursor.get_u8());

    let mut typesize = TypesizeData::default();
    for v in &mut typesize.values {
        *v = cursor.get_u32();
    }
    let seqno = cursor.get_u64();

    SiteRecord {
        alias,
        endpoints,
        remote_cmd,
        remote_version,
        remote_work_dir,
        connect_status,
        amg_status,
        fd_status,
        archive_watch_status,
        max_connections,
        danger_no_of_jobs,
        fc,
        fs,
        tr,
        fr,
        ec,
        host_error_counter,
        no_of_transfers,
        jobs_in_queue,
        no_of_hosts,
        no_of_dirs,
        no_of_jobs,
        top_tr,
        top_tr_time,
        top_fr,
        top_fr_time,
        top_no_of_transfers,
        top_transfer_time,
        files_send: rings[0],
        bytes_send: rings[1],
        files_received: rings[2],
        bytes_received: rings[3],
        connections: rings[4],
        total_errors: rings[5],
        log_bytes_received: rings[6],
        log_fifo,
        log_entry_counter,
        log_history,
        last_history_shift,
        poll_interval,
        connect_time,
        disconnect_time,
        last_data_time,
        failover,
        toggle: toggle & 1,
        options,
        log_capabilities,
        special_flag,
        typesize,
        seqno,
    }
}
