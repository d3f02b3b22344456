// src/core/status/record.rs

//! The per-site status record and its helper types.
//!
//! One polling client owns the live fields of its record; the aggregator owns
//! ring slots 1..5 and the rotation of the top arrays; the supervisor owns
//! group rows. Every mutation bumps `seqno` so snapshot readers can detect a
//! torn publish.

use crate::config::{Endpoint, SiteConfig};
use crate::core::Update;
use crate::core::constants::{LOG_FIFO_SIZE, MAX_LOG_HISTORY, NO_INFORMATION, STORAGE_TIME};
use crate::core::snapshot::TypesizeData;
use strum_macros::{Display, FromRepr};

/// Connect status codes, ordered by severity. Group rows take the maximum of
/// their members.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Display, FromRepr,
)]
#[repr(u8)]
pub enum ConnectStatus {
    Established = 0,
    Connecting = 1,
    #[default]
    Disconnected = 2,
    Stopped = 3,
    Disabled = 4,
    Defunct = 5,
}

/// Endpoint failover policy for a site with two configured endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum SwitchMode {
    #[default]
    None,
    Auto,
    User,
}

bitflags::bitflags! {
    /// Per-site option bits from the site configuration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SiteOptions: u32 {
        const TLS                  = 1 << 0;
        const COMPRESSION          = 1 << 1;
        const STRICT_HOST_KEY      = 1 << 2;
        const SYSTEM_LOG           = 1 << 3;
        const EVENT_LOG            = 1 << 4;
        const RECEIVE_LOG          = 1 << 5;
        const TRANSFER_LOG         = 1 << 6;
        const TRANSFER_DEBUG_LOG   = 1 << 7;
        const FAILOVER_AUTO        = 1 << 8;
        const FAILOVER_USER        = 1 << 9;
    }
}

bitflags::bitflags! {
    /// Log streams a remote declares it can serve (`LC`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LogCapabilities: u32 {
        const SYSTEM         = 1 << 0;
        const EVENT          = 1 << 1;
        const RECEIVE        = 1 << 2;
        const TRANSFER       = 1 << 3;
        const TRANSFER_DEBUG = 1 << 4;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SpecialFlags: u8 {
        const COUNTERS_INITIALIZED = 1 << 0;
    }
}

impl SiteOptions {
    pub fn failover_mode(self) -> SwitchMode {
        if self.contains(SiteOptions::FAILOVER_AUTO) {
            SwitchMode::Auto
        } else if self.contains(SiteOptions::FAILOVER_USER) {
            SwitchMode::User
        } else {
            SwitchMode::None
        }
    }

    /// The log streams this site wants forwarded, as a capability mask.
    pub fn requested_logs(self) -> LogCapabilities {
        let mut logs = LogCapabilities::empty();
        if self.contains(SiteOptions::SYSTEM_LOG) {
            logs |= LogCapabilities::SYSTEM;
        }
        if self.contains(SiteOptions::EVENT_LOG) {
            logs |= LogCapabilities::EVENT;
        }
        if self.contains(SiteOptions::RECEIVE_LOG) {
            logs |= LogCapabilities::RECEIVE;
        }
        if self.contains(SiteOptions::TRANSFER_LOG) {
            logs |= LogCapabilities::TRANSFER;
        }
        if self.contains(SiteOptions::TRANSFER_DEBUG_LOG) {
            logs |= LogCapabilities::TRANSFER_DEBUG;
        }
        logs
    }
}

/// Which ring slot a roll-up period rebases against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[repr(usize)]
pub enum RingSlot {
    Hour = 1,
    Day = 2,
    Week = 3,
    Month = 4,
    Year = 5,
}

impl RingSlot {
    pub const ALL: [RingSlot; 5] = [
        RingSlot::Hour,
        RingSlot::Day,
        RingSlot::Week,
        RingSlot::Month,
        RingSlot::Year,
    ];
}

/// A six-slot counter ring. Slot 0 is the monotonically growing current
/// value; slots 1..5 hold the value of slot 0 at the start of the running
/// hour, day, week, month and year.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterRing {
    pub slots: [u64; 6],
}

impl CounterRing {
    pub fn current(&self) -> u64 {
        self.slots[0]
    }

    pub fn set_current(&mut self, value: u64) {
        self.slots[0] = value;
    }

    /// Seeds every baseline slot from slot 0.
    pub fn seed(&mut self) {
        self.slots = [self.slots[0]; 6];
    }

    /// Returns the delta since the slot's baseline and rebases the slot.
    /// A current value below the baseline means the remote counter rolled
    /// over; the delta for that period is zero.
    pub fn take_delta(&mut self, slot: RingSlot) -> (u64, bool) {
        let idx = slot as usize;
        let current = self.slots[0];
        let baseline = self.slots[idx];
        self.slots[idx] = current;
        if current < baseline {
            (0, true)
        } else {
            (current - baseline, false)
        }
    }
}

/// The three 48-hour severity histories a remote streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum LogHistoryKind {
    Receive = 0,
    Transfer = 1,
    System = 2,
}

/// One fixed-layout record of the shared status area.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteRecord {
    // Identity.
    pub alias: String,
    pub endpoints: [Endpoint; 2],
    /// Empty string marks a group-aggregate row that owns no polling client.
    pub remote_cmd: String,
    pub remote_version: String,
    pub remote_work_dir: String,

    // Live status.
    pub connect_status: ConnectStatus,
    pub amg_status: i32,
    pub fd_status: i32,
    pub archive_watch_status: i32,
    pub max_connections: u32,
    pub danger_no_of_jobs: u32,
    pub fc: u32,
    pub fs: u64,
    pub tr: u64,
    pub fr: u32,
    pub ec: u32,
    pub host_error_counter: u32,
    pub no_of_transfers: u32,
    pub jobs_in_queue: u32,
    pub no_of_hosts: u32,
    pub no_of_dirs: u32,
    pub no_of_jobs: u32,

    // Rolling maxima, one slot per day.
    pub top_tr: [u64; STORAGE_TIME],
    pub top_tr_time: i64,
    pub top_fr: [u32; STORAGE_TIME],
    pub top_fr_time: i64,
    pub top_no_of_transfers: [u32; STORAGE_TIME],
    pub top_transfer_time: i64,

    // Counter rings.
    pub files_send: CounterRing,
    pub bytes_send: CounterRing,
    pub files_received: CounterRing,
    pub bytes_received: CounterRing,
    pub connections: CounterRing,
    pub total_errors: CounterRing,
    pub log_bytes_received: CounterRing,

    // Log fifo and histories.
    pub log_fifo: [u8; LOG_FIFO_SIZE],
    pub log_entry_counter: u32,
    pub log_history: [[u8; MAX_LOG_HISTORY]; 3],
    pub(crate) last_history_shift: [i64; 3],

    // Timing.
    pub poll_interval: u64,
    pub connect_time: u64,
    pub disconnect_time: u64,
    pub last_data_time: i64,

    // Failover.
    pub failover: SwitchMode,
    pub toggle: usize,

    // Flags.
    pub options: SiteOptions,
    pub log_capabilities: LogCapabilities,
    pub special_flag: SpecialFlags,

    pub typesize: TypesizeData,

    /// Bumped on every mutation; lets external readers detect torn reads.
    pub seqno: u64,
}

impl SiteRecord {
    pub fn from_config(site: &SiteConfig) -> Self {
        Self {
            alias: site.alias.clone(),
            endpoints: site.endpoints.clone(),
            remote_cmd: site.command.clone(),
            remote_version: String::new(),
            remote_work_dir: String::new(),
            connect_status: ConnectStatus::Disconnected,
            amg_status: 0,
            fd_status: 0,
            archive_watch_status: 0,
            max_connections: 0,
            danger_no_of_jobs: 0,
            fc: 0,
            fs: 0,
            tr: 0,
            fr: 0,
            ec: 0,
            host_error_counter: 0,
            no_of_transfers: 0,
            jobs_in_queue: 0,
            no_of_hosts: 0,
            no_of_dirs: 0,
            no_of_jobs: 0,
            top_tr: [0; STORAGE_TIME],
            top_tr_time: 0,
            top_fr: [0; STORAGE_TIME],
            top_fr_time: 0,
            top_no_of_transfers: [0; STORAGE_TIME],
            top_transfer_time: 0,
            files_send: CounterRing::default(),
            bytes_send: CounterRing::default(),
            files_received: CounterRing::default(),
            bytes_received: CounterRing::default(),
            connections: CounterRing::default(),
            total_errors: CounterRing::default(),
            log_bytes_received: CounterRing::default(),
            log_fifo: [NO_INFORMATION; LOG_FIFO_SIZE],
            log_entry_counter: 0,
            log_history: [[NO_INFORMATION; MAX_LOG_HISTORY]; 3],
            last_history_shift: [-1; 3],
            poll_interval: site.poll_interval,
            connect_time: site.connect_time,
            disconnect_time: site.disconnect_time,
            last_data_time: 0,
            failover: site.options.failover_mode(),
            toggle: 0,
            options: site.options,
            log_capabilities: LogCapabilities::empty(),
            special_flag: SpecialFlags::empty(),
            typesize: TypesizeData::default(),
            seqno: 0,
        }
    }

    /// Group rows own no polling client; their live fields are derived from
    /// the member rows that follow them.
    pub fn is_group(&self) -> bool {
        self.remote_cmd.is_empty()
    }

    pub fn current_endpoint(&self) -> &Endpoint {
        &self.endpoints[self.toggle & 1]
    }

    fn touch(&mut self) {
        self.seqno = self.seqno.wrapping_add(1);
    }

    pub fn set_connect_status(&mut self, status: ConnectStatus) {
        self.connect_status = status;
        self.touch();
    }

    /// Applies a record-targeted update. List updates (`HL`/`DL`/`JL`/`EL`)
    /// belong to the snapshot manager and return `false` here.
    ///
    /// `now_hour` is the hour index of `last_data_time`, used for the
    /// once-per-hour history shift.
    pub fn apply(&mut self, update: &Update, now_hour: i64) -> bool {
        match update {
            Update::IntervalSummary(is) => self.apply_interval_summary(is),
            Update::HostCount(n) => self.no_of_hosts = *n,
            Update::DirCount(n) => self.no_of_dirs = *n,
            Update::JobCount(n) => self.no_of_jobs = *n,
            Update::MaxConnections(n) => self.max_connections = *n,
            Update::AmgStatus(s) => self.amg_status = *s,
            Update::FdStatus(s) => self.fd_status = *s,
            Update::ArchiveWatchStatus(s) => self.archive_watch_status = *s,
            Update::DangerNoOfJobs(n) => self.danger_no_of_jobs = *n,
            Update::Version(v) => self.remote_version = v.clone(),
            Update::WorkDir(d) => self.remote_work_dir = d.clone(),
            Update::LogCapabilities(bits) => {
                self.log_capabilities = LogCapabilities::from_bits_truncate(*bits);
            }
            Update::Typesize(values) => {
                for (slot, value) in self.typesize.values.iter_mut().zip(values) {
                    *slot = *value;
                }
            }
            Update::ReceiveHistory(bytes) => {
                self.apply_history(LogHistoryKind::Receive, bytes, now_hour)
            }
            Update::TransferHistory(bytes) => {
                self.apply_history(LogHistoryKind::Transfer, bytes, now_hour)
            }
            Update::SystemHistory(bytes) => {
                self.apply_history(LogHistoryKind::System, bytes, now_hour)
            }
            Update::SystemRadar {
                entry_counter,
                fifo,
            } => {
                self.log_entry_counter = *entry_counter;
                self.log_fifo[..fifo.len()].copy_from_slice(fifo);
            }
            Update::CommandReply(_) | Update::RemoteShutdown => return false,
            Update::HostListEntry { .. }
            | Update::DirListEntry { .. }
            | Update::JobListEntry { .. }
            | Update::ErrorHistory { .. } => return false,
        }
        self.touch();
        true
    }

    fn apply_interval_summary(&mut self, is: &crate::core::protocol::IntervalSummary) {
        if let Some(v) = is.fc {
            self.fc = v;
        }
        if let Some(v) = is.fs {
            self.fs = v;
        }
        if let Some(v) = is.tr {
            self.tr = v;
            if v > self.top_tr[0] {
                self.top_tr[0] = v;
                self.top_tr_time = self.last_data_time;
            }
        }
        if let Some(v) = is.fr {
            self.fr = v;
            if v > self.top_fr[0] {
                self.top_fr[0] = v;
                self.top_fr_time = self.last_data_time;
            }
        }
        if let Some(v) = is.ec {
            self.ec = v;
        }
        if let Some(v) = is.host_error_counter {
            self.host_error_counter = v;
        }
        if let Some(v) = is.no_of_transfers {
            self.no_of_transfers = v;
            if v > self.top_no_of_transfers[0] {
                self.top_no_of_transfers[0] = v;
                self.top_transfer_time = self.last_data_time;
            }
        }
        if let Some(v) = is.jobs_in_queue {
            self.jobs_in_queue = v;
        }

        if let Some(v) = is.files_send {
            self.files_send.set_current(v);
        }
        if let Some(v) = is.bytes_send {
            self.bytes_send.set_current(v);
        }
        if let Some(v) = is.connections {
            self.connections.set_current(v);
        }
        if let Some(v) = is.total_errors {
            self.total_errors.set_current(v);
        }
        if let Some(v) = is.files_received {
            self.files_received.set_current(v);
        }
        if let Some(v) = is.bytes_received {
            self.bytes_received.set_current(v);
        }

        if !self.special_flag.contains(SpecialFlags::COUNTERS_INITIALIZED) {
            self.seed_counters();
        }
    }

    /// Seeds all ring baselines from their current values and marks the
    /// record as having established baselines.
    pub fn seed_counters(&mut self) {
        self.files_send.seed();
        self.bytes_send.seed();
        self.files_received.seed();
        self.bytes_received.seed();
        self.connections.seed();
        self.total_errors.seed();
        self.log_bytes_received.seed();
        self.special_flag.insert(SpecialFlags::COUNTERS_INITIALIZED);
    }

    /// A short history update shifts the window left once per hour and
    /// right-aligns the new bytes; a full-length update replaces the window.
    fn apply_history(&mut self, kind: LogHistoryKind, bytes: &[u8], now_hour: i64) {
        let history = &mut self.log_history[kind as usize];
        if bytes.len() >= MAX_LOG_HISTORY {
            history.copy_from_slice(&bytes[..MAX_LOG_HISTORY]);
            return;
        }
        if self.last_history_shift[kind as usize] != now_hour {
            history.copy_within(1.., 0);
            history[MAX_LOG_HISTORY - 1] = NO_INFORMATION;
            self.last_history_shift[kind as usize] = now_hour;
        }
        history[MAX_LOG_HISTORY - bytes.len()..].copy_from_slice(bytes);
    }

    /// Pushes one severity byte into the radar fifo, oldest out first.
    pub fn push_log_severity(&mut self, severity: u8) {
        self.log_fifo.copy_within(1.., 0);
        self.log_fifo[LOG_FIFO_SIZE - 1] = severity;
        self.log_entry_counter = self.log_entry_counter.wrapping_add(1);
        self.touch();
    }

    /// Records inbound log bytes on the slot-0 counter owned by the site's
    /// log forwarder.
    pub fn add_log_bytes(&mut self, count: u64) {
        let current = self.log_bytes_received.current();
        self.log_bytes_received.set_current(current + count);
        self.touch();
    }

    /// Shifts every top array one slot right and clears the slot-0 maxima and
    /// their timestamps. Run by the aggregator at UTC midnight.
    pub fn rotate_tops(&mut self) {
        self.top_tr.copy_within(0..STORAGE_TIME - 1, 1);
        self.top_tr[0] = 0;
        self.top_tr_time = 0;
        self.top_fr.copy_within(0..STORAGE_TIME - 1, 1);
        self.top_fr[0] = 0;
        self.top_fr_time = 0;
        self.top_no_of_transfers.copy_within(0..STORAGE_TIME - 1, 1);
        self.top_no_of_transfers[0] = 0;
        self.top_transfer_time = 0;
        self.touch();
    }

    /// Carries long-lived history over from the record of a previous attach
    /// of the same alias: counters, tops, histories and the failover toggle
    /// survive a configuration reload, live session state does not.
    pub fn inherit(&mut self, previous: &SiteRecord) {
        self.top_tr = previous.top_tr;
        self.top_tr_time = previous.top_tr_time;
        self.top_fr = previous.top_fr;
        self.top_fr_time = previous.top_fr_time;
        self.top_no_of_transfers = previous.top_no_of_transfers;
        self.top_transfer_time = previous.top_transfer_time;
        self.files_send = previous.files_send;
        self.bytes_send = previous.bytes_send;
        self.files_received = previous.files_received;
        self.bytes_received = previous.bytes_received;
        self.connections = previous.connections;
        self.total_errors = previous.total_errors;
        self.log_bytes_received = previous.log_bytes_received;
        self.log_fifo = previous.log_fifo;
        self.log_entry_counter = previous.log_entry_counter;
        self.log_history = previous.log_history;
        self.special_flag = previous.special_flag;
        self.toggle = previous.toggle;
        self.touch();
    }

    pub fn history(&self, kind: LogHistoryKind) -> &[u8; MAX_LOG_HISTORY] {
        &self.log_history[kind as usize]
    }
}
