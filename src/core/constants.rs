// src/core/constants.rs

//! Protocol and layout constants shared by the whole crate.
//!
//! The remote status daemon speaks a compact two-letter-tag protocol; the
//! widths and slot counts below define both the wire limits and the fixed
//! record layout of the published status area.

use std::time::Duration;

/// Days of rolling maxima kept per site (`top_tr`, `top_fr`, ...).
pub const STORAGE_TIME: usize = 7;

/// Hours of per-category log history (one severity byte per hour).
pub const MAX_LOG_HISTORY: usize = 48;

/// Entries in the system-log radar fifo.
pub const LOG_FIFO_SIZE: usize = 10;

/// Error-history slots per remote host row.
pub const ERROR_HISTORY_LENGTH: usize = 16;

/// List snapshot files grow and shrink in blocks of this many entries.
pub const DATA_STEP_SIZE: usize = 10;

/// Header bytes reserved at the start of every list snapshot file.
pub const WORD_OFFSET: usize = 8;

// Field width limits. Oversized inbound fields are truncated with a warning.
pub const MAX_ALIAS_LENGTH: usize = 12;
pub const MAX_REMOTE_CMD_LENGTH: usize = 20;
pub const MAX_REAL_HOSTNAME_LENGTH: usize = 70;
pub const MAX_VERSION_LENGTH: usize = 40;
pub const MAX_PATH_LENGTH: usize = 1024;
pub const MAX_RECIPIENT_LENGTH: usize = 256;

/// Slots in the typesize vector a remote reports via `TD`.
pub const MAX_TYPESIZE_FIELDS: usize = 16;

// Typesize defaults assumed until a remote reports its own sizes.
pub const MAX_MSG_NAME_DEFAULT: usize = 30;
pub const MAX_FILENAME_DEFAULT: usize = 256;
pub const MAX_HOSTNAME_DEFAULT: usize = 40;

/// Severity codes form a closed pool; anything above is mapped to
/// `NO_INFORMATION` on receipt.
pub const COLOR_POOL_SIZE: u8 = 7;
pub const NO_INFORMATION: u8 = 0;
pub const SEVERITY_INFO: u8 = 1;
pub const SEVERITY_CONFIG: u8 = 2;
pub const SEVERITY_WARN: u8 = 3;
pub const SEVERITY_ERROR_OFFLINE: u8 = 4;
pub const SEVERITY_ERROR: u8 = 5;
pub const SEVERITY_FAULTY: u8 = 6;

/// A first real-hostname byte equal to this marks a host row as a group row.
pub const GROUP_IDENTIFIER: u8 = b'+';

/// Wait between reconnect attempts, and the window of consecutive connect
/// failures after which automatic failover flips the endpoint toggle.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(60);

/// Cadence of the group-aggregate recompute pass on supervisor idle.
pub const GROUP_RESCAN_TIME: Duration = Duration::from_secs(1);

/// Default connect timeout when the configuration does not override it.
pub const DEFAULT_TCP_TIMEOUT: Duration = Duration::from_secs(120);

/// A child that dies twice within this window counts as a crash loop.
pub const CRASH_LOOP_WINDOW: Duration = Duration::from_secs(5);

/// After this many restarts a child is abandoned until the next config change.
pub const MAX_RESTART_COUNT: u32 = 20;

/// Shutdown escalation: how many 100 ms polls to grant a child before a kill.
pub const SHUTDOWN_POLLS: u32 = 9;
pub const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

// Client-issued commands (CRLF is appended by the codec).
pub const CMD_START_STAT: &str = "START_STAT";
pub const CMD_STAT: &str = "STAT";
pub const CMD_QUIT: &str = "QUIT";
pub const CMD_START_LOG: &str = "START_LOG";

/// The literal line a remote sends before closing down.
pub const REMOTE_SHUTDOWN_MESSAGE: &str = "500- Shutdown";

// Process exit codes. `INCORRECT` covers any failure without a better code.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_SYNTAX: i32 = 1;
pub const EXIT_ALREADY_RUNNING: i32 = 5;
pub const EXIT_INCORRECT: i32 = 6;
pub const EXIT_DISABLED_BY_SYSADM: i32 = 7;
