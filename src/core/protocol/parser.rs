// src/core/protocol/parser.rs

//! The pure tag parser: one framed protocol line in, one typed [`Update`] out.
//!
//! The parser owns no I/O and no site state. It works on the raw message
//! bytes because recipients arrive masked and severity bytes can collide with
//! the field separator, so a wholesale UTF-8 conversion up front would corrupt
//! both. Missing trailing fields are "not present", never an error; only a
//! field that is present but unparsable is reported.

use crate::core::FleetMonError;
use crate::core::constants::{
    COLOR_POOL_SIZE, ERROR_HISTORY_LENGTH, LOG_FIFO_SIZE, MAX_ALIAS_LENGTH, MAX_LOG_HISTORY,
    MAX_PATH_LENGTH, MAX_RECIPIENT_LENGTH, MAX_TYPESIZE_FIELDS, MAX_VERSION_LENGTH, NO_INFORMATION,
    REMOTE_SHUTDOWN_MESSAGE,
};
use crate::core::protocol::deobfuscate::deobfuscate_recipient;
use crate::core::snapshot::lists::{DirListEntry, HostListEntry, JobListEntry, alias_checksum};
use tracing::warn;

/// The fields of an `IS` interval summary. The first eight are sent by every
/// remote; the counter fields only by remotes that stream totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntervalSummary {
    pub fc: Option<u32>,
    pub fs: Option<u64>,
    pub tr: Option<u64>,
    pub fr: Option<u32>,
    pub ec: Option<u32>,
    pub host_error_counter: Option<u32>,
    pub no_of_transfers: Option<u32>,
    pub jobs_in_queue: Option<u32>,
    pub files_send: Option<u64>,
    pub bytes_send: Option<u64>,
    pub connections: Option<u64>,
    pub total_errors: Option<u64>,
    pub files_received: Option<u64>,
    pub bytes_received: Option<u64>,
}

/// A typed view of one inbound protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    IntervalSummary(IntervalSummary),
    HostCount(u32),
    DirCount(u32),
    JobCount(u32),
    MaxConnections(u32),
    AmgStatus(i32),
    FdStatus(i32),
    ArchiveWatchStatus(i32),
    DangerNoOfJobs(u32),
    Version(String),
    WorkDir(String),
    LogCapabilities(u32),
    Typesize(Vec<u32>),
    HostListEntry {
        pos: usize,
        entry: HostListEntry,
    },
    DirListEntry {
        pos: usize,
        entry: DirListEntry,
    },
    JobListEntry {
        pos: usize,
        entry: JobListEntry,
    },
    ErrorHistory {
        host_pos: usize,
        history: [u8; ERROR_HISTORY_LENGTH],
    },
    ReceiveHistory(Vec<u8>),
    TransferHistory(Vec<u8>),
    SystemHistory(Vec<u8>),
    SystemRadar {
        entry_counter: u32,
        fifo: Vec<u8>,
    },
    CommandReply(u16),
    RemoteShutdown,
}

bitflags::bitflags! {
    /// Tracks which tag kinds already produced a severity-substitution
    /// warning, so a chatty remote logs once per tag instead of per byte.
    #[derive(Debug, Clone, Copy, Default)]
    struct Warned: u8 {
        const RH = 1 << 0;
        const TH = 1 << 1;
        const SH = 1 << 2;
        const SR = 1 << 3;
    }
}

/// Per-session parser. The only state it carries is the warn-once bookkeeping;
/// the produced [`Update`] values depend solely on the input bytes.
#[derive(Debug, Default)]
pub struct TagParser {
    warned: Warned,
}

impl TagParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one framed message. `msg` is the message text followed by the
    /// NUL byte the framing layer wrote over the CR.
    pub fn parse(&mut self, msg: &[u8]) -> Result<Update, FleetMonError> {
        let line = match msg.iter().position(|&b| b == 0) {
            Some(nul) => &msg[..nul],
            None => msg,
        };

        if line == REMOTE_SHUTDOWN_MESSAGE.as_bytes() {
            return Ok(Update::RemoteShutdown);
        }

        // Numeric command status: three digits and a dash.
        if line.len() >= 4 && line[..3].iter().all(u8::is_ascii_digit) && line[3] == b'-' {
            let code = (line[0] - b'0') as u16 * 100
                + (line[1] - b'0') as u16 * 10
                + (line[2] - b'0') as u16;
            return Ok(Update::CommandReply(code));
        }

        if line.len() < 2 {
            return Err(FleetMonError::ProtocolError(format!(
                "Message too short: {:?}",
                String::from_utf8_lossy(line)
            )));
        }

        let tag: [u8; 2] = [line[0], line[1]];
        let payload = if line.len() > 3 { &line[3..] } else { &[][..] };

        match &tag {
            b"IS" => self.parse_is(payload),
            b"NH" => Ok(Update::HostCount(parse_u32("NH", "count", first(payload))?)),
            b"ND" => Ok(Update::DirCount(parse_u32("ND", "count", first(payload))?)),
            b"NJ" => Ok(Update::JobCount(parse_u32("NJ", "count", first(payload))?)),
            b"MC" => Ok(Update::MaxConnections(parse_u32(
                "MC",
                "max_connections",
                first(payload),
            )?)),
            b"AM" => Ok(Update::AmgStatus(parse_i32("AM", "status", first(payload))?)),
            b"FD" => Ok(Update::FdStatus(parse_i32("FD", "status", first(payload))?)),
            b"AW" => Ok(Update::ArchiveWatchStatus(parse_i32(
                "AW",
                "status",
                first(payload),
            )?)),
            b"DJ" => Ok(Update::DangerNoOfJobs(parse_u32(
                "DJ",
                "danger_no_of_jobs",
                first(payload),
            )?)),
            b"AV" => Ok(Update::Version(take_str(
                "AV",
                "version",
                payload,
                MAX_VERSION_LENGTH,
            )?)),
            b"WD" => Ok(Update::WorkDir(take_str(
                "WD",
                "work_dir",
                payload,
                MAX_PATH_LENGTH,
            )?)),
            b"LC" => Ok(Update::LogCapabilities(parse_u32(
                "LC",
                "capabilities",
                first(payload),
            )?)),
            b"TD" => self.parse_td(payload),
            b"HL" => self.parse_hl(payload),
            b"DL" => self.parse_dl(payload),
            b"JL" => self.parse_jl(payload, false),
            b"Jl" => self.parse_jl(payload, true),
            b"EL" => self.parse_el(payload),
            b"RH" => Ok(Update::ReceiveHistory(
                self.decode_history(payload, Warned::RH, "RH"),
            )),
            b"TH" => Ok(Update::TransferHistory(self.decode_history(
                payload,
                Warned::TH,
                "TH",
            ))),
            b"SH" => Ok(Update::SystemHistory(self.decode_history(
                payload,
                Warned::SH,
                "SH",
            ))),
            b"SR" => self.parse_sr(payload),
            _ => Err(FleetMonError::UnknownTag(
                String::from_utf8_lossy(&tag).into_owned(),
            )),
        }
    }

    fn parse_is(&mut self, payload: &[u8]) -> Result<Update, FleetMonError> {
        let mut cursor = payload;
        let mut summary = IntervalSummary::default();

        summary.fc = opt_u32("IS", "fc", next_token(&mut cursor))?;
        summary.fs = opt_u64("IS", "fs", next_token(&mut cursor))?;
        summary.tr = opt_u64("IS", "tr", next_token(&mut cursor))?;
        summary.fr = opt_u32("IS", "fr", next_token(&mut cursor))?;
        summary.ec = opt_u32("IS", "ec", next_token(&mut cursor))?;
        summary.host_error_counter =
            opt_u32("IS", "host_error_counter", next_token(&mut cursor))?;
        summary.no_of_transfers = opt_u32("IS", "no_of_transfers", next_token(&mut cursor))?;
        summary.jobs_in_queue = opt_u32("IS", "jobs_in_queue", next_token(&mut cursor))?;
        summary.files_send = opt_u64("IS", "files_send", next_token(&mut cursor))?;
        summary.bytes_send = opt_u64("IS", "bytes_send", next_token(&mut cursor))?;
        summary.connections = opt_u64("IS", "connections", next_token(&mut cursor))?;
        summary.total_errors = opt_u64("IS", "total_errors", next_token(&mut cursor))?;
        summary.files_received = opt_u64("IS", "files_received", next_token(&mut cursor))?;
        summary.bytes_received = opt_u64("IS", "bytes_received", next_token(&mut cursor))?;

        Ok(Update::IntervalSummary(summary))
    }

    fn parse_td(&mut self, payload: &[u8]) -> Result<Update, FleetMonError> {
        let mut cursor = payload;
        let mut values = Vec::with_capacity(MAX_TYPESIZE_FIELDS);
        while let Some(token) = next_token(&mut cursor) {
            if values.len() == MAX_TYPESIZE_FIELDS {
                warn!("TD message carries more than {MAX_TYPESIZE_FIELDS} sizes, extras dropped");
                break;
            }
            values.push(parse_u32("TD", "size", Some(token))?);
        }
        Ok(Update::Typesize(values))
    }

    fn parse_hl(&mut self, payload: &[u8]) -> Result<Update, FleetMonError> {
        let mut cursor = payload;
        let pos = parse_u32("HL", "pos", next_token(&mut cursor))? as usize;
        let alias = take_str("HL", "alias", require("HL", "alias", next_token(&mut cursor))?,
            MAX_ALIAS_LENGTH)?;

        let entry = match next_token(&mut cursor) {
            // No real hostname at all: a group row.
            None => HostListEntry::group(alias),
            Some(real1) => {
                let primary = take_str("HL", "real_hostname_1", real1, MAX_REAL_HOSTNAME)?;
                let secondary = match next_token(&mut cursor) {
                    Some(real2) => take_str("HL", "real_hostname_2", real2, MAX_REAL_HOSTNAME)?,
                    None => String::new(),
                };
                let mut entry = HostListEntry::new(alias, primary, secondary);
                entry.host_id = alias_checksum(&entry.alias);
                entry
            }
        };

        Ok(Update::HostListEntry { pos, entry })
    }

    fn parse_dl(&mut self, payload: &[u8]) -> Result<Update, FleetMonError> {
        let mut cursor = payload;
        let pos = parse_u32("DL", "pos", next_token(&mut cursor))? as usize;
        let dir_id = parse_hex_u32("DL", "dir_id", next_token(&mut cursor))?;
        let dir_alias = take_str(
            "DL",
            "dir_alias",
            require("DL", "dir_alias", next_token(&mut cursor))?,
            MAX_ALIAS_LENGTH,
        )?;
        let dir_name = take_str(
            "DL",
            "dir_name",
            require("DL", "dir_name", next_token(&mut cursor))?,
            MAX_PATH_LENGTH,
        )?;

        let mut entry = DirListEntry {
            dir_id,
            entry_time: 0,
            dir_alias,
            dir_name,
            ..Default::default()
        };
        if let Some(orig) = next_token(&mut cursor) {
            entry.original_dir_name = take_str("DL", "original_dir_name", orig, MAX_PATH_LENGTH)?;
            if let Some(user) = next_token(&mut cursor) {
                entry.home_dir_user = take_str("DL", "home_dir_user", user, MAX_ALIAS_LENGTH * 4)?;
                entry.home_dir_length =
                    parse_hex_u32("DL", "home_dir_length", next_token(&mut cursor))?;
            }
        }

        Ok(Update::DirListEntry { pos, entry })
    }

    fn parse_jl(&mut self, payload: &[u8], masked: bool) -> Result<Update, FleetMonError> {
        let tag = if masked { "Jl" } else { "JL" };
        let mut cursor = payload;
        let pos = parse_u32(tag_static(masked), "pos", next_token(&mut cursor))? as usize;
        let job_id = parse_hex_u32(tag_static(masked), "job_id", next_token(&mut cursor))?;
        let dir_id = parse_hex_u32(tag_static(masked), "dir_id", next_token(&mut cursor))?;
        let no_of_loptions =
            parse_hex_u32(tag_static(masked), "no_of_loptions", next_token(&mut cursor))?;
        let priority = require(tag_static(masked), "priority", next_token(&mut cursor))?;
        if priority.len() != 1 {
            return Err(FleetMonError::BadField {
                tag: tag_static(masked),
                field: "priority",
            });
        }

        // The recipient is everything after the single separator following
        // the priority character, raw: a masked recipient may contain any
        // byte value including spaces.
        if cursor.first() == Some(&b' ') {
            cursor = &cursor[1..];
        }
        let mut recipient = cursor.to_vec();
        if masked {
            deobfuscate_recipient(&mut recipient);
        }
        if recipient.len() > MAX_RECIPIENT_LENGTH {
            warn!(
                "{tag} recipient of {} bytes exceeds the {MAX_RECIPIENT_LENGTH}-byte limit, truncated",
                recipient.len()
            );
            recipient.truncate(MAX_RECIPIENT_LENGTH);
        }
        let recipient = String::from_utf8_lossy(&recipient).into_owned();

        Ok(Update::JobListEntry {
            pos,
            entry: JobListEntry {
                job_id,
                dir_id,
                no_of_loptions,
                entry_time: 0,
                priority: priority[0],
                recipient,
            },
        })
    }

    fn parse_el(&mut self, payload: &[u8]) -> Result<Update, FleetMonError> {
        let mut cursor = payload;
        let host_pos = parse_u32("EL", "host_pos", next_token(&mut cursor))? as usize;

        // Values beyond the window are dropped; the tail is zero-filled.
        let mut history = [0u8; ERROR_HISTORY_LENGTH];
        let mut k = 0;
        while let Some(token) = next_token(&mut cursor) {
            if k == ERROR_HISTORY_LENGTH {
                warn!("EL message carries more than {ERROR_HISTORY_LENGTH} entries, extras dropped");
                break;
            }
            history[k] = parse_u32("EL", "error_code", Some(token))?.min(u8::MAX as u32) as u8;
            k += 1;
        }

        Ok(Update::ErrorHistory { host_pos, history })
    }

    fn parse_sr(&mut self, payload: &[u8]) -> Result<Update, FleetMonError> {
        // The fifo bytes follow a single space after the counter and may
        // themselves be spaces, so only the first token is split off.
        let space = payload.iter().position(|&b| b == b' ');
        let (counter_bytes, rest) = match space {
            Some(i) => (&payload[..i], &payload[i + 1..]),
            None => (payload, &[][..]),
        };
        let entry_counter = parse_u32("SR", "entry_counter", Some(counter_bytes))?;

        let mut fifo: Vec<u8> = rest
            .iter()
            .map(|&b| self.decode_severity(b, Warned::SR, "SR"))
            .collect();
        if fifo.len() > LOG_FIFO_SIZE {
            warn!("SR message carries more than {LOG_FIFO_SIZE} entries, extras dropped");
            fifo.truncate(LOG_FIFO_SIZE);
        }

        Ok(Update::SystemRadar {
            entry_counter,
            fifo,
        })
    }

    fn decode_history(&mut self, payload: &[u8], kind: Warned, tag: &str) -> Vec<u8> {
        let mut bytes: Vec<u8> = payload
            .iter()
            .map(|&b| self.decode_severity(b, kind, tag))
            .collect();
        if bytes.len() > MAX_LOG_HISTORY {
            warn!("{tag} message carries more than {MAX_LOG_HISTORY} hours, extras dropped");
            bytes.truncate(MAX_LOG_HISTORY);
        }
        bytes
    }

    /// History and fifo bytes arrive as `severity + ' '` to stay printable.
    fn decode_severity(&mut self, byte: u8, kind: Warned, tag: &str) -> u8 {
        let value = byte.wrapping_sub(b' ');
        if value > COLOR_POOL_SIZE {
            if !self.warned.contains(kind) {
                warn!("{tag} message carries severity {value} outside the pool, mapped to no-information");
                self.warned.insert(kind);
            }
            return NO_INFORMATION;
        }
        value
    }
}

const MAX_REAL_HOSTNAME: usize = crate::core::constants::MAX_REAL_HOSTNAME_LENGTH;

fn tag_static(masked: bool) -> &'static str {
    if masked { "Jl" } else { "JL" }
}

/// Splits the next space-separated token off the cursor.
fn next_token<'a>(cursor: &mut &'a [u8]) -> Option<&'a [u8]> {
    while let [b' ', rest @ ..] = *cursor {
        *cursor = rest;
    }
    if cursor.is_empty() {
        return None;
    }
    let end = cursor
        .iter()
        .position(|&b| b == b' ')
        .unwrap_or(cursor.len());
    let (token, rest) = cursor.split_at(end);
    *cursor = rest;
    Some(token)
}

fn first(payload: &[u8]) -> Option<&[u8]> {
    let mut cursor = payload;
    next_token(&mut cursor)
}

fn require<'a>(
    tag: &'static str,
    field: &'static str,
    token: Option<&'a [u8]>,
) -> Result<&'a [u8], FleetMonError> {
    token.ok_or(FleetMonError::BadField { tag, field })
}

fn parse_u64(
    tag: &'static str,
    field: &'static str,
    token: Option<&[u8]>,
) -> Result<u64, FleetMonError> {
    let token = require(tag, field, token)?;
    std::str::from_utf8(token)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(FleetMonError::BadField { tag, field })
}

fn parse_u32(
    tag: &'static str,
    field: &'static str,
    token: Option<&[u8]>,
) -> Result<u32, FleetMonError> {
    let token = require(tag, field, token)?;
    std::str::from_utf8(token)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(FleetMonError::BadField { tag, field })
}

fn parse_i32(
    tag: &'static str,
    field: &'static str,
    token: Option<&[u8]>,
) -> Result<i32, FleetMonError> {
    let token = require(tag, field, token)?;
    std::str::from_utf8(token)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(FleetMonError::BadField { tag, field })
}

fn parse_hex_u32(
    tag: &'static str,
    field: &'static str,
    token: Option<&[u8]>,
) -> Result<u32, FleetMonError> {
    let token = require(tag, field, token)?;
    std::str::from_utf8(token)
        .ok()
        .and_then(|s| u32::from_str_radix(s, 16).ok())
        .ok_or(FleetMonError::BadField { tag, field })
}

fn opt_u64(
    tag: &'static str,
    field: &'static str,
    token: Option<&[u8]>,
) -> Result<Option<u64>, FleetMonError> {
    match token {
        None => Ok(None),
        some => parse_u64(tag, field, some).map(Some),
    }
}

fn opt_u32(
    tag: &'static str,
    field: &'static str,
    token: Option<&[u8]>,
) -> Result<Option<u32>, FleetMonError> {
    match token {
        None => Ok(None),
        some => parse_u32(tag, field, some).map(Some),
    }
}

/// Converts a field to a `String`, truncating to `max` bytes with a warning.
fn take_str(
    tag: &'static str,
    field: &'static str,
    bytes: &[u8],
    max: usize,
) -> Result<String, FleetMonError> {
    let s = std::str::from_utf8(bytes).map_err(|_| FleetMonError::BadField { tag, field })?;
    if s.len() > max {
        warn!("{tag} {field} of {} bytes exceeds the {max}-byte limit, truncated", s.len());
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        return Ok(s[..end].to_string());
    }
    Ok(s.to_string())
}
