// src/core/snapshot/lists.rs

//! The entry types stored in the per-site list snapshot files.

use crate::core::constants::{
    ERROR_HISTORY_LENGTH, GROUP_IDENTIFIER, MAX_ALIAS_LENGTH, MAX_FILENAME_DEFAULT,
    MAX_HOSTNAME_DEFAULT, MAX_MSG_NAME_DEFAULT, MAX_PATH_LENGTH, MAX_REAL_HOSTNAME_LENGTH,
    MAX_RECIPIENT_LENGTH, MAX_TYPESIZE_FIELDS, MAX_VERSION_LENGTH,
};
use crc::{CRC_32_ISO_HDLC, Crc};

const ID_CHECKSUM: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Derives the stable numeric id of a host row from its alias.
pub fn alias_checksum(alias: &str) -> u32 {
    ID_CHECKSUM.checksum(alias.as_bytes())
}

/// One row of the host inventory a remote reports via `HL`.
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct HostListEntry {
    pub host_id: u32,
    pub alias: String,
    pub primary_real_hostname: String,
    pub secondary_real_hostname: String,
    pub error_history: [u8; ERROR_HISTORY_LENGTH],
}

impl HostListEntry {
    pub fn new(alias: String, primary: String, secondary: String) -> Self {
        Self {
            host_id: alias_checksum(&alias),
            alias,
            primary_real_hostname: primary,
            secondary_real_hostname: secondary,
            error_history: [0; ERROR_HISTORY_LENGTH],
        }
    }

    /// A group row: no real hostname, only an alias grouping the rows below it.
    pub fn group(alias: String) -> Self {
        let mut entry = Self::new(alias, String::new(), String::new());
        entry.primary_real_hostname = (GROUP_IDENTIFIER as char).to_string();
        entry
    }

    pub fn is_group(&self) -> bool {
        self.primary_real_hostname.as_bytes().first() == Some(&GROUP_IDENTIFIER)
    }
}

impl Default for HostListEntry {
    fn default() -> Self {
        Self::new(String::new(), String::new(), String::new())
    }
}

/// One row of the directory inventory a remote reports via `DL`.
#[derive(Debug, Clone, Default, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct DirListEntry {
    pub dir_id: u32,
    /// Unix time the entry was first seen; drives retention in the reshuffle.
    pub entry_time: i64,
    pub dir_alias: String,
    pub dir_name: String,
    pub original_dir_name: String,
    pub home_dir_user: String,
    pub home_dir_length: u32,
}

/// One row of the job inventory a remote reports via `JL`/`Jl`.
#[derive(Debug, Clone, Default, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct JobListEntry {
    pub job_id: u32,
    pub dir_id: u32,
    pub no_of_loptions: u32,
    pub entry_time: i64,
    pub priority: u8,
    pub recipient: String,
}

/// The compile-time sizes a remote declares via `TD`, so variable-width
/// textual fields can be interpreted without recompiling the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct TypesizeData {
    pub values: [u32; MAX_TYPESIZE_FIELDS],
}

impl TypesizeData {
    pub fn msg_name_length(&self) -> usize {
        self.values[0] as usize
    }
    pub fn filename_length(&self) -> usize {
        self.values[1] as usize
    }
    pub fn hostname_length(&self) -> usize {
        self.values[2] as usize
    }
    pub fn real_hostname_length(&self) -> usize {
        self.values[3] as usize
    }
    pub fn alias_length(&self) -> usize {
        self.values[4] as usize
    }
    pub fn path_length(&self) -> usize {
        self.values[5] as usize
    }
    pub fn recipient_length(&self) -> usize {
        self.values[6] as usize
    }
    pub fn version_length(&self) -> usize {
        self.values[7] as usize
    }
}

impl Default for TypesizeData {
    fn default() -> Self {
        let mut values = [0u32; MAX_TYPESIZE_FIELDS];
        values[0] = MAX_MSG_NAME_DEFAULT as u32;
        values[1] = MAX_FILENAME_DEFAULT as u32;
        values[2] = MAX_HOSTNAME_DEFAULT as u32;
        values[3] = MAX_REAL_HOSTNAME_LENGTH as u32;
        values[4] = MAX_ALIAS_LENGTH as u32;
        values[5] = MAX_PATH_LENGTH as u32;
        values[6] = MAX_RECIPIENT_LENGTH as u32;
        values[7] = MAX_VERSION_LENGTH as u32;
        Self { values }
    }
}
