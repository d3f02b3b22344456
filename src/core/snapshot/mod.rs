// src/core/snapshot/mod.rs

//! Per-site persistent list snapshots: the host, directory and job
//! inventories a remote reports during a session, plus the typesize vector
//! that fixes how variable-width textual fields are interpreted.

pub mod lists;
pub mod manager;

pub use lists::{DirListEntry, HostListEntry, JobListEntry, TypesizeData};
pub use manager::SnapshotManager;
