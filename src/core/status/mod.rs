// src/core/status/mod.rs

//! The shared status area (SSA): one typed record per monitored site, the
//! supervisor-wide status record, and the publisher that serializes the area
//! to disk for external viewers.

pub mod area;
pub mod publisher;
pub mod record;
pub mod supervisor_status;

pub use area::StatusArea;
pub use record::{ConnectStatus, CounterRing, LogHistoryKind, RingSlot, SiteRecord};
pub use supervisor_status::SupervisorStatus;
