// src/core/client/mod.rs

//! The per-site polling client: a bounded TCP dialogue with the remote
//! status daemon, streaming tagged records into the site's status record and
//! list snapshots.

pub mod stream;
pub mod worker;

pub use stream::SiteStream;
pub use worker::PollWorker;
