// src/core/protocol/mod.rs

//! The client half of the remote status daemon's two-letter-tag protocol:
//! line framing, the pure tag parser, and the recipient de-obfuscation
//! transform.

pub mod deobfuscate;
pub mod frame;
pub mod parser;

pub use frame::TagLineCodec;
pub use parser::{IntervalSummary, TagParser, Update};
