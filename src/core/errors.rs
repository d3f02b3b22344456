// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the monitor.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum FleetMonError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Incomplete data in stream")]
    IncompleteData,

    #[error("Connect failed: {0}")]
    ConnectError(String),

    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),

    #[error("TLS Error: {0}")]
    TlsError(String),

    #[error("Unknown tag '{0}'")]
    UnknownTag(String),

    #[error("Bad '{field}' field in {tag} message")]
    BadField {
        tag: &'static str,
        field: &'static str,
    },

    #[error("Protocol Error: {0}")]
    ProtocolError(String),

    #[error("Remote is shutting down")]
    RemoteShutdown,

    #[error("Configuration Error: {0}")]
    ConfigError(String),

    #[error("Site configuration line {line}: {reason}")]
    SiteConfigError { line: usize, reason: String },

    #[error("Status area Error: {0}")]
    StatusAreaError(String),

    #[error("Snapshot Error: {0}")]
    SnapshotError(String),

    #[error("Control channel Error: {0}")]
    ControlError(String),

    #[error("Command not allowed in the current state: {0}")]
    InvalidState(String),

    #[error("Internal Error: {0}")]
    Internal(String),
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
// We wrap it in an Arc to allow for cheap, shared cloning.
impl Clone for FleetMonError {
    fn clone(&self) -> Self {
        match self {
            FleetMonError::Io(e) => FleetMonError::Io(Arc::clone(e)),
            FleetMonError::IncompleteData => FleetMonError::IncompleteData,
            FleetMonError::ConnectError(s) => FleetMonError::ConnectError(s.clone()),
            FleetMonError::ConnectTimeout(d) => FleetMonError::ConnectTimeout(*d),
            FleetMonError::TlsError(s) => FleetMonError::TlsError(s.clone()),
            FleetMonError::UnknownTag(s) => FleetMonError::UnknownTag(s.clone()),
            FleetMonError::BadField { tag, field } => FleetMonError::BadField { tag, field },
            FleetMonError::ProtocolError(s) => FleetMonError::ProtocolError(s.clone()),
            FleetMonError::RemoteShutdown => FleetMonError::RemoteShutdown,
            FleetMonError::ConfigError(s) => FleetMonError::ConfigError(s.clone()),
            FleetMonError::SiteConfigError { line, reason } => FleetMonError::SiteConfigError {
                line: *line,
                reason: reason.clone(),
            },
            FleetMonError::StatusAreaError(s) => FleetMonError::StatusAreaError(s.clone()),
            FleetMonError::SnapshotError(s) => FleetMonError::SnapshotError(s.clone()),
            FleetMonError::ControlError(s) => FleetMonError::ControlError(s.clone()),
            FleetMonError::InvalidState(s) => FleetMonError::InvalidState(s.clone()),
            FleetMonError::Internal(s) => FleetMonError::Internal(s.clone()),
        }
    }
}

impl PartialEq for FleetMonError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FleetMonError::Io(e1), FleetMonError::Io(e2)) => e1.to_string() == e2.to_string(),
            (FleetMonError::ConnectError(s1), FleetMonError::ConnectError(s2)) => s1 == s2,
            (FleetMonError::ConnectTimeout(d1), FleetMonError::ConnectTimeout(d2)) => d1 == d2,
            (FleetMonError::TlsError(s1), FleetMonError::TlsError(s2)) => s1 == s2,
            (FleetMonError::UnknownTag(s1), FleetMonError::UnknownTag(s2)) => s1 == s2,
            (
                FleetMonError::BadField { tag: t1, field: f1 },
                FleetMonError::BadField { tag: t2, field: f2 },
            ) => t1 == t2 && f1 == f2,
            (FleetMonError::ProtocolError(s1), FleetMonError::ProtocolError(s2)) => s1 == s2,
            (FleetMonError::ConfigError(s1), FleetMonError::ConfigError(s2)) => s1 == s2,
            (
                FleetMonError::SiteConfigError { line: l1, reason: r1 },
                FleetMonError::SiteConfigError { line: l2, reason: r2 },
            ) => l1 == l2 && r1 == r2,
            (FleetMonError::StatusAreaError(s1), FleetMonError::StatusAreaError(s2)) => s1 == s2,
            (FleetMonError::SnapshotError(s1), FleetMonError::SnapshotError(s2)) => s1 == s2,
            (FleetMonError::ControlError(s1), FleetMonError::ControlError(s2)) => s1 == s2,
            (FleetMonError::InvalidState(s1), FleetMonError::InvalidState(s2)) => s1 == s2,
            (FleetMonError::Internal(s1), FleetMonError::Internal(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for FleetMonError {
    fn from(e: std::io::Error) -> Self {
        FleetMonError::Io(Arc::new(e))
    }
}

impl From<std::str::Utf8Error> for FleetMonError {
    fn from(e: std::str::Utf8Error) -> Self {
        FleetMonError::ProtocolError(format!("Invalid UTF-8 in message: {e}"))
    }
}

impl From<std::string::FromUtf8Error> for FleetMonError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        FleetMonError::ProtocolError(format!("Invalid UTF-8 in message: {e}"))
    }
}
