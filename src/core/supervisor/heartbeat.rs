// src/core/supervisor/heartbeat.rs

//! Service-manager heartbeat over the `sd_notify` datagram protocol.
//!
//! When the process was started under a service manager that exports
//! `NOTIFY_SOCKET`, the supervisor reports readiness once and then pings the
//! watchdog on every control-loop iteration. Without the variable the whole
//! module is inert.

use std::os::unix::net::UnixDatagram;
use tracing::{info, warn};

pub struct Heartbeat {
    socket: Option<(UnixDatagram, String)>,
}

impl Heartbeat {
    /// Connects to the service manager's notify socket if one is announced.
    /// Abstract-namespace sockets are not supported and disable the
    /// heartbeat with a warning.
    pub fn from_env() -> Self {
        let Some(path) = std::env::var_os("NOTIFY_SOCKET") else {
            return Self { socket: None };
        };
        let path = path.to_string_lossy().into_owned();
        if path.starts_with('@') {
            warn!("Abstract notify sockets are not supported, watchdog heartbeat disabled.");
            return Self { socket: None };
        }
        match UnixDatagram::unbound() {
            Ok(socket) => {
                info!("Service-manager watchdog enabled via {path}.");
                Self {
                    socket: Some((socket, path)),
                }
            }
            Err(e) => {
                warn!("Failed to open notify socket: {e}. Watchdog heartbeat disabled.");
                Self { socket: None }
            }
        }
    }

    pub fn enabled(&self) -> bool {
        self.socket.is_some()
    }

    fn send(&self, state: &str) {
        if let Some((socket, path)) = &self.socket {
            if let Err(e) = socket.send_to(state.as_bytes(), path) {
                warn!("Failed to notify service manager: {e}");
            }
        }
    }

    pub fn ready(&self) {
        self.send("READY=1\n");
    }

    pub fn watchdog(&self) {
        self.send("WATCHDOG=1\n");
    }

    pub fn stopping(&self) {
        self.send("STOPPING=1\n");
    }
}
