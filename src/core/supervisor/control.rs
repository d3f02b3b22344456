// src/core/supervisor/control.rs

//! The control channel: a UNIX-domain socket under `<work>/fifo/` carrying
//! single-byte opcodes, bridged into typed commands on the supervisor's
//! command queue. Site indices travel as 4-byte little-endian integers after
//! their opcode. Probes are answered on the same connection.

use crate::core::FleetMonError;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

// Wire opcodes.
pub const OP_SHUTDOWN: u8 = 8;
pub const OP_SHUTDOWN_ALL: u8 = 9;
pub const OP_START: u8 = 10;
pub const OP_IS_ALIVE: u8 = 11;
pub const OP_GOT_LC: u8 = 12;
pub const OP_DISABLE_MON: u8 = 13;
pub const OP_ENABLE_MON: u8 = 14;

// Reply bytes.
pub const OP_ACK: u8 = 15;
pub const OP_ACK_STOPPED: u8 = 16;

/// A typed control command on its way to the supervisor loop.
#[derive(Debug)]
pub enum ControlCommand {
    Shutdown,
    ShutdownAll,
    Start {
        reply: oneshot::Sender<u8>,
    },
    IsAlive {
        reply: oneshot::Sender<u8>,
    },
    GotLogCapabilities {
        site_index: usize,
    },
    DisableMonitor {
        site_index: usize,
    },
    EnableMonitor {
        site_index: usize,
    },
}

/// Binds the control socket, replacing a stale one from a previous run.
pub async fn bind_control_socket(path: &Path) -> Result<UnixListener, FleetMonError> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        tokio::fs::remove_file(path).await?;
    }
    UnixListener::bind(path)
        .map_err(|e| FleetMonError::ControlError(format!("{}: {e}", path.display())))
}

/// Accepts control connections until shutdown and forwards their commands.
pub async fn run_control_listener(
    listener: UnixListener,
    socket_path: PathBuf,
    tx: mpsc::Sender<ControlCommand>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    info!("Control channel listening on {}.", socket_path.display());
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    if let Err(e) = handle_connection(stream, &tx).await {
                        warn!("Control connection failed: {e}");
                    }
                }
                Err(e) => {
                    warn!("Control channel accept failed: {e}");
                }
            },
        }
    }
    let _ = tokio::fs::remove_file(&socket_path).await;
    info!("Control channel closed.");
}

async fn handle_connection(
    mut stream: UnixStream,
    tx: &mpsc::Sender<ControlCommand>,
) -> Result<(), FleetMonError> {
    let opcode = stream.read_u8().await?;
    let command = match opcode {
        OP_SHUTDOWN => ControlCommand::Shutdown,
        OP_SHUTDOWN_ALL => ControlCommand::ShutdownAll,
        OP_GOT_LC => ControlCommand::GotLogCapabilities {
            site_index: read_index(&mut stream).await?,
        },
        OP_DISABLE_MON => ControlCommand::DisableMonitor {
            site_index: read_index(&mut stream).await?,
        },
        OP_ENABLE_MON => ControlCommand::EnableMonitor {
            site_index: read_index(&mut stream).await?,
        },
        OP_START | OP_IS_ALIVE => {
            let (reply_tx, reply_rx) = oneshot::channel();
            let command = if opcode == OP_START {
                ControlCommand::Start { reply: reply_tx }
            } else {
                ControlCommand::IsAlive { reply: reply_tx }
            };
            tx.send(command)
                .await
                .map_err(|_| FleetMonError::ControlError("Supervisor loop is gone".into()))?;
            let reply = reply_rx
                .await
                .map_err(|_| FleetMonError::ControlError("Probe reply dropped".into()))?;
            stream.write_u8(reply).await?;
            return Ok(());
        }
        other => {
            return Err(FleetMonError::ControlError(format!(
                "Unknown control opcode {other}"
            )));
        }
    };

    debug!("Control command received: {command:?}");
    tx.send(command)
        .await
        .map_err(|_| FleetMonError::ControlError("Supervisor loop is gone".into()))?;
    stream.write_u8(OP_ACK).await?;
    Ok(())
}

async fn read_index(stream: &mut UnixStream) -> Result<usize, FleetMonError> {
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf).await?;
    Ok(u32::from_le_bytes(buf) as usize)
}
