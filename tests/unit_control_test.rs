use fleetmon::core::supervisor::control::{
    ControlCommand, OP_ACK, OP_ACK_STOPPED, OP_DISABLE_MON, OP_ENABLE_MON, OP_GOT_LC, OP_IS_ALIVE,
    OP_SHUTDOWN, bind_control_socket, run_control_listener,
};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::{broadcast, mpsc};

struct Channel {
    path: std::path::PathBuf,
    rx: mpsc::Receiver<ControlCommand>,
    shutdown_tx: broadcast::Sender<()>,
    _dir: TempDir,
}

async fn start_channel() -> Channel {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("control");
    let listener = bind_control_socket(&path).await.unwrap();
    let (tx, rx) = mpsc::channel(8);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(run_control_listener(
        listener,
        path.clone(),
        tx,
        shutdown_rx,
    ));
    Channel {
        path,
        rx,
        shutdown_tx,
        _dir: dir,
    }
}

async fn send_opcode(path: &std::path::Path, bytes: &[u8]) -> u8 {
    let mut stream = UnixStream::connect(path).await.unwrap();
    stream.write_all(bytes).await.unwrap();
    stream.read_u8().await.unwrap()
}

#[tokio::test]
async fn test_indexed_opcodes_carry_their_site_index() {
    let mut ch = start_channel().await;

    let mut frame = vec![OP_DISABLE_MON];
    frame.extend_from_slice(&7u32.to_le_bytes());
    assert_eq!(send_opcode(&ch.path, &frame).await, OP_ACK);
    assert!(matches!(
        ch.rx.recv().await,
        Some(ControlCommand::DisableMonitor { site_index: 7 })
    ));

    let mut frame = vec![OP_ENABLE_MON];
    frame.extend_from_slice(&3u32.to_le_bytes());
    send_opcode(&ch.path, &frame).await;
    assert!(matches!(
        ch.rx.recv().await,
        Some(ControlCommand::EnableMonitor { site_index: 3 })
    ));

    let mut frame = vec![OP_GOT_LC];
    frame.extend_from_slice(&0u32.to_le_bytes());
    send_opcode(&ch.path, &frame).await;
    assert!(matches!(
        ch.rx.recv().await,
        Some(ControlCommand::GotLogCapabilities { site_index: 0 })
    ));

    let _ = ch.shutdown_tx.send(());
}

#[tokio::test]
async fn test_shutdown_opcode_is_acknowledged_and_forwarded() {
    let mut ch = start_channel().await;
    assert_eq!(send_opcode(&ch.path, &[OP_SHUTDOWN]).await, OP_ACK);
    assert!(matches!(ch.rx.recv().await, Some(ControlCommand::Shutdown)));
    let _ = ch.shutdown_tx.send(());
}

#[tokio::test]
async fn test_is_alive_probe_round_trips_through_the_supervisor() {
    let mut ch = start_channel().await;

    // Play the supervisor side: answer the probe with ACK_STOPPED.
    let answer = tokio::spawn(async move {
        if let Some(ControlCommand::IsAlive { reply }) = ch.rx.recv().await {
            reply.send(OP_ACK_STOPPED).unwrap();
        }
        ch.rx
    });

    assert_eq!(send_opcode(&ch.path, &[OP_IS_ALIVE]).await, OP_ACK_STOPPED);
    let _ = answer.await;
    let _ = ch.shutdown_tx.send(());
}
