// src/core/client/worker.rs

//! Implements the per-site polling client.
//!
//! The worker owns the whole lifecycle of one site's dialogue with its
//! remote status daemon: connect (optionally through TLS), the `START_STAT`
//! handshake, the streaming loop that parses tagged records into the site's
//! status record and list snapshots, scheduled disconnect windows, and
//! automatic failover between the site's two endpoints. Connect failures are
//! retried in place; a mid-session failure ends the worker and the
//! supervisor restarts it with its backoff policy.

use crate::core::FleetMonError;
use crate::core::client::stream::SiteStream;
use crate::core::constants::{CMD_QUIT, CMD_START_STAT, CMD_STAT, RETRY_INTERVAL, SEVERITY_WARN};
use crate::core::metrics;
use crate::core::protocol::{TagLineCodec, TagParser, Update};
use crate::core::snapshot::SnapshotManager;
use crate::core::status::record::SwitchMode;
use crate::core::status::{ConnectStatus, StatusArea};
use crate::core::supervisor::control::ControlCommand;
use futures::{SinkExt, StreamExt};
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::io::{ReadHalf, WriteHalf, split};
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

/// How long a graceful `QUIT` waits for an acknowledgement before the socket
/// is dropped anyway.
const QUIT_ACK_TIMEOUT: Duration = Duration::from_millis(500);

type Reader = FramedRead<ReadHalf<SiteStream>, TagLineCodec>;
type Writer = FramedWrite<WriteHalf<SiteStream>, TagLineCodec>;

/// How a streaming session ended, when it did not end in an error.
#[derive(Debug, PartialEq)]
enum SessionEnd {
    /// The remote announced its shutdown.
    RemoteShutdown,
    /// The configured connect window elapsed; reconnect after the
    /// disconnect window.
    ScheduledDisconnect,
    /// The supervisor asked this worker to stop.
    Supervisor,
}

/// Per-session connection settings read from the site record.
struct SessionSettings {
    endpoint: crate::config::Endpoint,
    tls_enabled: bool,
    poll_interval: Duration,
    connect_time: u64,
    disconnect_time: u64,
    failover: SwitchMode,
}

pub struct PollWorker {
    site_index: usize,
    alias: String,
    area: Arc<StatusArea>,
    snapshots: SnapshotManager,
    parser: TagParser,
    tcp_timeout: Duration,
    ctl_tx: mpsc::Sender<ControlCommand>,
    lc_reported: bool,
    /// Sticky bit set by a connect timeout, cleared on the next successful
    /// read; it selects the log message for the next failure.
    timeout_flag: bool,
    consecutive_failures: u32,
    first_failure: Option<Instant>,
}

impl PollWorker {
    pub fn new(
        site_index: usize,
        area: Arc<StatusArea>,
        fifo_dir: PathBuf,
        snapshot_retention: Duration,
        tcp_timeout: Duration,
        ctl_tx: mpsc::Sender<ControlCommand>,
    ) -> Self {
        let alias = area.record(site_index).lock().alias.clone();
        let snapshots = SnapshotManager::new(&alias, &fifo_dir, snapshot_retention);
        Self {
            site_index,
            alias,
            area,
            snapshots,
            parser: TagParser::new(),
            tcp_timeout,
            ctl_tx,
            lc_reported: false,
            timeout_flag: false,
            consecutive_failures: 0,
            first_failure: None,
        }
    }

    /// The main run loop: connect, stream, and retry connects in place.
    /// Returns when the supervisor signals shutdown, or with an error on a
    /// mid-session failure the supervisor should handle.
    pub async fn run(
        mut self,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), FleetMonError> {
        info!("Polling client for '{}' started.", self.alias);
        self.snapshots.load().await;

        loop {
            let settings = self.session_settings();
            self.set_status(ConnectStatus::Connecting);

            let stream = tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    self.set_status(ConnectStatus::Disconnected);
                    return Ok(());
                }
                result = SiteStream::connect(&settings.endpoint, settings.tls_enabled, self.tcp_timeout) => {
                    match result {
                        Ok(stream) => stream,
                        Err(e) => {
                            self.note_connect_failure(&settings, &e);
                            metrics::RECONNECTS_TOTAL
                                .with_label_values(&[self.alias.as_str()])
                                .inc();
                            if !self.wait_or_shutdown(retry_wait(), &mut shutdown_rx).await {
                                self.set_status(ConnectStatus::Disconnected);
                                return Ok(());
                            }
                            continue;
                        }
                    }
                }
            };

            self.consecutive_failures = 0;
            self.first_failure = None;
            self.set_status(ConnectStatus::Established);
            metrics::SITES_CONNECTED.inc();
            info!(
                "Connected to '{}' at {}:{}.",
                self.alias, settings.endpoint.host, settings.endpoint.port
            );

            let end = self.handle_session(stream, &settings, &mut shutdown_rx).await;
            metrics::SITES_CONNECTED.dec();

            match end {
                Ok(SessionEnd::Supervisor) => {
                    self.set_status(ConnectStatus::Disconnected);
                    return Ok(());
                }
                Ok(SessionEnd::ScheduledDisconnect) => {
                    self.set_status(ConnectStatus::Disconnected);
                    info!(
                        "Scheduled disconnect for '{}', reconnecting in {} s.",
                        self.alias, settings.disconnect_time
                    );
                    let wait = Duration::from_secs(settings.disconnect_time);
                    if !self.wait_or_shutdown(wait, &mut shutdown_rx).await {
                        return Ok(());
                    }
                }
                Ok(SessionEnd::RemoteShutdown) => {
                    warn!("========> REMOTE SHUTDOWN <======== ('{}')", self.alias);
                    self.set_status(ConnectStatus::Disconnected);
                    return Err(FleetMonError::RemoteShutdown);
                }
                Err(e) => {
                    warn!("Session with '{}' failed: {e}", self.alias);
                    self.set_status(ConnectStatus::Defunct);
                    return Err(e);
                }
            }
        }
    }

    /// Reads the per-session settings from the site record. The toggle is
    /// re-read each cycle so user-driven switching takes effect on the next
    /// connect.
    fn session_settings(&self) -> SessionSettings {
        let record = self.area.record(self.site_index).lock();
        SessionSettings {
            endpoint: record.current_endpoint().clone(),
            tls_enabled: record
                .options
                .contains(crate::core::status::record::SiteOptions::TLS),
            poll_interval: Duration::from_secs(record.poll_interval.max(1)),
            connect_time: record.connect_time,
            disconnect_time: record.disconnect_time,
            failover: record.failover,
        }
    }

    fn set_status(&self, status: ConnectStatus) {
        self.area.record(self.site_index).lock().set_connect_status(status);
    }

    /// A connect timeout and a connect error are logged differently; the
    /// timeout also sets the sticky timeout bit. Automatic failover flips the
    /// endpoint toggle once a full retry interval of consecutive failures has
    /// accumulated on the current endpoint.
    fn note_connect_failure(&mut self, settings: &SessionSettings, error: &FleetMonError) {
        match error {
            FleetMonError::ConnectTimeout(t) => {
                self.timeout_flag = true;
                warn!(
                    "Connect to '{}' at {}:{} timed out after {t:?}.",
                    self.alias, settings.endpoint.host, settings.endpoint.port
                );
            }
            other if self.timeout_flag => warn!(
                "Connect to '{}' at {}:{} failed after an earlier timeout: {other}",
                self.alias, settings.endpoint.host, settings.endpoint.port
            ),
            other => warn!(
                "Connect to '{}' at {}:{} failed: {other}",
                self.alias, settings.endpoint.host, settings.endpoint.port
            ),
        }
        self.set_status(ConnectStatus::Defunct);

        self.consecutive_failures += 1;
        let since_first = *self.first_failure.get_or_insert_with(Instant::now);
        if settings.failover == SwitchMode::Auto && since_first.elapsed() >= RETRY_INTERVAL {
            let mut record = self.area.record(self.site_index).lock();
            record.toggle ^= 1;
            let flipped = record.toggle;
            drop(record);
            info!(
                "Failing '{}' over to endpoint {} after {} consecutive connect failures.",
                self.alias, flipped, self.consecutive_failures
            );
            self.consecutive_failures = 0;
            self.first_failure = None;
        }
    }

    /// Sleeps for `wait`, returning `false` if shutdown arrived instead.
    async fn wait_or_shutdown(
        &self,
        wait: Duration,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(wait) => true,
            _ = shutdown_rx.recv() => false,
        }
    }

    /// Manages one established session: handshake, then the streaming loop.
    async fn handle_session(
        &mut self,
        stream: SiteStream,
        settings: &SessionSettings,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<SessionEnd, FleetMonError> {
        let (reader, writer) = split(stream);
        let mut reader = FramedRead::new(reader, TagLineCodec);
        let mut writer = FramedWrite::new(writer, TagLineCodec);

        writer.send(CMD_START_STAT).await?;
        let session_start = Instant::now();
        // Between a command and its numeric reply, garbage resets the
        // session instead of being skipped.
        let mut awaiting_reply = true;

        loop {
            let scheduled = settings.connect_time > 0 && settings.disconnect_time > 0;
            if scheduled && session_start.elapsed() >= Duration::from_secs(settings.connect_time) {
                let _ = writer.send(CMD_QUIT).await;
                return Ok(SessionEnd::ScheduledDisconnect);
            }

            let mut wait = settings.poll_interval;
            if scheduled {
                let remaining = Duration::from_secs(settings.connect_time)
                    .saturating_sub(session_start.elapsed());
                wait = wait.min(remaining);
            }

            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    self.graceful_quit(&mut reader, &mut writer).await;
                    return Ok(SessionEnd::Supervisor);
                }
                read = tokio::time::timeout(wait, reader.next()) => match read {
                    // Idle past the poll interval: solicit a fresh snapshot.
                    Err(_) => {
                        writer.send(CMD_STAT).await?;
                        awaiting_reply = true;
                    }
                    Ok(None) => {
                        return Err(FleetMonError::ProtocolError(
                            "Remote closed the connection".into(),
                        ));
                    }
                    Ok(Some(Err(e))) => return Err(e),
                    Ok(Some(Ok(line))) => {
                        self.timeout_flag = false;
                        match self.handle_line(&line, &mut awaiting_reply).await? {
                            Some(end) => return Ok(end),
                            None => {}
                        }
                    }
                },
            }
        }
    }

    /// Parses one framed line and applies its update.
    async fn handle_line(
        &mut self,
        line: &[u8],
        awaiting_reply: &mut bool,
    ) -> Result<Option<SessionEnd>, FleetMonError> {
        let update = match self.parser.parse(line) {
            Ok(update) => update,
            Err(e) => {
                metrics::PARSE_WARNINGS_TOTAL
                    .with_label_values(&[self.alias.as_str()])
                    .inc();
                warn!(
                    "Unparsable line from '{}': {e} ({:?})",
                    self.alias,
                    String::from_utf8_lossy(line)
                );
                self.area
                    .record(self.site_index)
                    .lock()
                    .push_log_severity(SEVERITY_WARN);
                if *awaiting_reply {
                    return Err(FleetMonError::ProtocolError(
                        "Garbage at the command-reply position".into(),
                    ));
                }
                return Ok(None);
            }
        };
        metrics::MESSAGES_PARSED_TOTAL.inc();

        match update {
            Update::RemoteShutdown => return Ok(Some(SessionEnd::RemoteShutdown)),
            Update::CommandReply(code) => {
                debug!("'{}' replied {code}.", self.alias);
                *awaiting_reply = false;
            }
            update => self.apply(update).await,
        }
        Ok(None)
    }

    /// Applies a parsed update: record fields under the record lock, list
    /// entries through the snapshot manager.
    async fn apply(&mut self, update: Update) {
        let now = unix_now();
        let last_data_time;
        {
            let mut record = self.area.record(self.site_index).lock();
            record.last_data_time = now;
            last_data_time = now;
            record.apply(&update, now / 3600);
        }

        match update {
            Update::HostCount(n) => self.snapshots.set_host_count(n as usize).await,
            Update::DirCount(n) => self.snapshots.set_dir_count(n as usize).await,
            Update::JobCount(n) => self.snapshots.set_job_count(n as usize).await,
            Update::Typesize(values) => self.snapshots.set_typesize(&values).await,
            Update::HostListEntry { pos, entry } => self.snapshots.write_host(pos, entry).await,
            Update::DirListEntry { pos, entry } => {
                self.snapshots.write_dir(pos, entry, now, last_data_time).await
            }
            Update::JobListEntry { pos, entry } => {
                self.snapshots.write_job(pos, entry, now, last_data_time).await
            }
            Update::ErrorHistory { host_pos, history } => {
                self.snapshots.apply_error_history(host_pos, history)
            }
            Update::LogCapabilities(_) if !self.lc_reported => {
                self.lc_reported = true;
                if self
                    .ctl_tx
                    .send(ControlCommand::GotLogCapabilities {
                        site_index: self.site_index,
                    })
                    .await
                    .is_err()
                {
                    warn!("Supervisor control channel closed, log capability report dropped.");
                }
            }
            _ => {}
        }
    }

    /// Attempts a graceful `QUIT`; drops the socket if no acknowledgement
    /// arrives in time.
    async fn graceful_quit(&mut self, reader: &mut Reader, writer: &mut Writer) {
        if writer.send(CMD_QUIT).await.is_err() {
            return;
        }
        let deadline = Instant::now() + QUIT_ACK_TIMEOUT;
        while let Ok(Some(Ok(line))) =
            tokio::time::timeout(deadline.saturating_duration_since(Instant::now()), reader.next())
                .await
        {
            if let Ok(Update::CommandReply(code)) = self.parser.parse(&line) {
                debug!("'{}' acknowledged QUIT with {code}.", self.alias);
                return;
            }
        }
    }
}

/// Unix time in seconds.
fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// The retry interval with jitter, to avoid thundering herds after a remote
/// restart.
fn retry_wait() -> Duration {
    RETRY_INTERVAL + Duration::from_millis(rand::thread_rng().gen_range(0..500))
}
