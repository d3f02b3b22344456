// src/core/logfwd/forwarder.rs

//! The per-site log forwarder.
//!
//! Spawned by the supervisor once a site has reported log capabilities that
//! intersect its requested options. It opens its own session to the site's
//! current endpoint, requests the granted log streams, and appends the raw
//! bytes it receives to the site's rotating log file. Received byte counts
//! feed the site's `log_bytes_received` counter.

use crate::core::client::SiteStream;
use crate::core::constants::CMD_START_LOG;
use crate::core::logfwd::writer::RotatingWriter;
use crate::core::metrics;
use crate::core::status::StatusArea;
use crate::core::status::record::{LogCapabilities, SiteOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::broadcast;
use tracing::{info, warn};

const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

const READ_BUFFER_SIZE: usize = 8 * 1024;

pub struct LogForwarder {
    site_index: usize,
    alias: String,
    area: Arc<StatusArea>,
    writer: RotatingWriter,
    tcp_timeout: Duration,
}

impl LogForwarder {
    pub fn new(
        site_index: usize,
        area: Arc<StatusArea>,
        log_dir: std::path::PathBuf,
        switch_file_time: Duration,
        max_files: u32,
        tcp_timeout: Duration,
    ) -> Self {
        let alias = area.record(site_index).lock().alias.clone();
        let writer = RotatingWriter::new(
            log_dir,
            &format!("LOG.{alias}"),
            switch_file_time,
            max_files,
        );
        Self {
            site_index,
            alias,
            area,
            writer,
            tcp_timeout,
        }
    }

    /// The streams to request: the intersection of what the site asked for
    /// and what the remote declared.
    fn granted(&self) -> LogCapabilities {
        let record = self.area.record(self.site_index).lock();
        record.options.requested_logs() & record.log_capabilities
    }

    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Log forwarder for '{}' started.", self.alias);
        let mut reconnect_delay = INITIAL_RECONNECT_DELAY;

        loop {
            let granted = self.granted();
            if granted.is_empty() {
                info!(
                    "Log forwarder for '{}' has no granted streams left, stopping.",
                    self.alias
                );
                return;
            }

            let (endpoint, tls_enabled) = {
                let record = self.area.record(self.site_index).lock();
                (
                    record.current_endpoint().clone(),
                    record.options.contains(SiteOptions::TLS),
                )
            };

            let session = tokio::select! {
                _ = shutdown_rx.recv() => break,
                result = SiteStream::connect(&endpoint, tls_enabled, self.tcp_timeout) => result,
            };

            match session {
                Ok(stream) => {
                    reconnect_delay = INITIAL_RECONNECT_DELAY;
                    if let Err(e) = self.stream_logs(stream, granted, &mut shutdown_rx).await {
                        warn!("Log stream from '{}' failed: {e}", self.alias);
                    } else {
                        // Clean end also means shutdown was requested.
                        break;
                    }
                }
                Err(e) => {
                    warn!(
                        "Log forwarder failed to connect to '{}': {e}. Retrying in {reconnect_delay:?}.",
                        self.alias
                    );
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(reconnect_delay) => {}
                _ = shutdown_rx.recv() => break,
            }
            reconnect_delay = (reconnect_delay * 2).min(MAX_RECONNECT_DELAY);
        }

        self.writer.flush().await;
        info!("Log forwarder for '{}' shutting down.", self.alias);
    }

    /// Requests the granted streams and appends the raw log bytes until the
    /// connection drops or shutdown arrives.
    async fn stream_logs(
        &mut self,
        mut stream: SiteStream,
        granted: LogCapabilities,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> std::io::Result<()> {
        let request = format!("{CMD_START_LOG} {}\r\n", granted.bits());
        stream.write_all(request.as_bytes()).await?;

        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => return Ok(()),
                read = stream.read(&mut buf) => {
                    let n = read?;
                    if n == 0 {
                        return Err(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "log stream closed",
                        ));
                    }
                    if let Err(e) = self.writer.append(&buf[..n]).await {
                        warn!("Failed to append log bytes for '{}': {e}", self.alias);
                    }
                    self.area.record(self.site_index).lock().add_log_bytes(n as u64);
                    metrics::LOG_BYTES_RECEIVED_TOTAL.inc_by(n as f64);
                }
            }
        }
    }
}
