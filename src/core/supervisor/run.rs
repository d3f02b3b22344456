// src/core/supervisor/run.rs

//! The supervisor's startup sequence, control loop and shutdown sequencing.

use crate::config::{Config, SiteConfig, load_site_config, site_config_mtime};
use crate::core::FleetMonError;
use crate::core::aggregate::{Rollup, recompute_groups};
use crate::core::client::PollWorker;
use crate::core::constants::{
    GROUP_RESCAN_TIME, MAX_ALIAS_LENGTH, SEVERITY_ERROR, SEVERITY_WARN, SHUTDOWN_POLLS,
    SHUTDOWN_POLL_INTERVAL,
};
use crate::core::logfwd::{LogForwarder, LogWriterTask, RotatingWriter};
use crate::core::metrics;
use crate::core::status::area::SharedArea;
use crate::core::status::publisher::PublisherTask;
use crate::core::status::{ConnectStatus, StatusArea, SupervisorStatus};
use crate::core::supervisor::control::{
    ControlCommand, OP_ACK, OP_ACK_STOPPED, bind_control_socket, run_control_listener,
};
use crate::core::supervisor::heartbeat::Heartbeat;
use crate::core::supervisor::metrics_server::run_metrics_server;
use crate::core::supervisor::process::{ExitDisposition, ProcessEntry, ProcessTable, WorkerKind};
use crate::core::supervisor::signals::watch_signals;
use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::{filter::EnvFilter, reload};

const ACTIVE_MAGIC: &[u8] = b"FLMNACTV";
const RUN_ID_BYTES: usize = 20;

/// One worker task's exit report: site, kind, incarnation, outcome.
type WorkerExit = (usize, WorkerKind, u64, Result<(), FleetMonError>);

/// Everything the control loop manipulates.
struct Supervisor {
    config: Config,
    area: Arc<StatusArea>,
    shared_area: SharedArea,
    supervisor_status: Arc<Mutex<SupervisorStatus>>,
    table: ProcessTable,
    workers: JoinSet<WorkerExit>,
    ctl_tx: mpsc::Sender<ControlCommand>,
    system_log_tx: mpsc::Sender<Vec<u8>>,
    monitor_log_tx: mpsc::Sender<Vec<u8>>,
    run_id: String,
    next_generation: u64,
}

/// The main supervisor entry point: set up, loop, tear down.
pub async fn run(
    config: Config,
    log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
) -> Result<()> {
    tokio::fs::create_dir_all(config.fifo_dir()).await?;
    tokio::fs::create_dir_all(config.etc_dir()).await?;
    tokio::fs::create_dir_all(config.log_dir()).await?;

    // Unreadable site configuration is fatal at startup (and only then).
    let sites = load_site_config(&config.site_config_path(), config.default_poll_interval)
        .context("Cannot start without a readable site configuration")?;
    let mut site_mtime = site_config_mtime(&config.site_config_path());

    let mut runid_bytes = [0u8; RUN_ID_BYTES];
    getrandom::fill(&mut runid_bytes)
        .map_err(|e| anyhow::anyhow!("Failed to generate random run ID: {}", e))?;
    let run_id = hex::encode(runid_bytes);
    info!("Supervisor run ID: {run_id}");

    let area = Arc::new(StatusArea::attach(&config.area_path(), &sites).await);
    let shared_area: SharedArea = Arc::new(RwLock::new(area.clone()));
    metrics::SITES_MONITORED.set(area.len() as f64);
    info!("Monitoring {} site record(s).", area.len());

    let supervisor_status = Arc::new(Mutex::new(SupervisorStatus::new(unix_now(), run_id.clone())));

    // Channels: shutdown fan-out, the control command queue, and the two
    // process-wide log streams.
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
    let (ctl_tx, mut ctl_rx) = mpsc::channel(64);
    let (system_log_tx, system_log_rx) = mpsc::channel(256);
    let (monitor_log_tx, monitor_log_rx) = mpsc::channel(256);

    // The control socket must bind before anything else is spawned; a bind
    // failure usually means another supervisor already owns the directory.
    let listener = bind_control_socket(&config.control_socket_path()).await?;

    let mut aux_tasks: JoinSet<()> = JoinSet::new();
    aux_tasks.spawn(run_control_listener(
        listener,
        config.control_socket_path(),
        ctl_tx.clone(),
        shutdown_tx.subscribe(),
    ));
    aux_tasks.spawn(watch_signals(shutdown_tx.clone()));
    aux_tasks.spawn(
        PublisherTask::new(
            shared_area.clone(),
            supervisor_status.clone(),
            config.area_path(),
            config.supervisor_status_path(),
            config.publish_interval,
        )
        .run(shutdown_tx.subscribe()),
    );
    if config.metrics.enabled {
        aux_tasks.spawn(run_metrics_server(
            shared_area.clone(),
            config.metrics.port,
            shutdown_tx.subscribe(),
        ));
    } else {
        info!("Prometheus metrics server is disabled in the configuration.");
    }

    // The two auxiliary log writers are tracked individually so IS_ALIVE can
    // report on them and SHUTDOWN_ALL can cut them off without a drain.
    let system_writer = tokio::spawn(
        LogWriterTask::new(
            RotatingWriter::new(
                config.log_dir(),
                "SYSTEM_LOG",
                config.switch_file_time,
                config.max_log_files,
            ),
            system_log_rx,
            "System log",
        )
        .run(shutdown_tx.subscribe()),
    );
    let monitor_writer = tokio::spawn(
        LogWriterTask::new(
            RotatingWriter::new(
                config.log_dir(),
                "MONITOR_LOG",
                config.switch_file_time,
                config.max_log_files,
            ),
            monitor_log_rx,
            "Monitor log",
        )
        .run(shutdown_tx.subscribe()),
    );

    let mut sup = Supervisor {
        config,
        area,
        shared_area,
        supervisor_status,
        table: ProcessTable::default(),
        workers: JoinSet::new(),
        ctl_tx,
        system_log_tx,
        monitor_log_tx,
        run_id,
        next_generation: 0,
    };
    sup.spawn_poll_clients();
    sup.write_active_file().await;

    let heartbeat = Heartbeat::from_env();
    heartbeat.ready();

    let mut rollup = Rollup::new(Utc::now());
    let mut rescan = tokio::time::interval(GROUP_RESCAN_TIME);
    rescan.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut shutdown_all = false;

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => break,

            Some(command) = ctl_rx.recv() => {
                match command {
                    ControlCommand::Shutdown => {
                        info!("SHUTDOWN received on the control channel.");
                        break;
                    }
                    ControlCommand::ShutdownAll => {
                        info!("SHUTDOWN_ALL received on the control channel.");
                        shutdown_all = true;
                        break;
                    }
                    ControlCommand::Start { reply } => {
                        info!("START received, re-initializing.");
                        let level = std::env::var("RUST_LOG")
                            .unwrap_or_else(|_| sup.config.log_level.clone());
                        if log_reload_handle.reload(EnvFilter::new(level)).is_err() {
                            warn!("Failed to reset the log filter.");
                        }
                        sup.reload_sites().await;
                        site_mtime = site_config_mtime(&sup.config.site_config_path());
                        let _ = reply.send(OP_ACK);
                    }
                    ControlCommand::IsAlive { reply } => {
                        let stopped =
                            system_writer.is_finished() || monitor_writer.is_finished();
                        let _ = reply.send(if stopped { OP_ACK_STOPPED } else { OP_ACK });
                    }
                    ControlCommand::GotLogCapabilities { site_index } => {
                        sup.handle_log_capabilities(site_index).await;
                    }
                    ControlCommand::DisableMonitor { site_index } => {
                        sup.disable_monitor(site_index).await;
                    }
                    ControlCommand::EnableMonitor { site_index } => {
                        sup.enable_monitor(site_index).await;
                    }
                }
            }

            Some(exit) = sup.workers.join_next() => {
                if let Ok(exit) = exit {
                    sup.handle_worker_exit(exit).await;
                }
            }

            _ = rescan.tick() => {
                recompute_groups(&sup.area);
                rollup.tick(&sup.area, Utc::now());

                let current_mtime = site_config_mtime(&sup.config.site_config_path());
                if current_mtime != site_mtime {
                    info!("Site configuration changed, reloading.");
                    sup.reload_sites().await;
                    site_mtime = current_mtime;
                }

                sup.restart_due_workers();
                heartbeat.watchdog();
            }
        }
    }

    // --- Graceful shutdown sequence ---
    info!("Shutting down. Sending signal to all tasks.");
    heartbeat.stopping();
    let _ = shutdown_tx.send(());
    sup.table.stop_all();
    drain_workers(&mut sup.workers).await;

    if shutdown_all {
        // SHUTDOWN_ALL also cuts the auxiliary log writers off immediately.
        system_writer.abort();
        monitor_writer.abort();
    } else {
        let _ = system_writer.await;
        let _ = monitor_writer.await;
    }

    if tokio::time::timeout(std::time::Duration::from_secs(10), async {
        while aux_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for auxiliary tasks to finish cleanly.");
    }

    let _ = tokio::fs::remove_file(sup.config.supervisor_active_path()).await;
    info!("Supervisor shutdown complete.");
    Ok(())
}

impl Supervisor {
    /// Spawns a polling client for every non-group, non-disabled site.
    fn spawn_poll_clients(&mut self) {
        for site_index in 0..self.area.len() {
            let (is_group, disabled, alias) = {
                let record = self.area.record(site_index).lock();
                (
                    record.is_group(),
                    record.connect_status == ConnectStatus::Disabled,
                    record.alias.clone(),
                )
            };
            if is_group || disabled {
                continue;
            }
            self.table
                .insert(ProcessEntry::new(alias, site_index, WorkerKind::PollClient));
            self.spawn_poll_client(site_index);
        }
    }

    fn spawn_poll_client(&mut self, site_index: usize) {
        let generation = self.next_generation();
        let Some(entry) = self.table.get_mut(site_index, WorkerKind::PollClient) else {
            return;
        };
        entry.mark_started(generation);
        let stop_rx = entry.stopper.subscribe();

        let worker = PollWorker::new(
            site_index,
            self.area.clone(),
            self.config.fifo_dir(),
            self.config.snapshot_retention(),
            self.config.tcp_timeout,
            self.ctl_tx.clone(),
        );
        // The inner spawn turns a panic into an error the reaper can handle.
        self.workers.spawn(async move {
            let inner = tokio::spawn(worker.run(stop_rx));
            let result = match inner.await {
                Ok(result) => result,
                Err(e) => Err(FleetMonError::Internal(format!("Worker panicked: {e}"))),
            };
            (site_index, WorkerKind::PollClient, generation, result)
        });
    }

    fn spawn_log_forwarder(&mut self, site_index: usize) {
        let generation = self.next_generation();
        let Some(entry) = self.table.get_mut(site_index, WorkerKind::LogForwarder) else {
            return;
        };
        entry.mark_started(generation);
        let stop_rx = entry.stopper.subscribe();

        let forwarder = LogForwarder::new(
            site_index,
            self.area.clone(),
            self.config.log_dir(),
            self.config.switch_file_time,
            self.config.max_log_files,
            self.config.tcp_timeout,
        );
        self.workers.spawn(async move {
            let inner = tokio::spawn(forwarder.run(stop_rx));
            let result = match inner.await {
                Ok(()) => Ok(()),
                Err(e) => Err(FleetMonError::Internal(format!(
                    "Log forwarder panicked: {e}"
                ))),
            };
            (site_index, WorkerKind::LogForwarder, generation, result)
        });
    }

    fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// A site reported log capabilities: (re)spawn its forwarder when they
    /// intersect the options the site asked for.
    async fn handle_log_capabilities(&mut self, site_index: usize) {
        if site_index >= self.area.len() {
            warn!("GOT_LC for site index {site_index} out of range.");
            return;
        }
        let (alias, granted) = {
            let record = self.area.record(site_index).lock();
            (
                record.alias.clone(),
                record.options.requested_logs() & record.log_capabilities,
            )
        };
        if granted.is_empty() {
            return;
        }
        info!("Site '{alias}' grants log streams {granted:?}, starting its forwarder.");

        if let Some(entry) = self.table.get(site_index, WorkerKind::LogForwarder) {
            if entry.running {
                let _ = entry.stopper.send(());
            }
        }
        self.table
            .insert(ProcessEntry::new(alias, site_index, WorkerKind::LogForwarder));
        self.spawn_log_forwarder(site_index);
        self.write_active_file().await;
    }

    async fn disable_monitor(&mut self, site_index: usize) {
        if site_index >= self.area.len() {
            warn!("DISABLE_MON for site index {site_index} out of range.");
            return;
        }
        let alias = {
            let mut record = self.area.record(site_index).lock();
            record.set_connect_status(ConnectStatus::Disabled);
            record.alias.clone()
        };
        if let Some(entry) = self.table.get(site_index, WorkerKind::PollClient) {
            let _ = entry.stopper.send(());
        }
        info!("Monitoring disabled for '{alias}'.");
        self.write_active_file().await;
    }

    async fn enable_monitor(&mut self, site_index: usize) {
        if site_index >= self.area.len() {
            warn!("ENABLE_MON for site index {site_index} out of range.");
            return;
        }
        let (is_group, alias) = {
            let mut record = self.area.record(site_index).lock();
            record.set_connect_status(ConnectStatus::Disconnected);
            (record.is_group(), record.alias.clone())
        };
        if is_group {
            return;
        }
        let running = self
            .table
            .get(site_index, WorkerKind::PollClient)
            .is_some_and(|e| e.running);
        if !running {
            self.table
                .insert(ProcessEntry::new(alias.clone(), site_index, WorkerKind::PollClient));
            self.spawn_poll_client(site_index);
        }
        info!("Monitoring enabled for '{alias}'.");
        self.write_active_file().await;
    }

    /// Reaps one worker exit and applies the restart policy.
    async fn handle_worker_exit(&mut self, exit: WorkerExit) {
        let (site_index, kind, generation, result) = exit;
        let Some(entry) = self.table.get_mut(site_index, kind) else {
            return;
        };
        if entry.generation != generation {
            // A stale incarnation; its replacement is already running.
            return;
        }

        let disposition = match &result {
            Ok(()) => ExitDisposition::Clean,
            Err(FleetMonError::RemoteShutdown) => ExitDisposition::RemoteShutdown,
            Err(_) => ExitDisposition::Crash,
        };
        let alias = entry.alias.clone();
        entry.mark_exit(disposition);

        match &result {
            Ok(()) => {}
            Err(e) => {
                let line = format!("{kind:?} for '{alias}' exited: {e}\n");
                if disposition == ExitDisposition::RemoteShutdown {
                    // Remote shutdowns are site events, not monitor faults.
                    self.supervisor_status.lock().note_severity(false, SEVERITY_WARN);
                    let _ = self.system_log_tx.try_send(line.into_bytes());
                } else {
                    self.supervisor_status.lock().note_severity(true, SEVERITY_ERROR);
                    let _ = self.monitor_log_tx.try_send(line.into_bytes());
                }
            }
        }
        self.write_active_file().await;
    }

    /// Respawns workers whose retry time has come.
    fn restart_due_workers(&mut self) {
        let now = Instant::now();
        let due: Vec<(usize, WorkerKind)> = self
            .table
            .entries()
            .iter()
            .filter(|e| e.due_for_restart(now))
            .map(|e| (e.site_index, e.kind))
            .collect();

        for (site_index, kind) in due {
            let disabled = self.area.record(site_index).lock().connect_status
                == ConnectStatus::Disabled;
            if disabled {
                continue;
            }
            metrics::WORKER_RESTARTS_TOTAL.inc();
            info!(
                "Restarting {:?} for site index {site_index}.",
                kind
            );
            match kind {
                WorkerKind::PollClient => self.spawn_poll_client(site_index),
                WorkerKind::LogForwarder => self.spawn_log_forwarder(site_index),
            }
        }
    }

    /// Stops everything, rebuilds the status area from the reloaded site
    /// configuration (records survive by alias match) and restarts all
    /// workers with fresh restart budgets.
    async fn reload_sites(&mut self) {
        let sites: Vec<SiteConfig> = match load_site_config(
            &self.config.site_config_path(),
            self.config.default_poll_interval,
        ) {
            Ok(sites) => sites,
            Err(e) => {
                // At reload time an unreadable configuration keeps the
                // running state.
                error!("Site configuration reload failed: {e}");
                self.supervisor_status.lock().note_severity(true, SEVERITY_ERROR);
                return;
            }
        };

        self.table.stop_all();
        drain_workers(&mut self.workers).await;
        self.table.clear();

        // Detach: publish the outgoing area one last time before replacing it.
        if let Err(e) = self.area.write_to(&self.config.area_path()).await {
            warn!("Failed to publish the outgoing status area: {e}");
        }

        self.area = Arc::new(self.area.rebuild(&sites));
        *self.shared_area.write() = self.area.clone();
        metrics::SITES_MONITORED.set(self.area.len() as f64);
        info!("Rebuilt status area with {} site record(s).", self.area.len());

        self.spawn_poll_clients();
        self.write_active_file().await;
    }

    /// Rewrites `<work>/fifo/supervisor_active`: magic, pid, run id, site
    /// count and one liveness row per site.
    async fn write_active_file(&self) {
        let mut bytes = Vec::with_capacity(
            ACTIVE_MAGIC.len() + 4 + 2 * RUN_ID_BYTES + 4 + self.area.len() * (MAX_ALIAS_LENGTH + 1),
        );
        bytes.extend_from_slice(ACTIVE_MAGIC);
        bytes.extend_from_slice(&std::process::id().to_le_bytes());
        let id = self.run_id.as_bytes();
        bytes.extend_from_slice(&id[..(2 * RUN_ID_BYTES).min(id.len())]);
        bytes.resize(ACTIVE_MAGIC.len() + 4 + 2 * RUN_ID_BYTES, 0);
        bytes.extend_from_slice(&(self.area.len() as u32).to_le_bytes());

        for site_index in 0..self.area.len() {
            let alias = self.area.record(site_index).lock().alias.clone();
            let raw = alias.as_bytes();
            let n = raw.len().min(MAX_ALIAS_LENGTH);
            bytes.extend_from_slice(&raw[..n]);
            bytes.extend(std::iter::repeat_n(0u8, MAX_ALIAS_LENGTH - n));

            let mut flags = 0u8;
            if self
                .table
                .get(site_index, WorkerKind::PollClient)
                .is_some_and(|e| e.running)
            {
                flags |= 1;
            }
            if self
                .table
                .get(site_index, WorkerKind::LogForwarder)
                .is_some_and(|e| e.running)
            {
                flags |= 2;
            }
            bytes.push(flags);
        }

        if let Err(e) =
            tokio::fs::write(self.config.supervisor_active_path(), &bytes).await
        {
            warn!("Failed to write the supervisor active file: {e}");
        }
    }
}

/// Grants each worker its voluntary-exit window, then hard-kills the rest.
async fn drain_workers(workers: &mut JoinSet<WorkerExit>) {
    for _ in 0..SHUTDOWN_POLLS {
        while workers.try_join_next().is_some() {}
        if workers.is_empty() {
            return;
        }
        tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
    }
    warn!(
        "{} worker(s) did not stop voluntarily, aborting them.",
        workers.len()
    );
    workers.shutdown().await;
}

/// Reads the pid recorded in a supervisor active file, if the file exists
/// and looks sane. Used by startup's already-running check.
pub fn read_active_pid(path: &Path) -> Option<u32> {
    let bytes = std::fs::read(path).ok()?;
    if bytes.len() < ACTIVE_MAGIC.len() + 4 || &bytes[..ACTIVE_MAGIC.len()] != ACTIVE_MAGIC {
        return None;
    }
    let pid_bytes: [u8; 4] = bytes[ACTIVE_MAGIC.len()..ACTIVE_MAGIC.len() + 4]
        .try_into()
        .ok()?;
    Some(u32::from_le_bytes(pid_bytes))
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
