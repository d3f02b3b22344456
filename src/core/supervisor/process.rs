// src/core/supervisor/process.rs

//! The runtime process table: one entry per worker task, with the restart
//! bookkeeping the supervisor's reap-and-restart policy needs.

use crate::core::constants::{CRASH_LOOP_WINDOW, MAX_RESTART_COUNT, RETRY_INTERVAL};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::warn;

const INITIAL_RESTART_DELAY: Duration = Duration::from_secs(1);
const MAX_RESTART_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerKind {
    PollClient,
    LogForwarder,
}

/// Why a worker task ended, as far as restart policy is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDisposition {
    /// Voluntary exit (shutdown request or disabled site): no restart.
    Clean,
    /// The remote announced shutdown: reconnect after the retry interval
    /// without burning a restart.
    RemoteShutdown,
    /// Crash or fatal session error: escalating backoff.
    Crash,
}

pub struct ProcessEntry {
    pub alias: String,
    pub site_index: usize,
    pub kind: WorkerKind,
    pub started: Instant,
    pub running: bool,
    pub gave_up: bool,
    pub restart_count: u32,
    pub last_death: Option<Instant>,
    pub next_retry: Option<Instant>,
    /// Identifies the current incarnation: a stale task's exit report must
    /// not disturb the entry of its replacement.
    pub generation: u64,
    /// Stops just this worker; the supervisor also fans global shutdown out
    /// through these.
    pub stopper: broadcast::Sender<()>,
}

impl ProcessEntry {
    pub fn new(alias: String, site_index: usize, kind: WorkerKind) -> Self {
        let (stopper, _) = broadcast::channel(1);
        Self {
            alias,
            site_index,
            kind,
            started: Instant::now(),
            running: false,
            gave_up: false,
            restart_count: 0,
            last_death: None,
            next_retry: None,
            generation: 0,
            stopper,
        }
    }

    pub fn mark_started(&mut self, generation: u64) {
        self.started = Instant::now();
        self.running = true;
        self.next_retry = None;
        self.generation = generation;
    }

    /// Records an exit and schedules the restart the policy calls for.
    pub fn mark_exit(&mut self, disposition: ExitDisposition) {
        let now = Instant::now();
        self.running = false;

        match disposition {
            ExitDisposition::Clean => {
                self.next_retry = None;
            }
            ExitDisposition::RemoteShutdown => {
                self.next_retry = Some(now + RETRY_INTERVAL);
            }
            ExitDisposition::Crash => {
                if self
                    .last_death
                    .is_some_and(|previous| now.duration_since(previous) < CRASH_LOOP_WINDOW)
                {
                    self.restart_count += 1;
                }
                if self.restart_count >= MAX_RESTART_COUNT {
                    if !self.gave_up {
                        warn!(
                            "Worker {:?} for '{}' crashed {} times, giving up until the configuration changes.",
                            self.kind, self.alias, self.restart_count
                        );
                    }
                    self.gave_up = true;
                    self.next_retry = None;
                } else {
                    let delay = (INITIAL_RESTART_DELAY * 2u32.saturating_pow(self.restart_count))
                        .min(MAX_RESTART_DELAY);
                    self.next_retry = Some(now + delay);
                }
            }
        }
        self.last_death = Some(now);
    }

    pub fn due_for_restart(&self, now: Instant) -> bool {
        !self.running
            && !self.gave_up
            && self.next_retry.is_some_and(|retry| retry <= now)
    }
}

/// The supervisor-owned table of worker entries.
#[derive(Default)]
pub struct ProcessTable {
    entries: Vec<ProcessEntry>,
}

impl ProcessTable {
    pub fn insert(&mut self, entry: ProcessEntry) {
        self.entries
            .retain(|e| !(e.site_index == entry.site_index && e.kind == entry.kind));
        self.entries.push(entry);
    }

    pub fn get_mut(&mut self, site_index: usize, kind: WorkerKind) -> Option<&mut ProcessEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.site_index == site_index && e.kind == kind)
    }

    pub fn get(&self, site_index: usize, kind: WorkerKind) -> Option<&ProcessEntry> {
        self.entries
            .iter()
            .find(|e| e.site_index == site_index && e.kind == kind)
    }

    pub fn entries(&self) -> &[ProcessEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [ProcessEntry] {
        &mut self.entries
    }

    /// Signals every worker to stop.
    pub fn stop_all(&self) {
        for entry in &self.entries {
            let _ = entry.stopper.send(());
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn running_count(&self) -> usize {
        self.entries.iter().filter(|e| e.running).count()
    }
}
