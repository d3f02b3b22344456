// src/core/status/publisher.rs

//! Periodically serializes the status area and the supervisor status to
//! their files under `<work>/fifo/`, so external viewers always have a
//! recent, checksummed copy to read.

use crate::core::status::SupervisorStatus;
use crate::core::status::area::SharedArea;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub struct PublisherTask {
    area: SharedArea,
    supervisor_status: Arc<Mutex<SupervisorStatus>>,
    area_path: PathBuf,
    status_path: PathBuf,
    interval: Duration,
}

impl PublisherTask {
    pub fn new(
        area: SharedArea,
        supervisor_status: Arc<Mutex<SupervisorStatus>>,
        area_path: PathBuf,
        status_path: PathBuf,
        interval: Duration,
    ) -> Self {
        Self {
            area,
            supervisor_status,
            area_path,
            status_path,
            interval,
        }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.publish_once().await;
                }
                _ = shutdown_rx.recv() => {
                    // One final publish so viewers see the shutdown state.
                    self.publish_once().await;
                    info!("Status publisher shutting down.");
                    return;
                }
            }
        }
    }

    async fn publish_once(&self) {
        let area = self.area.read().clone();
        if let Err(e) = area.write_to(&self.area_path).await {
            warn!(
                "Failed to publish status area to {}: {e}",
                self.area_path.display()
            );
        } else {
            debug!("Published status area ({} records).", area.len());
        }

        // The monitor-wide log byte counter is the sum over all sites.
        let total_log_bytes: u64 = area
            .records()
            .iter()
            .map(|r| r.lock().log_bytes_received.current())
            .sum();
        let status = {
            let mut status = self.supervisor_status.lock();
            status.log_bytes_received.set_current(total_log_bytes);
            status.clone()
        };
        if let Err(e) = status.write_to(&self.status_path).await {
            warn!(
                "Failed to publish supervisor status to {}: {e}",
                self.status_path.display()
            );
        }
    }
}
