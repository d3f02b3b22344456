// src/core/logfwd/writer.rs

//! Rotating append-only log files.
//!
//! A writer owns `<name>` under the log directory and rotates it to
//! `<name>.0`, `<name>.1`, ... after each switch interval, keeping at most
//! `max_files` rotated generations.

use crate::core::FleetMonError;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

pub struct RotatingWriter {
    dir: PathBuf,
    name: String,
    switch_file_time: Duration,
    max_files: u32,
    file: Option<File>,
    opened_at: Instant,
}

impl RotatingWriter {
    pub fn new(dir: PathBuf, name: &str, switch_file_time: Duration, max_files: u32) -> Self {
        Self {
            dir,
            name: name.to_string(),
            switch_file_time,
            max_files: max_files.max(1),
            file: None,
            opened_at: Instant::now(),
        }
    }

    fn current_path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }

    fn rotated_path(&self, generation: u32) -> PathBuf {
        self.dir.join(format!("{}.{generation}", self.name))
    }

    /// Appends `bytes`, rotating first if the current file has been open for
    /// a full switch interval.
    pub async fn append(&mut self, bytes: &[u8]) -> Result<(), FleetMonError> {
        if self.file.is_some() && self.opened_at.elapsed() >= self.switch_file_time {
            self.rotate().await;
        }
        if self.file.is_none() {
            tokio::fs::create_dir_all(&self.dir).await?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.current_path())
                .await?;
            self.file = Some(file);
            self.opened_at = Instant::now();
        }
        let file = self.file.as_mut().expect("file was just opened");
        file.write_all(bytes).await?;
        Ok(())
    }

    pub async fn flush(&mut self) {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush().await;
        }
    }

    /// Shifts every rotated generation up by one, dropping the oldest.
    async fn rotate(&mut self) {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush().await;
        }

        let oldest = self.rotated_path(self.max_files - 1);
        let _ = tokio::fs::remove_file(&oldest).await;
        for generation in (0..self.max_files - 1).rev() {
            let from = self.rotated_path(generation);
            if tokio::fs::try_exists(&from).await.unwrap_or(false) {
                let _ = tokio::fs::rename(&from, self.rotated_path(generation + 1)).await;
            }
        }
        if let Err(e) = tokio::fs::rename(self.current_path(), self.rotated_path(0)).await {
            warn!("Failed to rotate {}: {e}", self.current_path().display());
        }
        self.opened_at = Instant::now();
    }
}

/// A process-wide log writer: drains a byte channel into a rotating file.
/// Two of these run per supervisor, one for the system log stream and one
/// for the monitor log stream.
pub struct LogWriterTask {
    writer: RotatingWriter,
    rx: mpsc::Receiver<Vec<u8>>,
    name: &'static str,
}

impl LogWriterTask {
    pub fn new(writer: RotatingWriter, rx: mpsc::Receiver<Vec<u8>>, name: &'static str) -> Self {
        Self { writer, rx, name }
    }

    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("{} writer started.", self.name);
        loop {
            tokio::select! {
                entry = self.rx.recv() => match entry {
                    Some(bytes) => {
                        if let Err(e) = self.writer.append(&bytes).await {
                            warn!("{} writer failed to append: {e}", self.name);
                        }
                    }
                    None => break,
                },
                _ = shutdown_rx.recv() => break,
            }
        }
        // Drain whatever is already queued before stopping.
        while let Ok(bytes) = self.rx.try_recv() {
            if self.writer.append(&bytes).await.is_err() {
                break;
            }
        }
        self.writer.flush().await;
        info!("{} writer shutting down.", self.name);
    }
}
