// src/core/supervisor/mod.rs

//! The process top: attaches the status area, spawns the per-site workers
//! and auxiliary tasks, and runs the control loop that dispatches control
//! commands, reloads configuration, reaps crashed children and drives the
//! periodic aggregation passes.

pub mod control;
pub mod heartbeat;
pub mod metrics_server;
pub mod process;
pub mod run;
pub mod signals;

pub use run::{read_active_pid, run};
