// src/main.rs

//! The main entry point for the FleetMon supervisor.

use fleetmon::config::Config;
use fleetmon::core::constants::{
    EXIT_ALREADY_RUNNING, EXIT_DISABLED_BY_SYSADM, EXIT_INCORRECT, EXIT_SYNTAX,
};
use fleetmon::core::supervisor;
use std::env;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{filter::EnvFilter, prelude::*, reload};

const USAGE: &str = "Usage: fleetmon [--config <file>] [-w <dir>] [--version]";

#[tokio::main]
async fn main() {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("FleetMon version {VERSION}");
        return;
    }

    // Determine the configuration path. It can be provided via a --config
    // flag; otherwise, it defaults to "fleetmon.toml".
    let config_path = match flag_value(&args, "--config") {
        Ok(value) => value.unwrap_or_else(|| "fleetmon.toml".to_string()),
        Err(e) => {
            eprintln!("{e}\n{USAGE}");
            std::process::exit(EXIT_SYNTAX);
        }
    };
    let work_dir_override = match flag_value(&args, "-w") {
        Ok(value) => value,
        Err(e) => {
            eprintln!("{e}\n{USAGE}");
            std::process::exit(EXIT_SYNTAX);
        }
    };

    // Load the process configuration. The supervisor cannot run without it.
    let mut config = match Config::from_file(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e}");
            std::process::exit(EXIT_INCORRECT);
        }
    };
    if let Some(dir) = work_dir_override {
        config.work_dir = dir.into();
    }

    // A block sentinel left by the system administrator refuses startup.
    if config.block_path().exists() {
        eprintln!(
            "Startup disabled by the system administrator ({} exists).",
            config.block_path().display()
        );
        std::process::exit(EXIT_DISABLED_BY_SYSADM);
    }

    // Refuse to run twice over the same working directory.
    if let Some(pid) = supervisor::read_active_pid(&config.supervisor_active_path()) {
        if pid_alive(pid) {
            eprintln!("A supervisor (pid {pid}) is already running in this working directory.");
            std::process::exit(EXIT_ALREADY_RUNNING);
        }
    }

    // Setup logging with reloading capabilities. The initial level comes
    // from the environment or the configuration.
    let initial_log_level = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    let (filter, reload_handle) = reload::Layer::new(EnvFilter::new(initial_log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact() // Use the compact, single-line format.
                .with_ansi(true),
        )
        .init();
    let reload_handle = Arc::new(reload_handle);

    if let Err(e) = supervisor::run(config, reload_handle).await {
        error!("Supervisor runtime error: {e}");
        std::process::exit(EXIT_INCORRECT);
    }
}

/// Extracts `<flag> <value>` from the argument list.
fn flag_value(args: &[String], flag: &str) -> Result<Option<String>, String> {
    match args.iter().position(|a| a == flag) {
        None => Ok(None),
        Some(i) => match args.get(i + 1) {
            Some(value) => Ok(Some(value.clone())),
            None => Err(format!("{flag} requires a value")),
        },
    }
}

/// Signal-0 probe: is the recorded pid still alive?
fn pid_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}
