// src/config.rs

//! Manages monitor configuration: the TOML process configuration and the
//! plain-text site configuration under `<work>/etc/config`.
//!
//! The process configuration is loaded once at startup. The site
//! configuration is re-read whenever its mtime changes; the supervisor then
//! rebuilds the status area and restarts the per-site workers.

use crate::core::FleetMonError;
use crate::core::constants::{DEFAULT_TCP_TIMEOUT, MAX_ALIAS_LENGTH};
use crate::core::status::record::SiteOptions;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::warn;

/// Default port a remote status daemon listens on.
pub const DEFAULT_REMOTE_PORT: u16 = 4444;

/// One remote endpoint of a site.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

/// One line of the site configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteConfig {
    pub alias: String,
    pub endpoints: [Endpoint; 2],
    /// Empty for group rows, which aggregate the sites below them.
    pub command: String,
    pub poll_interval: u64,
    pub connect_time: u64,
    pub disconnect_time: u64,
    pub options: SiteOptions,
}

impl SiteConfig {
    pub fn is_group(&self) -> bool {
        self.command.is_empty()
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    8878
}

/// A raw representation of the config file before validation and resolution.
#[derive(Deserialize)]
struct RawConfig {
    work_dir: String,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_tcp_timeout", with = "humantime_serde")]
    tcp_timeout: Duration,
    #[serde(default = "default_publish_interval", with = "humantime_serde")]
    publish_interval: Duration,
    #[serde(default = "default_poll_interval")]
    default_poll_interval: u64,
    #[serde(default = "default_max_log_files")]
    max_log_files: u32,
    #[serde(default = "default_switch_file_time", with = "humantime_serde")]
    switch_file_time: Duration,
    #[serde(default)]
    metrics: MetricsConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_tcp_timeout() -> Duration {
    DEFAULT_TCP_TIMEOUT
}
fn default_publish_interval() -> Duration {
    Duration::from_secs(5)
}
fn default_poll_interval() -> u64 {
    5
}
fn default_max_log_files() -> u32 {
    10
}
fn default_switch_file_time() -> Duration {
    Duration::from_secs(60 * 60)
}

/// The validated process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub work_dir: PathBuf,
    pub log_level: String,
    pub tcp_timeout: Duration,
    pub publish_interval: Duration,
    pub default_poll_interval: u64,
    pub max_log_files: u32,
    pub switch_file_time: Duration,
    pub metrics: MetricsConfig,
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, FleetMonError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            FleetMonError::ConfigError(format!("Failed to read config file at '{path}': {e}"))
        })?;
        let raw: RawConfig = toml::from_str(&contents).map_err(|e| {
            FleetMonError::ConfigError(format!("Failed to parse TOML from '{path}': {e}"))
        })?;

        if raw.work_dir.is_empty() {
            return Err(FleetMonError::ConfigError(
                "'work_dir' must not be empty".into(),
            ));
        }
        if raw.default_poll_interval == 0 {
            return Err(FleetMonError::ConfigError(
                "'default_poll_interval' must be at least 1 second".into(),
            ));
        }

        Ok(Config {
            work_dir: PathBuf::from(raw.work_dir),
            log_level: raw.log_level,
            tcp_timeout: raw.tcp_timeout,
            publish_interval: raw.publish_interval,
            default_poll_interval: raw.default_poll_interval,
            max_log_files: raw.max_log_files,
            switch_file_time: raw.switch_file_time,
            metrics: raw.metrics,
        })
    }

    /// Retention window for reshuffled list entries.
    pub fn snapshot_retention(&self) -> Duration {
        self.switch_file_time * self.max_log_files
    }

    // --- Well-known paths under the working directory ---

    pub fn fifo_dir(&self) -> PathBuf {
        self.work_dir.join("fifo")
    }

    pub fn etc_dir(&self) -> PathBuf {
        self.work_dir.join("etc")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.work_dir.join("log")
    }

    pub fn site_config_path(&self) -> PathBuf {
        self.etc_dir().join("config")
    }

    pub fn block_path(&self) -> PathBuf {
        self.etc_dir().join("block")
    }

    pub fn area_path(&self) -> PathBuf {
        self.fifo_dir().join("status_area")
    }

    pub fn supervisor_status_path(&self) -> PathBuf {
        self.fifo_dir().join("supervisor_status")
    }

    pub fn supervisor_active_path(&self) -> PathBuf {
        self.fifo_dir().join("supervisor_active")
    }

    pub fn control_socket_path(&self) -> PathBuf {
        self.fifo_dir().join("control")
    }
}

/// Parses one endpoint field: `host[:port][/host2[:port]]`.
fn parse_endpoints(field: &str, line: usize) -> Result<[Endpoint; 2], FleetMonError> {
    let mut endpoints = [Endpoint::default(), Endpoint::default()];
    let mut parts = field.splitn(2, '/');

    let first = parts.next().unwrap_or_default();
    endpoints[0] = parse_endpoint(first, line)?;
    endpoints[1] = match parts.next() {
        Some(second) => parse_endpoint(second, line)?,
        // A single endpoint: both toggles dial the same address.
        None => endpoints[0].clone(),
    };
    Ok(endpoints)
}

fn parse_endpoint(field: &str, line: usize) -> Result<Endpoint, FleetMonError> {
    if field.is_empty() {
        return Err(FleetMonError::SiteConfigError {
            line,
            reason: "empty hostname".into(),
        });
    }
    match field.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse().map_err(|_| FleetMonError::SiteConfigError {
                line,
                reason: format!("invalid port '{port}'"),
            })?;
            Ok(Endpoint {
                host: host.to_string(),
                port,
            })
        }
        None => Ok(Endpoint {
            host: field.to_string(),
            port: DEFAULT_REMOTE_PORT,
        }),
    }
}

/// Parses the site configuration text. Each non-comment line is
/// `alias endpoints command interval connect_time disconnect_time options`;
/// a command of `-` marks a group row. Missing trailing numeric fields fall
/// back to defaults.
pub fn parse_site_config(
    contents: &str,
    default_poll_interval: u64,
) -> Result<Vec<SiteConfig>, FleetMonError> {
    let mut sites = Vec::new();

    for (index, raw_line) in contents.lines().enumerate() {
        let line_no = index + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.split_whitespace();
        let alias = fields.next().expect("non-empty line has a first field");
        if alias.len() > MAX_ALIAS_LENGTH {
            return Err(FleetMonError::SiteConfigError {
                line: line_no,
                reason: format!("alias '{alias}' exceeds {MAX_ALIAS_LENGTH} bytes"),
            });
        }
        if sites.iter().any(|s: &SiteConfig| s.alias == alias) {
            return Err(FleetMonError::SiteConfigError {
                line: line_no,
                reason: format!("duplicate alias '{alias}'"),
            });
        }

        let endpoints_field = fields.next().ok_or(FleetMonError::SiteConfigError {
            line: line_no,
            reason: "missing endpoints field".into(),
        })?;
        let endpoints = parse_endpoints(endpoints_field, line_no)?;

        let command = match fields.next() {
            None | Some("-") => String::new(),
            Some(cmd) => cmd.to_string(),
        };

        let poll_interval = parse_numeric_field(fields.next(), default_poll_interval, line_no, "interval")?;
        let connect_time = parse_numeric_field(fields.next(), 0, line_no, "connect_time")?;
        let disconnect_time =
            parse_numeric_field(fields.next(), 0, line_no, "disconnect_time")?;
        let options_bits = parse_numeric_field(fields.next(), 0, line_no, "options")? as u32;
        let options = SiteOptions::from_bits_truncate(options_bits);

        if (connect_time == 0) != (disconnect_time == 0) {
            warn!(
                "Site '{alias}' sets only one of connect_time/disconnect_time, scheduled disconnect disabled."
            );
        }

        sites.push(SiteConfig {
            alias: alias.to_string(),
            endpoints,
            command,
            poll_interval,
            connect_time,
            disconnect_time,
            options,
        });
    }

    Ok(sites)
}

fn parse_numeric_field(
    field: Option<&str>,
    default: u64,
    line: usize,
    name: &str,
) -> Result<u64, FleetMonError> {
    match field {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| FleetMonError::SiteConfigError {
            line,
            reason: format!("invalid {name} '{value}'"),
        }),
    }
}

/// Reads and parses the site configuration file.
pub fn load_site_config(path: &Path, default_poll_interval: u64) -> Result<Vec<SiteConfig>, FleetMonError> {
    let contents = fs::read_to_string(path).map_err(|e| {
        FleetMonError::ConfigError(format!(
            "Failed to read site configuration at '{}': {e}",
            path.display()
        ))
    })?;
    parse_site_config(&contents, default_poll_interval)
}

/// The site configuration's mtime, used to detect reloads.
pub fn site_config_mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).ok().and_then(|m| m.modified().ok())
}
