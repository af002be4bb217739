//! Collector configuration
//!
//! Every option comes from the command line with an environment fallback,
//! so the server runs the same under a process supervisor or a shell.

use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Directory name under the platform data dir
const APP_DIR: &str = "csp-collector";

/// Report directory name under the app dir
const REPORTS_DIR: &str = "csp-reports";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// CSP violation collector
#[derive(Parser, Debug, Clone)]
#[command(name = "csp-server")]
#[command(about = "Collects browser CSP violation reports into daily NDJSON logs")]
pub struct CollectorConfig {
    /// Address to bind
    #[arg(long, short = 'b', env = "CSP_COLLECTOR_BIND", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// Port to listen on
    #[arg(long, short = 'p', env = "CSP_COLLECTOR_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Directory holding the daily csp-<date>.ndjson files
    #[arg(long, short = 's', env = "CSP_STORAGE_DIR")]
    pub storage_dir: Option<PathBuf>,

    /// Write a daily rolling log file here in addition to stderr
    #[arg(long, env = "CSP_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Seconds between rotation hook runs
    #[arg(long, env = "CSP_ROTATION_INTERVAL_SECS", default_value_t = 86_400)]
    pub rotation_interval_secs: u64,

    /// Seconds after startup before the first rotation hook run
    #[arg(long, env = "CSP_ROTATION_DELAY_SECS", default_value_t = 3_600)]
    pub rotation_delay_secs: u64,
}

impl CollectorConfig {
    /// Resolved storage directory
    pub fn storage_dir(&self) -> PathBuf {
        self.storage_dir.clone().unwrap_or_else(default_storage_dir)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn rotation_interval(&self) -> Duration {
        Duration::from_secs(self.rotation_interval_secs)
    }

    pub fn rotation_delay(&self) -> Duration {
        Duration::from_secs(self.rotation_delay_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rotation_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rotation_interval_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if let Some(dir) = &self.storage_dir {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "storage_dir",
                    reason: "must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Platform data dir, falling back to the working directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(REPORTS_DIR)
}
