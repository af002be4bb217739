//! Health endpoint and startup validation
//!
//! Reports:
//! - Build info
//! - Storage directory and whether it is writable
//! - Size of today's log
//! - Overall verdict
//!
//! Startup validation runs the same storage probe before the listener binds,
//! so a misconfigured directory fails fast instead of on the first report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const PROBE_FILE: &str = ".csp_write_probe";

// ============================================================================
// Health Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub build: BuildInfo,
    pub storage: StorageHealth,
    pub verdict: HealthVerdict,
    pub checked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocking_issue: Option<BlockingIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildInfo {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_sha: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageHealth {
    pub storage_dir: String,
    pub writable: bool,
    pub today_log: String,
    /// `None` until the first report of the day is stored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub today_log_bytes: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthVerdict {
    Healthy,
    /// Reports cannot be stored
    Blocked,
}

impl HealthVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Blocked => "blocked",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockingIssue {
    pub issue: String,
    pub recommended_action: String,
    pub detail: Option<String>,
}

// ============================================================================
// Health Check Implementation
// ============================================================================

pub struct HealthCheckConfig {
    pub storage_dir: PathBuf,
    pub today_log: PathBuf,
}

pub fn check_health(config: &HealthCheckConfig) -> HealthResponse {
    let build = BuildInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_sha: option_env!("GIT_SHA").map(String::from),
    };

    let probe = probe_writable(&config.storage_dir);
    let storage = StorageHealth {
        storage_dir: config.storage_dir.display().to_string(),
        writable: probe.is_ok(),
        today_log: config.today_log.display().to_string(),
        today_log_bytes: fs::metadata(&config.today_log).ok().map(|m| m.len()),
    };

    let (verdict, blocking_issue) = match probe {
        Ok(()) => (HealthVerdict::Healthy, None),
        Err(detail) => (
            HealthVerdict::Blocked,
            Some(BlockingIssue {
                issue: "Report storage not writable".to_string(),
                recommended_action: format!(
                    "Ensure {} exists and is writable by the server user",
                    storage.storage_dir
                ),
                detail: Some(detail),
            }),
        ),
    };

    HealthResponse {
        build,
        storage,
        verdict,
        checked_at: Utc::now(),
        blocking_issue,
    }
}

/// Write and remove a probe file in `dir`
fn probe_writable(dir: &Path) -> Result<(), String> {
    let probe = dir.join(PROBE_FILE);
    fs::write(&probe, b"probe").map_err(|e| e.to_string())?;
    let _ = fs::remove_file(&probe);
    Ok(())
}

// ============================================================================
// Startup Validation
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartupValidation {
    pub success: bool,
    pub verdict: HealthVerdict,
    pub blocking_issue: Option<BlockingIssue>,
}

/// Create the storage directory if missing and check it is writable.
pub fn validate_startup(storage_dir: &Path) -> StartupValidation {
    if let Err(e) = fs::create_dir_all(storage_dir) {
        return StartupValidation {
            success: false,
            verdict: HealthVerdict::Blocked,
            blocking_issue: Some(BlockingIssue {
                issue: "Cannot create report storage directory".to_string(),
                recommended_action: format!(
                    "Create {} with appropriate permissions, or set CSP_STORAGE_DIR to a writable path",
                    storage_dir.display()
                ),
                detail: Some(e.to_string()),
            }),
        };
    }

    if let Err(detail) = probe_writable(storage_dir) {
        return StartupValidation {
            success: false,
            verdict: HealthVerdict::Blocked,
            blocking_issue: Some(BlockingIssue {
                issue: "Report storage directory is not writable".to_string(),
                recommended_action: format!(
                    "Ensure {} is writable by the current user",
                    storage_dir.display()
                ),
                detail: Some(detail),
            }),
        };
    }

    StartupValidation {
        success: true,
        verdict: HealthVerdict::Healthy,
        blocking_issue: None,
    }
}

// ============================================================================
// Tests
// ============================================================================
