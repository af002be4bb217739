//! Logging setup for the collector
//!
//! Always logs to stderr; with a log directory configured, also writes a
//! daily rolling file there.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "info,csp_server=info";

const LOG_FILE_NAME: &str = "csp-server.log";

/// Initialize logging.
///
/// The returned guard must be held for the lifetime of the process so the
/// file writer flushes on exit.
pub fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).ok();
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(non_blocking).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Some(dir) = log_dir {
        tracing::info!("Logging initialized, log directory: {:?}", dir);
    }

    guard
}
