//! CSP Violation Collector
//!
//! Accepts browser CSP violation reports (legacy `report-uri` objects and
//! Reporting API batches), drops extension and pseudo-scheme noise, appends
//! the rest to a per-day NDJSON log and serves aggregate views of a day.

pub mod aggregate;
pub mod api;
pub mod clock;
pub mod config;
pub mod health;
pub mod ingest;
pub mod logging;
pub mod rotation;
pub mod store;

pub use aggregate::{
    summarize, top_offenders, OffenderCount, Summary, DEFAULT_OFFENDER_LIMIT, UNKNOWN_KEY,
};
pub use api::{router, AppState, IngestResponse, SharedState, MAX_OFFENDER_LIMIT};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{default_storage_dir, CollectorConfig, ConfigError};
pub use health::{
    check_health, validate_startup, BlockingIssue, BuildInfo, HealthCheckConfig, HealthResponse,
    HealthVerdict, StartupValidation, StorageHealth,
};
pub use ingest::{IngestError, IngestPipeline};
pub use logging::init_logging;
pub use rotation::{NoopRotation, RotationHook, RotationScheduler};
pub use store::{ReportStore, StoreError};
