//! HTTP surface of the collector
//!
//! Routes:
//! - `POST /csp/v1/report`    report ingestion (also `/api/csp/report`)
//! - `GET  /csp/v1/summary`   directive -> blocked URI -> count for one day
//! - `GET  /csp/v1/offenders` top blocked URIs for one day
//! - `POST /csp/v1/rotate`    run the rotation hook now
//! - `GET  /health`
//!
//! File I/O runs on the blocking pool so a slow disk never stalls the
//! executor.

use crate::aggregate::{self, OffenderCount, Summary, DEFAULT_OFFENDER_LIMIT};
use crate::clock::Clock;
use crate::health::{check_health, HealthCheckConfig};
use crate::ingest::{IngestError, IngestPipeline};
use crate::rotation::RotationHook;
use crate::store::{ReportStore, StoreError};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, Query, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use csp_core::ArrivalMetadata;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Upper bound for `?limit=` on the offenders endpoint
pub const MAX_OFFENDER_LIMIT: usize = 1000;

// ============================================================================
// Application State
// ============================================================================

pub struct AppState {
    store: Arc<ReportStore>,
    pipeline: IngestPipeline,
    clock: Arc<dyn Clock>,
    rotation: Arc<dyn RotationHook>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        store: ReportStore,
        clock: Arc<dyn Clock>,
        rotation: Arc<dyn RotationHook>,
    ) -> SharedState {
        let store = Arc::new(store);
        Arc::new(Self {
            pipeline: IngestPipeline::new(Arc::clone(&store)),
            store,
            clock,
            rotation,
        })
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn rotation_hook(&self) -> Arc<dyn RotationHook> {
        Arc::clone(&self.rotation)
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub written: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl IngestResponse {
    fn written(written: usize) -> Json<Self> {
        Json(Self {
            ok: true,
            written: Some(written),
            reason: None,
        })
    }

    fn failed(reason: &str) -> Json<Self> {
        Json(Self {
            ok: false,
            written: None,
            reason: Some(reason.to_string()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct DayQuery {
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OffendersQuery {
    date: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct RotateResponse {
    ok: bool,
    rotated: bool,
}

fn failure(status: StatusCode, reason: &str) -> Response {
    (status, IngestResponse::failed(reason)).into_response()
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: SharedState) -> Router {
    // Browsers post reports cross-origin, and reports+json needs a preflight.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/health", get(health))
        .route("/csp/v1/report", post(ingest_report))
        .route("/api/csp/report", post(ingest_report))
        .route("/csp/v1/summary", get(summary))
        .route("/csp/v1/offenders", get(offenders))
        .route("/csp/v1/rotate", post(rotate))
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

fn header_string(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
}

async fn ingest_report(
    State(state): State<SharedState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let arrival = ArrivalMetadata {
        received_at: state.clock.now(),
        user_agent: header_string(&headers, header::USER_AGENT),
        ip: connect_info.map(|ConnectInfo(addr)| addr.ip().to_string()),
        content_type: header_string(&headers, header::CONTENT_TYPE),
    };

    let pipeline = state.pipeline.clone();
    let outcome = tokio::task::spawn_blocking(move || pipeline.ingest(&body, &arrival)).await;

    match outcome {
        Ok(Ok(written)) => (StatusCode::CREATED, IngestResponse::written(written)).into_response(),
        Ok(Err(e @ IngestError::BadPayload)) => failure(StatusCode::BAD_REQUEST, e.reason()),
        Ok(Err(e)) => {
            tracing::error!("CSP report ingestion failed: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.reason())
        }
        Err(e) => {
            tracing::error!("CSP ingestion task failed: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, "internal-error")
        }
    }
}

/// `?date=YYYY-MM-DD`, defaulting to today (UTC)
fn resolve_day(state: &AppState, date: Option<&str>) -> Result<NaiveDate, Response> {
    match date {
        None => Ok(state.clock.today()),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| failure(StatusCode::BAD_REQUEST, "bad-date")),
    }
}

async fn run_read<T, F>(state: SharedState, read: F) -> Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce(&ReportStore) -> Result<T, StoreError> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || read(state.store())).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            tracing::error!("Reading CSP log failed: {}", e);
            Err(failure(StatusCode::INTERNAL_SERVER_ERROR, "storage-error"))
        }
        Err(e) => {
            tracing::error!("CSP read task failed: {}", e);
            Err(failure(StatusCode::INTERNAL_SERVER_ERROR, "internal-error"))
        }
    }
}

async fn summary(State(state): State<SharedState>, Query(q): Query<DayQuery>) -> Response {
    let day = match resolve_day(&state, q.date.as_deref()) {
        Ok(day) => day,
        Err(resp) => return resp,
    };

    match run_read(state, move |store| aggregate::summarize(store, day)).await {
        Ok(summary) => Json::<Summary>(summary).into_response(),
        Err(resp) => resp,
    }
}

async fn offenders(State(state): State<SharedState>, Query(q): Query<OffendersQuery>) -> Response {
    let day = match resolve_day(&state, q.date.as_deref()) {
        Ok(day) => day,
        Err(resp) => return resp,
    };
    let limit = q
        .limit
        .unwrap_or(DEFAULT_OFFENDER_LIMIT)
        .min(MAX_OFFENDER_LIMIT);

    match run_read(state, move |store| aggregate::top_offenders(store, day, limit)).await {
        Ok(ranking) => Json::<Vec<OffenderCount>>(ranking).into_response(),
        Err(resp) => resp,
    }
}

async fn rotate(State(state): State<SharedState>) -> Response {
    let today = state.clock.today();
    let hook = state.rotation_hook();

    match tokio::task::spawn_blocking(move || hook.rotate(today)).await {
        Ok(Ok(())) => {
            tracing::info!(%today, "manual rotation requested");
            Json(RotateResponse {
                ok: true,
                rotated: true,
            })
            .into_response()
        }
        Ok(Err(e)) => {
            tracing::error!("Manual rotation failed: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, "storage-error")
        }
        Err(e) => {
            tracing::error!("Rotation task failed: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, "internal-error")
        }
    }
}

async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    let config = HealthCheckConfig {
        storage_dir: state.store.storage_dir().to_path_buf(),
        today_log: state.store.path_for(state.clock.today()),
    };
    let response = tokio::task::spawn_blocking(move || check_health(&config)).await;

    match response {
        Ok(health) => (StatusCode::OK, Json(health)).into_response(),
        Err(e) => {
            tracing::error!("Health check task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
