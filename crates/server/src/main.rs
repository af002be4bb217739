// csp-server main.rs
// HTTP collector for browser CSP violation reports

use clap::Parser;
use csp_server::{
    init_logging, router, validate_startup, AppState, CollectorConfig, NoopRotation,
    ReportStore, RotationScheduler, SystemClock,
};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CollectorConfig::parse();
    let _log_guard = init_logging(config.log_dir.as_deref());
    config.validate()?;

    let storage_dir = config.storage_dir();
    let startup = validate_startup(&storage_dir);
    if !startup.success {
        if let Some(issue) = &startup.blocking_issue {
            tracing::error!(
                "{} ({}): {}",
                issue.issue,
                issue.detail.as_deref().unwrap_or("no detail"),
                issue.recommended_action
            );
        }
        anyhow::bail!("report storage {} is not usable", storage_dir.display());
    }

    tracing::info!("📁 Report storage: {:?}", storage_dir);

    let state = AppState::new(
        ReportStore::new(&storage_dir),
        Arc::new(SystemClock),
        Arc::new(NoopRotation),
    );

    let scheduler = RotationScheduler::new(
        state.rotation_hook(),
        state.clock(),
        config.rotation_delay(),
        config.rotation_interval(),
    );
    scheduler.ensure_registered();

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("📡 Listening on {}", addr);

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    scheduler.shutdown();
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
