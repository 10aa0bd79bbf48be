//! PayPulse -- statistical health monitoring for payment-processing
//! pipelines.
//!
//! This crate turns raw per-transaction and per-authentication event logs
//! into time-bucketed metrics, estimates robust baselines from trailing
//! history, flags abnormal deviations, and composes a weighted health
//! score. Computation is pure and deterministic; the Data Source boundary
//! is the only place that suspends.

pub mod api;
pub mod config;
pub mod event;
pub mod health;
pub mod pipeline;
pub mod report;
pub mod source;
pub mod stats;

use anyhow::Result;

/// Start the PayPulse daemon: the read-only metrics API over the event
/// store.
pub async fn serve(bind: &str, db_path: &str) -> Result<()> {
    tracing::info!(%db_path, "opening event store");
    let source = source::sqlite::SqliteSource::open(db_path)?;
    let config = config::EngineConfig::load_or_default();

    let state = api::state::AppState::new(source, config);
    let app = api::router(state);

    let addr: std::net::SocketAddr = bind.parse()?;
    tracing::info!(%addr, "paypulse listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
