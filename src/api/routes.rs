//! API route definitions.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use super::state::{AppState, CachedReport};
use crate::event::Stream;
use crate::pipeline::{self, PipelineError};
use crate::source::SourceError;

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics/{date}", get(metrics))
        .route("/score/{date}", get(score))
        .route("/movers/{date}", get(movers))
        .route("/anomalies", get(anomalies))
}

fn envelope(data: Value, stale: bool, generated_at: Option<DateTime<Utc>>) -> Json<Value> {
    Json(json!({
        "data": data,
        "meta": {
            "timestamp": Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION"),
            "stale": stale,
            "generated_at": generated_at.map(|t| t.to_rfc3339()),
        }
    }))
}

fn error_response(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message })))
}

fn parse_date(raw: &str) -> Result<NaiveDate, (StatusCode, Json<Value>)> {
    raw.parse().map_err(|_| {
        error_response(
            StatusCode::BAD_REQUEST,
            &format!("invalid date (expected YYYY-MM-DD): {raw}"),
        )
    })
}

/// Cache a fresh result, or fall back to the cached copy (marked stale)
/// when the data source is unreachable.
async fn finish(state: &AppState, key: String, result: Result<Value, PipelineError>) -> ApiResult {
    match result {
        Ok(data) => {
            state.cache.write().await.insert(
                key,
                CachedReport {
                    data: data.clone(),
                    generated_at: Utc::now(),
                },
            );
            Ok(envelope(data, false, None))
        }
        Err(PipelineError::Source(SourceError::Unavailable(message))) => {
            if let Some(cached) = state.cache.read().await.get(&key).cloned() {
                warn!(%message, "data source unavailable, serving cached report");
                Ok(envelope(cached.data, true, Some(cached.generated_at)))
            } else {
                Err(error_response(StatusCode::SERVICE_UNAVAILABLE, &message))
            }
        }
        Err(e) => Err(error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &e.to_string(),
        )),
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

#[derive(Debug, Deserialize)]
struct MetricsQuery {
    stream: Option<String>,
    /// Sensitivity override for this request.
    k: Option<f64>,
}

async fn metrics(
    State(state): State<AppState>,
    Path(date): Path<String>,
    Query(query): Query<MetricsQuery>,
) -> ApiResult {
    let date = parse_date(&date)?;
    let stream = match query.stream.as_deref() {
        None | Some("transaction") => Stream::Transaction,
        Some("bio_auth") => Stream::BioAuth,
        Some(other) => {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                &format!("unknown stream: {other}"),
            ))
        }
    };

    let mut params = state.config.evaluation.params(date);
    if let Some(k) = query.k {
        params.sensitivity = k;
    }

    let key = format!("metrics:{date}:{stream}:{}", params.sensitivity);
    let result = pipeline::evaluate_stream(state.source.as_ref(), stream, &params)
        .await
        .and_then(|report| {
            serde_json::to_value(&report).map_err(|e| PipelineError::Task(e.to_string()))
        });
    finish(&state, key, result).await
}

async fn score(State(state): State<AppState>, Path(date): Path<String>) -> ApiResult {
    let date = parse_date(&date)?;
    let params = state.config.evaluation.params(date);

    let key = format!("score:{date}");
    let result = pipeline::evaluate_score(state.source.as_ref(), &params, &state.config.health)
        .await
        .and_then(|report| {
            serde_json::to_value(&report).map_err(|e| PipelineError::Task(e.to_string()))
        });
    finish(&state, key, result).await
}

async fn movers(State(state): State<AppState>, Path(date): Path<String>) -> ApiResult {
    let date = parse_date(&date)?;

    let key = format!("movers:{date}");
    let result = pipeline::evaluate_movers(
        state.source.as_ref(),
        date,
        state.config.ranking.alignment,
        &state.config.ranking.cutoffs,
    )
    .await
    .and_then(|report| {
        serde_json::to_value(&report).map_err(|e| PipelineError::Task(e.to_string()))
    });
    finish(&state, key, result).await
}

#[derive(Debug, Deserialize)]
struct AnomaliesQuery {
    limit: Option<usize>,
}

async fn anomalies(
    State(state): State<AppState>,
    Query(query): Query<AnomaliesQuery>,
) -> ApiResult {
    let limit = query.limit.unwrap_or(50);
    let source = state.source.clone();

    let records = tokio::task::spawn_blocking(move || source.recent_anomalies(limit))
        .await
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;

    let data = serde_json::to_value(&records)
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;
    Ok(envelope(data, false, None))
}
