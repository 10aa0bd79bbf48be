//! Read-only result shapes handed to the Presentation Layer.
//!
//! All three surfaces (per-bucket metrics with flags, the composite health
//! score, and the gainer/decliner lists) serialize to flat rows of named
//! fields for display or export.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::event::Stream;
use crate::health::{ranking::Movers, ScoreInput, Tier};
use crate::pipeline::bucket::Slot;
use crate::stats::anomaly::AnomalyFlag;

/// One bucket's metrics with baselines and anomaly flags. Baselines are
/// flattened into scalar columns so a row exports as-is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRow {
    pub date: NaiveDate,
    pub slot: Slot,
    pub total: u64,
    pub success: u64,
    pub success_rate: Option<f64>,
    pub success_amount: f64,
    pub distinct_clients: u64,
    pub per_client_rate: Option<f64>,
    pub aggregator_rates: BTreeMap<String, Option<f64>>,
    pub rate_median: Option<f64>,
    pub rate_std_dev: Option<f64>,
    pub rate_flag: AnomalyFlag,
    pub amount_median: Option<f64>,
    pub amount_std_dev: Option<f64>,
    pub amount_flag: AnomalyFlag,
}

/// The full evaluation of one stream for one date.
#[derive(Debug, Clone, Serialize)]
pub struct StreamReport {
    pub stream: Stream,
    pub date: NaiveDate,
    pub rows: Vec<MetricRow>,
    pub anomalies: Vec<AnomalyRecord>,
    pub generated_at: DateTime<Utc>,
}

/// A flagged deviation, persisted to the anomaly log. Derived data only:
/// always recomputable from metrics + baseline + sensitivity.
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyRecord {
    pub id: Uuid,
    pub date: NaiveDate,
    pub stream: Stream,
    /// Which metric field deviated, e.g. `success_rate`.
    pub field: String,
    pub slot: Slot,
    pub value: Option<f64>,
    pub median: f64,
    pub std_dev: f64,
    pub flag: AnomalyFlag,
}

/// The composite health score for one date.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreReport {
    pub date: NaiveDate,
    pub inputs: Vec<ScoreInput>,
    pub score: Option<f64>,
    pub tier: Option<Tier>,
    pub partial: bool,
    pub generated_at: DateTime<Utc>,
}

/// Gainers and decliners for one comparison window.
#[derive(Debug, Clone, Serialize)]
pub struct MoversReport {
    pub date: NaiveDate,
    pub dimension: String,
    pub movers: Movers,
    pub generated_at: DateTime<Utc>,
}
