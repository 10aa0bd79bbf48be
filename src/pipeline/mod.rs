//! The evaluation pipeline: bucketize → aggregate → estimate baselines →
//! classify. All computation is pure per bucket key, so aggregation and
//! baseline estimation fan out across keys; the historical window is
//! fetched once and shared read-only.

pub mod aggregate;
pub mod bucket;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::HealthConfig;
use crate::event::{Dimension, Stream, SuccessRule};
use crate::health::ranking::{rank_movers, RankEntry, RankingConfig};
use crate::health::{compose, ScoreInput};
use crate::report::{AnomalyRecord, MetricRow, MoversReport, ScoreReport, StreamReport};
use crate::source::{DataSource, EventQuery, SourceError};
use crate::stats::anomaly::classify;
use crate::stats::baseline::{aligned_history, estimate, Alignment};
use aggregate::{BucketMetric, MetricError};
use bucket::{BucketKey, Granularity, Slot};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Metric(#[from] MetricError),
    #[error("worker task failed: {0}")]
    Task(String),
}

/// Parameters for one evaluation run.
#[derive(Debug, Clone)]
pub struct EvaluationParams {
    pub date: NaiveDate,
    pub granularity: Granularity,
    /// Sensitivity multiplier k for the median ± k·σ band.
    pub sensitivity: f64,
    pub alignment: Alignment,
}

impl EvaluationParams {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            granularity: Granularity::Hour,
            sensitivity: 1.0,
            alignment: Alignment::TrailingDays(7),
        }
    }
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Aggregate every bucket concurrently. Results land in a BTreeMap so the
/// output order is independent of task completion order.
async fn aggregate_buckets(
    buckets: BTreeMap<BucketKey, Vec<crate::event::RawEvent>>,
    rule: SuccessRule,
) -> Result<BTreeMap<BucketKey, BucketMetric>, PipelineError> {
    let mut set = tokio::task::JoinSet::new();
    for (key, events) in buckets {
        let rule = rule.clone();
        set.spawn_blocking(move || (key, aggregate::aggregate(&events, &rule)));
    }

    let mut metrics = BTreeMap::new();
    while let Some(joined) = set.join_next().await {
        let (key, metric) = joined.map_err(|e| PipelineError::Task(e.to_string()))?;
        metrics.insert(key, metric);
    }
    Ok(metrics)
}

/// Baseline + classification for one slot. Pure: everything it needs is in
/// its arguments.
fn evaluate_slot(
    slot: Slot,
    current: Option<BucketMetric>,
    history: &BTreeMap<BucketKey, BucketMetric>,
    params: &EvaluationParams,
) -> Result<MetricRow, PipelineError> {
    let mut rate_series: BTreeMap<NaiveDate, Option<f64>> = BTreeMap::new();
    let mut amount_series: BTreeMap<NaiveDate, Option<f64>> = BTreeMap::new();
    for (key, metric) in history.iter().filter(|(key, _)| key.slot == slot) {
        rate_series.insert(key.date, metric.success_rate()?);
        amount_series.insert(
            key.date,
            (metric.total > 0).then_some(metric.success_amount),
        );
    }

    let rate_baseline = estimate(&aligned_history(&rate_series, params.date, params.alignment));
    let amount_baseline = estimate(&aligned_history(
        &amount_series,
        params.date,
        params.alignment,
    ));

    let metric = current.unwrap_or_default();
    let success_rate = metric.success_rate()?;
    let per_client_rate = metric.per_client_rate()?;
    let aggregator_rates = metric
        .by_aggregator
        .iter()
        .map(|(name, slice)| Ok((name.clone(), slice.success_rate()?)))
        .collect::<Result<BTreeMap<_, _>, MetricError>>()?;
    let current_amount = (metric.total > 0).then_some(metric.success_amount);

    Ok(MetricRow {
        date: params.date,
        slot,
        total: metric.total,
        success: metric.success,
        success_rate,
        success_amount: metric.success_amount,
        distinct_clients: metric.distinct_clients,
        per_client_rate,
        aggregator_rates,
        rate_median: rate_baseline.map(|b| b.median),
        rate_std_dev: rate_baseline.map(|b| b.std_dev),
        rate_flag: classify(success_rate, rate_baseline, params.sensitivity),
        amount_median: amount_baseline.map(|b| b.median),
        amount_std_dev: amount_baseline.map(|b| b.std_dev),
        amount_flag: classify(current_amount, amount_baseline, params.sensitivity),
    })
}

fn collect_anomalies(stream: Stream, rows: &[MetricRow]) -> Vec<AnomalyRecord> {
    let mut records = Vec::new();
    for row in rows {
        if row.rate_flag.is_anomalous() {
            records.push(AnomalyRecord {
                id: Uuid::new_v4(),
                date: row.date,
                stream,
                field: "success_rate".to_string(),
                slot: row.slot,
                value: row.success_rate,
                median: row.rate_median.unwrap_or_default(),
                std_dev: row.rate_std_dev.unwrap_or_default(),
                flag: row.rate_flag,
            });
        }
        if row.amount_flag.is_anomalous() {
            records.push(AnomalyRecord {
                id: Uuid::new_v4(),
                date: row.date,
                stream,
                field: "success_amount".to_string(),
                slot: row.slot,
                value: (row.total > 0).then_some(row.success_amount),
                median: row.amount_median.unwrap_or_default(),
                std_dev: row.amount_std_dev.unwrap_or_default(),
                flag: row.amount_flag,
            });
        }
    }
    records
}

/// Evaluate one stream for one date: time-bucketed metrics, aligned
/// baselines and anomaly flags, ordered by slot.
///
/// Slots that appear only in history still get a row (with no-data flags),
/// mirroring the full outer join the reporting layer expects.
pub async fn evaluate_stream(
    source: &dyn DataSource,
    stream: Stream,
    params: &EvaluationParams,
) -> Result<StreamReport, PipelineError> {
    let rule = SuccessRule::for_stream(stream);
    let start = day_start(params.date);
    let end = day_start(params.date + Duration::days(1));
    let history_start = day_start(params.date - Duration::days(i64::from(params.alignment.span_days())));

    // One fetch per window; the history fans out read-only afterwards.
    let current_query = EventQuery::window(stream, start, end);
    let history_query = EventQuery::window(stream, history_start, start);
    let (current_events, history_events) = tokio::try_join!(
        source.fetch(&current_query),
        source.fetch(&history_query),
    )?;
    info!(
        %stream,
        date = %params.date,
        current = current_events.len(),
        history = history_events.len(),
        "evaluating stream"
    );

    let current_buckets = bucket::bucketize(current_events, params.granularity, start, end);
    let history_buckets =
        bucket::bucketize(history_events, params.granularity, history_start, start);

    let current_metrics = aggregate_buckets(current_buckets, rule.clone()).await?;
    let history_metrics = Arc::new(aggregate_buckets(history_buckets, rule).await?);

    // Union of slots seen today and slots seen in history.
    let slots: BTreeSet<Slot> = current_metrics
        .keys()
        .chain(history_metrics.keys())
        .map(|key| key.slot)
        .collect();

    let mut set = tokio::task::JoinSet::new();
    for slot in slots {
        let current = current_metrics
            .get(&BucketKey {
                date: params.date,
                slot,
            })
            .cloned();
        let history = Arc::clone(&history_metrics);
        let params = params.clone();
        set.spawn_blocking(move || evaluate_slot(slot, current, &history, &params));
    }

    let mut by_slot = BTreeMap::new();
    while let Some(joined) = set.join_next().await {
        let row = joined.map_err(|e| PipelineError::Task(e.to_string()))??;
        by_slot.insert(row.slot, row);
    }

    let rows: Vec<MetricRow> = by_slot.into_values().collect();
    let anomalies = collect_anomalies(stream, &rows);
    Ok(StreamReport {
        stream,
        date: params.date,
        rows,
        anomalies,
        generated_at: Utc::now(),
    })
}

fn mean_rate(rows: &[MetricRow]) -> Option<f64> {
    let rates: Vec<f64> = rows.iter().filter_map(|row| row.success_rate).collect();
    if rates.is_empty() {
        None
    } else {
        Some(rates.iter().sum::<f64>() / rates.len() as f64)
    }
}

/// Compose the weighted health score for one date from both streams'
/// hourly success rates.
pub async fn evaluate_score(
    source: &dyn DataSource,
    params: &EvaluationParams,
    health: &HealthConfig,
) -> Result<ScoreReport, PipelineError> {
    let (transactions, bio_auth) = futures::future::try_join(
        evaluate_stream(source, Stream::Transaction, params),
        evaluate_stream(source, Stream::BioAuth, params),
    )
    .await?;

    let transaction_avg = mean_rate(&transactions.rows);
    let bio_avg = mean_rate(&bio_auth.rows);

    let inputs: Vec<ScoreInput> = health
        .weights
        .iter()
        .filter_map(|(name, weight)| match name.as_str() {
            "transaction_success" => Some(ScoreInput::new(name, *weight, transaction_avg)),
            "bio_auth_success" => Some(ScoreInput::new(name, *weight, bio_avg)),
            other => {
                warn!(input = other, "unknown health score input, skipping");
                None
            }
        })
        .collect();

    let composed = compose(&inputs, &health.thresholds);
    Ok(ScoreReport {
        date: params.date,
        inputs,
        score: composed.score,
        tier: composed.tier,
        partial: composed.partial,
        generated_at: Utc::now(),
    })
}

/// Rank state instances by the ratio of the evaluation date's settled
/// amount to its aligned historical median.
pub async fn evaluate_movers(
    source: &dyn DataSource,
    date: NaiveDate,
    alignment: Alignment,
    config: &RankingConfig,
) -> Result<MoversReport, PipelineError> {
    let rule = SuccessRule::for_stream(Stream::Transaction);
    let start = day_start(date);
    let end = day_start(date + Duration::days(1));
    let history_start = day_start(date - Duration::days(i64::from(alignment.span_days())));

    let current_query = EventQuery::window(Stream::Transaction, start, end);
    let history_query = EventQuery::window(Stream::Transaction, history_start, start);
    let (current_events, history_events) = tokio::try_join!(
        source.fetch(&current_query),
        source.fetch(&history_query),
    )?;

    let current_by_state = bucket::group_by_dimension(&current_events, Dimension::State);
    let mut history_by_state = bucket::group_by_dimension(&history_events, Dimension::State);

    let mut set = tokio::task::JoinSet::new();
    for (state, events) in current_by_state {
        let history = history_by_state.remove(&state).unwrap_or_default();
        let rule = rule.clone();
        set.spawn_blocking(move || {
            let metric = aggregate::aggregate(&events, &rule);
            let daily = bucket::bucketize(history, Granularity::Day, history_start, start);
            let series: BTreeMap<NaiveDate, Option<f64>> = daily
                .iter()
                .map(|(key, day_events)| {
                    let day_metric = aggregate::aggregate(day_events, &rule);
                    (key.date, (day_metric.total > 0).then_some(day_metric.success_amount))
                })
                .collect();
            let median =
                estimate(&aligned_history(&series, date, alignment)).map(|b| b.median);
            RankEntry {
                instance: state,
                current: metric.success_amount,
                median,
            }
        });
    }

    let mut entries = BTreeMap::new();
    while let Some(joined) = set.join_next().await {
        let entry = joined.map_err(|e| PipelineError::Task(e.to_string()))?;
        entries.insert(entry.instance.clone(), entry);
    }

    let entries: Vec<RankEntry> = entries.into_values().collect();
    let movers = rank_movers(&entries, config);
    Ok(MoversReport {
        date,
        dimension: "state".to_string(),
        movers,
        generated_at: Utc::now(),
    })
}
