use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::event::{Dimension, RawEvent};

/// Width of the time buckets events are grouped into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Hour,
    Day,
}

/// The within-day position of a bucket. Two buckets on different dates with
/// the same slot are aligned for historical comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Day,
    Hour(u8),
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::Day => write!(f, "day"),
            Slot::Hour(h) => write!(f, "{h:02}:00"),
        }
    }
}

impl std::str::FromStr for Slot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "day" {
            return Ok(Slot::Day);
        }
        let hour = s
            .strip_suffix(":00")
            .and_then(|h| h.parse::<u8>().ok())
            .filter(|h| *h < 24)
            .ok_or_else(|| format!("invalid slot: {s}"))?;
        Ok(Slot::Hour(hour))
    }
}

/// One fixed-width time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BucketKey {
    pub date: NaiveDate,
    pub slot: Slot,
}

impl BucketKey {
    pub fn for_timestamp(timestamp: DateTime<Utc>, granularity: Granularity) -> Self {
        let slot = match granularity {
            Granularity::Hour => Slot::Hour(timestamp.hour() as u8),
            Granularity::Day => Slot::Day,
        };
        Self {
            date: timestamp.date_naive(),
            slot,
        }
    }
}

/// Group events into fixed-width time buckets.
///
/// Events with a timestamp outside `[start, end)` are dropped; the drop
/// total is logged once in aggregate, not per event.
pub fn bucketize(
    events: Vec<RawEvent>,
    granularity: Granularity,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> BTreeMap<BucketKey, Vec<RawEvent>> {
    let mut buckets: BTreeMap<BucketKey, Vec<RawEvent>> = BTreeMap::new();
    let mut dropped = 0usize;
    for event in events {
        if event.timestamp < start || event.timestamp >= end {
            dropped += 1;
            continue;
        }
        buckets
            .entry(BucketKey::for_timestamp(event.timestamp, granularity))
            .or_default()
            .push(event);
    }
    if dropped > 0 {
        debug!(dropped, "dropped events outside requested window");
    }
    buckets
}

/// Group events by one categorical dimension value.
///
/// Events missing the dimension are excluded from this grouping but remain
/// in the time buckets: overall totals and per-dimension totals are
/// independently meaningful and must not be conflated.
pub fn group_by_dimension(
    events: &[RawEvent],
    dimension: Dimension,
) -> BTreeMap<String, Vec<RawEvent>> {
    let mut groups: BTreeMap<String, Vec<RawEvent>> = BTreeMap::new();
    for event in events {
        if let Some(value) = event.dimension(dimension) {
            groups.entry(value.to_string()).or_default().push(event.clone());
        }
    }
    groups
}
