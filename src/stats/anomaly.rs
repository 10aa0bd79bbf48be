use serde::{Deserialize, Serialize};

use super::baseline::Baseline;

/// Classification of a current value against its baseline band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyFlag {
    Normal,
    Upper,
    Lower,
    NoData,
}

impl AnomalyFlag {
    pub fn is_anomalous(&self) -> bool {
        matches!(self, AnomalyFlag::Upper | AnomalyFlag::Lower)
    }
}

impl std::fmt::Display for AnomalyFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnomalyFlag::Normal => write!(f, "normal"),
            AnomalyFlag::Upper => write!(f, "upper anomaly"),
            AnomalyFlag::Lower => write!(f, "lower anomaly"),
            AnomalyFlag::NoData => write!(f, "no data"),
        }
    }
}

/// Classify `current` against `baseline` with sensitivity multiplier `k`.
///
/// The band is `median ± k·σ` with the raw sample stddev. This is not a
/// z-test (σ is not divided by √n): k tunes operational alerting
/// sensitivity, it does not test a hypothesis. Fractional k is supported.
///
/// A pure function of its inputs: re-evaluating with the same arguments
/// always yields the same flag.
pub fn classify(current: Option<f64>, baseline: Option<Baseline>, k: f64) -> AnomalyFlag {
    let (Some(current), Some(baseline)) = (current, baseline) else {
        return AnomalyFlag::NoData;
    };
    if current < baseline.median - k * baseline.std_dev {
        AnomalyFlag::Lower
    } else if current > baseline.median + k * baseline.std_dev {
        AnomalyFlag::Upper
    } else {
        AnomalyFlag::Normal
    }
}
