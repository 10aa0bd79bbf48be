//! Composite health scoring across classified metric streams.

pub mod ranking;

use serde::{Deserialize, Serialize};

/// Discrete health status derived from the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Healthy,
    Watch,
    Critical,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Healthy => write!(f, "healthy"),
            Tier::Watch => write!(f, "watch"),
            Tier::Critical => write!(f, "critical"),
        }
    }
}

/// Score cut points for the tiers. Configuration, not constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    /// Scores at or above this are healthy.
    pub healthy: f64,
    /// Scores at or above this (but below `healthy`) are watch.
    pub watch: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            healthy: 90.0,
            watch: 75.0,
        }
    }
}

impl TierThresholds {
    pub fn tier(&self, score: f64) -> Tier {
        if score >= self.healthy {
            Tier::Healthy
        } else if score >= self.watch {
            Tier::Watch
        } else {
            Tier::Critical
        }
    }
}

/// One weighted input to the composite score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreInput {
    pub name: String,
    pub weight: f64,
    /// Current aggregated value in [0, 100], or `None` when the stream had
    /// no data.
    pub value: Option<f64>,
}

impl ScoreInput {
    pub fn new(name: impl Into<String>, weight: f64, value: Option<f64>) -> Self {
        Self {
            name: name.into(),
            weight,
            value,
        }
    }
}

/// The composed score and its tier.
#[derive(Debug, Clone, Serialize)]
pub struct HealthScore {
    pub score: Option<f64>,
    pub tier: Option<Tier>,
    /// True when at least one input was missing and the remaining weights
    /// were renormalized.
    pub partial: bool,
}

/// Compose a weighted health score in [0, 100].
///
/// Inputs with no value are excluded and the remaining weights
/// renormalized, so a missing stream can never drag the composite toward
/// zero. If every input is missing the score itself is no-data.
pub fn compose(inputs: &[ScoreInput], thresholds: &TierThresholds) -> HealthScore {
    let present: Vec<(f64, f64)> = inputs
        .iter()
        .filter_map(|input| input.value.map(|v| (input.weight, v.clamp(0.0, 100.0))))
        .collect();

    if present.is_empty() {
        return HealthScore {
            score: None,
            tier: None,
            partial: !inputs.is_empty(),
        };
    }

    let weight_sum: f64 = present.iter().map(|(w, _)| w).sum();
    let score = present.iter().map(|(w, v)| w * v).sum::<f64>() / weight_sum;

    HealthScore {
        score: Some(score),
        tier: Some(thresholds.tier(score)),
        partial: present.len() < inputs.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> TierThresholds {
        TierThresholds::default()
    }

    #[test]
    fn test_full_marks() {
        let inputs = [
            ScoreInput::new("transaction_success", 0.7, Some(100.0)),
            ScoreInput::new("bio_auth_success", 0.3, Some(100.0)),
        ];
        let health = compose(&inputs, &thresholds());
        assert_eq!(health.score, Some(100.0));
        assert_eq!(health.tier, Some(Tier::Healthy));
        assert!(!health.partial);
    }

    #[test]
    fn test_weighted_combination() {
        let inputs = [
            ScoreInput::new("transaction_success", 0.7, Some(80.0)),
            ScoreInput::new("bio_auth_success", 0.3, Some(100.0)),
        ];
        let health = compose(&inputs, &thresholds());
        let score = health.score.unwrap();
        assert!((score - 86.0).abs() < 1e-9);
        assert_eq!(health.tier, Some(Tier::Watch));
    }

    #[test]
    fn test_missing_input_renormalizes_instead_of_zeroing() {
        let inputs = [
            ScoreInput::new("transaction_success", 0.7, Some(96.0)),
            ScoreInput::new("bio_auth_success", 0.3, None),
        ];
        let health = compose(&inputs, &thresholds());
        // 0.7 * 96 / 0.7, not 0.7 * 96 + 0.3 * 0
        assert_eq!(health.score, Some(96.0));
        assert_eq!(health.tier, Some(Tier::Healthy));
        assert!(health.partial);
    }

    #[test]
    fn test_all_missing_is_no_data() {
        let inputs = [
            ScoreInput::new("transaction_success", 0.7, None),
            ScoreInput::new("bio_auth_success", 0.3, None),
        ];
        let health = compose(&inputs, &thresholds());
        assert_eq!(health.score, None);
        assert_eq!(health.tier, None);
        assert!(health.partial);
    }

    #[test]
    fn test_values_are_clamped_to_band() {
        let inputs = [ScoreInput::new("transaction_success", 1.0, Some(120.0))];
        let health = compose(&inputs, &thresholds());
        assert_eq!(health.score, Some(100.0));
    }

    #[test]
    fn test_custom_cut_points() {
        let tight = TierThresholds {
            healthy: 99.0,
            watch: 95.0,
        };
        assert_eq!(tight.tier(98.0), Tier::Watch);
        assert_eq!(tight.tier(94.9), Tier::Critical);
        assert_eq!(tight.tier(99.0), Tier::Healthy);
    }
}
