//! TOML configuration for the PayPulse engine.
//!
//! Layered configuration model with compiled-in defaults, environment
//! variable override for the config file path, and a standard filesystem
//! location.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::health::ranking::RankingConfig;
use crate::health::TierThresholds;
use crate::pipeline::bucket::Granularity;
use crate::pipeline::EvaluationParams;
use crate::stats::baseline::Alignment;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub evaluation: EvaluationConfig,
    pub health: HealthConfig,
    pub ranking: RankingSection,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config.warn_on_suspect_values();
        info!(path = %path.display(), "loaded engine configuration");
        Ok(config)
    }

    /// Try to load configuration from, in order:
    /// 1. The path specified by the `PAYPULSE_CONFIG` environment variable.
    /// 2. `/etc/paypulse/paypulse.toml`.
    /// 3. Fall back to compiled-in defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var("PAYPULSE_CONFIG") {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "PAYPULSE_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new("/etc/paypulse/paypulse.toml");
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    fn warn_on_suspect_values(&self) {
        let weight_sum: f64 = self.health.weights.values().sum();
        if (weight_sum - 1.0).abs() > 1e-6 {
            warn!(
                weight_sum,
                "health score weights do not sum to 1.0; scores will be renormalized"
            );
        }
        if self.evaluation.sensitivity <= 0.0 {
            warn!(
                sensitivity = self.evaluation.sensitivity,
                "non-positive sensitivity flags every bucket with history"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Bucketing, alignment, and sensitivity for evaluation runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub granularity: Granularity,
    /// Sensitivity multiplier k for the median ± k·σ anomaly band.
    pub sensitivity: f64,
    pub alignment: Alignment,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            granularity: Granularity::Hour,
            sensitivity: 1.0,
            alignment: Alignment::TrailingDays(7),
        }
    }
}

impl EvaluationConfig {
    pub fn params(&self, date: NaiveDate) -> EvaluationParams {
        EvaluationParams {
            date,
            granularity: self.granularity,
            sensitivity: self.sensitivity,
            alignment: self.alignment,
        }
    }
}

// ---------------------------------------------------------------------------
// Health score
// ---------------------------------------------------------------------------

/// Weight map and tier cut points for the composite health score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Named inputs and their weights. Weights should sum to 1.0.
    pub weights: BTreeMap<String, f64>,
    pub thresholds: TierThresholds,
}

impl Default for HealthConfig {
    fn default() -> Self {
        let mut weights = BTreeMap::new();
        weights.insert("transaction_success".to_string(), 0.7);
        weights.insert("bio_auth_success".to_string(), 0.3);
        Self {
            weights,
            thresholds: TierThresholds::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

/// Comparative ranker settings: cutoffs plus the comparison window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingSection {
    #[serde(flatten)]
    pub cutoffs: RankingConfig,
    pub alignment: Alignment,
}

impl Default for RankingSection {
    fn default() -> Self {
        Self {
            cutoffs: RankingConfig::default(),
            alignment: Alignment::TrailingDays(90),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = EngineConfig::default();

        assert_eq!(cfg.evaluation.granularity, Granularity::Hour);
        assert_eq!(cfg.evaluation.alignment, Alignment::TrailingDays(7));
        assert_eq!(cfg.evaluation.sensitivity, 1.0);

        assert_eq!(cfg.health.weights["transaction_success"], 0.7);
        assert_eq!(cfg.health.weights["bio_auth_success"], 0.3);
        assert_eq!(cfg.health.thresholds.healthy, 90.0);
        assert_eq!(cfg.health.thresholds.watch, 75.0);

        assert_eq!(cfg.ranking.cutoffs.floor, 1.0);
        assert_eq!(cfg.ranking.cutoffs.elevated, 1.1);
        assert_eq!(cfg.ranking.cutoffs.depressed, 0.9);
        assert_eq!(cfg.ranking.cutoffs.top_n, 5);
        assert_eq!(cfg.ranking.alignment, Alignment::TrailingDays(90));

        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_parse_example_toml() {
        let toml_str = r#"
[evaluation]
granularity = "day"
alignment = "same_weekday"
sensitivity = 1.5

[health]
thresholds = { healthy = 95.0, watch = 85.0 }

[health.weights]
transaction_success = 0.6
bio_auth_success = 0.4

[ranking]
floor = 2.5
elevated = 1.25
depressed = 0.8
top_n = 10
alignment = { trailing_days = 30 }

[logging]
level = "debug"
"#;

        let cfg: EngineConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(cfg.evaluation.granularity, Granularity::Day);
        assert_eq!(cfg.evaluation.alignment, Alignment::SameWeekday);
        assert_eq!(cfg.evaluation.sensitivity, 1.5);
        assert_eq!(cfg.health.weights["transaction_success"], 0.6);
        assert_eq!(cfg.health.thresholds.healthy, 95.0);
        assert_eq!(cfg.ranking.cutoffs.floor, 2.5);
        assert_eq!(cfg.ranking.cutoffs.top_n, 10);
        assert_eq!(cfg.ranking.alignment, Alignment::TrailingDays(30));
        assert_eq!(cfg.logging.level, "debug");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
[evaluation]
sensitivity = 2.0
"#;

        let cfg: EngineConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(cfg.evaluation.sensitivity, 2.0);
        assert_eq!(cfg.evaluation.granularity, Granularity::Hour);
        assert_eq!(cfg.health.weights["transaction_success"], 0.7);
        assert_eq!(cfg.ranking.cutoffs.top_n, 5);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let cfg: EngineConfig = toml::from_str("").unwrap();
        let defaults = EngineConfig::default();

        assert_eq!(cfg.evaluation.sensitivity, defaults.evaluation.sensitivity);
        assert_eq!(cfg.health.weights, defaults.health.weights);
        assert_eq!(cfg.ranking.cutoffs.floor, defaults.ranking.cutoffs.floor);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("paypulse.toml");
        std::fs::write(
            &path,
            r#"
[evaluation]
sensitivity = 2.5
"#,
        )
        .unwrap();

        let cfg = EngineConfig::load(&path).unwrap();
        assert_eq!(cfg.evaluation.sensitivity, 2.5);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let result = EngineConfig::load(Path::new("/nonexistent/path/paypulse.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let cfg = EngineConfig::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let roundtripped: EngineConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(cfg.evaluation.sensitivity, roundtripped.evaluation.sensitivity);
        assert_eq!(cfg.health.weights, roundtripped.health.weights);
        assert_eq!(cfg.ranking.alignment, roundtripped.ranking.alignment);
    }

    #[test]
    fn test_params_carry_config_into_a_run() {
        let cfg = EngineConfig::default();
        let date = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        let params = cfg.evaluation.params(date);
        assert_eq!(params.date, date);
        assert_eq!(params.sensitivity, 1.0);
        assert_eq!(params.alignment, Alignment::TrailingDays(7));
    }
}
