use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::{median, sample_std_dev};

/// Central tendency and dispersion of one metric field at one bucket
/// position, computed over a trailing historical window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub median: f64,
    pub std_dev: f64,
    pub samples: usize,
}

/// How the historical window is aligned to the evaluation date.
///
/// Volume has strong diurnal and weekly seasonality, so history is matched
/// to the same temporal position (same hour slot via the bucket key, and one
/// of these date axes), never to raw calendar date alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    /// The N calendar days ending the day before the evaluation date.
    TrailingDays(u32),
    /// Every prior date falling on the same weekday.
    SameWeekday,
    /// Every prior date falling on the same day of the month.
    SameDayOfMonth,
}

impl Alignment {
    /// Whether `candidate` participates in the history for `eval_date`.
    /// The evaluation date itself (and anything after it) never does.
    pub fn includes(&self, eval_date: NaiveDate, candidate: NaiveDate) -> bool {
        if candidate >= eval_date {
            return false;
        }
        match self {
            Alignment::TrailingDays(n) => {
                eval_date.signed_duration_since(candidate) <= Duration::days(i64::from(*n))
            }
            Alignment::SameWeekday => candidate.weekday() == eval_date.weekday(),
            Alignment::SameDayOfMonth => candidate.day() == eval_date.day(),
        }
    }

    /// How many calendar days of history must be fetched to cover this
    /// alignment. Weekday / day-of-month axes sample a longer span.
    pub fn span_days(&self) -> u32 {
        match self {
            Alignment::TrailingDays(n) => *n,
            Alignment::SameWeekday | Alignment::SameDayOfMonth => 90,
        }
    }
}

/// Estimate a baseline from an aligned historical sample.
///
/// Fewer than 2 samples yields `None` rather than a degenerate zero-stddev
/// baseline, so insufficient history can never manufacture anomalies.
pub fn estimate(history: &[f64]) -> Option<Baseline> {
    let std_dev = sample_std_dev(history)?;
    let median = median(history)?;
    Some(Baseline {
        median,
        std_dev,
        samples: history.len(),
    })
}

/// Collect the historical values of one slot's metric series for
/// `eval_date` under `alignment`. `series` maps observation date to the
/// metric value on that date; dates where the metric had no data (for
/// example a 0/0 rate) contribute nothing to the sample.
pub fn aligned_history(
    series: &BTreeMap<NaiveDate, Option<f64>>,
    eval_date: NaiveDate,
    alignment: Alignment,
) -> Vec<f64> {
    series
        .iter()
        .filter(|(date, _)| alignment.includes(eval_date, **date))
        .filter_map(|(_, value)| *value)
        .collect()
}
