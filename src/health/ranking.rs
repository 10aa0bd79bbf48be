use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// One dimension instance eligible for ranking: its current value and the
/// historical median for the same position.
#[derive(Debug, Clone, Serialize)]
pub struct RankEntry {
    pub instance: String,
    pub current: f64,
    /// Historical median, `None` when there was not enough history.
    pub median: Option<f64>,
}

/// A ranked instance with its current-to-median ratio.
#[derive(Debug, Clone, Serialize)]
pub struct Mover {
    pub instance: String,
    pub current: f64,
    pub median: f64,
    pub ratio: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Movers {
    /// Ratio above the elevated cutoff, descending by ratio.
    pub gainers: Vec<Mover>,
    /// Ratio below the depressed cutoff, ascending by ratio.
    pub decliners: Vec<Mover>,
}

/// Cutoffs and materiality floor for the ranker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Instances whose current value does not exceed this floor are not
    /// ranked, to keep near-zero-volume noise out of the lists.
    pub floor: f64,
    pub elevated: f64,
    pub depressed: f64,
    pub top_n: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            floor: 1.0,
            elevated: 1.1,
            depressed: 0.9,
            top_n: 5,
        }
    }
}

fn by_ratio_desc(a: &Mover, b: &Mover) -> Ordering {
    b.ratio
        .partial_cmp(&a.ratio)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.current.partial_cmp(&a.current).unwrap_or(Ordering::Equal))
}

fn by_ratio_asc(a: &Mover, b: &Mover) -> Ordering {
    a.ratio
        .partial_cmp(&b.ratio)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.current.partial_cmp(&a.current).unwrap_or(Ordering::Equal))
}

/// Rank dimension instances by the ratio of current value to historical
/// median. Instances below the materiality floor, without a usable median,
/// or inside the [depressed, elevated] band appear in neither list. Ties
/// break by absolute current value, descending.
pub fn rank_movers(entries: &[RankEntry], config: &RankingConfig) -> Movers {
    let mut movers = Movers::default();

    for entry in entries {
        if entry.current <= config.floor {
            continue;
        }
        let Some(median) = entry.median.filter(|m| *m > 0.0) else {
            continue;
        };
        let ratio = entry.current / median;
        let mover = Mover {
            instance: entry.instance.clone(),
            current: entry.current,
            median,
            ratio,
        };
        if ratio > config.elevated {
            movers.gainers.push(mover);
        } else if ratio < config.depressed {
            movers.decliners.push(mover);
        }
    }

    movers.gainers.sort_by(by_ratio_desc);
    movers.decliners.sort_by(by_ratio_asc);
    movers.gainers.truncate(config.top_n);
    movers.decliners.truncate(config.top_n);
    movers
}
