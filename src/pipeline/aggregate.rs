use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;

use crate::event::{RawEvent, SuccessRule};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetricError {
    #[error("division undefined: {numer}/{denom}")]
    DivisionUndefined { numer: u64, denom: u64 },
}

/// Rate as a percentage, or `None` when there is no data.
///
/// 0/0 is "no data", never 0 or NaN. A non-zero numerator over a zero
/// denominator is a hard error: it means the counts disagree and must not
/// be silently coerced to 0 or 100 downstream.
pub fn safe_rate(numer: u64, denom: u64) -> Result<Option<f64>, MetricError> {
    match (numer, denom) {
        (0, 0) => Ok(None),
        (n, 0) => Err(MetricError::DivisionUndefined { numer: n, denom: 0 }),
        (n, d) => Ok(Some(n as f64 / d as f64 * 100.0)),
    }
}

/// Success/total tallies for one dimension slice of a bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SliceCounts {
    pub total: u64,
    pub success: u64,
}

impl SliceCounts {
    pub fn success_rate(&self) -> Result<Option<f64>, MetricError> {
        safe_rate(self.success, self.total)
    }
}

/// Summary metrics for one bucket's events.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BucketMetric {
    pub total: u64,
    pub success: u64,
    /// Amount summed over successful events only.
    pub success_amount: f64,
    /// Number of distinct clients seen ("affected users" -- a different
    /// quantity from the event count).
    pub distinct_clients: u64,
    /// Number of distinct clients with at least one successful event.
    pub distinct_success_clients: u64,
    /// Per-aggregator slices. Events with no aggregator value are counted
    /// in the overall tallies but in no slice.
    pub by_aggregator: BTreeMap<String, SliceCounts>,
}

impl BucketMetric {
    /// Overall success rate in [0, 100], or `None` for an empty bucket.
    pub fn success_rate(&self) -> Result<Option<f64>, MetricError> {
        safe_rate(self.success, self.total)
    }

    /// Success rate restricted to one aggregator's slice. `None` when the
    /// aggregator was not seen in this bucket.
    pub fn aggregator_rate(&self, aggregator: &str) -> Result<Option<f64>, MetricError> {
        match self.by_aggregator.get(aggregator) {
            Some(slice) => slice.success_rate(),
            None => Ok(None),
        }
    }

    /// Successful attempts per distinct successful client. Gauges retry
    /// load on the authentication stream.
    pub fn per_client_rate(&self) -> Result<Option<f64>, MetricError> {
        match (self.success, self.distinct_success_clients) {
            (0, 0) => Ok(None),
            (n, 0) => Err(MetricError::DivisionUndefined { numer: n, denom: 0 }),
            (n, d) => Ok(Some(n as f64 / d as f64)),
        }
    }
}

/// Reduce one bucket's events into summary metrics under the caller's
/// success rule.
pub fn aggregate(events: &[RawEvent], rule: &SuccessRule) -> BucketMetric {
    let mut metric = BucketMetric::default();
    let mut clients: BTreeSet<&str> = BTreeSet::new();
    let mut success_clients: BTreeSet<&str> = BTreeSet::new();

    for event in events {
        metric.total += 1;
        let succeeded = rule.matches(event);
        if succeeded {
            metric.success += 1;
            if let Some(amount) = event.amount {
                metric.success_amount += amount;
            }
        }
        if let Some(client) = event.client_id.as_deref() {
            clients.insert(client);
            if succeeded {
                success_clients.insert(client);
            }
        }
        if let Some(aggregator) = event.aggregator.as_deref() {
            let slice = metric
                .by_aggregator
                .entry(aggregator.to_string())
                .or_default();
            slice.total += 1;
            if succeeded {
                slice.success += 1;
            }
        }
    }

    metric.distinct_clients = clients.len() as u64;
    metric.distinct_success_clients = success_clients.len() as u64;
    metric
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Stream;
    use chrono::Utc;

    fn tx(aggregator: Option<&str>, message: &str, amount: f64, client: &str) -> RawEvent {
        RawEvent {
            timestamp: Utc::now(),
            request_id: format!("{client}-{message}-{amount}"),
            client_id: Some(client.to_string()),
            aggregator: aggregator.map(str::to_string),
            state: None,
            trans_type: Some("CW".to_string()),
            amount: Some(amount),
            response_code: None,
            response_message: Some(message.to_string()),
        }
    }

    #[test]
    fn test_safe_rate_zero_over_zero_is_no_data() {
        assert_eq!(safe_rate(0, 0), Ok(None));
    }

    #[test]
    fn test_safe_rate_nonzero_over_zero_is_an_error() {
        assert_eq!(
            safe_rate(3, 0),
            Err(MetricError::DivisionUndefined { numer: 3, denom: 0 })
        );
    }

    #[test]
    fn test_empty_bucket_has_no_rate() {
        let metric = aggregate(&[], &SuccessRule::for_stream(Stream::Transaction));
        assert_eq!(metric.total, 0);
        assert_eq!(metric.success_rate(), Ok(None));
    }

    #[test]
    fn test_mixed_bucket_scenario() {
        // success/YBL/100, fail/YBL/50, success/NSDL/200
        let events = vec![
            tx(Some("YBL"), "SUCCESS", 100.0, "c1"),
            tx(Some("YBL"), "FAILED", 50.0, "c2"),
            tx(Some("NSDL"), "success", 200.0, "c3"),
        ];
        let metric = aggregate(&events, &SuccessRule::for_stream(Stream::Transaction));

        assert_eq!(metric.total, 3);
        assert_eq!(metric.success, 2);
        let rate = metric.success_rate().unwrap().unwrap();
        assert!((rate - 66.666_666).abs() < 1e-3);
        assert_eq!(metric.aggregator_rate("YBL").unwrap(), Some(50.0));
        assert_eq!(metric.aggregator_rate("NSDL").unwrap(), Some(100.0));
        // Amounts only from successes
        assert_eq!(metric.success_amount, 300.0);
    }

    #[test]
    fn test_missing_aggregator_counts_overall_but_not_in_slices() {
        let mut orphan = tx(None, "success", 10.0, "c9");
        orphan.aggregator = None;
        let events = vec![orphan, tx(Some("YBL"), "success", 20.0, "c1")];
        let metric = aggregate(&events, &SuccessRule::for_stream(Stream::Transaction));

        assert_eq!(metric.total, 2);
        let sliced: u64 = metric.by_aggregator.values().map(|s| s.total).sum();
        assert_eq!(sliced, 1);
    }

    #[test]
    fn test_distinct_clients_differ_from_event_counts() {
        let events = vec![
            tx(Some("YBL"), "success", 10.0, "c1"),
            tx(Some("YBL"), "success", 10.0, "c1"),
            tx(Some("YBL"), "failed", 10.0, "c2"),
        ];
        let metric = aggregate(&events, &SuccessRule::for_stream(Stream::Transaction));

        assert_eq!(metric.total, 3);
        assert_eq!(metric.distinct_clients, 2);
        assert_eq!(metric.distinct_success_clients, 1);
        assert_eq!(metric.per_client_rate().unwrap(), Some(2.0));
    }

    #[test]
    fn test_unknown_aggregator_rate_is_no_data() {
        let events = vec![tx(Some("YBL"), "success", 10.0, "c1")];
        let metric = aggregate(&events, &SuccessRule::for_stream(Stream::Transaction));
        assert_eq!(metric.aggregator_rate("NSDL"), Ok(None));
    }
}
