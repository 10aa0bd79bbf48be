//! Robust statistics shared by the baseline estimator and the classifier.

pub mod anomaly;
pub mod baseline;

/// Median by the nearest-rank upper-middle convention: `sorted[len / 2]`.
/// For odd counts this is the true middle element, for even counts the upper
/// of the two middle elements. Every baseline in the engine uses this same
/// definition.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    Some(sorted[sorted.len() / 2])
}

/// Sample standard deviation (n - 1 denominator). Historical windows are
/// samples of the process, not the full population. Returns `None` for
/// fewer than 2 values.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd_count() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
    }

    #[test]
    fn test_median_even_count_takes_upper_middle() {
        // sorted: [1, 2, 3, 4] -> index 2 -> 3
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(3.0));
    }

    #[test]
    fn test_median_empty() {
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_sample_std_dev() {
        // Variance of [2, 4, 4, 4, 5, 5, 7, 9] with n-1 is 32/7
        let sd = sample_std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((sd - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_sample_std_dev_needs_two_values() {
        assert_eq!(sample_std_dev(&[]), None);
        assert_eq!(sample_std_dev(&[5.0]), None);
    }

    #[test]
    fn test_sample_std_dev_constant_series_is_zero() {
        assert_eq!(sample_std_dev(&[7.0, 7.0, 7.0]), Some(0.0));
    }
}
