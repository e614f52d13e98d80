/// Estimates the sampling rate in samples per second from µs timestamps.
///
/// The first and last timestamps of the window are skipped so a partially
/// filled edge does not skew the mean. Needs at least two interior points.
pub fn estimate(timestamps: &[i64]) -> Option<f64> {
    if timestamps.len() < 3 {
        return None;
    }
    let interior = &timestamps[1..timestamps.len() - 1];
    if interior.len() < 2 {
        return None;
    }
    let total: i64 = interior.windows(2).map(|w| w[1] - w[0]).sum();
    let mean_delta = total as f64 / (interior.len() - 1) as f64;
    if mean_delta <= 0.0 {
        return None;
    }
    Some(1_000_000.0 / mean_delta)
}

/// Rate estimate over the last `window` rows of a timestamp column.
pub struct RateEstimator {
    window: usize,
}

impl RateEstimator {
    pub fn new(window: usize) -> Self {
        Self {
            // 四个点才有两个内部点
            window: window.max(4),
        }
    }

    pub fn estimate_tail<'a, I>(&self, timestamps: I) -> Option<f64>
    where
        I: IntoIterator<Item = &'a i64>,
        I::IntoIter: ExactSizeIterator,
    {
        let iter = timestamps.into_iter();
        let skip = iter.len().saturating_sub(self.window);
        let tail: Vec<i64> = iter.skip(skip).copied().collect();
        estimate(&tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[test]
    fn ten_samples_at_two_ms_is_500_sps() {
        let timestamps: Vec<i64> = (0..10).map(|i| i * 2000).collect();
        let rate = estimate(&timestamps).unwrap();
        assert!((rate - 500.0).abs() < 1e-9);
    }

    #[test]
    fn too_few_points_are_unavailable() {
        assert_eq!(estimate(&[]), None);
        assert_eq!(estimate(&[0, 2000]), None);
        assert_eq!(estimate(&[0, 2000, 4000]), None);
        assert!(estimate(&[0, 2000, 4000, 6000]).is_some());
    }

    #[test]
    fn edges_are_ignored() {
        // A late first and last frame do not move the estimate.
        let timestamps = [0, 50_000, 52_000, 54_000, 56_000, 200_000];
        let rate = estimate(&timestamps).unwrap();
        assert!((rate - 500.0).abs() < 1e-9);
    }

    #[test]
    fn duplicated_timestamps_give_no_rate() {
        assert_eq!(estimate(&[5, 5, 5, 5]), None);
    }

    #[test]
    fn tiny_window_still_yields_a_rate() {
        let column: Vec<i64> = (0..10).map(|i| i * 2000).collect();
        for window in [0, 3, 4] {
            let rate = RateEstimator::new(window).estimate_tail(&column).unwrap();
            assert!((rate - 500.0).abs() < 1e-9, "window {window}");
        }
    }

    #[test]
    fn tail_window_uses_latest_rows() {
        let mut column: VecDeque<i64> = (0..100).map(|i| i * 1000).collect();
        column.extend((0..20).map(|i| 100_000 + i * 4000));
        let estimator = RateEstimator::new(10);
        let rate = estimator.estimate_tail(&column).unwrap();
        assert!((rate - 250.0).abs() < 1e-9);
    }
}
