use std::sync::{Arc, Mutex};

use ndarray::Array2;

use crate::acquisition::buffer::SampleMatrix;
use crate::acquisition::filter::OnlineFilter;

/// Owned copy of the newest rows, safe to hand to a renderer.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    /// Absolute index of the first row in this snapshot.
    pub first_row: u64,
    pub timestamps: Vec<i64>,
    pub channels: Vec<Vec<i32>>, // channel -> samples
    /// 0-based channel index of each filtered column.
    pub filtered_channels: Vec<usize>,
    pub filtered: Vec<Vec<f64>>,
    pub rate_sps: Option<f64>,
}

impl Snapshot {
    /// Copies the last `max_rows` rows (all rows when `None`).
    pub fn capture(
        matrix: &SampleMatrix,
        filter: &OnlineFilter,
        rate_sps: Option<f64>,
        max_rows: Option<usize>,
    ) -> Self {
        let take = max_rows.unwrap_or(usize::MAX).min(matrix.len());
        let skip = matrix.len() - take;
        let timestamps = matrix.timestamps().iter().skip(skip).copied().collect();
        let channels = (0..matrix.channel_count())
            .filter_map(|c| matrix.channel(c))
            .map(|column| column.iter().skip(skip).copied().collect())
            .collect();
        let filtered_channels = filter.channels();
        let filtered = (0..filtered_channels.len())
            .filter_map(|i| filter.filtered(i))
            .map(|column| {
                let skip = column.len().saturating_sub(take);
                column.iter().skip(skip).copied().collect()
            })
            .collect();
        Self {
            first_row: matrix.evicted_rows() + skip as u64,
            timestamps,
            channels,
            filtered_channels,
            filtered,
            rate_sps,
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        match (self.timestamps.first(), self.timestamps.last()) {
            (Some(first), Some(last)) => (last - first) as f64 / 1_000_000.0,
            _ => 0.0,
        }
    }

    /// Raw channels as a `channels x samples` matrix.
    pub fn raw_array(&self) -> Array2<f64> {
        let rows = self.channels.len();
        let cols = self.len();
        Array2::from_shape_fn((rows, cols), |(c, i)| self.channels[c][i] as f64)
    }

    /// Filtered channels as a `channels x samples` matrix.
    pub fn filtered_array(&self) -> Array2<f64> {
        let rows = self.filtered.len();
        let cols = self.filtered.iter().map(Vec::len).min().unwrap_or(0);
        Array2::from_shape_fn((rows, cols), |(c, i)| self.filtered[c][i])
    }
}

/// Latest published snapshot, shared with whoever renders it.
#[derive(Clone, Default)]
pub struct SnapshotHandle {
    latest: Arc<Mutex<Option<Arc<Snapshot>>>>,
}

impl SnapshotHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: Snapshot) {
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Some(Arc::new(snapshot));
        }
    }

    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.latest.lock().ok().and_then(|latest| latest.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::design::Coefficients;

    #[test]
    fn capture_copies_the_tail() {
        let mut matrix = SampleMatrix::new(3);
        for i in 0..20 {
            matrix.push_row(i * 2000, &[i as i32, 1, 2]).unwrap();
        }
        let mut filter = OnlineFilter::new(Coefficients::passthrough(), &[0, 2]);
        filter.run(&matrix);
        let snapshot = Snapshot::capture(&matrix, &filter, Some(500.0), Some(5));
        assert_eq!(snapshot.first_row, 15);
        assert_eq!(snapshot.timestamps, vec![30_000, 32_000, 34_000, 36_000, 38_000]);
        assert_eq!(snapshot.channels[0], vec![15, 16, 17, 18, 19]);
        assert_eq!(snapshot.filtered_channels, vec![0, 2]);
        assert_eq!(snapshot.filtered_array().dim(), (2, 5));
        assert_eq!(snapshot.raw_array()[[0, 4]], 19.0);
        assert!((snapshot.duration_seconds() - 0.008).abs() < 1e-12);
    }

    #[test]
    fn published_snapshot_is_isolated_from_later_changes() {
        let handle = SnapshotHandle::new();
        assert!(handle.latest().is_none());
        let mut matrix = SampleMatrix::new(1);
        matrix.push_row(0, &[1]).unwrap();
        let filter = OnlineFilter::new(Coefficients::passthrough(), &[0]);
        handle.publish(Snapshot::capture(&matrix, &filter, None, None));
        matrix.push_row(1, &[2]).unwrap();
        let seen = handle.clone().latest().unwrap();
        assert_eq!(seen.len(), 1);
    }
}
