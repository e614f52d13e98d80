use std::collections::VecDeque;

use crate::acquisition::AcquisitionError;

/// One assembled row: timestamp plus one value per channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    pub timestamp: i64,
    pub values: Vec<i32>,
}

/// Column store for assembled rows: timestamps plus one column per channel.
///
/// Rows are appended at the tail and trimmed from the head. Every column has
/// the same length after each public call returns.
pub struct SampleMatrix {
    timestamps: VecDeque<i64>,
    channels: Vec<VecDeque<i32>>, // channel -> samples
    evicted: u64,
}

impl SampleMatrix {
    pub fn new(channel_count: usize) -> Self {
        Self::with_capacity(channel_count, 0)
    }

    pub fn with_capacity(channel_count: usize, rows: usize) -> Self {
        Self {
            timestamps: VecDeque::with_capacity(rows),
            channels: (0..channel_count)
                .map(|_| VecDeque::with_capacity(rows))
                .collect(),
            evicted: 0,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Rows trimmed from the head so far.
    pub fn evicted_rows(&self) -> u64 {
        self.evicted
    }

    /// Rows ever appended, retained or not.
    pub fn total_rows(&self) -> u64 {
        self.evicted + self.len() as u64
    }

    pub fn timestamps(&self) -> &VecDeque<i64> {
        &self.timestamps
    }

    pub fn channel(&self, index: usize) -> Option<&VecDeque<i32>> {
        self.channels.get(index)
    }

    pub fn row(&self, index: usize) -> Option<Row> {
        let timestamp = *self.timestamps.get(index)?;
        let values = self.channels.iter().map(|c| c[index]).collect();
        Some(Row { timestamp, values })
    }

    pub fn push_row(&mut self, timestamp: i64, values: &[i32]) -> Result<(), AcquisitionError> {
        if values.len() != self.channels.len() {
            return Err(AcquisitionError::ChannelMismatch {
                expected: self.channels.len(),
                actual: values.len(),
            });
        }
        self.timestamps.push_back(timestamp);
        for (column, &value) in self.channels.iter_mut().zip(values) {
            column.push_back(value);
        }
        Ok(())
    }

    pub fn columns_aligned(&self) -> bool {
        self.channels.iter().all(|c| c.len() == self.timestamps.len())
    }

    /// Iterates retained rows in order, oldest first.
    pub fn rows(&self) -> impl Iterator<Item = Row> + '_ {
        (0..self.len()).filter_map(move |i| self.row(i))
    }

    /// Removes the first `k` rows from every column. Callers go through the
    /// evictor, which checks the filter watermark first.
    pub(crate) fn trim_front(&mut self, k: usize) {
        let k = k.min(self.len());
        self.timestamps.drain(..k);
        for column in &mut self.channels {
            column.drain(..k);
        }
        self.evicted += k as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_rows_of_wrong_width() {
        let mut matrix = SampleMatrix::new(3);
        assert!(matrix.push_row(0, &[1, 2, 3]).is_ok());
        assert!(matches!(
            matrix.push_row(1, &[1, 2]),
            Err(AcquisitionError::ChannelMismatch { expected: 3, actual: 2 })
        ));
        assert_eq!(matrix.len(), 1);
        assert!(matrix.columns_aligned());
    }

    #[test]
    fn trim_front_keeps_tail_and_counts() {
        let mut matrix = SampleMatrix::new(2);
        for i in 0..6 {
            matrix.push_row(i * 10, &[i as i32, -(i as i32)]).unwrap();
        }
        matrix.trim_front(4);
        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix.evicted_rows(), 4);
        assert_eq!(matrix.total_rows(), 6);
        assert_eq!(
            matrix.row(0),
            Some(Row {
                timestamp: 40,
                values: vec![4, -4]
            })
        );
        assert!(matrix.columns_aligned());
    }
}
