//! Corrupt-frame suppression applied while rows are assembled.
//!
//! A frame whose last channel jumps by more than the threshold relative to the
//! previously appended row is treated as corrupt. The monitor keeps its own
//! copy of that row, so trimming the matrix never removes the reference.
use crate::acquisition::buffer::Row;
use crate::config::{IntegrityConfig, SuppressionPolicy};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Admission {
    Accepted(Row),
    /// Corrupt frame replaced by a copy of the previous row.
    Substituted { row: Row, delta: i64 },
    /// Corrupt frame discarded.
    Dropped { delta: i64 },
}

impl Admission {
    pub fn row(&self) -> Option<&Row> {
        match self {
            Admission::Accepted(row) | Admission::Substituted { row, .. } => Some(row),
            Admission::Dropped { .. } => None,
        }
    }

    pub fn suppressed_delta(&self) -> Option<i64> {
        match self {
            Admission::Accepted(_) => None,
            Admission::Substituted { delta, .. } | Admission::Dropped { delta } => Some(*delta),
        }
    }
}

pub struct IntegrityMonitor {
    threshold: i64,
    policy: SuppressionPolicy,
    last: Option<Row>,
    dropped: u64,
}

impl IntegrityMonitor {
    pub fn new(config: &IntegrityConfig) -> Self {
        Self {
            threshold: config.threshold,
            policy: config.policy,
            last: None,
            dropped: 0,
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }

    pub fn admit(&mut self, row: Row) -> Admission {
        let Some(previous) = &self.last else {
            self.last = Some(row.clone());
            return Admission::Accepted(row);
        };
        let delta = match (row.values.last(), previous.values.last()) {
            (Some(&new), Some(&old)) => new as i64 - old as i64,
            _ => 0,
        };
        if delta.abs() <= self.threshold {
            self.last = Some(row.clone());
            return Admission::Accepted(row);
        }
        self.dropped += 1;
        match self.policy {
            SuppressionPolicy::DuplicatePrevious => Admission::Substituted {
                row: previous.clone(),
                delta,
            },
            SuppressionPolicy::Drop => Admission::Dropped { delta },
        }
    }
}

/// Counts device sample numbers that never reached the consumer.
///
/// A number at or below the previous one is taken as a counter reset and only
/// moves the reference. Samples without a number are ignored.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    last: Option<u32>,
    gaps: u64,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gaps(&self) -> u64 {
        self.gaps
    }

    /// Returns how many numbers were skipped before `sequence_id`.
    pub fn observe(&mut self, sequence_id: Option<u32>) -> u64 {
        let Some(id) = sequence_id else {
            return 0;
        };
        let skipped = match self.last {
            Some(last) if id > last => u64::from(id - last - 1),
            _ => 0,
        };
        self.last = Some(id);
        self.gaps += skipped;
        skipped
    }
}
