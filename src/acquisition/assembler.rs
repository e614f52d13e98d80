use log::debug;

use crate::acquisition::buffer::{Row, SampleMatrix};
use crate::acquisition::integrity::{Admission, IntegrityMonitor, SequenceTracker};
use crate::acquisition::queue::{Pop, QueueConsumer};
use crate::acquisition::PipelineWarning;

/// Outcome of one drain cycle.
#[derive(Debug, Default)]
pub struct DrainReport {
    pub popped: usize,
    pub appended: usize,
    /// Rows whose width did not match the matrix.
    pub malformed: usize,
    /// Device sample numbers skipped during this drain.
    pub sequence_gaps: u64,
    pub warnings: Vec<PipelineWarning>,
    /// The reader hung up and the queue is empty.
    pub closed: bool,
    /// Bounded mode reached its row limit.
    pub limit_reached: bool,
}

/// Moves queued samples into the matrix through the integrity monitor.
pub struct Assembler {
    row_limit: Option<u64>,
    sequence: SequenceTracker,
}

impl Assembler {
    pub fn bounded(max_samples: u64) -> Self {
        Self {
            row_limit: Some(max_samples),
            sequence: SequenceTracker::new(),
        }
    }

    pub fn continuous() -> Self {
        Self {
            row_limit: None,
            sequence: SequenceTracker::new(),
        }
    }

    /// Sample numbers skipped since the session started.
    pub fn sequence_gaps(&self) -> u64 {
        self.sequence.gaps()
    }

    pub fn row_limit(&self) -> Option<u64> {
        self.row_limit
    }

    pub fn is_complete(&self, matrix: &SampleMatrix) -> bool {
        self.row_limit
            .is_some_and(|limit| matrix.total_rows() >= limit)
    }

    /// Pops what is queued right now without blocking. Samples that arrive
    /// while draining wait for the next tick.
    pub fn drain(
        &mut self,
        queue: &QueueConsumer,
        matrix: &mut SampleMatrix,
        monitor: &mut IntegrityMonitor,
    ) -> DrainReport {
        let mut report = DrainReport::default();
        let available = queue.backlog();
        while report.popped < available.max(1) {
            if self.is_complete(matrix) {
                report.limit_reached = true;
                break;
            }
            let sample = match queue.try_pop() {
                Pop::Item(sample) => sample,
                Pop::Empty => break,
                Pop::Closed => {
                    report.closed = true;
                    break;
                }
            };
            report.popped += 1;
            report.sequence_gaps += self.sequence.observe(sample.sequence_id);
            if sample.channel_data.len() != matrix.channel_count() {
                debug!(
                    "skipping frame with {} channels (expected {})",
                    sample.channel_data.len(),
                    matrix.channel_count()
                );
                report.malformed += 1;
                continue;
            }
            let row_index = matrix.total_rows();
            let admission = monitor.admit(Row {
                timestamp: sample.timestamp,
                values: sample.channel_data,
            });
            if let Some(delta) = admission.suppressed_delta() {
                report
                    .warnings
                    .push(PipelineWarning::IntegritySuppressed { row: row_index, delta });
            }
            if let Admission::Accepted(row) | Admission::Substituted { row, .. } = admission {
                // Width was checked above, so this cannot fail.
                if matrix.push_row(row.timestamp, &row.values).is_ok() {
                    report.appended += 1;
                }
            }
        }
        if self.is_complete(matrix) {
            report.limit_reached = true;
        }
        report
    }
}
