use thiserror::Error;

use crate::device::DeviceError;
use crate::session::SessionSummary;
use crate::types::SessionState;

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("invalid {field}: {value} (allowed: {allowed})")]
    Configuration {
        field: &'static str,
        value: String,
        allowed: String,
    },
    #[error("channel count mismatch: expected {expected}, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },
    #[error("invalid filter coefficients: {0}")]
    Coefficients(String),
    #[error("eviction of {requested} rows exceeds safe watermark {watermark}")]
    EvictionBeyondWatermark { requested: usize, watermark: usize },
    #[error("illegal session transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },
    #[error("reader terminated: {reason} ({summary})")]
    StreamingFault {
        reason: String,
        summary: SessionSummary,
    },
    #[error("device error: {0}")]
    Device(#[from] DeviceError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AcquisitionError {
    pub fn configuration(
        field: &'static str,
        value: impl ToString,
        allowed: impl ToString,
    ) -> Self {
        AcquisitionError::Configuration {
            field,
            value: value.to_string(),
            allowed: allowed.to_string(),
        }
    }
}

/// Soft failures surfaced per tick; never fatal.
#[derive(Clone, Debug, PartialEq)]
pub enum PipelineWarning {
    IntegritySuppressed { row: u64, delta: i64 },
    Backlog { queued: usize, threshold: usize },
}
