// src/types.rs
use serde::{Deserialize, Serialize};

// 设备状态码 (200 = Ok)
pub const STATUS_OK: u16 = 200;

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Status {
    Ok,
    Error(u16),
}

impl Status {
    pub fn from_code(code: u16) -> Self {
        if code == STATUS_OK {
            Status::Ok
        } else {
            Status::Error(code)
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }
}

/// One decoded device reading.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    /// Device timestamp in microseconds.
    pub timestamp: i64,
    pub sequence_id: Option<u32>,
    pub status: Status,
    pub channel_data: Vec<i32>,
}

impl Sample {
    pub fn ok(timestamp: i64, sequence_id: Option<u32>, channel_data: Vec<i32>) -> Self {
        Self {
            timestamp,
            sequence_id,
            status: Status::Ok,
            channel_data,
        }
    }

    /// Only OK readings with channel data are forwarded downstream.
    pub fn is_usable(&self) -> bool {
        self.status.is_ok() && !self.channel_data.is_empty()
    }
}

// 设备输出格式
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireMode {
    #[default]
    LineDelimited,
    CompactBinary,
}

// 会话状态机
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum SessionState {
    Idle,
    Configuring,
    Streaming,
    Paused,
    Stopped,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Configuring)
                | (Configuring, Streaming)
                | (Configuring, Stopped)
                | (Streaming, Paused)
                | (Paused, Streaming)
                | (Streaming, Stopped)
                | (Paused, Stopped)
                | (Stopped, Idle)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_mapping() {
        assert_eq!(Status::from_code(200), Status::Ok);
        assert_eq!(Status::from_code(500), Status::Error(500));
    }

    #[test]
    fn empty_or_failed_samples_are_not_usable() {
        assert!(Sample::ok(0, None, vec![1]).is_usable());
        assert!(!Sample::ok(0, None, vec![]).is_usable());
        let mut failed = Sample::ok(0, None, vec![1]);
        failed.status = Status::Error(400);
        assert!(!failed.is_usable());
    }

    #[test]
    fn pause_only_from_streaming() {
        assert!(SessionState::Streaming.can_transition_to(SessionState::Paused));
        assert!(!SessionState::Configuring.can_transition_to(SessionState::Paused));
        assert!(!SessionState::Stopped.can_transition_to(SessionState::Streaming));
    }
}
