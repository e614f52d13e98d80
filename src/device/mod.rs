// src/device/mod.rs
// 设备驱动层：只负责产出已解码的样本
pub mod registers;
pub mod scripted;
pub mod serial;
pub mod simulated;

use thiserror::Error;

use crate::types::{Sample, WireMode};

pub use registers::{RegisterPlan, RegisterWrite};
pub use scripted::{DeviceLog, ScriptStep, ScriptedDevice};
pub use serial::SerialDevice;
pub use simulated::SimulatedDevice;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("cannot connect to {port}: {reason}")]
    Connection { port: String, reason: String },
    #[error("malformed frame: {0}")]
    Decode(String),
    #[error("read timed out")]
    Timeout,
    #[error("end of stream")]
    EndOfStream,
    #[error("{0:?} mode is not supported by this device")]
    UnsupportedMode(WireMode),
    #[error("device rejected `{command}` with status {status}")]
    Rejected { command: String, status: u16 },
    #[error("device i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeviceError {
    /// Errors the reader counts and skips instead of terminating.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DeviceError::Decode(_) | DeviceError::Timeout)
    }
}

/// Driver contract consumed by the acquisition pipeline.
///
/// `read_next_sample` blocks until a frame arrives, the device's own read
/// timeout expires (`DeviceError::Timeout`), or the stream ends. `Ok(None)`
/// means a frame arrived but could not be decoded.
pub trait Device: Send {
    fn configure(&mut self, writes: &[RegisterWrite]) -> Result<(), DeviceError>;
    fn set_mode(&mut self, mode: WireMode) -> Result<(), DeviceError>;
    fn start(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }
    fn read_next_sample(&mut self) -> Result<Option<Sample>, DeviceError>;
    fn stop(&mut self) -> Result<(), DeviceError>;
}

impl<D: Device + ?Sized> Device for Box<D> {
    fn configure(&mut self, writes: &[RegisterWrite]) -> Result<(), DeviceError> {
        (**self).configure(writes)
    }
    fn set_mode(&mut self, mode: WireMode) -> Result<(), DeviceError> {
        (**self).set_mode(mode)
    }
    fn start(&mut self) -> Result<(), DeviceError> {
        (**self).start()
    }
    fn read_next_sample(&mut self) -> Result<Option<Sample>, DeviceError> {
        (**self).read_next_sample()
    }
    fn stop(&mut self) -> Result<(), DeviceError> {
        (**self).stop()
    }
}
