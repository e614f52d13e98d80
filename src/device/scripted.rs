use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::device::{Device, DeviceError, RegisterWrite};
use crate::types::{Sample, WireMode};

/// One scripted device response.
#[derive(Clone, Debug)]
pub enum ScriptStep {
    Sample(Sample),
    /// A frame arrived but did not decode.
    Undecodable,
    /// The driver reported a malformed frame.
    Corrupt(String),
    /// Unrecoverable device failure.
    Fail(String),
    /// Simulates a crash inside the reader thread.
    Panic,
}

/// Calls observed by a scripted device, shared with the test that built it.
#[derive(Debug, Default)]
pub struct DeviceLog {
    pub writes: Vec<RegisterWrite>,
    pub mode: Option<WireMode>,
    pub started: bool,
    pub stopped: bool,
    pub reads: usize,
}

/// In-memory device for tests and deterministic playback.
pub struct ScriptedDevice {
    queue: VecDeque<ScriptStep>,
    log: Arc<Mutex<DeviceLog>>,
    pace: Option<Duration>,
}

impl ScriptedDevice {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            queue: steps.into_iter().collect(),
            log: Arc::new(Mutex::new(DeviceLog::default())),
            pace: None,
        }
    }

    pub fn from_samples(samples: impl IntoIterator<Item = Sample>) -> Self {
        Self::new(samples.into_iter().map(ScriptStep::Sample))
    }

    /// Sleep before every read, like a device clocking out frames.
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = Some(pace);
        self
    }

    pub fn log(&self) -> Arc<Mutex<DeviceLog>> {
        Arc::clone(&self.log)
    }

    fn record(&self, f: impl FnOnce(&mut DeviceLog)) {
        if let Ok(mut log) = self.log.lock() {
            f(&mut log);
        }
    }
}

impl Device for ScriptedDevice {
    fn configure(&mut self, writes: &[RegisterWrite]) -> Result<(), DeviceError> {
        self.record(|log| log.writes.extend_from_slice(writes));
        Ok(())
    }

    fn set_mode(&mut self, mode: WireMode) -> Result<(), DeviceError> {
        self.record(|log| log.mode = Some(mode));
        Ok(())
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        self.record(|log| log.started = true);
        Ok(())
    }

    fn read_next_sample(&mut self) -> Result<Option<Sample>, DeviceError> {
        if let Some(pace) = self.pace {
            thread::sleep(pace);
        }
        self.record(|log| log.reads += 1);
        match self.queue.pop_front() {
            Some(ScriptStep::Sample(sample)) => Ok(Some(sample)),
            Some(ScriptStep::Undecodable) => Ok(None),
            Some(ScriptStep::Corrupt(reason)) => Err(DeviceError::Decode(reason)),
            Some(ScriptStep::Fail(reason)) => Err(DeviceError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                reason,
            ))),
            Some(ScriptStep::Panic) => panic!("scripted reader crash"),
            None => Err(DeviceError::EndOfStream),
        }
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.record(|log| log.stopped = true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plays_back_then_ends() {
        let mut device = ScriptedDevice::new(vec![
            ScriptStep::Sample(Sample::ok(0, Some(0), vec![1, 2])),
            ScriptStep::Undecodable,
            ScriptStep::Corrupt("crc".into()),
        ]);
        assert!(device.read_next_sample().unwrap().is_some());
        assert!(device.read_next_sample().unwrap().is_none());
        assert!(matches!(device.read_next_sample(), Err(DeviceError::Decode(_))));
        assert!(matches!(device.read_next_sample(), Err(DeviceError::EndOfStream)));
        assert_eq!(device.log().lock().unwrap().reads, 4);
    }
}
