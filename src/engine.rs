// src/engine.rs
// 采集线程：阻塞读取设备，把有效样本推入队列
use std::any::Any;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};

use crate::acquisition::QueueProducer;
use crate::device::{Device, DeviceError};

/// Cooperative cancellation flag shared by reader and session.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
pub struct ReaderCounters {
    /// Samples forwarded to the queue.
    pub forwarded: AtomicU64,
    /// Frames that failed to decode or carried a non-OK status.
    pub dropped: AtomicU64,
    pub timeouts: AtomicU64,
}

impl ReaderCounters {
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ReaderExit {
    Stopped,
    EndOfStream,
    /// The queue's consumer was dropped.
    ConsumerGone,
}

#[derive(Debug)]
pub enum ReaderFault {
    Device(DeviceError),
    Panicked(String),
}

impl fmt::Display for ReaderFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReaderFault::Device(e) => write!(f, "device failure: {e}"),
            ReaderFault::Panicked(msg) => write!(f, "reader panicked: {msg}"),
        }
    }
}

/// Reader loop. The stop signal is checked between blocking reads only.
pub fn run<D: Device + ?Sized>(
    device: &mut D,
    queue: &QueueProducer,
    stop: &StopSignal,
    counters: &ReaderCounters,
) -> Result<ReaderExit, DeviceError> {
    while !stop.is_raised() {
        match device.read_next_sample() {
            Ok(Some(sample)) if sample.is_usable() => {
                if !queue.push(sample) {
                    return Ok(ReaderExit::ConsumerGone);
                }
                counters.forwarded.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Some(sample)) => {
                debug!("dropping frame with status {:?}", sample.status);
                counters.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Ok(None) => {
                counters.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(DeviceError::Timeout) => {
                counters.timeouts.fetch_add(1, Ordering::Relaxed);
            }
            Err(DeviceError::EndOfStream) => return Ok(ReaderExit::EndOfStream),
            Err(e) if e.is_recoverable() => {
                debug!("{e}");
                counters.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(ReaderExit::Stopped)
}

pub struct ReaderHandle {
    join: JoinHandle<Result<ReaderExit, DeviceError>>,
    counters: Arc<ReaderCounters>,
}

impl ReaderHandle {
    pub fn counters(&self) -> Arc<ReaderCounters> {
        Arc::clone(&self.counters)
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub fn join(self) -> Result<ReaderExit, ReaderFault> {
        match self.join.join() {
            Ok(Ok(exit)) => Ok(exit),
            Ok(Err(e)) => Err(ReaderFault::Device(e)),
            Err(payload) => Err(ReaderFault::Panicked(panic_message(payload))),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

/// Moves the device onto its own OS thread. The device is stopped when the
/// loop exits normally; the queue producer is dropped either way.
pub fn spawn_reader<D: Device + 'static>(
    mut device: D,
    queue: QueueProducer,
    stop: StopSignal,
) -> io::Result<ReaderHandle> {
    let counters = Arc::new(ReaderCounters::default());
    let thread_counters = Arc::clone(&counters);
    let join = thread::Builder::new()
        .name("acq-reader".to_owned())
        .spawn(move || {
            info!("reader started");
            let result = run(&mut device, &queue, &stop, &thread_counters);
            match &result {
                Ok(exit) => info!(
                    "reader exited ({exit:?}): {} forwarded, {} dropped",
                    thread_counters.forwarded(),
                    thread_counters.dropped()
                ),
                Err(e) => error!("reader failed: {e}"),
            }
            if let Err(e) = device.stop() {
                warn!("device stop failed: {e}");
            }
            result
        })?;
    Ok(ReaderHandle { join, counters })
}
