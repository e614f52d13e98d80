// src/session.rs
// 会话：持有矩阵、滤波器、读线程句柄，由 tick 驱动
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::acquisition::{
    evict_excess, sample_queue, AcquisitionError, Assembler, Butterworth, FilterDesigner,
    IntegrityMonitor, OnlineFilter, PipelineWarning, QueueConsumer, RateEstimator, Row,
    SampleMatrix, Snapshot, SnapshotHandle,
};
use crate::config::Config;
use crate::device::{Device, RegisterPlan};
use crate::engine::{spawn_reader, ReaderCounters, ReaderFault, ReaderHandle, StopSignal};
use crate::recorder::DataRecorder;
use crate::types::SessionState;

/// Statistics reported when a session stops, normally or not.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionSummary {
    pub duration: Duration,
    /// Rows per wall-clock second on the host.
    pub achieved_rate: Option<f64>,
    /// Estimated from device timestamps of the retained rows.
    pub estimated_rate: Option<f64>,
    pub samples_read: u64,
    pub decode_drops: u64,
    pub integrity_drops: u64,
    /// Device sample numbers that never arrived.
    pub sequence_gaps: u64,
    /// Rows appended over the whole session, evicted ones included.
    pub rows: u64,
    pub peak_backlog: usize,
}

/// `rows / seconds`, or `None` for an empty interval.
fn rows_per_second(rows: u64, elapsed: Duration) -> Option<f64> {
    let seconds = elapsed.as_secs_f64();
    (seconds > 0.0).then(|| rows as f64 / seconds)
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} rows in {:.2}s", self.rows, self.duration.as_secs_f64())?;
        match self.achieved_rate {
            Some(rate) => write!(f, " at {rate:.1} sps")?,
            None => write!(f, ", rate unavailable")?,
        }
        match self.estimated_rate {
            Some(rate) => write!(f, " (device clock {rate:.1} sps)")?,
            None => write!(f, " (device clock n/a)")?,
        }
        write!(
            f,
            "; {} read, {} decode drops, {} integrity drops, {} sequence gaps, peak backlog {}",
            self.samples_read,
            self.decode_drops,
            self.integrity_drops,
            self.sequence_gaps,
            self.peak_backlog
        )
    }
}

/// What one tick did.
#[derive(Debug, Default)]
pub struct TickReport {
    pub appended: usize,
    pub malformed: usize,
    pub sequence_gaps: u64,
    pub evicted: usize,
    pub watermark: usize,
    /// Queue length observed at the start of the tick.
    pub backlog: usize,
    pub warnings: Vec<PipelineWarning>,
    /// Bounded limit reached, or the reader ended and the queue is empty.
    pub complete: bool,
}

pub struct Session {
    config: Config,
    state: SessionState,
    matrix: SampleMatrix,
    monitor: IntegrityMonitor,
    assembler: Assembler,
    filter: OnlineFilter,
    rate: RateEstimator,
    queue: QueueConsumer,
    reader: Option<ReaderHandle>,
    counters: Arc<ReaderCounters>,
    stop: StopSignal,
    recorder: Option<DataRecorder>,
    snapshots: SnapshotHandle,
    started: Instant,
    last_publish: Option<Instant>,
    peak_backlog: usize,
}

impl Session {
    /// Starts a session with the Butterworth designer.
    pub fn start<D: Device + 'static>(config: Config, device: D) -> Result<Self, AcquisitionError> {
        Self::start_with_designer(config, device, &Butterworth)
    }

    /// Validates `config`, programs the device and spawns the reader. Nothing
    /// is sent to the device unless validation and filter design succeed.
    pub fn start_with_designer<D: Device + 'static>(
        config: Config,
        mut device: D,
        designer: &dyn FilterDesigner,
    ) -> Result<Self, AcquisitionError> {
        let mut state = SessionState::Idle;
        transition(&mut state, SessionState::Configuring)?;

        config.validate()?;
        let filter = OnlineFilter::from_config(&config, designer)?;
        let plan = RegisterPlan::from_config(&config).ok_or_else(|| {
            AcquisitionError::configuration(
                "register plan",
                format!("{} channels", config.channel_count),
                "a config accepted by validate()",
            )
        })?;
        let recorder = match &config.recording_path {
            Some(path) => Some(DataRecorder::create(path)?),
            None => None,
        };

        if let Err(e) = program(&mut device, &plan, &config) {
            if let Err(stop_err) = device.stop() {
                warn!("device stop after failed setup: {stop_err}");
            }
            return Err(e);
        }

        let (producer, queue) = sample_queue();
        let stop = StopSignal::new();
        let reader = spawn_reader(device, producer, stop.clone())?;
        let counters = reader.counters();
        transition(&mut state, SessionState::Streaming)?;
        info!(
            "streaming {} channels at {} sps, gain {}",
            config.channel_count, config.sample_rate, config.gain
        );

        let assembler = if config.acquisition.continuous {
            Assembler::continuous()
        } else {
            Assembler::bounded(config.acquisition.max_samples)
        };
        let capacity = config
            .acquisition
            .retain_rows
            .unwrap_or(config.acquisition.max_samples as usize)
            .min(1 << 20);
        Ok(Self {
            state,
            matrix: SampleMatrix::with_capacity(config.channel_count, capacity),
            monitor: IntegrityMonitor::new(&config.integrity),
            assembler,
            filter,
            rate: RateEstimator::new(config.acquisition.rate_window),
            queue,
            reader: Some(reader),
            counters,
            stop,
            recorder,
            snapshots: SnapshotHandle::new(),
            started: Instant::now(),
            last_publish: None,
            peak_backlog: 0,
            config,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn matrix(&self) -> &SampleMatrix {
        &self.matrix
    }

    pub fn filter(&self) -> &OnlineFilter {
        &self.filter
    }

    pub fn integrity_drops(&self) -> u64 {
        self.monitor.dropped_count()
    }

    pub fn peak_backlog(&self) -> usize {
        self.peak_backlog
    }

    /// Raising this signal makes `run` return after the current tick.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn snapshots(&self) -> SnapshotHandle {
        self.snapshots.clone()
    }

    /// Rate estimate over the newest `rate_window` rows.
    pub fn rate(&self) -> Option<f64> {
        self.rate.estimate_tail(self.matrix.timestamps())
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(
            &self.matrix,
            &self.filter,
            self.rate(),
            self.config.acquisition.retain_rows,
        )
    }

    pub fn pause(&mut self) -> Result<(), AcquisitionError> {
        transition(&mut self.state, SessionState::Paused)
    }

    pub fn resume(&mut self) -> Result<(), AcquisitionError> {
        transition(&mut self.state, SessionState::Streaming)
    }

    /// One consumer cycle: drain, filter, evict, publish. While paused only
    /// the backlog is observed. A dead reader stops the session and yields
    /// `StreamingFault`.
    pub fn tick(&mut self) -> Result<TickReport, AcquisitionError> {
        if self.state == SessionState::Stopped {
            return Err(AcquisitionError::InvalidTransition {
                from: SessionState::Stopped,
                to: SessionState::Streaming,
            });
        }
        let mut report = TickReport {
            backlog: self.queue.backlog(),
            ..TickReport::default()
        };
        self.peak_backlog = self.peak_backlog.max(report.backlog);
        let threshold = self.config.acquisition.backlog_warning;
        if report.backlog > threshold {
            warn!("queue backlog {} exceeds {threshold}", report.backlog);
            report.warnings.push(PipelineWarning::Backlog {
                queued: report.backlog,
                threshold,
            });
        }

        let mut queue_closed = false;
        if self.state == SessionState::Streaming {
            let drain = self
                .assembler
                .drain(&self.queue, &mut self.matrix, &mut self.monitor);
            log_suppressed(&drain.warnings);
            report.appended = drain.appended;
            report.malformed = drain.malformed;
            report.sequence_gaps = drain.sequence_gaps;
            report.warnings.extend(drain.warnings);
            report.watermark = self.filter.run(&self.matrix);
            if let Some(retain) = self.config.acquisition.retain_rows {
                let evicted = evict_excess(&mut self.matrix, &mut self.filter, retain)?;
                report.evicted = evicted.len();
                self.record(&evicted)?;
            }
            self.publish_if_due();
            queue_closed = drain.closed;
            report.complete = drain.limit_reached || drain.closed;
        }

        // A closed queue means the reader dropped its producer and is exiting.
        let reader_done = queue_closed || self.reader.as_ref().is_some_and(ReaderHandle::is_finished);
        if reader_done {
            if let Some(reader) = self.reader.take() {
                if let Err(fault) = reader.join() {
                    error!("{fault}");
                    let (summary, _) = self.shutdown()?;
                    return Err(AcquisitionError::StreamingFault {
                        reason: fault.to_string(),
                        summary,
                    });
                }
            }
        }
        Ok(report)
    }

    /// Ticks until the session completes or the stop signal is raised.
    pub fn run(&mut self) -> Result<(), AcquisitionError> {
        let interval = Duration::from_millis(self.config.acquisition.tick_interval_ms);
        loop {
            let report = self.tick()?;
            if report.complete || self.stop.is_raised() {
                return Ok(());
            }
            thread::sleep(interval);
        }
    }

    /// Stops the reader, assembles whatever is still queued, flushes the
    /// recorder and reports the session statistics.
    pub fn stop(mut self) -> Result<SessionSummary, AcquisitionError> {
        let (summary, fault) = self.shutdown()?;
        info!("session stopped: {summary}");
        match fault {
            Some(fault) => Err(AcquisitionError::StreamingFault {
                reason: fault.to_string(),
                summary,
            }),
            None => Ok(summary),
        }
    }

    fn shutdown(&mut self) -> Result<(SessionSummary, Option<ReaderFault>), AcquisitionError> {
        self.stop.raise();
        let mut fault = None;
        if let Some(reader) = self.reader.take() {
            match reader.join() {
                Ok(exit) => debug!("reader joined: {exit:?}"),
                Err(e) => {
                    error!("{e}");
                    fault = Some(e);
                }
            }
        }
        if self.state != SessionState::Stopped {
            self.drain_remaining();
            self.state = SessionState::Stopped;
            self.snapshots.publish(self.snapshot());
        }
        if let Some(mut recorder) = self.recorder.take() {
            let rows: Vec<Row> = self.matrix.rows().collect();
            recorder.write_rows(&rows)?;
            recorder.finish()?;
        }
        Ok((self.summary(), fault))
    }

    /// Producer is gone by now, so this terminates on `closed`.
    fn drain_remaining(&mut self) {
        loop {
            let drain = self
                .assembler
                .drain(&self.queue, &mut self.matrix, &mut self.monitor);
            log_suppressed(&drain.warnings);
            if drain.closed || drain.limit_reached || drain.popped == 0 {
                break;
            }
        }
        self.filter.run(&self.matrix);
        let discarded = self.queue.discard();
        if discarded > 0 {
            debug!("discarded {discarded} samples past the row limit");
        }
    }

    fn summary(&self) -> SessionSummary {
        let duration = self.started.elapsed();
        let rows = self.matrix.total_rows();
        SessionSummary {
            duration,
            achieved_rate: rows_per_second(rows, duration),
            estimated_rate: self.rate(),
            samples_read: self.counters.forwarded(),
            decode_drops: self.counters.dropped(),
            integrity_drops: self.monitor.dropped_count(),
            sequence_gaps: self.assembler.sequence_gaps(),
            rows,
            peak_backlog: self.peak_backlog,
        }
    }

    fn record(&mut self, rows: &[Row]) -> Result<(), AcquisitionError> {
        if let Some(recorder) = &mut self.recorder {
            recorder.write_rows(rows)?;
        }
        Ok(())
    }

    fn publish_if_due(&mut self) {
        let refresh = Duration::from_millis(self.config.acquisition.refresh_interval_ms);
        let due = self.last_publish.map_or(true, |at| at.elapsed() >= refresh);
        if due {
            self.snapshots.publish(self.snapshot());
            self.last_publish = Some(Instant::now());
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // 未调用 stop 时也让读线程退出
        self.stop.raise();
    }
}

fn transition(state: &mut SessionState, next: SessionState) -> Result<(), AcquisitionError> {
    if !state.can_transition_to(next) {
        return Err(AcquisitionError::InvalidTransition {
            from: *state,
            to: next,
        });
    }
    debug!("session {:?} -> {:?}", state, next);
    *state = next;
    Ok(())
}

fn program<D: Device>(device: &mut D, plan: &RegisterPlan, config: &Config) -> Result<(), AcquisitionError> {
    device.configure(&plan.writes)?;
    device.set_mode(config.wire_mode)?;
    device.start()?;
    Ok(())
}

fn log_suppressed(warnings: &[PipelineWarning]) {
    for warning in warnings {
        if let PipelineWarning::IntegritySuppressed { row, delta } = warning {
            warn!("row {row}: last-channel jump of {delta} suppressed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ScriptedDevice;
    use crate::types::Sample;

    fn samples(n: i64) -> Vec<Sample> {
        (0..n)
            .map(|i| Sample::ok(i * 2000, Some(i as u32), vec![i as i32; 8]))
            .collect()
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        let device = ScriptedDevice::from_samples(samples(5));
        let mut session = Session::start(Config::default(), device).unwrap();
        assert_eq!(session.state(), SessionState::Streaming);
        assert!(matches!(
            session.resume(),
            Err(AcquisitionError::InvalidTransition {
                from: SessionState::Streaming,
                to: SessionState::Streaming
            })
        ));
        session.pause().unwrap();
        assert!(session.pause().is_err());
        session.resume().unwrap();
        session.stop().unwrap();
    }

    #[test]
    fn summary_renders_counts() {
        let summary = SessionSummary {
            duration: Duration::from_millis(1500),
            achieved_rate: Some(480.0),
            estimated_rate: Some(500.0),
            samples_read: 10,
            decode_drops: 1,
            integrity_drops: 2,
            sequence_gaps: 3,
            rows: 10,
            peak_backlog: 4,
        };
        let text = summary.to_string();
        assert!(text.starts_with("10 rows in 1.50s at 480.0 sps (device clock 500.0 sps)"));
        assert!(text.contains("1 decode drops"));
        assert!(text.contains("3 sequence gaps"));
    }

    #[test]
    fn achieved_rate_is_rows_over_elapsed_time() {
        let rate = rows_per_second(300, Duration::from_millis(1500)).unwrap();
        assert!((rate - 200.0).abs() < 1e-9);
        assert_eq!(rows_per_second(5, Duration::ZERO), None);
    }

    #[test]
    fn backlog_warning_is_raised_while_paused() {
        let mut config = Config::default();
        config.acquisition.continuous = true;
        config.acquisition.backlog_warning = 1;
        let device = ScriptedDevice::from_samples(samples(10));
        let mut session = Session::start(config, device).unwrap();
        session.pause().unwrap();
        // 暂停期间读线程继续写入队列
        let deadline = Instant::now() + Duration::from_secs(2);
        while session.queue.backlog() < 10 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        let report = session.tick().unwrap();
        assert!(report.backlog > 1);
        assert!(report.warnings.iter().any(|w| matches!(
            w,
            PipelineWarning::Backlog { queued, threshold: 1 } if *queued > 1
        )));
        assert_eq!(report.appended, 0);
        assert!(session.matrix().is_empty());
        assert_eq!(session.integrity_drops(), 0);
        assert_eq!(session.peak_backlog(), report.backlog);
        session.stop().unwrap();
    }

    #[test]
    fn stop_assembles_everything_still_queued() {
        let config = Config {
            acquisition: crate::config::AcquisitionConfig {
                continuous: true,
                ..Default::default()
            },
            ..Config::default()
        };
        let device = ScriptedDevice::from_samples(samples(50));
        let session = Session::start(config, device).unwrap();
        let summary = session.stop().unwrap();
        // The reader may be stopped before it reads everything.
        assert_eq!(summary.rows, summary.samples_read);
        assert!(summary.rows <= 50);
    }
}
