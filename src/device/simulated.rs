// src/device/simulated.rs
use std::thread;
use std::time::{Duration, Instant};

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::device::{Device, DeviceError, RegisterWrite};
use crate::types::{Sample, WireMode};

// 模拟 ADS1299 输出的直流偏置 (raw counts)
const BASELINE: f64 = 7_500_000.0;
const AMPLITUDE: f64 = 4_000.0;
const NOISE: f64 = 200.0;
const SPIKE: i32 = 60_000;

/// Synthetic multi-channel source paced at the configured sample rate.
pub struct SimulatedDevice {
    channel_count: usize,
    sample_rate: u32,
    spike_probability: f64,
    rng: StdRng,
    index: u64,
    started_at: Option<Instant>,
    paced: bool,
}

impl SimulatedDevice {
    pub fn new(channel_count: usize, sample_rate: u32) -> Self {
        Self {
            channel_count,
            sample_rate,
            spike_probability: 0.0,
            rng: StdRng::from_entropy(),
            index: 0,
            started_at: None,
            paced: true,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Chance per frame that the last channel carries a corrupt spike.
    pub fn with_spike_probability(mut self, probability: f64) -> Self {
        self.spike_probability = probability.clamp(0.0, 1.0);
        self
    }

    /// Produce frames as fast as they are read instead of in real time.
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    fn period_us(&self) -> f64 {
        1_000_000.0 / self.sample_rate.max(1) as f64
    }

    fn wait_for_frame(&mut self) {
        if !self.paced {
            return;
        }
        let started_at = *self.started_at.get_or_insert_with(Instant::now);
        let due = Duration::from_micros((self.index as f64 * self.period_us()) as u64);
        let elapsed = started_at.elapsed();
        if due > elapsed {
            thread::sleep(due - elapsed);
        }
    }
}

impl Device for SimulatedDevice {
    fn configure(&mut self, writes: &[RegisterWrite]) -> Result<(), DeviceError> {
        debug!("sim: ignoring {} register writes", writes.len());
        Ok(())
    }

    fn set_mode(&mut self, mode: WireMode) -> Result<(), DeviceError> {
        debug!("sim: mode {mode:?}");
        Ok(())
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        self.started_at = Some(Instant::now());
        Ok(())
    }

    fn read_next_sample(&mut self) -> Result<Option<Sample>, DeviceError> {
        self.wait_for_frame();
        let t = self.index as f64 / self.sample_rate.max(1) as f64;
        let mut channel_data: Vec<i32> = (0..self.channel_count)
            .map(|ch| {
                let freq = 2.0 + ch as f64 * 1.5;
                let wave = (2.0 * std::f64::consts::PI * freq * t).sin() * AMPLITUDE;
                let noise = self.rng.gen_range(-NOISE..NOISE);
                (BASELINE + wave + noise) as i32
            })
            .collect();
        if self.spike_probability > 0.0 && self.rng.gen_bool(self.spike_probability) {
            if let Some(last) = channel_data.last_mut() {
                *last += SPIKE;
            }
        }
        let timestamp = (self.index as f64 * self.period_us()) as i64;
        let sample = Sample::ok(timestamp, Some(self.index as u32), channel_data);
        self.index += 1;
        Ok(Some(sample))
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        debug!("sim: stopped after {} frames", self.index);
        self.started_at = None;
        Ok(())
    }
}
