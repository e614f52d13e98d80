// src/config.rs
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::acquisition::AcquisitionError;
use crate::device::registers::{
    allowed_gains, allowed_speeds, gain_bits, speed_bits, MAX_CHANNELS,
};
use crate::types::WireMode;

pub const DEFAULT_BAUD_RATE: u32 = 2_000_000;
pub const DEFAULT_INTEGRITY_THRESHOLD: i64 = 20_000;

/// Session configuration, loaded once and validated before any device call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial port path, or `"sim"` for the simulated device.
    pub port: String,
    pub baud_rate: u32,
    pub channel_count: usize,
    pub sample_rate: u32,
    pub gain: u32,
    /// 1-based channel selection; empty selects every channel.
    pub channels: Vec<usize>,
    /// Route selected channels to the internal test signal.
    pub test_signal: bool,
    pub wire_mode: WireMode,
    pub acquisition: AcquisitionConfig,
    pub integrity: IntegrityConfig,
    pub filter_design: FilterDesign,
    pub recording_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: "sim".to_owned(),
            baud_rate: DEFAULT_BAUD_RATE,
            channel_count: 8,
            sample_rate: 500,
            gain: 1,
            channels: Vec::new(),
            test_signal: false,
            wire_mode: WireMode::LineDelimited,
            acquisition: AcquisitionConfig::default(),
            integrity: IntegrityConfig::default(),
            filter_design: FilterDesign::default(),
            recording_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Stream until stopped instead of stopping after `max_samples`.
    pub continuous: bool,
    pub max_samples: u64,
    /// Keep at most this many rows in memory; older rows go to the recorder.
    pub retain_rows: Option<usize>,
    pub tick_interval_ms: u64,
    pub refresh_interval_ms: u64,
    /// Queue length above which a backlog warning is raised.
    pub backlog_warning: usize,
    /// Rows considered by the rate estimator.
    pub rate_window: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            continuous: false,
            max_samples: 5000,
            retain_rows: None,
            tick_interval_ms: 10,
            refresh_interval_ms: 100,
            backlog_warning: 50_000,
            rate_window: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionPolicy {
    #[default]
    DuplicatePrevious,
    Drop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrityConfig {
    pub threshold: i64,
    pub policy: SuppressionPolicy,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_INTEGRITY_THRESHOLD,
            policy: SuppressionPolicy::DuplicatePrevious,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandType {
    Lowpass,
    Highpass,
    Bandpass,
    Bandstop,
}

impl BandType {
    pub fn edge_count(self) -> usize {
        match self {
            BandType::Lowpass | BandType::Highpass => 1,
            BandType::Bandpass | BandType::Bandstop => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterDesign {
    pub order: usize,
    /// Passband ripple in dB, for designers that use it.
    pub ripple: f64,
    /// Stopband attenuation in dB, for designers that use it.
    pub attenuation: f64,
    /// Critical frequencies in Hz.
    pub critical_freqs: Vec<f64>,
    pub band_type: BandType,
}

impl Default for FilterDesign {
    fn default() -> Self {
        Self {
            order: 2,
            ripple: 0.1,
            attenuation: 40.0,
            critical_freqs: vec![1.0, 40.0],
            band_type: BandType::Bandpass,
        }
    }
}

impl Config {
    pub fn from_json_str(text: &str) -> Result<Self, AcquisitionError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, AcquisitionError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn nyquist_hz(&self) -> f64 {
        self.sample_rate as f64 / 2.0
    }

    /// Critical frequencies normalized to `[0, 1]` against Nyquist.
    pub fn normalized_critical_freqs(&self) -> Vec<f64> {
        let nyquist = self.nyquist_hz();
        self.filter_design
            .critical_freqs
            .iter()
            .map(|f| f / nyquist)
            .collect()
    }

    /// 0-based indices of the channels the filter runs on.
    pub fn selected_channels(&self) -> Vec<usize> {
        if self.channels.is_empty() {
            (0..self.channel_count).collect()
        } else {
            self.channels.iter().map(|c| c.saturating_sub(1)).collect()
        }
    }

    pub fn validate(&self) -> Result<(), AcquisitionError> {
        if speed_bits(self.sample_rate).is_none() {
            return Err(AcquisitionError::configuration(
                "sample_rate",
                self.sample_rate,
                allowed_speeds(),
            ));
        }
        if gain_bits(self.gain).is_none() {
            return Err(AcquisitionError::configuration(
                "gain",
                self.gain,
                allowed_gains(),
            ));
        }
        if !(1..=MAX_CHANNELS).contains(&self.channel_count) {
            return Err(AcquisitionError::configuration(
                "channel_count",
                self.channel_count,
                format!("1..={MAX_CHANNELS}"),
            ));
        }
        for &channel in &self.channels {
            if channel == 0 || channel > self.channel_count {
                return Err(AcquisitionError::configuration(
                    "channels",
                    channel,
                    format!("1..={}", self.channel_count),
                ));
            }
        }
        if !self.acquisition.continuous && self.acquisition.max_samples == 0 {
            return Err(AcquisitionError::configuration(
                "acquisition.max_samples",
                0,
                ">= 1 in bounded mode",
            ));
        }
        if self.integrity.threshold <= 0 {
            return Err(AcquisitionError::configuration(
                "integrity.threshold",
                self.integrity.threshold,
                "> 0",
            ));
        }
        self.validate_filter_design()
    }

    fn validate_filter_design(&self) -> Result<(), AcquisitionError> {
        let design = &self.filter_design;
        if design.order == 0 {
            return Err(AcquisitionError::configuration(
                "filter_design.order",
                design.order,
                ">= 1",
            ));
        }
        let edges = design.band_type.edge_count();
        if design.critical_freqs.len() != edges {
            return Err(AcquisitionError::configuration(
                "filter_design.critical_freqs",
                format!("{:?}", design.critical_freqs),
                format!("{edges} frequencies for {:?}", design.band_type),
            ));
        }
        let normalized = self.normalized_critical_freqs();
        if normalized.iter().any(|w| !(*w > 0.0 && *w < 1.0)) {
            return Err(AcquisitionError::configuration(
                "filter_design.critical_freqs",
                format!("{:?}", design.critical_freqs),
                format!("0 < f < {} Hz", self.nyquist_hz()),
            ));
        }
        if edges == 2 && normalized[0] >= normalized[1] {
            return Err(AcquisitionError::configuration(
                "filter_design.critical_freqs",
                format!("{:?}", design.critical_freqs),
                "ascending band edges",
            ));
        }
        Ok(())
    }
}
