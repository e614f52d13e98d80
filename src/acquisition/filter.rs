//! Incremental despike + IIR stage.
//!
//! Each run only touches rows appended since the previous run. The median
//! window reaches back into rows that were already processed, and the IIR
//! recursion carries its last `M` inputs and outputs in `FilterState`, so
//! running over a buffer in many chunks gives the same output as one pass.
use std::collections::VecDeque;

use crate::acquisition::buffer::SampleMatrix;
use crate::acquisition::design::{Coefficients, FilterDesigner};
use crate::acquisition::AcquisitionError;
use crate::config::Config;

/// Median window length of the despike stage.
pub const DESPIKE_WINDOW: usize = 9;

/// Fixed-length ring of the most recent values, zero-initialized.
#[derive(Clone, Debug)]
struct History {
    buf: Vec<f64>,
    head: usize,
}

impl History {
    fn new(len: usize) -> Self {
        Self {
            buf: vec![0.0; len],
            head: 0,
        }
    }

    /// Value pushed `n` steps ago, `1 <= n <= len`.
    fn back(&self, n: usize) -> f64 {
        let len = self.buf.len();
        self.buf[(self.head + len - (n - 1)) % len]
    }

    fn push(&mut self, value: f64) {
        if self.buf.is_empty() {
            return;
        }
        self.head = (self.head + 1) % self.buf.len();
        self.buf[self.head] = value;
    }
}

/// IIR history for one channel.
#[derive(Clone, Debug)]
pub struct ChannelState {
    channel: usize,
    inputs: History,
    outputs: History,
}

impl ChannelState {
    fn new(channel: usize, order: usize) -> Self {
        Self {
            channel,
            inputs: History::new(order),
            outputs: History::new(order),
        }
    }

    fn step(&mut self, x: f64, coefficients: &Coefficients) -> f64 {
        let b = coefficients.b();
        let a = coefficients.a();
        let mut y = b[0] * x;
        for n in 1..b.len() {
            y += b[n] * self.inputs.back(n) - a[n] * self.outputs.back(n);
        }
        self.inputs.push(x);
        self.outputs.push(y);
        y
    }
}

/// Coefficients plus per-channel recursion history.
#[derive(Clone, Debug)]
pub struct FilterState {
    coefficients: Coefficients,
    channels: Vec<ChannelState>,
}

impl FilterState {
    pub fn new(coefficients: Coefficients, channels: &[usize]) -> Self {
        let order = coefficients.order();
        Self {
            channels: channels
                .iter()
                .map(|&ch| ChannelState::new(ch, order))
                .collect(),
            coefficients,
        }
    }

    pub fn order(&self) -> usize {
        self.coefficients.order()
    }

    pub fn coefficients(&self) -> &Coefficients {
        &self.coefficients
    }
}

pub struct OnlineFilter {
    state: FilterState,
    filtered: Vec<VecDeque<f64>>, // selected channel -> filtered samples
    processed: usize,
    segment: Vec<f64>,
    despiked: Vec<f64>,
}

impl OnlineFilter {
    /// `channels` are 0-based matrix channel indices.
    pub fn new(coefficients: Coefficients, channels: &[usize]) -> Self {
        Self {
            state: FilterState::new(coefficients, channels),
            filtered: channels.iter().map(|_| VecDeque::new()).collect(),
            processed: 0,
            segment: Vec::new(),
            despiked: Vec::new(),
        }
    }

    pub fn from_config(
        config: &Config,
        designer: &dyn FilterDesigner,
    ) -> Result<Self, AcquisitionError> {
        let coefficients =
            designer.design(&config.filter_design, &config.normalized_critical_freqs())?;
        Ok(Self::new(coefficients, &config.selected_channels()))
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    pub fn order(&self) -> usize {
        self.state.order()
    }

    /// 0-based matrix channels this filter processes.
    pub fn channels(&self) -> Vec<usize> {
        self.state.channels.iter().map(|c| c.channel).collect()
    }

    /// Rows that must stay in the matrix behind the last processed row.
    pub fn required_history(&self) -> usize {
        self.order().max(DESPIKE_WINDOW - 1)
    }

    /// Matrix rows already consumed; equals the length of every filtered column.
    pub fn processed_rows(&self) -> usize {
        self.processed
    }

    /// Rows at the head of the matrix that may be evicted.
    pub fn watermark(&self) -> usize {
        self.processed.saturating_sub(self.required_history())
    }

    /// Filtered output of the `index`-th selected channel.
    pub fn filtered(&self, index: usize) -> Option<&VecDeque<f64>> {
        self.filtered.get(index)
    }

    /// Filters every row appended since the last call and returns the new
    /// watermark.
    pub fn run(&mut self, matrix: &SampleMatrix) -> usize {
        let start = self.processed;
        let end = matrix.len();
        if end <= start {
            return self.watermark();
        }
        let history = start.min(DESPIKE_WINDOW - 1);
        debug_assert!(
            matrix.evicted_rows() == 0 || history == DESPIKE_WINDOW - 1,
            "despike history was evicted"
        );
        let coefficients = &self.state.coefficients;
        for (state, output) in self.state.channels.iter_mut().zip(&mut self.filtered) {
            let Some(column) = matrix.channel(state.channel) else {
                continue;
            };
            self.segment.clear();
            self.segment
                .extend(column.range(start - history..end).map(|&v| v as f64));
            self.despiked.clear();
            despike(&self.segment, history, &mut self.despiked);
            output.extend(self.despiked.iter().map(|&x| state.step(x, coefficients)));
        }
        self.processed = end;
        self.watermark()
    }

    /// Drops the first `k` filtered values; the evictor trims the matrix in
    /// the same call.
    pub(crate) fn trim_front(&mut self, k: usize) {
        let k = k.min(self.processed);
        for output in &mut self.filtered {
            output.drain(..k);
        }
        self.processed -= k;
    }
}

/// Causal median over `segment`, emitting values from position `from` on.
/// Windows are shorter than `DESPIKE_WINDOW` only at the start of `segment`.
fn despike(segment: &[f64], from: usize, out: &mut Vec<f64>) {
    let mut window = [0.0; DESPIKE_WINDOW];
    for p in from..segment.len() {
        let len = DESPIKE_WINDOW.min(p + 1);
        let w = &mut window[..len];
        w.copy_from_slice(&segment[p + 1 - len..=p]);
        out.push(median(w));
    }
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_unstable_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::design::Butterworth;
    use crate::config::{BandType, FilterDesign};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn lowpass() -> Coefficients {
        let design = FilterDesign {
            order: 4,
            band_type: BandType::Lowpass,
            critical_freqs: vec![40.0],
            ..FilterDesign::default()
        };
        Butterworth.design(&design, &[0.16]).unwrap()
    }

    fn random_matrix(rng: &mut StdRng, rows: usize) -> SampleMatrix {
        let mut matrix = SampleMatrix::new(2);
        for i in 0..rows {
            let spike = if rng.gen_bool(0.05) { 50_000 } else { 0 };
            matrix
                .push_row(
                    i as i64 * 2000,
                    &[rng.gen_range(-1000..1000) + spike, rng.gen_range(-5..5)],
                )
                .unwrap();
        }
        matrix
    }

    /// Replays the rows `0..len` of `full` into a fresh matrix.
    fn prefix(full: &SampleMatrix, len: usize) -> SampleMatrix {
        let mut matrix = SampleMatrix::new(full.channel_count());
        for row in full.rows().take(len) {
            matrix.push_row(row.timestamp, &row.values).unwrap();
        }
        matrix
    }

    /// Whole-buffer reference: trailing median then direct-form recursion.
    fn reference(raw: &[f64], c: &Coefficients) -> Vec<f64> {
        let mut despiked = Vec::new();
        despike(raw, 0, &mut despiked);
        let (b, a) = (c.b(), c.a());
        let mut y = vec![0.0; despiked.len()];
        for k in 0..despiked.len() {
            let mut acc = b[0] * despiked[k];
            for n in 1..b.len() {
                if k >= n {
                    acc += b[n] * despiked[k - n] - a[n] * y[k - n];
                }
            }
            y[k] = acc;
        }
        y
    }

    #[test]
    fn median_handles_short_and_full_windows() {
        let mut out = Vec::new();
        despike(&[1.0, 9.0, 2.0, 100.0, 3.0], 0, &mut out);
        assert_eq!(out, vec![1.0, 5.0, 2.0, 5.5, 3.0]);
    }

    #[test]
    fn despike_removes_isolated_spike() {
        let mut raw = vec![10.0; 20];
        raw[12] = 50_000.0;
        let mut out = Vec::new();
        despike(&raw, 0, &mut out);
        assert!(out.iter().all(|&v| v == 10.0));
    }

    #[test]
    fn one_pass_matches_reference() {
        let mut rng = StdRng::seed_from_u64(11);
        let matrix = random_matrix(&mut rng, 300);
        let coefficients = lowpass();
        let mut filter = OnlineFilter::new(coefficients.clone(), &[0, 1]);
        filter.run(&matrix);
        for (i, ch) in [0usize, 1].iter().enumerate() {
            let raw: Vec<f64> = matrix.channel(*ch).unwrap().iter().map(|&v| v as f64).collect();
            let expected = reference(&raw, &coefficients);
            let got: Vec<f64> = filter.filtered(i).unwrap().iter().copied().collect();
            assert_eq!(got.len(), expected.len());
            for (g, e) in got.iter().zip(&expected) {
                assert!((g - e).abs() <= 1e-9 * e.abs().max(1.0));
            }
        }
    }

    #[test]
    fn random_chunking_matches_one_pass() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..20 {
            let rows = rng.gen_range(1..400);
            let full = random_matrix(&mut rng, rows);
            let mut one_pass = OnlineFilter::new(lowpass(), &[0, 1]);
            one_pass.run(&full);

            let mut chunked = OnlineFilter::new(lowpass(), &[0, 1]);
            let mut len = 0;
            while len < rows {
                len = (len + rng.gen_range(1..40)).min(rows);
                chunked.run(&prefix(&full, len));
                assert_eq!(chunked.processed_rows(), len);
            }
            for i in 0..2 {
                assert_eq!(chunked.filtered(i), one_pass.filtered(i));
            }
        }
    }

    #[test]
    fn output_never_outgrows_input() {
        let mut rng = StdRng::seed_from_u64(3);
        let full = random_matrix(&mut rng, 50);
        let mut filter = OnlineFilter::new(lowpass(), &[1]);
        for len in 0..=50 {
            let matrix = prefix(&full, len);
            filter.run(&matrix);
            let out = filter.filtered(0).unwrap().len();
            assert!(out <= matrix.len());
            if len >= filter.order() {
                assert_eq!(out, matrix.len());
            }
        }
    }

    #[test]
    fn watermark_keeps_required_history() {
        let mut rng = StdRng::seed_from_u64(5);
        let matrix = random_matrix(&mut rng, 30);
        let mut filter = OnlineFilter::new(lowpass(), &[0]);
        assert_eq!(filter.run(&prefix(&matrix, 5)), 0);
        assert_eq!(filter.run(&matrix), 30 - DESPIKE_WINDOW + 1);
        assert_eq!(filter.required_history(), 8);
    }
}
