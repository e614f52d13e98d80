use std::f64::consts::PI;

use crate::acquisition::AcquisitionError;
use crate::config::{BandType, FilterDesign};

/// Transfer-function coefficients with `a[0] == 1` and `b.len() == a.len()`.
#[derive(Clone, Debug, PartialEq)]
pub struct Coefficients {
    b: Vec<f64>,
    a: Vec<f64>,
}

impl Coefficients {
    /// Normalizes by `a[0]` and zero-pads the shorter vector.
    pub fn new(mut b: Vec<f64>, mut a: Vec<f64>) -> Result<Self, AcquisitionError> {
        if b.is_empty() || a.is_empty() {
            return Err(AcquisitionError::Coefficients(
                "b and a must be non-empty".into(),
            ));
        }
        let a0 = a[0];
        if a0 == 0.0 || !a0.is_finite() {
            return Err(AcquisitionError::Coefficients(format!("a[0] = {a0}")));
        }
        if b.iter().chain(a.iter()).any(|c| !c.is_finite()) {
            return Err(AcquisitionError::Coefficients(
                "coefficients must be finite".into(),
            ));
        }
        let len = b.len().max(a.len());
        b.resize(len, 0.0);
        a.resize(len, 0.0);
        b.iter_mut().for_each(|c| *c /= a0);
        a.iter_mut().for_each(|c| *c /= a0);
        Ok(Self { b, a })
    }

    pub fn passthrough() -> Self {
        Self {
            b: vec![1.0],
            a: vec![1.0],
        }
    }

    /// Filter order `M`.
    pub fn order(&self) -> usize {
        self.a.len() - 1
    }

    pub fn b(&self) -> &[f64] {
        &self.b
    }

    pub fn a(&self) -> &[f64] {
        &self.a
    }

    /// Series connection of two filters.
    pub fn cascade(&self, other: &Coefficients) -> Coefficients {
        Coefficients {
            b: convolve(&self.b, &other.b),
            a: convolve(&self.a, &other.a),
        }
    }

    /// Magnitude response at `w` given as a fraction of Nyquist.
    pub fn gain_at(&self, w: f64) -> f64 {
        let omega = PI * w;
        let eval = |coeffs: &[f64]| {
            let (re, im) = coeffs
                .iter()
                .enumerate()
                .fold((0.0, 0.0), |(re, im), (k, c)| {
                    let phase = omega * k as f64;
                    (re + c * phase.cos(), im - c * phase.sin())
                });
            (re * re + im * im).sqrt()
        };
        eval(&self.b) / eval(&self.a)
    }
}

fn convolve(x: &[f64], y: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; x.len() + y.len() - 1];
    for (i, xi) in x.iter().enumerate() {
        for (j, yj) in y.iter().enumerate() {
            out[i + j] += xi * yj;
        }
    }
    out
}

/// Turns a design request into coefficients. `wn` holds the critical
/// frequencies normalized to Nyquist.
pub trait FilterDesigner: Send + Sync {
    fn design(&self, design: &FilterDesign, wn: &[f64]) -> Result<Coefficients, AcquisitionError>;
}

/// Digital Butterworth designs built from bilinear second-order sections.
/// Ripple and attenuation do not apply and are ignored.
#[derive(Clone, Copy, Debug, Default)]
pub struct Butterworth;

impl FilterDesigner for Butterworth {
    fn design(&self, design: &FilterDesign, wn: &[f64]) -> Result<Coefficients, AcquisitionError> {
        let order = design.order;
        if order == 0 {
            return Err(AcquisitionError::Coefficients("order must be >= 1".into()));
        }
        if wn.len() != design.band_type.edge_count() || wn.iter().any(|w| !(*w > 0.0 && *w < 1.0)) {
            return Err(AcquisitionError::Coefficients(format!(
                "critical frequencies {wn:?} invalid for {:?}",
                design.band_type
            )));
        }
        let coeffs = match design.band_type {
            BandType::Lowpass => butterworth(order, wn[0], Kind::Lowpass),
            BandType::Highpass => butterworth(order, wn[0], Kind::Highpass),
            BandType::Bandpass => {
                butterworth(order, wn[0], Kind::Highpass).cascade(&butterworth(order, wn[1], Kind::Lowpass))
            }
            BandType::Bandstop => {
                let center = (wn[0] * wn[1]).sqrt();
                let q = center / (wn[1] - wn[0]);
                let section = notch(center, q);
                (1..order).fold(section.clone(), |acc, _| acc.cascade(&section))
            }
        };
        Ok(coeffs)
    }
}

#[derive(Clone, Copy)]
enum Kind {
    Lowpass,
    Highpass,
}

fn butterworth(order: usize, wn: f64, kind: Kind) -> Coefficients {
    let mut coeffs = Coefficients::passthrough();
    for m in 1..=order / 2 {
        let angle = PI * (order - 2 * m + 1) as f64 / (2 * order) as f64;
        let q = 1.0 / (2.0 * angle.cos());
        coeffs = coeffs.cascade(&biquad(wn, q, kind));
    }
    if order % 2 == 1 {
        coeffs = coeffs.cascade(&first_order(wn, kind));
    }
    coeffs
}

fn biquad(wn: f64, q: f64, kind: Kind) -> Coefficients {
    let w0 = PI * wn;
    let alpha = w0.sin() / (2.0 * q);
    let cos_w0 = w0.cos();
    let (b0, b1) = match kind {
        Kind::Lowpass => ((1.0 - cos_w0) * 0.5, 1.0 - cos_w0),
        Kind::Highpass => ((1.0 + cos_w0) * 0.5, -(1.0 + cos_w0)),
    };
    normalize(
        [b0, b1, b0],
        [1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha],
    )
}

fn first_order(wn: f64, kind: Kind) -> Coefficients {
    let k = (PI * wn / 2.0).tan();
    let a1 = (k - 1.0) / (k + 1.0);
    let b = match kind {
        Kind::Lowpass => vec![k / (k + 1.0), k / (k + 1.0)],
        Kind::Highpass => vec![1.0 / (k + 1.0), -1.0 / (k + 1.0)],
    };
    Coefficients { b, a: vec![1.0, a1] }
}

fn notch(wn: f64, q: f64) -> Coefficients {
    let w0 = PI * wn;
    let alpha = w0.sin() / (2.0 * q);
    let cos_w0 = w0.cos();
    normalize(
        [1.0, -2.0 * cos_w0, 1.0],
        [1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha],
    )
}

fn normalize(b: [f64; 3], a: [f64; 3]) -> Coefficients {
    let a0_inv = 1.0 / a[0];
    Coefficients {
        b: b.iter().map(|c| c * a0_inv).collect(),
        a: a.iter().map(|c| c * a0_inv).collect(),
    }
}
