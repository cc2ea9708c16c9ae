//! Biquad filter for shaping drum noise.

use std::f64::consts::PI;

/// Filter response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterType {
    Lowpass,
    Highpass,
    Bandpass,
}

/// A biquad IIR filter (2nd order).
///
/// Direct Form II Transposed, coefficients from the Audio EQ Cookbook
/// (Robert Bristow-Johnson). Frequency and Q default to a freshly created
/// Web Audio biquad (350 Hz, Q 1), but Q is always linear: Web Audio reads
/// lowpass/highpass Q in dB, this filter does not convert it.
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    pub filter_type: FilterType,
    pub frequency: f64,
    pub q: f64,

    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    z1: f64,
    z2: f64,

    sample_rate: f64,
}

impl BiquadFilter {
    pub const DEFAULT_FREQUENCY: f64 = 350.0;
    pub const DEFAULT_Q: f64 = 1.0;

    pub fn new(filter_type: FilterType, sample_rate: f64) -> Self {
        let mut f = BiquadFilter {
            filter_type,
            frequency: Self::DEFAULT_FREQUENCY,
            q: Self::DEFAULT_Q,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
            sample_rate,
        };
        f.update_coefficients();
        f
    }

    /// Build a filter and tune it in one go. The frequency is kept below
    /// Nyquist so low output rates stay stable.
    pub fn tuned(
        filter_type: FilterType,
        sample_rate: f64,
        frequency: f64,
        q: Option<f64>,
    ) -> Self {
        let mut f = BiquadFilter::new(filter_type, sample_rate);
        f.frequency = frequency.clamp(10.0, sample_rate * 0.45);
        f.q = q.unwrap_or(Self::DEFAULT_Q).max(1e-4);
        f.update_coefficients();
        f
    }

    /// Recompute filter coefficients from current parameters.
    pub fn update_coefficients(&mut self) {
        let w0 = 2.0 * PI * self.frequency / self.sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * self.q);
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        let (b0, b1, b2) = match self.filter_type {
            FilterType::Lowpass => {
                let b1 = 1.0 - cos_w0;
                (b1 / 2.0, b1, b1 / 2.0)
            }
            FilterType::Highpass => {
                let b0 = (1.0 + cos_w0) / 2.0;
                (b0, -(1.0 + cos_w0), b0)
            }
            FilterType::Bandpass => (alpha, 0.0, -alpha),
        };

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
    }

    /// Process a single sample through the filter.
    pub fn process(&mut self, input: f64) -> f64 {
        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }
}
