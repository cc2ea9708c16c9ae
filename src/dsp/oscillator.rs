//! Sound sources: a phase-accumulating sine and white noise.

use std::f64::consts::PI;

/// Sine oscillator whose frequency may change every sample.
#[derive(Debug, Clone)]
pub struct Oscillator {
    phase: f64,
    sample_rate: f64,
}

impl Oscillator {
    pub fn new(sample_rate: f64) -> Self {
        Oscillator {
            phase: 0.0,
            sample_rate,
        }
    }

    /// Generate the next sample at `frequency` Hz.
    pub fn next_sample(&mut self, frequency: f64) -> f64 {
        let sample = (2.0 * PI * self.phase).sin();
        self.phase += frequency / self.sample_rate;
        self.phase -= self.phase.floor();
        sample
    }
}

/// White noise in [-1, 1) from a xorshift64 generator.
///
/// Seeded so renders are reproducible.
#[derive(Debug, Clone)]
pub struct Noise {
    state: u64,
}

impl Noise {
    pub fn new(seed: u64) -> Self {
        Noise { state: seed.max(1) }
    }

    pub fn next_sample(&mut self) -> f64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        // top 53 bits as a uniform float in [0, 1)
        let unit = (x >> 11) as f64 / (1u64 << 53) as f64;
        unit * 2.0 - 1.0
    }
}
