//! Voice — one planned drum hit rendered sample by sample.

use crate::synth::{HitPlan, HitSource};

use super::envelope::Envelope;
use super::filter::BiquadFilter;
use super::oscillator::{Noise, Oscillator};

#[derive(Debug, Clone)]
enum Source {
    Tone {
        oscillator: Oscillator,
        frequency: Envelope,
        gain: Envelope,
    },
    Noise {
        noise: Noise,
        filter: BiquadFilter,
    },
}

/// A single hit: a source shaped by its gain envelope, alive from
/// `start_frame` until `stop_frame`.
#[derive(Debug, Clone)]
pub struct Voice {
    source: Source,
    gain: Envelope,
    pub start_frame: u64,
    pub stop_frame: u64,
    /// Frames rendered so far.
    played: u64,
}

impl Voice {
    /// Build a voice for `hit`. Times in the plan are output clock seconds.
    pub fn from_plan(hit: &HitPlan, sample_rate: f64, noise_seed: u64) -> Self {
        let start_frame = (hit.start.max(0.0) * sample_rate).round() as u64;
        let stop_frame = (hit.stop.max(hit.start) * sample_rate).round() as u64;
        // Curves are anchored to the frame the voice actually starts on.
        let origin = start_frame as f64 / sample_rate;

        let source = match &hit.source {
            HitSource::Tone { frequency, gain } => Source::Tone {
                oscillator: Oscillator::new(sample_rate),
                frequency: Envelope::new(frequency, origin, sample_rate),
                gain: Envelope::new(gain, origin, sample_rate),
            },
            HitSource::Noise {
                filter,
                frequency,
                q,
            } => Source::Noise {
                noise: Noise::new(noise_seed),
                filter: BiquadFilter::tuned(*filter, sample_rate, *frequency, *q),
            },
        };

        Voice {
            source,
            gain: Envelope::new(&hit.gain, origin, sample_rate),
            start_frame,
            stop_frame,
            played: 0,
        }
    }

    /// Generate the next sample. Silent once the stop frame is reached.
    pub fn next_sample(&mut self) -> f64 {
        if self.is_finished() {
            return 0.0;
        }
        self.played += 1;

        let raw = match &mut self.source {
            Source::Tone {
                oscillator,
                frequency,
                gain,
            } => oscillator.next_sample(frequency.next_sample()) * gain.next_sample(),
            Source::Noise { noise, filter } => filter.process(noise.next_sample()),
        };
        raw * self.gain.next_sample()
    }

    /// True once the source has been released.
    pub fn is_finished(&self) -> bool {
        self.start_frame + self.played >= self.stop_frame
    }
}
