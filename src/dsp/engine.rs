//! Software audio output — renders planned hits to mono f32 samples.
//!
//! The backend is pull-based: an AudioWorklet or a native output stream
//! calls [`SoftwareBackend::render`] for every block, and the number of
//! frames rendered is the output clock.

use log::debug;

use crate::error::PlaybackError;
use crate::synth::{AudioBackend, HitPlan, OutputState};

use super::voice::Voice;

pub struct SoftwareBackend {
    pub sample_rate: f64,
    pub master_gain: f64,
    state: OutputState,
    /// Frames rendered while running.
    frame: u64,
    voices: Vec<Voice>,
    next_seed: u64,
}

impl SoftwareBackend {
    /// A suspended output, like a freshly created browser audio context.
    pub fn new(sample_rate: f64) -> Self {
        SoftwareBackend {
            sample_rate,
            master_gain: 0.8,
            state: OutputState::Suspended,
            frame: 0,
            voices: Vec::new(),
            next_seed: 0x9E37_79B9_7F4A_7C15,
        }
    }

    /// Voices started or waiting to start.
    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Fill `out` with the next block. Silence while suspended or closed,
    /// and the clock only advances while running.
    pub fn render(&mut self, out: &mut [f32]) {
        if self.state != OutputState::Running {
            out.fill(0.0);
            return;
        }

        for sample in out.iter_mut() {
            let frame = self.frame;
            let mut sum = 0.0;
            for voice in self.voices.iter_mut() {
                if voice.start_frame <= frame {
                    sum += voice.next_sample();
                }
            }
            *sample = soft_clip(sum * self.master_gain) as f32;
            self.frame += 1;
        }

        self.voices.retain(|v| !v.is_finished());
    }

    fn seed(&mut self) -> u64 {
        self.next_seed = self
            .next_seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.next_seed
    }
}

impl AudioBackend for SoftwareBackend {
    fn current_time(&self) -> f64 {
        self.frame as f64 / self.sample_rate
    }

    fn output_state(&self) -> OutputState {
        self.state
    }

    fn resume(&mut self) -> Result<(), PlaybackError> {
        match self.state {
            OutputState::Closed => Err(PlaybackError::Closed),
            _ => {
                self.state = OutputState::Running;
                Ok(())
            }
        }
    }

    fn play(&mut self, hit: &HitPlan) -> Result<(), PlaybackError> {
        if self.state == OutputState::Closed {
            return Err(PlaybackError::Closed);
        }
        let seed = self.seed();
        let mut voice = Voice::from_plan(hit, self.sample_rate, seed);
        // A hit planned in the past starts on the next rendered frame.
        if voice.start_frame < self.frame {
            let late = self.frame - voice.start_frame;
            voice.start_frame = self.frame;
            voice.stop_frame = voice.stop_frame.saturating_add(late);
        }
        self.voices.push(voice);
        Ok(())
    }

    fn close(&mut self) -> Result<(), PlaybackError> {
        if self.state != OutputState::Closed {
            debug!("closing software output, dropping {} voices", self.voices.len());
            self.voices.clear();
            self.state = OutputState::Closed;
        }
        Ok(())
    }
}

/// Soft clipper using tanh to prevent harsh digital clipping.
fn soft_clip(x: f64) -> f64 {
    x.tanh()
}
