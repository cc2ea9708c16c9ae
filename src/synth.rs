//! Drum synthesis.
//!
//! A hit is described as a [`HitPlan`]: parameter automation for the output
//! gain plus a source recipe picked by drum kind. Planning is pure; an
//! [`AudioBackend`] turns plans into sound.

use crate::dsp::filter::FilterType;
use crate::error::PlaybackError;
use crate::instrument::{DrumKind, Voicing};
use crate::state::Adsr;

/// How a parameter moves from the previous event to this one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Ramp {
    /// Jump to the value at the event time.
    Set,
    Linear,
    /// Exponential approach; both ends must be positive.
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutomationEvent {
    pub time: f64,
    pub value: f64,
    pub ramp: Ramp,
}

/// A parameter curve made of time-ordered events, evaluated the way Web
/// Audio evaluates `AudioParam` automation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Automation {
    events: Vec<AutomationEvent>,
}

impl Automation {
    pub fn new() -> Self {
        Automation { events: Vec::new() }
    }

    fn push(mut self, time: f64, value: f64, ramp: Ramp) -> Self {
        self.events.push(AutomationEvent { time, value, ramp });
        self
    }

    pub fn set(self, time: f64, value: f64) -> Self {
        self.push(time, value, Ramp::Set)
    }

    pub fn linear_to(self, time: f64, value: f64) -> Self {
        self.push(time, value, Ramp::Linear)
    }

    pub fn exponential_to(self, time: f64, value: f64) -> Self {
        self.push(time, value, Ramp::Exponential)
    }

    pub fn events(&self) -> &[AutomationEvent] {
        &self.events
    }

    /// Time of the last event.
    pub fn end_time(&self) -> f64 {
        self.events.last().map_or(0.0, |e| e.time)
    }

    /// Parameter value at `time`. Before the first event the curve holds the
    /// first event's value; after the last it holds the last value.
    pub fn value_at(&self, time: f64) -> f64 {
        let Some(first) = self.events.first() else {
            return 0.0;
        };
        if time < first.time {
            return first.value;
        }

        let mut prev = *first;
        for event in &self.events[1..] {
            if time < event.time {
                return match event.ramp {
                    Ramp::Set => prev.value,
                    Ramp::Linear => {
                        let t = (time - prev.time) / (event.time - prev.time);
                        prev.value + (event.value - prev.value) * t
                    }
                    Ramp::Exponential => {
                        if prev.value <= 0.0 || event.value <= 0.0 {
                            prev.value
                        } else {
                            let t = (time - prev.time) / (event.time - prev.time);
                            prev.value * (event.value / prev.value).powf(t)
                        }
                    }
                };
            }
            prev = *event;
        }
        prev.value
    }
}

/// The sound source of a hit.
#[derive(Debug, Clone, PartialEq)]
pub enum HitSource {
    /// Sine whose frequency and inner gain follow their own curves.
    Tone {
        frequency: Automation,
        gain: Automation,
    },
    /// Looping white noise through a fixed filter.
    Noise {
        filter: FilterType,
        frequency: f64,
        q: Option<f64>,
    },
}

/// Everything a backend needs to play one drum hit.
#[derive(Debug, Clone, PartialEq)]
pub struct HitPlan {
    pub drum: DrumKind,
    pub start: f64,
    /// When the source must be released.
    pub stop: f64,
    /// Output gain: the ADSR envelope.
    pub gain: Automation,
    pub source: HitSource,
}

/// Lifecycle of the shared audio output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    /// Idle until a user gesture resumes it.
    Suspended,
    Running,
    Closed,
}

/// The platform audio output, as far as the sequencer is concerned.
pub trait AudioBackend {
    /// The output clock in seconds.
    fn current_time(&self) -> f64;

    fn output_state(&self) -> OutputState;

    fn resume(&mut self) -> Result<(), PlaybackError>;

    /// Play `hit`, starting at `hit.start` and releasing everything it
    /// allocated at `hit.stop`.
    fn play(&mut self, hit: &HitPlan) -> Result<(), PlaybackError>;

    fn close(&mut self) -> Result<(), PlaybackError>;
}

/// Four-stage gain curve: up to 1 over `attack`, down to `sustain` over
/// `decay`, down to 0 over `release`.
pub fn envelope_curve(adsr: &Adsr, start: f64) -> Automation {
    let attack_end = start + adsr.attack;
    let decay_end = attack_end + adsr.decay;
    Automation::new()
        .set(start, 0.0)
        .linear_to(attack_end, 1.0)
        .linear_to(decay_end, adsr.sustain)
        .linear_to(decay_end + adsr.release, 0.0)
}

/// Describe a hit of `drum` shaped by `adsr`, starting at `start`.
/// `tail_guard` keeps the source alive a little past the release.
pub fn plan_hit(drum: DrumKind, adsr: &Adsr, start: f64, tail_guard: f64) -> HitPlan {
    let source = match drum.voicing() {
        Voicing::Sweep {
            start_hz,
            end_hz,
            sweep_time,
            body_time,
        } => HitSource::Tone {
            frequency: Automation::new()
                .set(start, start_hz)
                .exponential_to(start + sweep_time, end_hz),
            gain: Automation::new()
                .set(start, 1.0)
                .exponential_to(start + body_time, 0.01),
        },
        Voicing::FilteredNoise {
            filter,
            frequency,
            q,
        } => HitSource::Noise {
            filter,
            frequency,
            q,
        },
    };

    HitPlan {
        drum,
        start,
        stop: start + adsr.length() + tail_guard,
        gain: envelope_curve(adsr, start),
        source,
    }
}

/// Plan a hit and hand it to `backend`.
pub fn trigger<B: AudioBackend + ?Sized>(
    backend: &mut B,
    drum: DrumKind,
    adsr: &Adsr,
    start: f64,
    tail_guard: f64,
) -> Result<(), PlaybackError> {
    backend.play(&plan_hit(drum, adsr, start, tail_guard))
}
