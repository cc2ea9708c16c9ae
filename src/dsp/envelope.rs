//! Sample-by-sample playback of an automation curve.

use crate::synth::{Automation, Ramp};

#[derive(Debug, Clone, Copy)]
struct Point {
    /// Samples after the voice origin.
    at: usize,
    value: f64,
    ramp: Ramp,
}

/// Follows an [`Automation`] one sample at a time.
///
/// Event times are rounded to whole samples relative to `origin`, the
/// clock time of the voice's first sample.
#[derive(Debug, Clone)]
pub struct Envelope {
    points: Vec<Point>,
    /// Index of the point the current segment heads towards.
    next: usize,
    /// Samples generated so far.
    counter: usize,
    level: f64,
}

impl Envelope {
    pub fn new(curve: &Automation, origin: f64, sample_rate: f64) -> Self {
        let points: Vec<Point> = curve
            .events()
            .iter()
            .map(|e| Point {
                at: ((e.time - origin) * sample_rate).round().max(0.0) as usize,
                value: e.value,
                ramp: e.ramp,
            })
            .collect();
        let level = points.first().map_or(0.0, |p| p.value);
        Envelope {
            points,
            next: 1,
            counter: 0,
            level,
        }
    }

    /// Generate the next curve value.
    pub fn next_sample(&mut self) -> f64 {
        let n = self.counter;
        self.counter += 1;

        // Enter every point we have reached.
        while self.next < self.points.len() && n >= self.points[self.next].at {
            self.level = self.points[self.next].value;
            self.next += 1;
        }

        if self.is_finished() || self.points.is_empty() || n < self.points[0].at {
            return self.level;
        }

        let from = self.points[self.next - 1];
        let to = self.points[self.next];
        let span = (to.at - from.at).max(1) as f64;
        let t = (n - from.at) as f64 / span;
        self.level = match to.ramp {
            Ramp::Set => from.value,
            Ramp::Linear => from.value + (to.value - from.value) * t,
            Ramp::Exponential if from.value > 0.0 && to.value > 0.0 => {
                from.value * (to.value / from.value).powf(t)
            }
            Ramp::Exponential => from.value,
        };
        self.level
    }

    /// True once every event has been passed; the level then holds.
    pub fn is_finished(&self) -> bool {
        self.next >= self.points.len()
    }
}
