//! Sequencer configuration.
//!
//! Every field has a default, so hosts only spell out what they change:
//!
//! ```json
//! { "limits": { "maxBpm": 300 }, "scheduling": { "mode": "stepTimer" } }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, RangeError};

/// Bounds on user-editable envelope times, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EnvelopeLimits {
    /// Shortest attack/decay/release. Zero-length ramps click.
    pub min_time: f64,
    pub max_attack: f64,
    pub max_decay: f64,
    pub max_release: f64,
}

impl Default for EnvelopeLimits {
    fn default() -> Self {
        EnvelopeLimits {
            min_time: 0.001,
            max_attack: 0.5,
            max_decay: 0.5,
            max_release: 1.5,
        }
    }
}

/// Bounds enforced by the state mutators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Limits {
    pub min_bpm: u32,
    pub max_bpm: u32,
    pub max_bars: u32,
    pub envelope: EnvelopeLimits,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            min_bpm: 40,
            max_bpm: 240,
            max_bars: 16,
            envelope: EnvelopeLimits::default(),
        }
    }
}

impl Limits {
    /// Reject empty tempo or bar ranges and unusable envelope bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_bpm == 0 || self.min_bpm > self.max_bpm {
            return Err(ConfigError::Invalid(format!(
                "tempo bounds {}..={} are empty",
                self.min_bpm, self.max_bpm
            )));
        }
        if self.max_bars == 0 {
            return Err(ConfigError::Invalid("maxBars must be at least 1".into()));
        }

        let env = &self.envelope;
        let times = [
            ("minTime", env.min_time),
            ("maxAttack", env.max_attack),
            ("maxDecay", env.max_decay),
            ("maxRelease", env.max_release),
        ];
        for (name, value) in times {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a finite, non-negative time, got {value}"
                )));
            }
        }
        if env.min_time > env.max_attack.min(env.max_decay).min(env.max_release) {
            return Err(ConfigError::Invalid(
                "minTime exceeds one of the envelope maxima".into(),
            ));
        }
        Ok(())
    }

    pub fn check_tempo(&self, bpm: u32) -> Result<u32, RangeError> {
        if (self.min_bpm..=self.max_bpm).contains(&bpm) {
            Ok(bpm)
        } else {
            Err(RangeError::Tempo {
                value: bpm,
                min: self.min_bpm,
                max: self.max_bpm,
            })
        }
    }

    pub fn check_bars(&self, bars: u32) -> Result<u32, RangeError> {
        if (1..=self.max_bars).contains(&bars) {
            Ok(bars)
        } else {
            Err(RangeError::Bars {
                value: bars,
                max: self.max_bars,
            })
        }
    }
}

/// How the transport loop places steps in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum Scheduling {
    /// One step per tick, fired at the tick's clock time; the next tick is
    /// armed one 16th note later.
    StepTimer,
    /// Steps carry target times on the audio clock. Each tick schedules
    /// every step due within `lookahead` seconds and re-arms after
    /// `interval` seconds.
    Lookahead { lookahead: f64, interval: f64 },
}

impl Default for Scheduling {
    fn default() -> Self {
        Scheduling::Lookahead {
            lookahead: 0.1,
            interval: 0.025,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BeatboxConfig {
    pub limits: Limits,
    /// Extra time a hit's source keeps running after its release ends.
    pub tail_guard: f64,
    pub scheduling: Scheduling,
    /// Output rate of the software backend.
    pub sample_rate: f64,
}

impl Default for BeatboxConfig {
    fn default() -> Self {
        BeatboxConfig {
            limits: Limits::default(),
            tail_guard: 0.2,
            scheduling: Scheduling::default(),
            sample_rate: 44100.0,
        }
    }
}

impl BeatboxConfig {
    /// Parse a JSON config and validate it.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: BeatboxConfig =
            serde_json::from_str(text).map_err(|e| ConfigError::Json(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.limits.validate()?;
        if !self.tail_guard.is_finite() || self.tail_guard < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "tailGuard must be a finite, non-negative time, got {}",
                self.tail_guard
            )));
        }

        if let Scheduling::Lookahead { lookahead, interval } = self.scheduling {
            if !(interval.is_finite() && interval > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "scheduling interval must be positive, got {interval}"
                )));
            }
            if !(lookahead.is_finite() && lookahead >= interval) {
                return Err(ConfigError::Invalid(format!(
                    "lookahead {lookahead} must cover at least one interval ({interval})"
                )));
            }
        }

        if !(self.sample_rate.is_finite() && self.sample_rate >= 8000.0) {
            return Err(ConfigError::Invalid(format!(
                "sample rate {} is too low",
                self.sample_rate
            )));
        }
        Ok(())
    }
}
