//! Drum kinds and the recipe each one is synthesized from.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dsp::filter::FilterType;

/// The eight drum sounds a track can play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrumKind {
    Kick,
    Snare,
    Clap,
    Hihat,
    OpenHat,
    Tom,
    Triangle,
    Cowbell,
}

/// How a drum kind is built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Voicing {
    /// Sine tone whose pitch falls exponentially, with its own body decay
    /// running alongside the amplitude envelope.
    Sweep {
        start_hz: f64,
        end_hz: f64,
        sweep_time: f64,
        body_time: f64,
    },
    /// White noise through a fixed biquad. `q: None` leaves the filter at
    /// its default resonance.
    FilteredNoise {
        filter: FilterType,
        frequency: f64,
        q: Option<f64>,
    },
}

impl DrumKind {
    pub const ALL: [DrumKind; 8] = [
        DrumKind::Kick,
        DrumKind::Snare,
        DrumKind::Clap,
        DrumKind::Hihat,
        DrumKind::OpenHat,
        DrumKind::Tom,
        DrumKind::Triangle,
        DrumKind::Cowbell,
    ];

    /// Name used in the JSON state.
    pub fn wire_name(self) -> &'static str {
        match self {
            DrumKind::Kick => "kick",
            DrumKind::Snare => "snare",
            DrumKind::Clap => "clap",
            DrumKind::Hihat => "hihat",
            DrumKind::OpenHat => "open_hat",
            DrumKind::Tom => "tom",
            DrumKind::Triangle => "triangle",
            DrumKind::Cowbell => "cowbell",
        }
    }

    /// Human-readable name for instrument pickers.
    pub fn label(self) -> &'static str {
        match self {
            DrumKind::Kick => "Kick Drum",
            DrumKind::Snare => "Snare Drum",
            DrumKind::Clap => "Clap",
            DrumKind::Hihat => "Hi-Hat",
            DrumKind::OpenHat => "Ride",
            DrumKind::Tom => "Tom",
            DrumKind::Triangle => "Triangle",
            DrumKind::Cowbell => "Cowbell",
        }
    }

    /// Icon key for instrument pickers. The open hat shares the ride icon.
    pub fn icon(self) -> &'static str {
        match self {
            DrumKind::OpenHat => "ride",
            other => other.wire_name(),
        }
    }

    /// Release time a track takes on when switched to this kind. Hats ring
    /// for very different lengths, so picking one resets the release.
    pub fn release_preset(self) -> Option<f64> {
        match self {
            DrumKind::OpenHat => Some(0.5),
            DrumKind::Hihat => Some(0.05),
            _ => None,
        }
    }

    pub fn voicing(self) -> Voicing {
        use FilterType::*;
        let noise = |filter, frequency, q| Voicing::FilteredNoise { filter, frequency, q };
        match self {
            DrumKind::Kick => Voicing::Sweep {
                start_hz: 150.0,
                end_hz: 0.01,
                sweep_time: 0.1,
                body_time: 0.15,
            },
            DrumKind::Snare => noise(Bandpass, 1500.0, Some(2.5)),
            DrumKind::Clap => noise(Bandpass, 1200.0, Some(5.0)),
            DrumKind::Hihat | DrumKind::OpenHat => noise(Highpass, 8000.0, None),
            DrumKind::Tom => noise(Lowpass, 800.0, Some(2.0)),
            DrumKind::Triangle | DrumKind::Cowbell => noise(Bandpass, 3000.0, Some(10.0)),
        }
    }
}

impl fmt::Display for DrumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDrum(pub String);

impl fmt::Display for UnknownDrum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown drum kind '{}'", self.0)
    }
}

impl std::error::Error for UnknownDrum {}

impl FromStr for DrumKind {
    type Err = UnknownDrum;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DrumKind::ALL
            .into_iter()
            .find(|kind| kind.wire_name() == s)
            .ok_or_else(|| UnknownDrum(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for kind in DrumKind::ALL {
            assert_eq!(kind.wire_name().parse::<DrumKind>(), Ok(kind));
        }
        assert!("tabla".parse::<DrumKind>().is_err());
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&DrumKind::OpenHat).unwrap();
        assert_eq!(json, "\"open_hat\"");
        let kind: DrumKind = serde_json::from_str("\"cowbell\"").unwrap();
        assert_eq!(kind, DrumKind::Cowbell);
    }

    #[test]
    fn only_kick_sweeps() {
        for kind in DrumKind::ALL {
            let sweeps = matches!(kind.voicing(), Voicing::Sweep { .. });
            assert_eq!(sweeps, kind == DrumKind::Kick, "{kind}");
        }
    }

    #[test]
    fn hats_are_highpassed() {
        for kind in [DrumKind::Hihat, DrumKind::OpenHat] {
            match kind.voicing() {
                Voicing::FilteredNoise { filter, frequency, .. } => {
                    assert_eq!(filter, FilterType::Highpass);
                    assert_eq!(frequency, 8000.0);
                }
                other => panic!("{kind} should be filtered noise, got {other:?}"),
            }
        }
    }

    #[test]
    fn only_hats_carry_a_release_preset() {
        assert_eq!(DrumKind::OpenHat.release_preset(), Some(0.5));
        assert_eq!(DrumKind::Hihat.release_preset(), Some(0.05));
        assert_eq!(DrumKind::Kick.release_preset(), None);
    }

    #[test]
    fn open_hat_uses_ride_icon() {
        assert_eq!(DrumKind::OpenHat.icon(), "ride");
        assert_eq!(DrumKind::Tom.icon(), "tom");
    }
}
