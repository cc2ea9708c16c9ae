//! JSON import/export of the sequencer state.
//!
//! The wire format is the plain state record, keys in this order:
//!
//! ```json
//! {
//!   "meta": { "bpm": 120, "bars": 1 },
//!   "tracks": [
//!     { "id": "d_kick", "type": "drum", "drum": "kick",
//!       "steps": [1, 0, 0, 0, ...],
//!       "adsr": { "attack": 0.001, "decay": 0.08, "sustain": 0.0, "release": 0.03 } }
//!   ],
//!   "isPlaying": false,
//!   "currentStep": 0
//! }
//! ```
//!
//! Imports are merged over a base state: a top-level key that is missing
//! keeps the base value.

use std::collections::HashSet;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{ImportError, RangeError};
use crate::instrument::DrumKind;
use crate::state::{Adsr, SequencerState, Track, TrackType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaRecord {
    pub bpm: u32,
    pub bars: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub id: String,
    #[serde(rename = "type", default)]
    pub track_type: TrackType,
    pub drum: DrumKind,
    #[serde(with = "step_flags")]
    pub steps: Vec<bool>,
    pub adsr: Adsr,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateRecord {
    pub meta: MetaRecord,
    pub tracks: Vec<TrackRecord>,
    pub is_playing: bool,
    pub current_step: usize,
}

#[derive(Debug, Default, Deserialize)]
struct MetaPatch {
    bpm: Option<u32>,
    bars: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatePatch {
    #[serde(default)]
    meta: Option<MetaPatch>,
    #[serde(default)]
    tracks: Option<Vec<TrackRecord>>,
    #[serde(default)]
    is_playing: Option<bool>,
    #[serde(default)]
    current_step: Option<usize>,
}

impl From<&Track> for TrackRecord {
    fn from(track: &Track) -> Self {
        TrackRecord {
            id: track.id.clone(),
            track_type: track.track_type,
            drum: track.drum,
            steps: track.steps.clone(),
            adsr: track.adsr,
        }
    }
}

impl From<&SequencerState> for StateRecord {
    fn from(state: &SequencerState) -> Self {
        StateRecord {
            meta: MetaRecord {
                bpm: state.bpm(),
                bars: state.bars(),
            },
            tracks: state.tracks().iter().map(TrackRecord::from).collect(),
            is_playing: state.is_playing(),
            current_step: state.position(),
        }
    }
}

/// Pretty-printed JSON of the state record.
pub fn serialize(state: &SequencerState) -> String {
    // The record holds only strings, integers, booleans and floats, none of
    // which serde_json fails on.
    serde_json::to_string_pretty(&StateRecord::from(state)).unwrap_or_default()
}

/// Parse `text` and merge it over `base`. On error nothing is built and the
/// caller keeps its current state.
pub fn deserialize(text: &str, base: &SequencerState) -> Result<SequencerState, ImportError> {
    if text.trim().is_empty() {
        return Err(ImportError::Empty);
    }
    let patch: StatePatch = serde_json::from_str(text)?;
    let limits = *base.limits();

    let meta = patch.meta.unwrap_or_default();
    let bpm = limits.check_tempo(meta.bpm.unwrap_or(base.bpm()))?;
    let bars = limits.check_bars(meta.bars.unwrap_or(base.bars()))?;
    let step_count = bars as usize * crate::state::STEPS_PER_BAR;

    let records = match patch.tracks {
        Some(records) => records,
        None => base.tracks().iter().map(TrackRecord::from).collect(),
    };

    let mut seen = HashSet::new();
    let mut tracks = Vec::with_capacity(records.len());
    for record in records {
        if !seen.insert(record.id.clone()) {
            return Err(ImportError::DuplicateTrackId(record.id));
        }
        check_envelope(&record)?;
        tracks.push(into_track(record, step_count));
    }

    Ok(SequencerState::from_parts(
        limits,
        bpm,
        bars,
        tracks,
        patch.current_step.unwrap_or(base.position()),
        patch.is_playing.unwrap_or(base.is_playing()),
    ))
}

fn check_envelope(record: &TrackRecord) -> Result<(), ImportError> {
    let adsr = &record.adsr;
    let invalid = |reason| ImportError::InvalidEnvelope {
        track: record.id.clone(),
        reason,
    };
    for (param, value) in [
        ("attack", adsr.attack),
        ("decay", adsr.decay),
        ("release", adsr.release),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(invalid(RangeError::EnvelopeTime { param, value }));
        }
    }
    if !(0.0..=1.0).contains(&adsr.sustain) {
        return Err(invalid(RangeError::Sustain {
            value: adsr.sustain,
        }));
    }
    Ok(())
}

fn into_track(record: TrackRecord, step_count: usize) -> Track {
    let mut steps = record.steps;
    if steps.len() != step_count {
        warn!(
            "track '{}' has {} steps, resizing to {step_count}",
            record.id,
            steps.len()
        );
        steps.resize(step_count, false);
    }
    Track {
        id: record.id,
        track_type: record.track_type,
        drum: record.drum,
        steps,
        adsr: record.adsr,
    }
}

/// Steps travel as `0`/`1`; `true`/`false` are accepted on the way in.
mod step_flags {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Cell {
        Flag(bool),
        Number(u64),
    }

    pub fn serialize<S: Serializer>(steps: &[bool], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(steps.iter().map(|&on| u8::from(on)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<bool>, D::Error> {
        Vec::<Cell>::deserialize(deserializer)?
            .into_iter()
            .map(|cell| match cell {
                Cell::Flag(on) => Ok(on),
                Cell::Number(0) => Ok(false),
                Cell::Number(1) => Ok(true),
                Cell::Number(n) => Err(D::Error::custom(format!(
                    "step values must be 0 or 1, got {n}"
                ))),
            })
            .collect()
    }
}
