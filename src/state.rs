//! Sequencer state: tempo, bars, tracks and the transport position.
//!
//! The state is the one source of truth. Mutators validate their input,
//! apply it, and return a [`Change`] describing what happened; a rejected
//! request returns `None` and leaves the state as it was.

use std::fmt;
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::Limits;
use crate::instrument::DrumKind;

/// 16th-note steps in one bar.
pub const STEPS_PER_BAR: usize = 16;

/// Amplitude envelope of a drum hit. Times in seconds, sustain in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Adsr {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
}

impl Adsr {
    pub const fn new(attack: f64, decay: f64, sustain: f64, release: f64) -> Self {
        Adsr {
            attack,
            decay,
            sustain,
            release,
        }
    }

    /// Envelope given to newly added tracks.
    pub const fn new_track() -> Self {
        Adsr::new(0.001, 0.15, 0.0, 0.1)
    }

    /// Attack + decay + release.
    pub fn length(&self) -> f64 {
        self.attack + self.decay + self.release
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeParam {
    Attack,
    Decay,
    Sustain,
    Release,
}

impl EnvelopeParam {
    pub fn name(self) -> &'static str {
        match self {
            EnvelopeParam::Attack => "attack",
            EnvelopeParam::Decay => "decay",
            EnvelopeParam::Sustain => "sustain",
            EnvelopeParam::Release => "release",
        }
    }
}

impl fmt::Display for EnvelopeParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EnvelopeParam {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "attack" => Ok(EnvelopeParam::Attack),
            "decay" => Ok(EnvelopeParam::Decay),
            "sustain" => Ok(EnvelopeParam::Sustain),
            "release" => Ok(EnvelopeParam::Release),
            other => Err(format!("unknown envelope parameter '{other}'")),
        }
    }
}

/// Track family. Only drum tracks exist today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackType {
    #[default]
    Drum,
}

/// One instrument's step pattern plus its envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: String,
    pub track_type: TrackType,
    pub drum: DrumKind,
    pub steps: Vec<bool>,
    pub adsr: Adsr,
}

impl Track {
    pub fn new(id: impl Into<String>, drum: DrumKind, step_count: usize, adsr: Adsr) -> Self {
        Track {
            id: id.into(),
            track_type: TrackType::Drum,
            drum,
            steps: vec![false; step_count],
            adsr,
        }
    }

    /// Build a track whose step `i` is active when `pattern(i)` holds.
    pub fn with_pattern(
        id: impl Into<String>,
        drum: DrumKind,
        step_count: usize,
        adsr: Adsr,
        pattern: impl Fn(usize) -> bool,
    ) -> Self {
        let mut track = Track::new(id, drum, step_count, adsr);
        for (i, step) in track.steps.iter_mut().enumerate() {
            *step = pattern(i);
        }
        track
    }

    pub fn is_active(&self, step: usize) -> bool {
        self.steps.get(step).copied().unwrap_or(false)
    }
}

/// What an accepted mutation did.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Tempo(u32),
    Bars(u32),
    TrackAdded { index: usize },
    TrackRemoved { index: usize, id: String },
    TrackMoved { from: usize, to: usize },
    StepToggled { track: usize, step: usize, active: bool },
    /// `release` is set when the new kind reset the track's release time.
    Instrument { track: usize, drum: DrumKind, release: Option<f64> },
    Envelope { track: usize, param: EnvelopeParam, value: f64 },
    Imported,
    Reset,
    PlaybackStarted,
    PlaybackStopped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SequencerState {
    bpm: u32,
    bars: u32,
    tracks: Vec<Track>,
    position: usize,
    playing: bool,
    limits: Limits,
}

impl SequencerState {
    /// The demo pattern every new sequencer starts with.
    pub fn new(limits: Limits) -> Self {
        let steps = STEPS_PER_BAR;
        SequencerState {
            bpm: 120,
            bars: 1,
            tracks: vec![
                Track::with_pattern(
                    "d_kick",
                    DrumKind::Kick,
                    steps,
                    Adsr::new(0.001, 0.08, 0.0, 0.03),
                    |i| i % 4 == 0,
                ),
                Track::with_pattern(
                    "d_snare",
                    DrumKind::Clap,
                    steps,
                    Adsr::new(0.001, 0.06, 0.0, 0.03),
                    |i| (i + 4) % 8 == 0,
                ),
                Track::with_pattern(
                    "d_hihat",
                    DrumKind::Hihat,
                    steps,
                    Adsr::new(0.001, 0.05, 0.0, 0.02),
                    |i| i % 2 == 0,
                ),
            ],
            position: 0,
            playing: false,
            limits,
        }
    }

    /// A state with no tracks, for building patterns from scratch.
    pub fn empty(limits: Limits) -> Self {
        let mut state = SequencerState::new(limits);
        state.tracks.clear();
        state
    }

    /// Assemble a state from already-validated parts.
    pub(crate) fn from_parts(
        limits: Limits,
        bpm: u32,
        bars: u32,
        tracks: Vec<Track>,
        position: usize,
        playing: bool,
    ) -> Self {
        let step_count = bars as usize * STEPS_PER_BAR;
        SequencerState {
            bpm,
            bars,
            tracks,
            position: position % step_count,
            playing,
            limits,
        }
    }

    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    pub fn bars(&self) -> u32 {
        self.bars
    }

    /// Total steps in the loop: `bars * 16`.
    pub fn step_count(&self) -> usize {
        self.bars as usize * STEPS_PER_BAR
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Length of one 16th note at the current tempo, in seconds.
    pub fn step_duration(&self) -> f64 {
        60.0 / self.bpm as f64 / 4.0
    }

    pub fn set_tempo(&mut self, bpm: u32) -> Option<Change> {
        match self.limits.check_tempo(bpm) {
            Ok(bpm) => {
                self.bpm = bpm;
                Some(Change::Tempo(bpm))
            }
            Err(e) => {
                debug!("tempo ignored: {e}");
                None
            }
        }
    }

    /// Change the bar count, padding every track with rests or truncating it
    /// so all tracks keep exactly `bars * 16` steps.
    pub fn set_bars(&mut self, bars: u32) -> Option<Change> {
        let bars = match self.limits.check_bars(bars) {
            Ok(bars) => bars,
            Err(e) => {
                debug!("bar count ignored: {e}");
                return None;
            }
        };
        self.bars = bars;
        let step_count = self.step_count();
        for track in &mut self.tracks {
            track.steps.resize(step_count, false);
        }
        self.position %= step_count;
        Some(Change::Bars(bars))
    }

    /// Append a silent track. Returns the new track's index in the change.
    pub fn add_track(&mut self, drum: DrumKind) -> Option<Change> {
        let id = self.fresh_track_id();
        self.tracks
            .push(Track::new(id, drum, self.step_count(), Adsr::new_track()));
        Some(Change::TrackAdded {
            index: self.tracks.len() - 1,
        })
    }

    /// Append a prepared track, resized to the current bar count. Rejected
    /// if its id is already taken.
    pub fn push_track(&mut self, mut track: Track) -> Option<Change> {
        if self.tracks.iter().any(|t| t.id == track.id) {
            debug!("track '{}' already exists", track.id);
            return None;
        }
        track.steps.resize(self.step_count(), false);
        self.tracks.push(track);
        Some(Change::TrackAdded {
            index: self.tracks.len() - 1,
        })
    }

    pub fn remove_track(&mut self, index: usize) -> Option<Change> {
        if index >= self.tracks.len() {
            return None;
        }
        let removed = self.tracks.remove(index);
        Some(Change::TrackRemoved {
            index,
            id: removed.id,
        })
    }

    pub fn toggle_step(&mut self, track: usize, step: usize) -> Option<Change> {
        let cell = self.tracks.get_mut(track)?.steps.get_mut(step)?;
        *cell = !*cell;
        Some(Change::StepToggled {
            track,
            step,
            active: *cell,
        })
    }

    /// Move a track to `to`, keeping the relative order of all others.
    pub fn move_track(&mut self, from: usize, to: usize) -> Option<Change> {
        let len = self.tracks.len();
        if from >= len || to >= len {
            return None;
        }
        if from != to {
            let track = self.tracks.remove(from);
            self.tracks.insert(to, track);
        }
        Some(Change::TrackMoved { from, to })
    }

    /// Switch a track's drum kind. Hats also reset the release time, within
    /// the configured bounds.
    pub fn set_instrument(&mut self, track: usize, drum: DrumKind) -> Option<Change> {
        let limits = self.limits.envelope;
        let target = self.tracks.get_mut(track)?;
        target.drum = drum;
        let release = drum.release_preset().map(|preset| {
            target.adsr.release = preset.clamp(limits.min_time, limits.max_release);
            target.adsr.release
        });
        Some(Change::Instrument { track, drum, release })
    }

    /// Overwrite one envelope field. Times are clamped to the configured
    /// bounds and sustain to [0, 1]; non-finite values are ignored.
    pub fn set_envelope(
        &mut self,
        track: usize,
        param: EnvelopeParam,
        value: f64,
    ) -> Option<Change> {
        if !value.is_finite() {
            debug!("non-finite {param} ignored");
            return None;
        }
        let limits = self.limits.envelope;
        let adsr = &mut self.tracks.get_mut(track)?.adsr;
        let value = match param {
            EnvelopeParam::Attack => {
                adsr.attack = value.clamp(limits.min_time, limits.max_attack);
                adsr.attack
            }
            EnvelopeParam::Decay => {
                adsr.decay = value.clamp(limits.min_time, limits.max_decay);
                adsr.decay
            }
            EnvelopeParam::Sustain => {
                adsr.sustain = value.clamp(0.0, 1.0);
                adsr.sustain
            }
            EnvelopeParam::Release => {
                adsr.release = value.clamp(limits.min_time, limits.max_release);
                adsr.release
            }
        };
        Some(Change::Envelope { track, param, value })
    }

    /// Back to the demo pattern. Limits are kept.
    pub fn reset(&mut self) -> Option<Change> {
        *self = SequencerState::new(self.limits);
        Some(Change::Reset)
    }

    pub(crate) fn set_position(&mut self, position: usize) {
        self.position = position % self.step_count();
    }

    pub(crate) fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    fn fresh_track_id(&self) -> String {
        (self.tracks.len() + 1..)
            .map(|n| format!("track_{n}"))
            .find(|id| !self.tracks.iter().any(|t| &t.id == id))
            .unwrap_or_default()
    }
}

impl Default for SequencerState {
    fn default() -> Self {
        SequencerState::new(Limits::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SequencerState {
        SequencerState::default()
    }

    #[test]
    fn default_pattern() {
        let s = state();
        assert_eq!(s.bpm(), 120);
        assert_eq!(s.bars(), 1);
        assert_eq!(s.tracks().len(), 3);

        let kick = &s.tracks()[0];
        assert_eq!(kick.id, "d_kick");
        assert_eq!(kick.drum, DrumKind::Kick);
        let hits: Vec<usize> = (0..16).filter(|&i| kick.is_active(i)).collect();
        assert_eq!(hits, vec![0, 4, 8, 12]);

        let clap = &s.tracks()[1];
        assert_eq!(clap.drum, DrumKind::Clap);
        let hits: Vec<usize> = (0..16).filter(|&i| clap.is_active(i)).collect();
        assert_eq!(hits, vec![4, 12]);

        let hat = &s.tracks()[2];
        assert_eq!(hat.steps.iter().filter(|&&on| on).count(), 8);
    }

    #[test]
    fn tempo_outside_range_is_ignored() {
        let mut s = state();
        for bpm in [0, 39, 241, 999] {
            assert_eq!(s.set_tempo(bpm), None, "{bpm} should be rejected");
            assert_eq!(s.bpm(), 120);
        }
        for bpm in [40, 90, 240] {
            assert_eq!(s.set_tempo(bpm), Some(Change::Tempo(bpm)));
            assert_eq!(s.bpm(), bpm);
        }
    }

    #[test]
    fn toggle_twice_restores_cell() {
        let mut s = state();
        for track in 0..s.tracks().len() {
            for step in 0..s.step_count() {
                let before = s.tracks()[track].steps[step];
                s.toggle_step(track, step);
                assert_ne!(s.tracks()[track].steps[step], before);
                s.toggle_step(track, step);
                assert_eq!(s.tracks()[track].steps[step], before);
            }
        }
    }

    #[test]
    fn toggle_out_of_bounds_is_noop() {
        let mut s = state();
        let before = s.clone();
        assert_eq!(s.toggle_step(7, 0), None);
        assert_eq!(s.toggle_step(0, 16), None);
        assert_eq!(s, before);
    }

    #[test]
    fn move_track_is_a_stable_move() {
        let mut s = SequencerState::empty(Limits::default());
        let kinds = [
            DrumKind::Kick,
            DrumKind::Snare,
            DrumKind::Clap,
            DrumKind::Tom,
            DrumKind::Cowbell,
        ];
        for kind in kinds {
            s.add_track(kind);
        }
        let ids = |s: &SequencerState| s.tracks().iter().map(|t| t.id.clone()).collect::<Vec<_>>();
        let before = ids(&s);

        s.move_track(0, 3);
        let after = ids(&s);
        assert_eq!(after[3], before[0]);
        let others: Vec<_> = after.iter().filter(|id| **id != before[0]).cloned().collect();
        assert_eq!(others, before[1..].to_vec());

        s.move_track(4, 1);
        let mut sorted_now = ids(&s);
        let mut sorted_before = before.clone();
        sorted_now.sort();
        sorted_before.sort();
        assert_eq!(sorted_now, sorted_before, "move must preserve the set of tracks");
    }

    #[test]
    fn move_out_of_bounds_is_noop() {
        let mut s = state();
        let before = s.clone();
        assert_eq!(s.move_track(0, 3), None);
        assert_eq!(s.move_track(5, 0), None);
        assert_eq!(s, before);
    }

    #[test]
    fn added_tracks_are_silent_and_sized() {
        let mut s = state();
        s.set_bars(2);
        let change = s.add_track(DrumKind::Tom);
        assert_eq!(change, Some(Change::TrackAdded { index: 3 }));
        let track = &s.tracks()[3];
        assert_eq!(track.steps.len(), 32);
        assert!(track.steps.iter().all(|&on| !on));
        assert_eq!(track.adsr, Adsr::new_track());
        assert!(!s.is_playing());
    }

    #[test]
    fn added_track_ids_are_unique() {
        let mut s = state();
        s.push_track(Track::new("track_1", DrumKind::Kick, 16, Adsr::new_track()));
        s.add_track(DrumKind::Snare);
        s.add_track(DrumKind::Snare);
        let mut ids: Vec<_> = s.tracks().iter().map(|t| t.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), s.tracks().len());
    }

    #[test]
    fn push_track_rejects_duplicate_id() {
        let mut s = state();
        let dup = Track::new("d_kick", DrumKind::Tom, 16, Adsr::new_track());
        assert_eq!(s.push_track(dup), None);
        assert_eq!(s.tracks().len(), 3);
    }

    #[test]
    fn remove_track() {
        let mut s = state();
        assert_eq!(
            s.remove_track(1),
            Some(Change::TrackRemoved { index: 1, id: "d_snare".into() })
        );
        assert_eq!(s.tracks().len(), 2);
        assert_eq!(s.remove_track(2), None);
        assert_eq!(s.tracks().len(), 2);
    }

    #[test]
    fn bars_resize_pads_and_truncates() {
        let mut s = state();
        s.set_bars(3);
        assert!(s.tracks().iter().all(|t| t.steps.len() == 48));
        assert!(s.tracks()[0].steps[16..].iter().all(|&on| !on), "padding must be rests");

        s.set_position(40);
        s.set_bars(2);
        assert!(s.tracks().iter().all(|t| t.steps.len() == 32));
        assert_eq!(s.position(), 8, "position wraps into the shorter loop");
        assert!(s.tracks()[0].is_active(0));
    }

    #[test]
    fn bars_outside_range_ignored() {
        let mut s = state();
        assert_eq!(s.set_bars(0), None);
        assert_eq!(s.set_bars(17), None);
        assert_eq!(s.bars(), 1);
    }

    #[test]
    fn envelope_values_are_clamped() {
        let mut s = state();
        s.set_envelope(0, EnvelopeParam::Attack, 0.0);
        assert_eq!(s.tracks()[0].adsr.attack, 0.001);
        s.set_envelope(0, EnvelopeParam::Release, 9.0);
        assert_eq!(s.tracks()[0].adsr.release, 1.5);
        s.set_envelope(0, EnvelopeParam::Decay, 0.2);
        assert_eq!(s.tracks()[0].adsr.decay, 0.2);
        s.set_envelope(0, EnvelopeParam::Sustain, 1.7);
        assert_eq!(s.tracks()[0].adsr.sustain, 1.0);
        assert_eq!(s.set_envelope(0, EnvelopeParam::Decay, f64::NAN), None);
        assert_eq!(s.tracks()[0].adsr.decay, 0.2);
    }

    #[test]
    fn set_instrument_changes_kind() {
        let mut s = state();
        assert_eq!(
            s.set_instrument(0, DrumKind::Tom),
            Some(Change::Instrument { track: 0, drum: DrumKind::Tom, release: None })
        );
        assert_eq!(s.tracks()[0].drum, DrumKind::Tom);
        assert_eq!(s.tracks()[0].adsr.release, 0.03, "toms keep their release");
        assert_eq!(s.set_instrument(9, DrumKind::Tom), None);
    }

    #[test]
    fn hats_reset_the_release() {
        let mut s = state();
        assert_eq!(
            s.set_instrument(2, DrumKind::OpenHat),
            Some(Change::Instrument { track: 2, drum: DrumKind::OpenHat, release: Some(0.5) })
        );
        assert_eq!(s.tracks()[2].adsr.release, 0.5);

        s.set_instrument(2, DrumKind::Hihat);
        assert_eq!(s.tracks()[2].adsr.release, 0.05);
    }

    #[test]
    fn release_preset_respects_limits() {
        let mut limits = Limits::default();
        limits.envelope.max_release = 0.3;
        let mut s = SequencerState::new(limits);
        s.set_instrument(0, DrumKind::OpenHat);
        assert_eq!(s.tracks()[0].adsr.release, 0.3);
    }

    #[test]
    fn reset_restores_demo_pattern() {
        let mut s = state();
        s.set_tempo(200);
        s.remove_track(0);
        s.reset();
        assert_eq!(s, SequencerState::default());
    }

    #[test]
    fn step_duration_is_a_sixteenth() {
        let s = state();
        assert!((s.step_duration() - 0.125).abs() < 1e-12);
    }

    #[test]
    fn envelope_param_parses() {
        assert_eq!("release".parse::<EnvelopeParam>(), Ok(EnvelopeParam::Release));
        assert!("hold".parse::<EnvelopeParam>().is_err());
    }
}
