//! Sequencer — the single owner of the state, the transport and the
//! audio output.
//!
//! Every user operation goes through a [`Sequencer`]. Accepted mutations
//! are reported to the registered [`SequencerObserver`]s; rejected ones are
//! dropped silently and return `None`.

use log::{info, warn};

use crate::config::BeatboxConfig;
use crate::error::{ConfigError, ImportError, PlaybackError};
use crate::instrument::DrumKind;
use crate::persist;
use crate::state::{Change, EnvelopeParam, SequencerState};
use crate::synth::{self, AudioBackend, OutputState};
use crate::transport::{TaskHandle, TickScheduler, Transport, TransportState};

/// Receives notifications from a [`Sequencer`]. Every method has an empty
/// default so observers implement only what they render.
pub trait SequencerObserver {
    /// Called after every accepted mutation.
    fn state_changed(&mut self, _state: &SequencerState, _change: &Change) {}

    /// Called for every processed step with the clock time it sounds at.
    fn position_changed(&mut self, _step: usize, _time: f64) {}

    /// Called when the output cannot be started.
    fn playback_failed(&mut self, _error: &PlaybackError) {}
}

pub struct Sequencer<B: AudioBackend, S: TickScheduler> {
    state: SequencerState,
    config: BeatboxConfig,
    transport: Transport,
    backend: B,
    scheduler: S,
    observers: Vec<Box<dyn SequencerObserver>>,
}

impl<B: AudioBackend, S: TickScheduler> Sequencer<B, S> {
    /// A sequencer holding the demo pattern.
    pub fn new(config: BeatboxConfig, backend: B, scheduler: S) -> Result<Self, ConfigError> {
        let state = SequencerState::new(config.limits);
        Sequencer::with_state(config, state, backend, scheduler)
    }

    /// A sequencer over an existing state. Both the configuration and the
    /// state's own limits are validated.
    pub fn with_state(
        config: BeatboxConfig,
        mut state: SequencerState,
        backend: B,
        scheduler: S,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        state.limits().validate()?;
        state.set_playing(false);
        Ok(Sequencer {
            state,
            transport: Transport::new(config.scheduling),
            config,
            backend,
            scheduler,
            observers: Vec::new(),
        })
    }

    pub fn state(&self) -> &SequencerState {
        &self.state
    }

    pub fn config(&self) -> &BeatboxConfig {
        &self.config
    }

    pub fn transport_state(&self) -> TransportState {
        self.transport.state()
    }

    pub fn is_playing(&self) -> bool {
        self.transport.is_running()
    }

    /// The step most recently played, while running.
    pub fn current_step(&self) -> Option<usize> {
        if self.transport.is_running() {
            self.transport.last_step()
        } else {
            None
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    pub fn add_observer(&mut self, observer: Box<dyn SequencerObserver>) {
        self.observers.push(observer);
    }

    // -- State operations ----------------------------------------------

    pub fn set_tempo(&mut self, bpm: u32) -> Option<Change> {
        let change = self.state.set_tempo(bpm);
        self.publish(change)
    }

    pub fn set_bars(&mut self, bars: u32) -> Option<Change> {
        let change = self.state.set_bars(bars);
        self.publish(change)
    }

    pub fn add_track(&mut self, drum: DrumKind) -> Option<Change> {
        let change = self.state.add_track(drum);
        self.publish(change)
    }

    pub fn remove_track(&mut self, index: usize) -> Option<Change> {
        let change = self.state.remove_track(index);
        self.publish(change)
    }

    pub fn toggle_step(&mut self, track: usize, step: usize) -> Option<Change> {
        let change = self.state.toggle_step(track, step);
        self.publish(change)
    }

    pub fn move_track(&mut self, from: usize, to: usize) -> Option<Change> {
        let change = self.state.move_track(from, to);
        self.publish(change)
    }

    pub fn set_instrument(&mut self, track: usize, drum: DrumKind) -> Option<Change> {
        let change = self.state.set_instrument(track, drum);
        self.publish(change)
    }

    pub fn set_envelope(
        &mut self,
        track: usize,
        param: EnvelopeParam,
        value: f64,
    ) -> Option<Change> {
        let change = self.state.set_envelope(track, param, value);
        self.publish(change)
    }

    /// Back to the demo pattern. A running transport keeps running.
    pub fn reset(&mut self) -> Option<Change> {
        info!("resetting sequencer state");
        let change = self.state.reset();
        self.state.set_playing(self.transport.is_running());
        self.publish(change)
    }

    // -- Persistence ---------------------------------------------------

    pub fn export_json(&self) -> String {
        persist::serialize(&self.state)
    }

    /// Replace the state with `text`. On error the current state is kept.
    /// The transport is neither started nor stopped by an import.
    pub fn import_json(&mut self, text: &str) -> Result<Change, ImportError> {
        let mut imported = persist::deserialize(text, &self.state)?;
        imported.set_playing(self.transport.is_running());
        imported.set_position(self.state.position());
        info!(
            "imported state: {} tracks, {} bpm, {} bars",
            imported.tracks().len(),
            imported.bpm(),
            imported.bars()
        );
        self.state = imported;
        self.publish(Some(Change::Imported));
        Ok(Change::Imported)
    }

    // -- Transport -----------------------------------------------------

    /// Stopped → Running. Resumes a suspended output first; if that fails
    /// the transport stays stopped and observers hear about it.
    pub fn start(&mut self) -> Result<(), PlaybackError> {
        if self.transport.is_running() {
            return Ok(());
        }

        if let Err(err) = self.ensure_output() {
            warn!("cannot start playback: {err}");
            for observer in self.observers.iter_mut() {
                observer.playback_failed(&err);
            }
            return Err(err);
        }

        self.transport.start(self.backend.current_time());
        self.state.set_position(0);
        self.state.set_playing(true);
        self.publish(Some(Change::PlaybackStarted));
        self.run_tick();
        Ok(())
    }

    /// Running → Stopped. Cancels the one armed tick; the position is kept.
    pub fn stop(&mut self) {
        if !self.transport.is_running() {
            return;
        }
        if let Some(handle) = self.transport.stop() {
            self.scheduler.cancel(handle);
        }
        self.state.set_playing(false);
        self.publish(Some(Change::PlaybackStopped));
    }

    /// Start when stopped, stop when running. Returns whether it is now
    /// playing.
    pub fn toggle_playback(&mut self) -> Result<bool, PlaybackError> {
        if self.transport.is_running() {
            self.stop();
            Ok(false)
        } else {
            self.start()?;
            Ok(true)
        }
    }

    /// A scheduled tick fired. Ticks other than the armed one are ignored.
    pub fn on_tick(&mut self, handle: TaskHandle) {
        if self.transport.claim(handle) {
            self.run_tick();
        }
    }

    /// Stop and release the audio output.
    pub fn teardown(&mut self) {
        self.stop();
        if let Err(err) = self.backend.close() {
            warn!("closing audio output failed: {err}");
        }
        info!("sequencer torn down");
    }

    fn ensure_output(&mut self) -> Result<(), PlaybackError> {
        match self.backend.output_state() {
            OutputState::Running => Ok(()),
            OutputState::Suspended => self.backend.resume(),
            OutputState::Closed => Err(PlaybackError::Closed),
        }
    }

    fn run_tick(&mut self) {
        let now = self.backend.current_time();
        let steps = self.transport.due_steps(&mut self.state, now);

        for step in steps {
            for track in self.state.tracks() {
                if !track.is_active(step.index) {
                    continue;
                }
                if let Err(err) = synth::trigger(
                    &mut self.backend,
                    track.drum,
                    &track.adsr,
                    step.time,
                    self.config.tail_guard,
                ) {
                    warn!(
                        "dropped {} hit on {} at step {}: {err}",
                        track.drum, track.id, step.index
                    );
                }
            }
            for observer in self.observers.iter_mut() {
                observer.position_changed(step.index, step.time);
            }
        }

        let delay = self.transport.next_delay(&self.state);
        let handle = self.scheduler.schedule(delay);
        self.transport.arm(handle);
    }

    fn publish(&mut self, change: Option<Change>) -> Option<Change> {
        if let Some(change) = &change {
            for observer in self.observers.iter_mut() {
                observer.state_changed(&self.state, change);
            }
        }
        change
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Scheduling;
    use crate::state::{Adsr, Track};
    use crate::testing::{Event, RecordingBackend, RecordingObserver};
    use crate::transport::HostScheduler;

    type TestSequencer = Sequencer<RecordingBackend, HostScheduler>;

    fn config(scheduling: Scheduling) -> BeatboxConfig {
        BeatboxConfig {
            scheduling,
            ..BeatboxConfig::default()
        }
    }

    fn four_on_the_floor(scheduling: Scheduling) -> TestSequencer {
        let config = config(scheduling);
        let mut state = SequencerState::empty(config.limits);
        state.push_track(Track::with_pattern(
            "kick",
            DrumKind::Kick,
            16,
            Adsr::new_track(),
            |i| i % 4 == 0,
        ));
        Sequencer::with_state(config, state, RecordingBackend::new(), HostScheduler::new())
            .expect("valid config")
    }

    /// Fire the pending tick after letting the clock run for its delay.
    fn fire(seq: &mut TestSequencer) {
        let (handle, delay) = seq.scheduler_mut().take().expect("a tick should be armed");
        seq.backend_mut().now += delay.as_secs_f64();
        seq.on_tick(handle);
    }

    fn observed(seq: &mut TestSequencer) -> RecordingObserver {
        let observer = RecordingObserver::new();
        seq.add_observer(Box::new(observer.clone()));
        observer
    }

    #[test]
    fn quarter_notes_trigger_on_every_fourth_tick() {
        let mut seq = four_on_the_floor(Scheduling::StepTimer);
        let log = observed(&mut seq);
        seq.start().unwrap();
        for _ in 1..16 {
            fire(&mut seq);
        }
        assert_eq!(log.positions(), (0..16).collect::<Vec<_>>());
        let starts = seq.backend().starts();
        assert_eq!(starts.len(), 4, "one hit per active step, got {starts:?}");
        for (k, start) in starts.iter().enumerate() {
            assert!((start - 0.5 * k as f64).abs() < 1e-9, "hit {k} at {start}");
        }
    }

    #[test]
    fn lookahead_mode_places_hits_exactly() {
        let mut seq = four_on_the_floor(Scheduling::default());
        seq.start().unwrap();
        while seq.backend().now < 2.0 {
            fire(&mut seq);
        }
        let starts = seq.backend().starts();
        assert!(starts.len() >= 4);
        for (k, start) in starts.iter().enumerate() {
            assert!((start - 0.5 * k as f64).abs() < 1e-9, "hit {k} at {start}");
        }
    }

    #[test]
    fn start_resumes_output_and_plays_step_zero() {
        let mut seq = four_on_the_floor(Scheduling::StepTimer);
        assert_eq!(seq.backend().state, OutputState::Suspended);
        seq.start().unwrap();
        assert_eq!(seq.backend().state, OutputState::Running);
        assert_eq!(seq.backend().hits.len(), 1, "step 0 plays immediately");
        assert_eq!(seq.current_step(), Some(0));
        assert!(seq.state().is_playing());
        assert!(seq.scheduler().pending().is_some());
    }

    #[test]
    fn start_always_begins_at_zero() {
        let mut seq = four_on_the_floor(Scheduling::StepTimer);
        let log = observed(&mut seq);
        seq.start().unwrap();
        for _ in 0..6 {
            fire(&mut seq);
        }
        seq.stop();
        assert_eq!(seq.state().position(), 7, "stop keeps the position");

        log.events.borrow_mut().clear();
        seq.start().unwrap();
        assert_eq!(log.positions(), vec![0]);
    }

    #[test]
    fn position_wraps_without_skipping() {
        let mut seq = four_on_the_floor(Scheduling::StepTimer);
        let log = observed(&mut seq);
        seq.start().unwrap();
        for _ in 0..40 {
            fire(&mut seq);
        }
        let positions = log.positions();
        assert_eq!(positions.len(), 41);
        for (i, p) in positions.iter().enumerate() {
            assert_eq!(*p, i % 16);
        }
    }

    #[test]
    fn stop_twice_is_idempotent() {
        let mut seq = four_on_the_floor(Scheduling::StepTimer);
        let log = observed(&mut seq);
        seq.start().unwrap();
        seq.stop();
        let after_first = log.events.borrow().len();
        seq.stop();
        assert_eq!(log.events.borrow().len(), after_first);
        assert_eq!(seq.transport_state(), TransportState::Stopped);
        assert!(seq.scheduler().pending().is_none(), "the armed tick is cancelled");
        assert!(!seq.state().is_playing());
    }

    #[test]
    fn stale_tick_after_restart_is_ignored() {
        let mut seq = four_on_the_floor(Scheduling::StepTimer);
        seq.start().unwrap();
        let (stale, _) = seq.scheduler().pending().unwrap();
        seq.stop();
        seq.start().unwrap();
        let hits = seq.backend().hits.len();
        let position = seq.state().position();

        seq.on_tick(stale);
        assert_eq!(seq.backend().hits.len(), hits);
        assert_eq!(seq.state().position(), position);
        assert!(seq.scheduler().pending().is_some(), "the live tick stays armed");
    }

    #[test]
    fn tick_while_stopped_does_nothing() {
        let mut seq = four_on_the_floor(Scheduling::StepTimer);
        seq.start().unwrap();
        let (handle, _) = seq.scheduler().pending().unwrap();
        seq.stop();
        seq.on_tick(handle);
        assert_eq!(seq.backend().hits.len(), 1);
        assert!(seq.scheduler().pending().is_none());
    }

    #[test]
    fn tempo_change_applies_to_the_next_step() {
        let mut seq = four_on_the_floor(Scheduling::StepTimer);
        seq.start().unwrap();
        seq.set_tempo(60);
        let (_, delay) = seq.scheduler().pending().unwrap();
        assert_eq!(delay.as_millis(), 125, "the armed tick keeps its delay");
        fire(&mut seq);
        let (_, delay) = seq.scheduler().pending().unwrap();
        assert_eq!(delay.as_millis(), 250);
    }

    #[test]
    fn resume_denial_is_reported() {
        let mut seq = four_on_the_floor(Scheduling::StepTimer);
        let log = observed(&mut seq);
        seq.backend_mut().deny_resume = Some("no user gesture".into());

        let err = seq.start().unwrap_err();
        assert_eq!(err, PlaybackError::ResumeDenied("no user gesture".into()));
        assert_eq!(seq.transport_state(), TransportState::Stopped);
        assert!(seq.scheduler().pending().is_none());
        assert_eq!(log.events.borrow().as_slice(), &[Event::Failed(err)]);
    }

    #[test]
    fn rejected_hits_do_not_stop_the_loop() {
        let mut seq = four_on_the_floor(Scheduling::StepTimer);
        seq.backend_mut().reject_hits = Some("busy".into());
        seq.start().unwrap();
        fire(&mut seq);
        assert!(seq.is_playing());
        assert_eq!(seq.state().position(), 2);
    }

    #[test]
    fn toggle_flips_playback() {
        let mut seq = four_on_the_floor(Scheduling::StepTimer);
        assert_eq!(seq.toggle_playback(), Ok(true));
        assert_eq!(seq.toggle_playback(), Ok(false));
        assert!(!seq.is_playing());
    }

    #[test]
    fn accepted_mutations_are_published() {
        let mut seq = four_on_the_floor(Scheduling::StepTimer);
        let log = observed(&mut seq);
        assert!(seq.set_tempo(300).is_none());
        seq.set_tempo(90);
        seq.toggle_step(0, 1);
        seq.add_track(DrumKind::Cowbell);
        assert_eq!(
            log.changes(),
            vec![
                Change::Tempo(90),
                Change::StepToggled { track: 0, step: 1, active: true },
                Change::TrackAdded { index: 1 },
            ]
        );
    }

    #[test]
    fn shrinking_bars_while_running_keeps_position_in_range() {
        let mut seq = four_on_the_floor(Scheduling::StepTimer);
        seq.set_bars(2);
        seq.start().unwrap();
        for _ in 0..20 {
            fire(&mut seq);
        }
        seq.set_bars(1);
        fire(&mut seq);
        assert!(seq.current_step().is_some_and(|s| s < 16));
    }

    #[test]
    fn out_of_range_import_keeps_state() {
        let mut seq = four_on_the_floor(Scheduling::StepTimer);
        let log = observed(&mut seq);
        let before = seq.state().clone();
        let err = seq
            .import_json(r#"{"meta":{"bpm":999,"bars":1},"tracks":[]}"#)
            .unwrap_err();
        assert!(matches!(err, ImportError::OutOfRange(_)), "got {err:?}");
        assert_eq!(seq.state(), &before);
        assert!(log.changes().is_empty());
    }

    #[test]
    fn import_does_not_touch_the_transport() {
        let mut seq = four_on_the_floor(Scheduling::StepTimer);
        seq.start().unwrap();
        let json = r#"{"meta":{"bpm":100,"bars":1},"isPlaying":false,"currentStep":9}"#;
        assert_eq!(seq.import_json(json), Ok(Change::Imported));
        assert!(seq.is_playing());
        assert!(seq.state().is_playing());
        assert_eq!(seq.state().bpm(), 100);
        assert_eq!(seq.state().tracks().len(), 1, "tracks were not in the payload");
        assert_eq!(seq.state().position(), 1);
    }

    #[test]
    fn export_round_trips_through_import() {
        let mut seq = four_on_the_floor(Scheduling::StepTimer);
        seq.add_track(DrumKind::OpenHat);
        seq.set_envelope(1, EnvelopeParam::Sustain, 0.4);
        let json = seq.export_json();
        let before = seq.state().clone();

        let mut other: TestSequencer = Sequencer::new(
            config(Scheduling::StepTimer),
            RecordingBackend::new(),
            HostScheduler::new(),
        )
        .expect("valid config");
        other.import_json(&json).unwrap();
        assert_eq!(other.state(), &before);
    }

    #[test]
    fn reset_while_running_keeps_playing() {
        let mut seq = four_on_the_floor(Scheduling::StepTimer);
        seq.start().unwrap();
        assert_eq!(seq.reset(), Some(Change::Reset));
        assert_eq!(seq.state().tracks().len(), 3);
        assert!(seq.state().is_playing());
    }

    #[test]
    fn invalid_config_is_refused_up_front() {
        let bad = config(Scheduling::Lookahead {
            lookahead: 0.1,
            interval: -0.5,
        });
        let result: Result<TestSequencer, _> =
            Sequencer::new(bad, RecordingBackend::new(), HostScheduler::new());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn state_with_invalid_limits_is_refused() {
        let limits = crate::config::Limits {
            min_bpm: 0,
            ..Default::default()
        };
        let state = SequencerState::new(limits);
        let result: Result<TestSequencer, _> = Sequencer::with_state(
            config(Scheduling::StepTimer),
            state,
            RecordingBackend::new(),
            HostScheduler::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn teardown_stops_and_closes() {
        let mut seq = four_on_the_floor(Scheduling::StepTimer);
        seq.start().unwrap();
        seq.teardown();
        assert!(!seq.is_playing());
        assert_eq!(seq.backend().closed, 1);
        assert_eq!(seq.start(), Err(PlaybackError::Closed));
    }
}
