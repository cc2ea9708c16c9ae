//! Test doubles shared by the unit tests.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::PlaybackError;
use crate::sequencer::SequencerObserver;
use crate::state::{Change, SequencerState};
use crate::synth::{AudioBackend, HitPlan, OutputState};

/// Records every hit instead of playing it. The clock is set by hand.
#[derive(Debug)]
pub struct RecordingBackend {
    pub now: f64,
    pub state: OutputState,
    pub hits: Vec<HitPlan>,
    /// When set, `resume` fails with this message.
    pub deny_resume: Option<String>,
    /// When set, `play` rejects every hit with this message.
    pub reject_hits: Option<String>,
    pub closed: usize,
}

impl RecordingBackend {
    pub fn new() -> Self {
        RecordingBackend {
            now: 0.0,
            state: OutputState::Suspended,
            hits: Vec::new(),
            deny_resume: None,
            reject_hits: None,
            closed: 0,
        }
    }

    /// Start times of the recorded hits.
    pub fn starts(&self) -> Vec<f64> {
        self.hits.iter().map(|h| h.start).collect()
    }
}

impl AudioBackend for RecordingBackend {
    fn current_time(&self) -> f64 {
        self.now
    }

    fn output_state(&self) -> OutputState {
        self.state
    }

    fn resume(&mut self) -> Result<(), PlaybackError> {
        if self.state == OutputState::Closed {
            return Err(PlaybackError::Closed);
        }
        if let Some(reason) = &self.deny_resume {
            return Err(PlaybackError::ResumeDenied(reason.clone()));
        }
        self.state = OutputState::Running;
        Ok(())
    }

    fn play(&mut self, hit: &HitPlan) -> Result<(), PlaybackError> {
        if let Some(reason) = &self.reject_hits {
            return Err(PlaybackError::Rejected(reason.clone()));
        }
        self.hits.push(hit.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<(), PlaybackError> {
        self.closed += 1;
        self.state = OutputState::Closed;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Changed(Change),
    Position(usize, f64),
    Failed(PlaybackError),
}

/// Observer that appends every notification to a shared log.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    pub events: Rc<RefCell<Vec<Event>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        RecordingObserver::default()
    }

    pub fn changes(&self) -> Vec<Change> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Changed(c) => Some(c.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn positions(&self) -> Vec<usize> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Position(step, _) => Some(*step),
                _ => None,
            })
            .collect()
    }
}

impl SequencerObserver for RecordingObserver {
    fn state_changed(&mut self, _state: &SequencerState, change: &Change) {
        self.events.borrow_mut().push(Event::Changed(change.clone()));
    }

    fn position_changed(&mut self, step: usize, time: f64) {
        self.events.borrow_mut().push(Event::Position(step, time));
    }

    fn playback_failed(&mut self, error: &PlaybackError) {
        self.events.borrow_mut().push(Event::Failed(error.clone()));
    }
}
