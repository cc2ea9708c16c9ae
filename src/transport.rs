//! Transport — the Stopped/Running state machine that walks the step grid.
//!
//! The transport decides *which* steps are due and *when* they should
//! sound; the [`Sequencer`](crate::sequencer::Sequencer) turns due steps
//! into hits. Ticks are cancellable delayed callbacks obtained from a
//! [`TickScheduler`]. Exactly one tick is armed while running, and a tick
//! whose handle is not the armed one is stale and must be ignored.

use std::time::Duration;

use log::debug;

use crate::config::Scheduling;
use crate::state::SequencerState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Running,
}

/// Identifies one scheduled tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u32);

impl TaskHandle {
    pub fn from_raw(raw: u32) -> Self {
        TaskHandle(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// A source of cancellable delayed callbacks.
///
/// When a scheduled task fires, the host calls
/// [`Sequencer::on_tick`](crate::sequencer::Sequencer::on_tick) with its
/// handle.
pub trait TickScheduler {
    fn schedule(&mut self, delay: Duration) -> TaskHandle;

    /// Cancel `handle` if it has not fired yet. Unknown handles are ignored.
    fn cancel(&mut self, handle: TaskHandle);
}

/// Keeps the one outstanding request for a host event loop to honour:
/// a JS `setTimeout`, a native loop, or a test.
#[derive(Debug, Default)]
pub struct HostScheduler {
    last_id: u32,
    pending: Option<(TaskHandle, Duration)>,
}

impl HostScheduler {
    pub fn new() -> Self {
        HostScheduler::default()
    }

    /// The tick waiting to be fired, with its delay.
    pub fn pending(&self) -> Option<(TaskHandle, Duration)> {
        self.pending
    }

    /// Remove and return the pending tick, as a timer does when it fires.
    pub fn take(&mut self) -> Option<(TaskHandle, Duration)> {
        self.pending.take()
    }
}

impl TickScheduler for HostScheduler {
    fn schedule(&mut self, delay: Duration) -> TaskHandle {
        self.last_id = self.last_id.wrapping_add(1);
        let handle = TaskHandle(self.last_id);
        self.pending = Some((handle, delay));
        handle
    }

    fn cancel(&mut self, handle: TaskHandle) {
        if matches!(self.pending, Some((pending, _)) if pending == handle) {
            self.pending = None;
        }
    }
}

/// A step the transport has decided to play.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub index: usize,
    /// Output clock time the step should sound at.
    pub time: f64,
}

#[derive(Debug, Clone)]
pub struct Transport {
    state: TransportState,
    scheduling: Scheduling,
    /// Target clock time of the next step (lookahead mode).
    next_time: f64,
    armed: Option<TaskHandle>,
    last_step: Option<usize>,
}

impl Transport {
    pub fn new(scheduling: Scheduling) -> Self {
        Transport {
            state: TransportState::Stopped,
            scheduling,
            next_time: 0.0,
            armed: None,
            last_step: None,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == TransportState::Running
    }

    /// The step most recently played.
    pub fn last_step(&self) -> Option<usize> {
        self.last_step
    }

    /// Stopped → Running. The step clock starts at `now`.
    pub fn start(&mut self, now: f64) {
        debug!("transport: start at {now:.3}s");
        self.state = TransportState::Running;
        self.next_time = now;
        self.armed = None;
        self.last_step = None;
    }

    /// Running → Stopped. Returns the armed tick so the caller can cancel
    /// it; stopping while stopped returns `None`.
    pub fn stop(&mut self) -> Option<TaskHandle> {
        if self.state == TransportState::Stopped {
            return None;
        }
        debug!("transport: stop");
        self.state = TransportState::Stopped;
        self.armed.take()
    }

    /// Accept a fired tick. Only the armed handle is accepted, once.
    pub fn claim(&mut self, handle: TaskHandle) -> bool {
        if self.state == TransportState::Running && self.armed == Some(handle) {
            self.armed = None;
            true
        } else {
            debug!("transport: ignoring stale tick {}", handle.raw());
            false
        }
    }

    pub fn arm(&mut self, handle: TaskHandle) {
        self.armed = Some(handle);
    }

    /// Collect the steps due at clock time `now`, advancing the position
    /// stored in `state` once per step. Tempo and loop length are read
    /// fresh for every step.
    pub fn due_steps(&mut self, state: &mut SequencerState, now: f64) -> Vec<Step> {
        let mut steps = Vec::new();
        match self.scheduling {
            Scheduling::StepTimer => {
                steps.push(self.advance(state, now));
            }
            Scheduling::Lookahead { lookahead, .. } => {
                if self.next_time < now - state.step_duration() {
                    debug!(
                        "transport: {:.3}s behind, resyncing step clock",
                        now - self.next_time
                    );
                    self.next_time = now;
                }
                while self.next_time < now + lookahead {
                    let time = self.next_time.max(now);
                    let duration = state.step_duration();
                    steps.push(self.advance(state, time));
                    self.next_time += duration;
                }
            }
        }
        steps
    }

    /// Delay until the next tick should fire. A delay that cannot be
    /// represented (zero tempo, a negative interval) saturates.
    pub fn next_delay(&self, state: &SequencerState) -> Duration {
        let seconds = match self.scheduling {
            Scheduling::StepTimer => state.step_duration(),
            Scheduling::Lookahead { interval, .. } => interval,
        };
        if seconds > 0.0 {
            Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        }
    }

    fn advance(&mut self, state: &mut SequencerState, time: f64) -> Step {
        let index = state.position();
        self.last_step = Some(index);
        state.set_position(index + 1);
        Step { index, time }
    }
}
