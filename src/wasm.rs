//! JS-facing handle.
//!
//! The page owns one [`Beatbox`]. It polls `pending_tick` after every call
//! that may arm the transport, runs a `setTimeout` for `pending_delay_ms`,
//! and calls `fire` with the token when it elapses. An AudioWorklet pulls
//! samples through `render`.

use std::str::FromStr;

use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::config::BeatboxConfig;
use crate::dsp::engine::SoftwareBackend;
use crate::error::BeatboxError;
use crate::instrument::DrumKind;
use crate::persist::{self, StateRecord};
use crate::sequencer::Sequencer;
use crate::state::{EnvelopeParam, SequencerState};
use crate::synth::{AudioBackend, OutputState};
use crate::transport::{HostScheduler, TaskHandle};

#[derive(Serialize)]
struct CatalogEntry {
    name: &'static str,
    label: &'static str,
    icon: &'static str,
}

/// WASM-exposed: the instruments a track can use, as `{name, label, icon}`.
#[wasm_bindgen]
pub fn instrument_catalog() -> Result<JsValue, JsValue> {
    let entries: Vec<CatalogEntry> = DrumKind::ALL
        .iter()
        .map(|kind| CatalogEntry {
            name: kind.wire_name(),
            label: kind.label(),
            icon: kind.icon(),
        })
        .collect();
    serde_wasm_bindgen::to_value(&entries).map_err(|e| JsValue::from_str(&format!("{e}")))
}

#[wasm_bindgen]
pub struct Beatbox {
    inner: Sequencer<SoftwareBackend, HostScheduler>,
}

impl Beatbox {
    fn build(config: BeatboxConfig, state: SequencerState) -> Result<Self, JsValue> {
        let backend = SoftwareBackend::new(config.sample_rate);
        let inner = Sequencer::with_state(config, state, backend, HostScheduler::new())
            .map_err(js_error)?;
        Ok(Beatbox { inner })
    }
}

#[wasm_bindgen]
impl Beatbox {
    /// A sequencer with the default configuration and the demo pattern.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Result<Beatbox, JsValue> {
        let config = BeatboxConfig::default();
        let state = SequencerState::new(config.limits);
        Beatbox::build(config, state)
    }

    /// A sequencer configured from JSON.
    pub fn with_config(config_json: &str) -> Result<Beatbox, JsValue> {
        let config = BeatboxConfig::from_json(config_json).map_err(js_error)?;
        let state = SequencerState::new(config.limits);
        Beatbox::build(config, state)
    }

    /// A sequencer with the default configuration, restored from saved state.
    pub fn from_saved(state_json: &str) -> Result<Beatbox, JsValue> {
        let config = BeatboxConfig::default();
        let base = SequencerState::new(config.limits);
        let state = persist::deserialize(state_json, &base)
            .map_err(|e| JsValue::from_str(&e.report(state_json)))?;
        Beatbox::build(config, state)
    }

    // -- State ---------------------------------------------------------

    pub fn set_tempo(&mut self, bpm: u32) -> bool {
        self.inner.set_tempo(bpm).is_some()
    }

    pub fn set_bars(&mut self, bars: u32) -> bool {
        self.inner.set_bars(bars).is_some()
    }

    pub fn add_track(&mut self, drum: &str) -> Result<bool, JsValue> {
        let drum = parse_drum(drum)?;
        Ok(self.inner.add_track(drum).is_some())
    }

    pub fn remove_track(&mut self, index: usize) -> bool {
        self.inner.remove_track(index).is_some()
    }

    pub fn toggle_step(&mut self, track: usize, step: usize) -> bool {
        self.inner.toggle_step(track, step).is_some()
    }

    pub fn move_track(&mut self, from: usize, to: usize) -> bool {
        self.inner.move_track(from, to).is_some()
    }

    pub fn set_instrument(&mut self, track: usize, drum: &str) -> Result<bool, JsValue> {
        let drum = parse_drum(drum)?;
        Ok(self.inner.set_instrument(track, drum).is_some())
    }

    /// `param` is one of `attack`, `decay`, `sustain`, `release`.
    pub fn set_envelope(
        &mut self,
        track: usize,
        param: &str,
        value: f64,
    ) -> Result<bool, JsValue> {
        let param = EnvelopeParam::from_str(param).map_err(|e| JsValue::from_str(&e))?;
        Ok(self.inner.set_envelope(track, param, value).is_some())
    }

    pub fn reset(&mut self) {
        self.inner.reset();
    }

    pub fn bpm(&self) -> u32 {
        self.inner.state().bpm()
    }

    pub fn bars(&self) -> u32 {
        self.inner.state().bars()
    }

    pub fn step_count(&self) -> usize {
        self.inner.state().step_count()
    }

    /// The full state as a plain JS object, shaped like the export format.
    pub fn state(&self) -> Result<JsValue, JsValue> {
        let record = StateRecord::from(self.inner.state());
        serde_wasm_bindgen::to_value(&record).map_err(|e| JsValue::from_str(&format!("{e}")))
    }

    // -- Persistence ---------------------------------------------------

    pub fn export_json(&self) -> String {
        self.inner.export_json()
    }

    /// Errors carry a rendered diagnostic pointing into `text`.
    pub fn import_json(&mut self, text: &str) -> Result<(), JsValue> {
        self.inner
            .import_json(text)
            .map(|_| ())
            .map_err(|e| JsValue::from_str(&e.report(text)))
    }

    // -- Transport -----------------------------------------------------

    pub fn start(&mut self) -> Result<(), JsValue> {
        self.inner.start().map_err(js_error)
    }

    pub fn stop(&mut self) {
        self.inner.stop();
    }

    pub fn toggle_playback(&mut self) -> Result<bool, JsValue> {
        self.inner.toggle_playback().map_err(js_error)
    }

    pub fn is_playing(&self) -> bool {
        self.inner.is_playing()
    }

    /// The step most recently played, while running.
    pub fn current_step(&self) -> Option<usize> {
        self.inner.current_step()
    }

    /// Token of the tick waiting for a timer.
    pub fn pending_tick(&self) -> Option<u32> {
        self.inner.scheduler().pending().map(|(handle, _)| handle.raw())
    }

    pub fn pending_delay_ms(&self) -> Option<f64> {
        self.inner
            .scheduler()
            .pending()
            .map(|(_, delay)| delay.as_secs_f64() * 1000.0)
    }

    /// The timer for `token` elapsed.
    pub fn fire(&mut self, token: u32) {
        let handle = TaskHandle::from_raw(token);
        if self
            .inner
            .scheduler()
            .pending()
            .is_some_and(|(pending, _)| pending == handle)
        {
            self.inner.scheduler_mut().take();
        }
        self.inner.on_tick(handle);
    }

    // -- Audio ---------------------------------------------------------

    /// Render the next `frames` mono samples.
    pub fn render(&mut self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0_f32; frames];
        self.inner.backend_mut().render(&mut out);
        out
    }

    /// Resume the output from a user gesture without starting playback.
    pub fn resume_audio(&mut self) -> Result<(), JsValue> {
        self.inner.backend_mut().resume().map_err(js_error)
    }

    /// `suspended`, `running` or `closed`.
    pub fn audio_state(&self) -> String {
        match self.inner.backend().output_state() {
            OutputState::Suspended => "suspended",
            OutputState::Running => "running",
            OutputState::Closed => "closed",
        }
        .to_string()
    }

    pub fn sample_rate(&self) -> f64 {
        self.inner.backend().sample_rate
    }

    /// Stop playback and close the output. The handle is unusable after.
    pub fn destroy(&mut self) {
        self.inner.teardown();
    }
}

/// Errors cross into JS as their `BeatboxError` message.
fn js_error(err: impl Into<BeatboxError>) -> JsValue {
    JsValue::from_str(&err.into().to_string())
}

fn parse_drum(name: &str) -> Result<DrumKind, JsValue> {
    DrumKind::from_str(name).map_err(|e| JsValue::from_str(&format!("{e}")))
}
