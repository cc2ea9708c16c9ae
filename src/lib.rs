pub mod config;
pub mod dsp;
pub mod error;
pub mod instrument;
pub mod persist;
pub mod sequencer;
pub mod state;
pub mod synth;
pub mod transport;
pub mod wasm;

#[cfg(test)]
mod testing;

pub use crate::config::BeatboxConfig;
pub use crate::error::BeatboxError;
pub use crate::instrument::DrumKind;
pub use crate::sequencer::{Sequencer, SequencerObserver};
pub use crate::state::{Change, SequencerState};

use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the beatbox-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}
