//! DSP — pure Rust rendering of drum hits.
//!
//! Used by the WASM build (samples pulled by an AudioWorklet) and by any
//! native host that feeds an output stream.

pub mod engine;
pub mod envelope;
pub mod filter;
pub mod oscillator;
pub mod voice;
