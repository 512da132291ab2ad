//! Speech synthesis engines.
//!
//! This module contains implementations of text-to-speech engines.
//!
//! # Available Engines
//!
//! Enable engines via Cargo features:
//! - `fastspeech` - FastSpeech2 + MelGAN (ONNX format, enabled by default)

#[cfg(feature = "fastspeech")]
pub mod fastspeech;
