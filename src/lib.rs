//! # fastspeech-rs
//!
//! A Rust library providing text-to-speech synthesis using a FastSpeech2
//! acoustic model chained with a MelGAN vocoder.
//!
//! ## Features
//!
//! - **FastSpeech2 + MelGAN**: Two-stage neural TTS producing 16-bit PCM at 22050 Hz
//! - **Background synthesis**: Single-flight scheduler keeps inference off the caller's thread
//! - **Number expansion**: Numeric literals are spoken as words before encoding
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! fastspeech-rs = "0.1"
//! ```
//!
//! ```ignore
//! use std::path::PathBuf;
//! use fastspeech_rs::{engines::fastspeech::FastSpeechEngine, SynthesisEngine};
//!
//! let mut engine = FastSpeechEngine::new();
//! engine.load_model(&PathBuf::from("models/fastspeech"))?;
//!
//! let buffer = engine.synthesize("Hello, world!", None)?;
//! buffer.write_wav(&PathBuf::from("output.wav"))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod engines;

use std::path::Path;

/// Loop behavior attached to a finished audio buffer.
///
/// Synthesized speech is one-shot, so the pipeline always emits
/// [`LoopMode::Disabled`]; the descriptor carries it so the playback
/// collaborator does not have to assume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    Disabled,
}

/// The result of a completed synthesis: a playable PCM clip.
///
/// Samples are 16-bit signed little-endian PCM, mono, ready for handoff to a
/// playback device.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// Raw little-endian 16-bit PCM bytes (2 bytes per sample).
    pub data: Vec<u8>,
    /// Sample rate of the audio (22050 for FastSpeech2/MelGAN).
    pub sample_rate: u32,
    /// Channel count (always 1 for this pipeline).
    pub channels: u16,
    /// Loop behavior for the playback collaborator.
    pub loop_mode: LoopMode,
    /// Loop end point, in samples.
    pub loop_end: usize,
}

impl AudioBuffer {
    /// Number of PCM samples in the buffer.
    pub fn sample_count(&self) -> usize {
        self.data.len() / 2
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.sample_count() as f64 / self.sample_rate as f64
    }

    /// Write the audio to a 16-bit integer WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let spec = hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for pair in self.data.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
        }
        writer.finalize()?;
        Ok(())
    }
}

/// Common interface for text-to-speech synthesis engines.
///
/// This trait defines the standard operations that all synthesis engines must support.
/// Each engine may have different parameter types for model loading and inference configuration.
pub trait SynthesisEngine {
    /// Parameters for configuring inference behavior (speaker, speed, etc.)
    type SynthesisParams;
    /// Parameters for configuring model loading (threads, etc.)
    type ModelParams: Default;

    /// Load a model from the specified path using default parameters.
    fn load_model(&mut self, model_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        self.load_model_with_params(model_path, Self::ModelParams::default())
    }

    /// Load a model from the specified path with custom parameters.
    fn load_model_with_params(
        &mut self,
        model_path: &Path,
        params: Self::ModelParams,
    ) -> Result<(), Box<dyn std::error::Error>>;

    /// Unload the currently loaded model and free associated resources.
    fn unload_model(&mut self);

    /// Synthesize speech from the given text.
    fn synthesize(
        &mut self,
        text: &str,
        params: Option<Self::SynthesisParams>,
    ) -> Result<AudioBuffer, Box<dyn std::error::Error>>;

    /// Synthesize speech from the given text and write to a WAV file.
    ///
    /// Default implementation calls `synthesize()` then `AudioBuffer::write_wav()`.
    fn synthesize_to_file(
        &mut self,
        text: &str,
        wav_path: &Path,
        params: Option<Self::SynthesisParams>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.synthesize(text, params)?.write_wav(wav_path)
    }
}
