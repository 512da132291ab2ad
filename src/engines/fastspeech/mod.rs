//! FastSpeech2 + MelGAN text-to-speech engine implementation.
//!
//! This module provides a two-stage neural TTS pipeline: a FastSpeech2
//! acoustic model converts symbol ids into a mel spectrogram, and a MelGAN
//! vocoder converts the spectrogram into a 22050 Hz waveform. Both models
//! run through ONNX Runtime with dynamically shaped inputs.
//!
//! # Model Directory Layout
//!
//! ```text
//! models/fastspeech/
//! ├── fastspeech2-quant.onnx   # acoustic model (LJSpeech-trained export)
//! ├── melgan.onnx              # vocoder
//! ├── symbol_to_id.json        # {symbol: id} mapper
//! └── id_to_symbol.json        # {"id": symbol} inverse mapper
//! ```
//!
//! The mapper files ship with the model export; both are validated against
//! each other at load time and must contain an `"eos"` entry.
//!
//! # Text Frontend
//!
//! Input text is lowercased and numeric literals are expanded to words
//! (`"42"` → `"forty two"`) before the character-level symbol lookup.
//! Characters missing from the vocabulary are logged and skipped.
//!
//! # Examples
//!
//! ## Synchronous Synthesis
//!
//! ```rust,no_run
//! use fastspeech_rs::{SynthesisEngine, engines::fastspeech::FastSpeechEngine};
//! use std::path::PathBuf;
//!
//! let mut engine = FastSpeechEngine::new();
//! engine.load_model(&PathBuf::from("models/fastspeech"))?;
//!
//! let buffer = engine.synthesize("Hello, world!", None)?;
//! println!("Generated {} samples at {}Hz", buffer.sample_count(), buffer.sample_rate);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Background Synthesis with a Frame Loop
//!
//! ```rust,no_run
//! use fastspeech_rs::{SynthesisEngine, engines::fastspeech::{
//!     FastSpeechEngine, FastSpeechInferenceParams,
//! }};
//! use std::path::PathBuf;
//!
//! let mut engine = FastSpeechEngine::new();
//! engine.load_model(&PathBuf::from("models/fastspeech"))?;
//!
//! let mut scheduler = engine.scheduler(FastSpeechInferenceParams::default())?;
//! scheduler.speak("Hello from the background!");
//!
//! // Host frame loop: hand finished audio to playback.
//! loop {
//!     if let Some(buffer) = scheduler.poll() {
//!         buffer.write_wav(&PathBuf::from("output.wav"))?;
//!         break;
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod audio;
pub mod engine;
pub mod interpreter;
pub mod model;
pub mod scheduler;
pub mod text;
pub mod vocab;

pub use engine::{
    FastSpeechEngine, FastSpeechInferenceParams, FastSpeechInferenceParamsBuilder,
    FastSpeechModelParams, FastSpeechModelParamsBuilder,
};
pub use model::{FastSpeechError, FastSpeechModel};
pub use scheduler::SpeechScheduler;
pub use vocab::SymbolVocabulary;
