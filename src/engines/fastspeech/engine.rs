use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use derive_builder::Builder;

use crate::{AudioBuffer, SynthesisEngine};

use super::interpreter::OrtBackend;
use super::model::{FastSpeechError, FastSpeechModel};
use super::scheduler::SpeechScheduler;

/// Parameters for configuring FastSpeech2/MelGAN model loading.
#[derive(Debug, Clone, Builder)]
#[builder(default)]
pub struct FastSpeechModelParams {
    /// Worker-thread count for the inference engine's internal compute,
    /// independent of the crate's own scheduling thread.
    pub threads: usize,
}

impl Default for FastSpeechModelParams {
    fn default() -> Self {
        Self { threads: 4 }
    }
}

/// Parameters for configuring a synthesis request.
#[derive(Debug, Clone, Builder)]
#[builder(default)]
pub struct FastSpeechInferenceParams {
    /// Speaker embedding id of the multi-speaker acoustic model.
    pub speaker_id: i32,
    /// Speech speed control. Clamped to 0.0–1.0 at inference time.
    pub speed_ratio: f32,
}

impl Default for FastSpeechInferenceParams {
    fn default() -> Self {
        Self {
            speaker_id: 1,
            speed_ratio: 1.0,
        }
    }
}

/// FastSpeech2 + MelGAN text-to-speech engine.
///
/// Chains a FastSpeech2 acoustic model and a MelGAN vocoder into a
/// text-to-PCM pipeline. Synchronous synthesis goes through
/// [`SynthesisEngine::synthesize`]; hosts with a frame loop should take a
/// [`SpeechScheduler`] via [`scheduler`](Self::scheduler) instead and poll it
/// once per frame.
///
/// # Quick Start
///
/// ```rust,no_run
/// use fastspeech_rs::{SynthesisEngine, engines::fastspeech::FastSpeechEngine};
/// use std::path::PathBuf;
///
/// let mut engine = FastSpeechEngine::new();
/// engine.load_model(&PathBuf::from("models/fastspeech"))?;
/// let buffer = engine.synthesize("Hello, world!", None)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct FastSpeechEngine {
    model: Option<Arc<Mutex<FastSpeechModel<OrtBackend>>>>,
    model_path: Option<PathBuf>,
}

impl Default for FastSpeechEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FastSpeechEngine {
    pub fn new() -> Self {
        Self {
            model: None,
            model_path: None,
        }
    }

    /// Hand out a background scheduler sharing the loaded model.
    ///
    /// The scheduler keeps the model alive; dropping the engine does not
    /// tear down a scheduler still speaking.
    pub fn scheduler(
        &self,
        params: FastSpeechInferenceParams,
    ) -> Result<SpeechScheduler<OrtBackend>, FastSpeechError> {
        let model = self.model.as_ref().ok_or(FastSpeechError::ModelNotLoaded)?;
        Ok(SpeechScheduler::new(Arc::clone(model), params))
    }

    /// Number of symbols in the loaded vocabulary, if a model is loaded.
    pub fn vocabulary_size(&self) -> Option<usize> {
        let model = self.model.as_ref()?;
        let guard = model.lock().ok()?;
        Some(guard.vocabulary().len())
    }
}

impl Drop for FastSpeechEngine {
    fn drop(&mut self) {
        self.unload_model();
    }
}

impl SynthesisEngine for FastSpeechEngine {
    type SynthesisParams = FastSpeechInferenceParams;
    type ModelParams = FastSpeechModelParams;

    fn load_model_with_params(
        &mut self,
        model_path: &Path,
        params: Self::ModelParams,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let model = FastSpeechModel::load(model_path, params.threads)?;
        self.model = Some(Arc::new(Mutex::new(model)));
        self.model_path = Some(model_path.to_path_buf());
        Ok(())
    }

    fn unload_model(&mut self) {
        self.model = None;
        self.model_path = None;
    }

    fn synthesize(
        &mut self,
        text: &str,
        params: Option<Self::SynthesisParams>,
    ) -> Result<AudioBuffer, Box<dyn std::error::Error>> {
        let model = self.model.as_ref().ok_or(FastSpeechError::ModelNotLoaded)?;
        let p = params.unwrap_or_default();

        let mut guard = model.lock().map_err(|_| {
            FastSpeechError::Inference("synthesis model mutex poisoned".to_string())
        })?;
        Ok(guard.synthesize(text, p.speaker_id, p.speed_ratio)?)
    }
}
