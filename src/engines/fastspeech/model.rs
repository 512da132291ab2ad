use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use ndarray::Array3;

use super::audio;
use super::interpreter::{InferenceBackend, Interpreter, OrtBackend, TensorData, TensorInput};
use super::text;
use super::vocab::SymbolVocabulary;
use crate::AudioBuffer;

/// Output slot of the acoustic model holding the mel spectrogram.
/// Slot 0 is the phoneme duration output, which the pipeline discards.
const MEL_OUTPUT_SLOT: usize = 1;

/// Output slot of the vocoder holding the waveform.
const WAVEFORM_OUTPUT_SLOT: usize = 0;

#[derive(thiserror::Error, Debug)]
pub enum FastSpeechError {
    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("Invalid vocabulary: {0}")]
    VocabLoad(String),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Interpreter protocol violation: {0}")]
    Protocol(&'static str),
    #[error("Model not loaded. Call load_model() first.")]
    ModelNotLoaded,
    #[error("No usable inference backend on this platform: {0}")]
    UnsupportedPlatform(String),
}

static RUNTIME: OnceLock<Result<(), String>> = OnceLock::new();

/// Initialize the process-wide inference runtime.
///
/// Idempotent; every model load calls this and exactly one caller commits
/// the ort environment, even under concurrent loads. Failure is fatal at
/// startup and stays cached — there is no fallback backend and no retry.
pub fn init_runtime() -> Result<(), FastSpeechError> {
    RUNTIME
        .get_or_init(|| {
            ort::init()
                .with_name("fastspeech-rs")
                .commit()
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
        .clone()
        .map_err(FastSpeechError::UnsupportedPlatform)
}

/// First stage: FastSpeech2. Text-derived symbol ids in, mel spectrogram out.
pub struct AcousticStage<B: InferenceBackend> {
    interpreter: Interpreter<B>,
}

impl<B: InferenceBackend> AcousticStage<B> {
    pub fn new(backend: B) -> Self {
        Self {
            interpreter: Interpreter::new(backend),
        }
    }

    /// Run the acoustic model over one utterance.
    ///
    /// Inputs are `ids: int32[1, N]`, `speaker_id: int32[1]` and
    /// `speed_ratio: float32[1]` (clamped to `[0, 1]`); the result is the
    /// spectrogram `float32[1, frames, mel_bins]`.
    pub fn infer(
        &mut self,
        ids: &[i32],
        speaker_id: i32,
        speed_ratio: f32,
    ) -> Result<Array3<f32>, FastSpeechError> {
        let speed_ratio = speed_ratio.clamp(0.0, 1.0);
        let inputs = vec![
            TensorInput::new(vec![1, ids.len()], TensorData::I32(ids.to_vec())),
            TensorInput::new(vec![1], TensorData::I32(vec![speaker_id])),
            TensorInput::new(vec![1], TensorData::F32(vec![speed_ratio])),
        ];
        let output = self.interpreter.run(inputs, MEL_OUTPUT_SLOT)?;
        into_array3(output.shape, output.data, "spectrogram")
    }
}

/// Second stage: MelGAN. Mel spectrogram in, raw waveform out.
pub struct VocoderStage<B: InferenceBackend> {
    interpreter: Interpreter<B>,
}

impl<B: InferenceBackend> VocoderStage<B> {
    pub fn new(backend: B) -> Self {
        Self {
            interpreter: Interpreter::new(backend),
        }
    }

    /// Convert a spectrogram into a waveform `float32[1, samples, 1]`.
    /// The input shape is taken directly from the acoustic stage's output.
    pub fn infer(&mut self, spectrogram: &Array3<f32>) -> Result<Array3<f32>, FastSpeechError> {
        let (batch, frames, mel_bins) = spectrogram.dim();
        let inputs = vec![TensorInput::new(
            vec![batch, frames, mel_bins],
            TensorData::F32(spectrogram.iter().copied().collect()),
        )];
        let output = self.interpreter.run(inputs, WAVEFORM_OUTPUT_SLOT)?;
        into_array3(output.shape, output.data, "waveform")
    }
}

fn into_array3(
    shape: Vec<usize>,
    data: Vec<f32>,
    what: &str,
) -> Result<Array3<f32>, FastSpeechError> {
    let [batch, len, channels]: [usize; 3] = shape.as_slice().try_into().map_err(|_| {
        FastSpeechError::Inference(format!("{what} output has shape {shape:?}, expected 3 dims"))
    })?;
    Ok(Array3::from_shape_vec((batch, len, channels), data)?)
}

/// The assembled text-to-speech pipeline: vocabulary plus both model stages.
pub struct FastSpeechModel<B: InferenceBackend> {
    vocab: SymbolVocabulary,
    acoustic: AcousticStage<B>,
    vocoder: VocoderStage<B>,
}

impl FastSpeechModel<OrtBackend> {
    /// Load the pipeline from a model directory.
    ///
    /// The directory must contain:
    /// - A FastSpeech2 ONNX export (`fastspeech2*.onnx`)
    /// - A MelGAN ONNX export (`melgan*.onnx`)
    /// - The `symbol_to_id.json` / `id_to_symbol.json` mapper pair
    pub fn load(model_dir: &Path, threads: usize) -> Result<Self, FastSpeechError> {
        init_runtime()?;

        let vocab = SymbolVocabulary::load(
            &model_dir.join("symbol_to_id.json"),
            &model_dir.join("id_to_symbol.json"),
        )?;

        let acoustic_path = find_model_file(model_dir, "fastspeech2")?;
        let vocoder_path = find_model_file(model_dir, "melgan")?;
        let acoustic = AcousticStage::new(OrtBackend::from_file(&acoustic_path, threads)?);
        let vocoder = VocoderStage::new(OrtBackend::from_file(&vocoder_path, threads)?);

        Ok(Self::from_parts(vocab, acoustic, vocoder))
    }
}

impl<B: InferenceBackend> FastSpeechModel<B> {
    /// Assemble a pipeline from already-built stages.
    ///
    /// Lets callers plug a non-ort backend behind the same pipeline.
    pub fn from_parts(
        vocab: SymbolVocabulary,
        acoustic: AcousticStage<B>,
        vocoder: VocoderStage<B>,
    ) -> Self {
        Self {
            vocab,
            acoustic,
            vocoder,
        }
    }

    /// Synthesize one whole utterance into a playable PCM buffer.
    ///
    /// A failure anywhere in the chain aborts this synthesis only; nothing
    /// already delivered to playback is affected.
    pub fn synthesize(
        &mut self,
        text: &str,
        speaker_id: i32,
        speed_ratio: f32,
    ) -> Result<AudioBuffer, FastSpeechError> {
        let normalized = text::normalize(text);
        let ids = text::encode(&normalized, &self.vocab);
        if log::log_enabled!(log::Level::Debug) {
            log::debug!("Encoded {} ids: {}", ids.len(), self.vocab.decode(&ids));
        }

        let spectrogram = self.acoustic.infer(&ids, speaker_id, speed_ratio)?;
        log::debug!("Spectrogram shape: {:?}", spectrogram.dim());

        let waveform = self.vocoder.infer(&spectrogram)?;
        log::debug!("Waveform shape: {:?}", waveform.dim());

        Ok(audio::build_audio_buffer(&waveform))
    }

    pub fn vocabulary(&self) -> &SymbolVocabulary {
        &self.vocab
    }
}

/// Find a model file in the directory whose name starts with `stem`.
///
/// Prefers the exact `<stem>.onnx`, then falls back to any `.onnx` file with
/// the stem as a name prefix (quantized exports ship as e.g.
/// `fastspeech2-quant.onnx`).
fn find_model_file(model_dir: &Path, stem: &str) -> Result<PathBuf, FastSpeechError> {
    let preferred = model_dir.join(format!("{stem}.onnx"));
    if preferred.exists() {
        return Ok(preferred);
    }

    for entry in std::fs::read_dir(model_dir)? {
        let path = entry?.path();
        let is_onnx = path.extension().and_then(|e| e.to_str()) == Some("onnx");
        let matches_stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s.starts_with(stem));
        if is_onnx && matches_stem {
            log::info!("Using {stem} model file: {}", path.display());
            return Ok(path);
        }
    }

    Err(FastSpeechError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("No {stem}*.onnx file found in {}", model_dir.display()),
    )))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::engines::fastspeech::interpreter::stub::{StubBackend, StubInputs};
    use crate::engines::fastspeech::vocab::tests::test_vocab;

    pub(crate) const STUB_MEL_BINS: usize = 4;
    pub(crate) const STUB_FRAMES_PER_ID: usize = 2;
    pub(crate) const STUB_SAMPLES_PER_FRAME: usize = 10;

    /// Acoustic stand-in: N ids become 2N frames of 4 mel bins; slot 0 is a
    /// duration tensor the pipeline must ignore.
    pub(crate) fn acoustic_stub(inputs: &StubInputs) -> Vec<(Vec<usize>, Vec<f32>)> {
        let ids = inputs[0].0[1];
        let frames = ids * STUB_FRAMES_PER_ID;
        vec![
            (vec![1, ids], vec![0.0; ids]),
            (vec![1, frames, STUB_MEL_BINS], vec![0.25; frames * STUB_MEL_BINS]),
        ]
    }

    /// Vocoder stand-in: F frames become 10F samples of amplitude 0.5.
    pub(crate) fn vocoder_stub(inputs: &StubInputs) -> Vec<(Vec<usize>, Vec<f32>)> {
        let frames = inputs[0].0[1];
        let samples = frames * STUB_SAMPLES_PER_FRAME;
        vec![(vec![1, samples, 1], vec![0.5; samples])]
    }

    /// Vocoder stand-in with a 6-frame capacity: longer spectrograms yield
    /// no output at all, so reading the waveform slot fails the same way an
    /// incompatible-shape invocation does.
    pub(crate) fn capped_vocoder_stub(inputs: &StubInputs) -> Vec<(Vec<usize>, Vec<f32>)> {
        if inputs[0].0[1] > 6 {
            return Vec::new();
        }
        vocoder_stub(inputs)
    }

    pub(crate) fn stub_model() -> FastSpeechModel<StubBackend> {
        FastSpeechModel::from_parts(
            test_vocab(),
            AcousticStage::new(StubBackend::new(3, acoustic_stub)),
            VocoderStage::new(StubBackend::new(1, vocoder_stub)),
        )
    }

    /// Pipeline that can only voice short utterances; see [`capped_vocoder_stub`].
    pub(crate) fn capped_model() -> FastSpeechModel<StubBackend> {
        FastSpeechModel::from_parts(
            test_vocab(),
            AcousticStage::new(StubBackend::new(3, acoustic_stub)),
            VocoderStage::new(StubBackend::new(1, capped_vocoder_stub)),
        )
    }

    #[test]
    fn acoustic_stage_reads_the_mel_slot() {
        let mut stage = AcousticStage::new(StubBackend::new(3, acoustic_stub));
        let mel = stage.infer(&[1, 2, 9], 1, 1.0).unwrap();
        assert_eq!(mel.dim(), (1, 6, STUB_MEL_BINS));
        assert!(mel.iter().all(|&v| v == 0.25));
    }

    #[test]
    fn vocoder_stage_consumes_the_spectrogram_shape() {
        let mut stage = VocoderStage::new(StubBackend::new(1, vocoder_stub));
        let mel = Array3::from_elem((1, 6, STUB_MEL_BINS), 0.25f32);
        let waveform = stage.infer(&mel).unwrap();
        assert_eq!(waveform.dim(), (1, 60, 1));
    }

    #[test]
    fn synthesize_chains_the_stages_deterministically() {
        let mut model = stub_model();
        // "hi" -> 2 ids + eos = 3 ids -> 6 frames -> 60 samples -> 120 bytes.
        let buffer = model.synthesize("hi", 1, 1.0).unwrap();
        assert_eq!(buffer.data.len(), 120);
        assert_eq!(buffer.sample_rate, 22050);
        let first = i16::from_le_bytes([buffer.data[0], buffer.data[1]]);
        assert_eq!(first, 16384);
    }

    #[test]
    fn runtime_init_is_idempotent() {
        let first = init_runtime().map_err(|e| e.to_string());
        let second = init_runtime().map_err(|e| e.to_string());
        // Whatever the first commit decided is what every later call sees.
        assert_eq!(first, second);
    }

    #[test]
    fn acoustic_stage_rejects_non_3d_output() {
        // A mel slot missing its batch dimension must fail, not be reshaped.
        fn flat_mel_stub(inputs: &StubInputs) -> Vec<(Vec<usize>, Vec<f32>)> {
            let ids = inputs[0].0[1];
            let frames = ids * STUB_FRAMES_PER_ID;
            vec![
                (vec![1, ids], vec![0.0; ids]),
                (vec![frames, STUB_MEL_BINS], vec![0.25; frames * STUB_MEL_BINS]),
            ]
        }
        let mut stage = AcousticStage::new(StubBackend::new(3, flat_mel_stub));
        let err = stage.infer(&[1, 2, 9], 1, 1.0).unwrap_err();
        assert!(matches!(err, FastSpeechError::Inference(_)));
    }

    #[test]
    fn vocoder_failure_aborts_the_synthesis() {
        let mut model = capped_model();
        // 13 ids -> 26 frames, past the stub's capacity.
        let err = model.synthesize("hello to who", 1, 1.0).unwrap_err();
        assert!(matches!(err, FastSpeechError::Inference(_)));
    }

    #[test]
    fn unknown_symbols_do_not_abort_synthesis() {
        let mut model = stub_model();
        // 'z' and '!' miss the test vocabulary; only "hi" + eos survive.
        let buffer = model.synthesize("z!hi", 1, 1.0).unwrap();
        assert_eq!(buffer.data.len(), 120);
    }
}
