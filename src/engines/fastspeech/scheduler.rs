//! Background synthesis scheduling.
//!
//! One synthesis runs at a time per scheduler instance. A new `speak` joins
//! the in-flight worker before starting its own (wait-then-replace, never
//! cancel), so the model's interpreters are never invoked concurrently and
//! the queue never grows beyond depth 1. The host's per-frame `poll` only
//! takes the finished buffer out of the shared slot; it never computes and
//! never blocks on synthesis.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use super::engine::FastSpeechInferenceParams;
use super::interpreter::InferenceBackend;
use super::model::FastSpeechModel;
use crate::AudioBuffer;

/// Single-flight driver for asynchronous `speak` requests.
///
/// The finished buffer lands in a single slot, last write wins; a failed
/// synthesis logs the error and leaves the slot untouched.
pub struct SpeechScheduler<B: InferenceBackend + Send + 'static> {
    model: Arc<Mutex<FastSpeechModel<B>>>,
    /// Control parameters applied to every subsequent `speak`.
    pub params: FastSpeechInferenceParams,
    slot: Arc<Mutex<Option<AudioBuffer>>>,
    worker: Option<JoinHandle<()>>,
}

impl<B: InferenceBackend + Send + 'static> SpeechScheduler<B> {
    pub fn new(
        model: Arc<Mutex<FastSpeechModel<B>>>,
        params: FastSpeechInferenceParams,
    ) -> Self {
        Self {
            model,
            params,
            slot: Arc::new(Mutex::new(None)),
            worker: None,
        }
    }

    /// Synthesize `text` on a background thread.
    ///
    /// Blocks the *calling* thread until any in-flight synthesis completes,
    /// then launches the new one. The result becomes visible through
    /// [`poll`](Self::poll) once the worker finishes.
    pub fn speak(&mut self, text: &str) {
        self.join_worker();

        let model = Arc::clone(&self.model);
        let slot = Arc::clone(&self.slot);
        let params = self.params.clone();
        let text = text.to_string();

        self.worker = Some(std::thread::spawn(move || {
            let result = match model.lock() {
                Ok(mut model) => {
                    model.synthesize(&text, params.speaker_id, params.speed_ratio)
                }
                Err(_) => {
                    log::error!("Synthesis model mutex poisoned, dropping request");
                    return;
                }
            };
            match result {
                Ok(buffer) => {
                    if let Ok(mut slot) = slot.lock() {
                        *slot = Some(buffer);
                    }
                }
                // Contained to this task; the slot keeps whatever it held.
                Err(err) => log::error!("Speech synthesis failed: {err}"),
            }
        }));
    }

    /// Take the finished audio buffer, if one is ready.
    ///
    /// The host calls this once per frame. Non-blocking, never panics; each
    /// finished synthesis is observed exactly once.
    pub fn poll(&mut self) -> Option<AudioBuffer> {
        self.slot.lock().ok().and_then(|mut slot| slot.take())
    }

    /// True while a background synthesis is still running.
    pub fn is_synthesizing(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Join any in-flight synthesis. Called on teardown before the model
    /// resources can be released.
    pub fn shutdown(&mut self) {
        self.join_worker();
    }

    fn join_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Synthesis worker panicked");
            }
        }
    }
}

impl<B: InferenceBackend + Send + 'static> Drop for SpeechScheduler<B> {
    fn drop(&mut self) {
        self.join_worker();
    }
}
