//! Tensor protocol driver and inference backends.
//!
//! Both models in the pipeline take dynamically shaped inputs (the id
//! sequence length and the spectrogram frame count change per utterance), so
//! every invocation re-declares input shapes before binding data. The
//! [`Interpreter`] makes that protocol explicit and rejects out-of-order
//! calls instead of letting a stale shape or an unbound tensor reach the
//! engine.

use std::borrow::Cow;
use std::path::Path;

use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionInputValue};
use ort::value::Tensor;

use super::model::FastSpeechError;

/// Typed backing data for one input tensor.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    I32(Vec<i32>),
    F32(Vec<f32>),
}

impl TensorData {
    fn len(&self) -> usize {
        match self {
            TensorData::I32(v) => v.len(),
            TensorData::F32(v) => v.len(),
        }
    }
}

/// A shaped, typed input for one invocation.
#[derive(Debug, Clone)]
pub struct TensorInput {
    pub shape: Vec<usize>,
    pub data: TensorData,
}

impl TensorInput {
    pub fn new(shape: Vec<usize>, data: TensorData) -> Self {
        Self { shape, data }
    }
}

/// A model output read back after an invocation.
#[derive(Debug, Clone)]
pub struct OutputTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// Raw call surface of an inference engine.
///
/// Implementations may assume the calls arrive in protocol order; the
/// [`Interpreter`] wrapper enforces it.
pub trait InferenceBackend {
    /// Number of input tensors the loaded model declares.
    fn input_count(&self) -> usize;

    /// Declare the shape of one input tensor for the next invocation.
    fn resize_input(&mut self, index: usize, shape: &[usize]) -> Result<(), FastSpeechError>;

    /// Allocate backing storage for all tensors at the declared shapes.
    fn allocate_tensors(&mut self) -> Result<(), FastSpeechError>;

    /// Bind the data buffer for one input tensor.
    fn set_input_tensor_data(
        &mut self,
        index: usize,
        data: TensorData,
    ) -> Result<(), FastSpeechError>;

    /// Execute inference synchronously. This is the dominant latency cost of
    /// the pipeline and the only blocking point.
    fn invoke(&mut self) -> Result<(), FastSpeechError>;

    /// Shape of an output tensor, as reported by the model after `invoke`.
    fn output_shape(&self, index: usize) -> Result<Vec<usize>, FastSpeechError>;

    /// Read an output tensor into a freshly allocated buffer.
    fn read_output(&self, index: usize) -> Result<OutputTensor, FastSpeechError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Shaping,
    Allocated,
    Invoked,
}

/// Protocol state machine over an [`InferenceBackend`].
///
/// One invocation cycle is `resize* → allocate → bind* → invoke → read*`;
/// a `resize_input` in any state starts the next cycle. Every input must be
/// re-shaped and re-bound each cycle.
pub struct Interpreter<B: InferenceBackend> {
    backend: B,
    phase: Phase,
    shaped: Vec<bool>,
    bound: Vec<bool>,
}

impl<B: InferenceBackend> Interpreter<B> {
    pub fn new(backend: B) -> Self {
        let inputs = backend.input_count();
        Self {
            backend,
            phase: Phase::Shaping,
            shaped: vec![false; inputs],
            bound: vec![false; inputs],
        }
    }

    pub fn resize_input(
        &mut self,
        index: usize,
        shape: &[usize],
    ) -> Result<(), FastSpeechError> {
        if self.phase != Phase::Shaping {
            // A new cycle begins; previous shapes and bindings are stale.
            self.phase = Phase::Shaping;
            self.shaped.iter_mut().for_each(|s| *s = false);
            self.bound.iter_mut().for_each(|b| *b = false);
        }
        self.check_index(index)?;
        self.backend.resize_input(index, shape)?;
        self.shaped[index] = true;
        Ok(())
    }

    pub fn allocate_tensors(&mut self) -> Result<(), FastSpeechError> {
        if self.phase != Phase::Shaping {
            return Err(FastSpeechError::Protocol(
                "allocate_tensors called twice in one cycle",
            ));
        }
        if !self.shaped.iter().all(|&s| s) {
            return Err(FastSpeechError::Protocol(
                "allocate_tensors called before all inputs were shaped",
            ));
        }
        self.backend.allocate_tensors()?;
        self.phase = Phase::Allocated;
        Ok(())
    }

    pub fn set_input_tensor_data(
        &mut self,
        index: usize,
        data: TensorData,
    ) -> Result<(), FastSpeechError> {
        if self.phase != Phase::Allocated {
            return Err(FastSpeechError::Protocol(
                "set_input_tensor_data called before allocate_tensors",
            ));
        }
        self.check_index(index)?;
        self.backend.set_input_tensor_data(index, data)?;
        self.bound[index] = true;
        Ok(())
    }

    pub fn invoke(&mut self) -> Result<(), FastSpeechError> {
        if self.phase != Phase::Allocated {
            return Err(FastSpeechError::Protocol(
                "invoke called outside the allocated phase",
            ));
        }
        if !self.bound.iter().all(|&b| b) {
            return Err(FastSpeechError::Protocol(
                "invoke called before all inputs were bound",
            ));
        }
        self.backend.invoke()?;
        self.phase = Phase::Invoked;
        Ok(())
    }

    pub fn output_shape(&self, index: usize) -> Result<Vec<usize>, FastSpeechError> {
        if self.phase != Phase::Invoked {
            return Err(FastSpeechError::Protocol(
                "output_shape queried before invoke",
            ));
        }
        self.backend.output_shape(index)
    }

    pub fn read_output(&self, index: usize) -> Result<OutputTensor, FastSpeechError> {
        if self.phase != Phase::Invoked {
            return Err(FastSpeechError::Protocol("read_output called before invoke"));
        }
        self.backend.read_output(index)
    }

    /// Drive one full invocation cycle and read a single output.
    pub fn run(
        &mut self,
        inputs: Vec<TensorInput>,
        output_index: usize,
    ) -> Result<OutputTensor, FastSpeechError> {
        if inputs.len() != self.shaped.len() {
            return Err(FastSpeechError::Inference(format!(
                "model expects {} inputs, got {}",
                self.shaped.len(),
                inputs.len()
            )));
        }
        for (index, input) in inputs.iter().enumerate() {
            self.resize_input(index, &input.shape)?;
        }
        self.allocate_tensors()?;
        for (index, input) in inputs.into_iter().enumerate() {
            self.set_input_tensor_data(index, input.data)?;
        }
        self.invoke()?;
        self.read_output(output_index)
    }

    fn check_index(&self, index: usize) -> Result<(), FastSpeechError> {
        if index >= self.shaped.len() {
            return Err(FastSpeechError::Inference(format!(
                "input index {index} out of range ({} inputs)",
                self.shaped.len()
            )));
        }
        Ok(())
    }
}

/// ONNX Runtime backend: one `ort` session per model.
///
/// `invoke` materializes every float32 output eagerly; integer outputs (the
/// acoustic model's duration tensor) are left unread since the pipeline only
/// consumes float tensors. A session is not safe for concurrent invocation —
/// the scheduler's single-flight policy guarantees that never happens.
pub struct OrtBackend {
    session: Session,
    input_names: Vec<String>,
    output_names: Vec<String>,
    shapes: Vec<Option<Vec<usize>>>,
    pending: Vec<Option<TensorData>>,
    outputs: Vec<Option<OutputTensor>>,
}

impl OrtBackend {
    /// Build a session from model bytes already loaded into memory.
    pub fn from_memory(model_bytes: &[u8], threads: usize) -> Result<Self, FastSpeechError> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_execution_providers([CPUExecutionProvider::default().build()])?
            .with_intra_threads(threads)?
            .commit_from_memory(model_bytes)?;

        let input_names: Vec<String> = session
            .inputs
            .iter()
            .map(|i| i.name.to_string())
            .collect();
        let output_names: Vec<String> = session
            .outputs
            .iter()
            .map(|o| o.name.to_string())
            .collect();

        log::debug!(
            "Session ready: inputs {:?}, outputs {:?}",
            input_names,
            output_names
        );

        let inputs = input_names.len();
        Ok(Self {
            session,
            input_names,
            output_names,
            shapes: vec![None; inputs],
            pending: vec![None; inputs],
            outputs: Vec::new(),
        })
    }

    /// Load a model file fully into memory and build a session from it.
    pub fn from_file(path: &Path, threads: usize) -> Result<Self, FastSpeechError> {
        let bytes = std::fs::read(path)?;
        log::info!(
            "Loading model {} ({:.1} MB)",
            path.display(),
            bytes.len() as f64 / 1_048_576.0
        );
        Self::from_memory(&bytes, threads)
    }
}

impl InferenceBackend for OrtBackend {
    fn input_count(&self) -> usize {
        self.input_names.len()
    }

    fn resize_input(&mut self, index: usize, shape: &[usize]) -> Result<(), FastSpeechError> {
        self.shapes[index] = Some(shape.to_vec());
        self.pending[index] = None;
        self.outputs.clear();
        Ok(())
    }

    fn allocate_tensors(&mut self) -> Result<(), FastSpeechError> {
        // ort allocates at run time; shapes just have to be fully declared.
        if self.shapes.iter().any(|s| s.is_none()) {
            return Err(FastSpeechError::Inference(
                "allocate_tensors with undeclared input shape".to_string(),
            ));
        }
        Ok(())
    }

    fn set_input_tensor_data(
        &mut self,
        index: usize,
        data: TensorData,
    ) -> Result<(), FastSpeechError> {
        let shape = self.shapes[index]
            .as_ref()
            .ok_or(FastSpeechError::Protocol("input bound before resize"))?;
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(FastSpeechError::Inference(format!(
                "input {index}: {} elements bound for shape {shape:?} ({expected} expected)",
                data.len()
            )));
        }
        self.pending[index] = Some(data);
        Ok(())
    }

    fn invoke(&mut self) -> Result<(), FastSpeechError> {
        let mut inputs: Vec<(Cow<'_, str>, SessionInputValue<'_>)> =
            Vec::with_capacity(self.input_names.len());

        for (index, name) in self.input_names.iter().enumerate() {
            let shape: Vec<i64> = self.shapes[index]
                .as_ref()
                .ok_or(FastSpeechError::Protocol("invoke with unshaped input"))?
                .iter()
                .map(|&d| d as i64)
                .collect();
            let data = self.pending[index]
                .take()
                .ok_or(FastSpeechError::Protocol("invoke with unbound input"))?;
            let value = match data {
                TensorData::I32(v) => Tensor::from_array((shape, v))?.into_dyn(),
                TensorData::F32(v) => Tensor::from_array((shape, v))?.into_dyn(),
            };
            inputs.push((Cow::Borrowed(name.as_str()), value.into()));
        }

        let session_outputs = self.session.run(inputs)?;

        let mut outputs: Vec<Option<OutputTensor>> = vec![None; self.output_names.len()];
        for (name, value) in session_outputs.iter() {
            let Some(slot) = self.output_names.iter().position(|n| n == name) else {
                continue;
            };
            // Non-float outputs stay unmaterialized.
            if let Ok(array) = value.try_extract_array::<f32>() {
                outputs[slot] = Some(OutputTensor {
                    shape: array.shape().to_vec(),
                    data: array.iter().copied().collect(),
                });
            }
        }
        self.outputs = outputs;
        Ok(())
    }

    fn output_shape(&self, index: usize) -> Result<Vec<usize>, FastSpeechError> {
        self.read_output(index).map(|out| out.shape)
    }

    fn read_output(&self, index: usize) -> Result<OutputTensor, FastSpeechError> {
        self.outputs
            .get(index)
            .and_then(|o| o.clone())
            .ok_or_else(|| {
                FastSpeechError::Inference(format!("output {index} is absent or not float32"))
            })
    }
}


#[cfg(test)]
mod tests {
    use super::stub::{StubBackend, StubInputs};
    use super::*;

    fn echo_outputs(inputs: &StubInputs) -> Vec<(Vec<usize>, Vec<f32>)> {
        let (shape, _) = &inputs[0];
        let count: usize = shape.iter().product();
        vec![(shape.clone(), vec![1.0; count])]
    }

    fn interpreter() -> Interpreter<StubBackend> {
        Interpreter::new(StubBackend::new(1, echo_outputs))
    }

    #[test]
    fn full_cycle_reads_an_output() {
        let mut interp = interpreter();
        let out = interp
            .run(
                vec![TensorInput::new(vec![1, 3], TensorData::F32(vec![0.0; 3]))],
                0,
            )
            .unwrap();
        assert_eq!(out.shape, vec![1, 3]);
        assert_eq!(out.data, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn allocate_requires_all_shapes() {
        let mut interp = interpreter();
        let err = interp.allocate_tensors().unwrap_err();
        assert!(matches!(err, FastSpeechError::Protocol(_)));
    }

    #[test]
    fn bind_requires_allocate() {
        let mut interp = interpreter();
        interp.resize_input(0, &[1, 2]).unwrap();
        let err = interp
            .set_input_tensor_data(0, TensorData::F32(vec![0.0, 0.0]))
            .unwrap_err();
        assert!(matches!(err, FastSpeechError::Protocol(_)));
    }

    #[test]
    fn invoke_requires_all_bindings() {
        let mut interp = interpreter();
        interp.resize_input(0, &[1, 2]).unwrap();
        interp.allocate_tensors().unwrap();
        let err = interp.invoke().unwrap_err();
        assert!(matches!(err, FastSpeechError::Protocol(_)));
    }

    #[test]
    fn read_requires_invoke() {
        let mut interp = interpreter();
        interp.resize_input(0, &[1, 2]).unwrap();
        let err = interp.read_output(0).unwrap_err();
        assert!(matches!(err, FastSpeechError::Protocol(_)));
    }

    #[test]
    fn resize_begins_a_fresh_cycle() {
        let mut interp = interpreter();
        interp
            .run(
                vec![TensorInput::new(vec![1, 2], TensorData::F32(vec![0.0; 2]))],
                0,
            )
            .unwrap();

        // Shapes from the finished cycle must not leak into the next one.
        interp.resize_input(0, &[1, 5]).unwrap();
        interp.allocate_tensors().unwrap();
        interp
            .set_input_tensor_data(0, TensorData::F32(vec![0.0; 5]))
            .unwrap();
        interp.invoke().unwrap();
        assert_eq!(interp.output_shape(0).unwrap(), vec![1, 5]);
    }

    #[test]
    fn run_rejects_wrong_input_count() {
        let mut interp = interpreter();
        let err = interp.run(Vec::new(), 0).unwrap_err();
        assert!(matches!(err, FastSpeechError::Inference(_)));
    }
}
