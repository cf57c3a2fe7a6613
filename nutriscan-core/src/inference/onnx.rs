//! ONNX Runtime backed classifier with a small session pool.

use super::{Classifier, PredictionVector, check_finite, check_input_shape};
use crate::config::ModelConfig;
use crate::error::InferenceError;
use crate::preprocess::Tensor4D;
use ort::logging::LogLevel;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::{TensorRef, ValueType};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Image classifier running an ONNX model.
///
/// `Session::run` needs exclusive access, so every session sits behind a
/// `Mutex` and calls are spread round-robin over the pool. With a pool of one,
/// forward passes are fully serialized.
pub struct OnnxClassifier {
    sessions: Vec<Mutex<Session>>,
    next_idx: AtomicUsize,
    input_name: String,
    output_name: String,
    input_shape: [usize; 4],
    declared_output_len: Option<usize>,
    model_path: PathBuf,
    model_name: String,
}

impl std::fmt::Debug for OnnxClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxClassifier")
            .field("sessions", &self.sessions.len())
            .field("input_name", &self.input_name)
            .field("output_name", &self.output_name)
            .field("input_shape", &self.input_shape)
            .field("model_path", &self.model_path)
            .finish()
    }
}

fn load_error(path: &Path, message: impl std::fmt::Display) -> InferenceError {
    InferenceError::Load {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

fn build_session(path: &Path, config: &ModelConfig) -> Result<Session, InferenceError> {
    let mut builder = Session::builder()
        .map_err(|e| load_error(path, e))?
        .with_log_level(LogLevel::Error)
        .map_err(|e| load_error(path, e))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| load_error(path, e))?;
    if let Some(threads) = config.intra_threads {
        builder = builder
            .with_intra_threads(threads)
            .map_err(|e| load_error(path, e))?;
    }
    builder
        .commit_from_file(path)
        .map_err(|e| load_error(path, format!("failed to create ONNX session: {e}")))
}

fn tensor_dims(value_type: &ValueType) -> Option<Vec<i64>> {
    match value_type {
        ValueType::Tensor { shape, .. } => Some(shape.iter().copied().collect()),
        _ => None,
    }
}

impl OnnxClassifier {
    /// Load `path` and check its declared input against `input_shape`
    /// (`[1, height, width, 3]`). Dynamic dimensions (`-1`) accept any size.
    pub fn load(
        path: &Path,
        config: &ModelConfig,
        input_shape: [usize; 4],
    ) -> Result<Self, InferenceError> {
        let pool_size = config.session_pool_size.max(1);
        let mut sessions = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            sessions.push(build_session(path, config)?);
        }

        let model_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown_model")
            .to_string();

        let first = &sessions[0];
        let input = match &config.input_name {
            Some(name) => first.inputs.iter().find(|i| &i.name == name),
            None => first.inputs.first(),
        }
        .ok_or_else(|| load_error(path, "model has no matching input tensor"))?;
        let output = match &config.output_name {
            Some(name) => first.outputs.iter().find(|o| &o.name == name),
            None => first.outputs.first(),
        }
        .ok_or_else(|| load_error(path, "model has no matching output tensor"))?;

        if let Some(dims) = tensor_dims(&input.input_type) {
            let compatible = dims.len() == 4
                && dims
                    .iter()
                    .zip(input_shape.iter())
                    .all(|(&declared, &wanted)| declared < 0 || declared as usize == wanted);
            if !compatible {
                return Err(InferenceError::ShapeMismatch {
                    model: model_name,
                    expected: input_shape.to_vec(),
                    actual: dims.iter().map(|&d| d.max(0) as usize).collect(),
                });
            }
        }

        let declared_output_len = tensor_dims(&output.output_type)
            .and_then(|dims| dims.last().copied())
            .filter(|&d| d > 0)
            .map(|d| d as usize);
        let input_name = input.name.clone();
        let output_name = output.name.clone();

        let classifier = Self {
            input_name,
            output_name,
            sessions: sessions.into_iter().map(Mutex::new).collect(),
            next_idx: AtomicUsize::new(0),
            input_shape,
            declared_output_len,
            model_path: path.to_path_buf(),
            model_name,
        };
        tracing::info!(
            model = %classifier.model_name,
            path = %path.display(),
            sessions = classifier.sessions.len(),
            input = %classifier.input_name,
            output = %classifier.output_name,
            "Loaded ONNX classifier"
        );
        Ok(classifier)
    }

    fn run(&self, input: &Tensor4D) -> Result<PredictionVector, InferenceError> {
        let runtime_error = |message: String| InferenceError::Runtime {
            model: self.model_name.clone(),
            message,
        };

        let tensor = TensorRef::from_array_view(input.view())
            .map_err(|e| runtime_error(format!("tensor conversion failed: {e}")))?;

        let idx = self.next_idx.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session = self.sessions[idx]
            .lock()
            .map_err(|_| InferenceError::SessionPoisoned {
                model: self.model_name.clone(),
                index: idx,
            })?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(|e| runtime_error(e.to_string()))?;

        let (shape, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::Output {
                model: self.model_name.clone(),
                message: format!("output '{}' is not an f32 tensor: {e}", self.output_name),
            })?;

        let dims: Vec<i64> = shape.iter().copied().collect();
        let per_item = match dims.as_slice() {
            [n] => *n,
            [1, n] => *n,
            other => {
                return Err(InferenceError::Output {
                    model: self.model_name.clone(),
                    message: format!("expected output shape [1, N], got {other:?}"),
                });
            }
        };
        if per_item < 0 || data.len() != per_item as usize {
            return Err(InferenceError::Output {
                model: self.model_name.clone(),
                message: format!(
                    "output holds {} values but declares shape {:?}",
                    data.len(),
                    dims
                ),
            });
        }
        Ok(data.to_vec())
    }
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn input_shape(&self) -> [usize; 4] {
        self.input_shape
    }

    /// Uses the declared output dimension, or a zero-input probe pass when it is dynamic.
    fn output_len(&self) -> Result<usize, InferenceError> {
        if let Some(len) = self.declared_output_len {
            return Ok(len);
        }
        let probe = Tensor4D::zeros(self.input_shape);
        let len = self.run(&probe)?.len();
        tracing::debug!(model = %self.model_name, outputs = len, "Probed output dimension");
        Ok(len)
    }

    fn predict(&self, input: &Tensor4D) -> Result<PredictionVector, InferenceError> {
        check_input_shape(&self.model_name, self.input_shape, input)?;
        let output = self.run(input)?;
        check_finite(&self.model_name, &output)?;
        Ok(output)
    }
}
