//! # Inference Engine
//!
//! A [`Classifier`] holds a loaded model for the process lifetime and runs one
//! forward pass per call. Implementations must be safe to call from several
//! request threads at once; [`OnnxClassifier`] serializes passes per session.

mod onnx;

pub use onnx::OnnxClassifier;

use crate::error::InferenceError;
use crate::preprocess::Tensor4D;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Raw model output: one confidence per vocabulary label, in label order.
pub type PredictionVector = Vec<f32>;

/// A loaded image classification model.
pub trait Classifier: Send + Sync {
    /// Model name for logs.
    fn name(&self) -> &str;

    /// The exact input shape `[batch, height, width, channels]` the model accepts.
    fn input_shape(&self) -> [usize; 4];

    /// Number of confidences a forward pass produces.
    fn output_len(&self) -> Result<usize, InferenceError>;

    /// Run one forward pass.
    fn predict(&self, input: &Tensor4D) -> Result<PredictionVector, InferenceError>;
}

/// Fail loudly when a tensor does not match the declared model input.
pub(crate) fn check_input_shape(
    model: &str,
    expected: [usize; 4],
    input: &Tensor4D,
) -> Result<(), InferenceError> {
    if input.shape() != expected.as_slice() {
        return Err(InferenceError::ShapeMismatch {
            model: model.to_string(),
            expected: expected.to_vec(),
            actual: input.shape().to_vec(),
        });
    }
    Ok(())
}

/// Reject NaN and infinite confidences before they reach the ranker.
pub(crate) fn check_finite(model: &str, output: &[f32]) -> Result<(), InferenceError> {
    match output.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(InferenceError::NonFinite {
            model: model.to_string(),
            index,
        }),
        None => Ok(()),
    }
}

/// A scripted classifier for tests and offline development.
///
/// Returns the same confidences for every input and counts calls.
pub struct MockClassifier {
    name: String,
    input_shape: [usize; 4],
    scores: PredictionVector,
    failure: Mutex<Option<String>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockClassifier {
    pub fn new(scores: PredictionVector) -> Self {
        Self {
            name: "mock-classifier".to_string(),
            input_shape: [1, 224, 224, 3],
            scores,
            failure: Mutex::new(None),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Uniform confidences over `len` labels.
    pub fn uniform(len: usize) -> Self {
        Self::new(vec![1.0 / len.max(1) as f32; len])
    }

    pub fn with_input_shape(mut self, shape: [usize; 4]) -> Self {
        self.input_shape = shape;
        self
    }

    /// Block every forward pass for `delay`, like a slow model.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make every following `predict` call fail with a runtime error.
    pub fn fail_with(&self, message: &str) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = Some(message.to_string());
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Classifier for MockClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_shape(&self) -> [usize; 4] {
        self.input_shape
    }

    fn output_len(&self) -> Result<usize, InferenceError> {
        Ok(self.scores.len())
    }

    fn predict(&self, input: &Tensor4D) -> Result<PredictionVector, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        check_input_shape(&self.name, self.input_shape, input)?;
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let failure = self
            .failure
            .lock()
            .map_err(|_| InferenceError::SessionPoisoned {
                model: self.name.clone(),
                index: 0,
            })?
            .clone();
        if let Some(message) = failure {
            return Err(InferenceError::Runtime {
                model: self.name.clone(),
                message,
            });
        }
        check_finite(&self.name, &self.scores)?;
        Ok(self.scores.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_returns_scores() {
        let model = MockClassifier::new(vec![0.1, 0.9]);
        let input = Tensor4D::zeros((1, 224, 224, 3));
        assert_eq!(model.predict(&input).unwrap(), vec![0.1, 0.9]);
        assert_eq!(model.output_len().unwrap(), 2);
        assert_eq!(model.calls(), 1);
    }

    #[test]
    fn test_shape_mismatch_fails_loudly() {
        let model = MockClassifier::uniform(3);
        let input = Tensor4D::zeros((1, 200, 224, 3));
        let err = model.predict(&input).unwrap_err();
        match err {
            InferenceError::ShapeMismatch { expected, actual, .. } => {
                assert_eq!(expected, vec![1, 224, 224, 3]);
                assert_eq!(actual, vec![1, 200, 224, 3]);
            }
            other => panic!("Expected ShapeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_mock_failure() {
        let model = MockClassifier::uniform(2);
        model.fail_with("device lost");
        let err = model
            .predict(&Tensor4D::zeros((1, 224, 224, 3)))
            .unwrap_err();
        assert!(err.to_string().contains("device lost"));
    }

    #[test]
    fn test_non_finite_rejected() {
        let model = MockClassifier::new(vec![0.5, f32::NAN]);
        let err = model
            .predict(&Tensor4D::zeros((1, 224, 224, 3)))
            .unwrap_err();
        assert!(matches!(err, InferenceError::NonFinite { index: 1, .. }));
    }

    #[test]
    fn test_delay_blocks_the_pass() {
        let model = MockClassifier::uniform(2).with_delay(Duration::from_millis(50));
        let started = std::time::Instant::now();
        model.predict(&Tensor4D::zeros((1, 224, 224, 3))).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_uniform_scores() {
        let model = MockClassifier::uniform(4);
        assert_eq!(model.scores, vec![0.25; 4]);
    }
}
