//! Error types for the nutriscan pipeline.
//!
//! Uses `thiserror` for structured error variants grouped by the stage that
//! produces them. Startup-fatal classes ([`ConfigError`], [`ProvisioningError`],
//! [`DataIntegrityError`]) abort bootstrap; per-request classes are collected in
//! [`PredictionError`] and translated to the uniform client failure at the gateway.

use std::path::PathBuf;

/// Top-level error type for the nutriscan core library.
#[derive(Debug, thiserror::Error)]
pub enum NutriscanError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provisioning error: {0}")]
    Provisioning(#[from] ProvisioningError),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Data integrity error: {0}")]
    DataIntegrity(#[from] DataIntegrityError),

    #[error("Prediction error: {0}")]
    Prediction(#[from] PredictionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors from resolving, verifying, or fetching the model artifact.
#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    #[error("Invalid model manifest {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "Model artifact {path} must be fetched but no source URL is configured \
         (set `url` in the manifest or `model.source_url`)"
    )]
    NoSource { path: PathBuf },

    #[error("Failed to fetch model from {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

impl ProvisioningError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn fetch(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Whether a further fetch attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch { .. })
    }
}

/// The uploaded bytes could not be decoded or resized into a model input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid image: {reason}")]
pub struct InvalidImage {
    pub reason: String,
}

impl InvalidImage {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Errors from loading the model or running a forward pass.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Failed to load model {path}: {message}")]
    Load { path: PathBuf, message: String },

    #[error("Input shape mismatch for model '{model}': expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        model: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Model '{model}' forward pass failed: {message}")]
    Runtime { model: String, message: String },

    #[error("Model '{model}' produced unusable output: {message}")]
    Output { model: String, message: String },

    #[error("Model '{model}' produced a non-finite confidence at index {index}")]
    NonFinite { model: String, index: usize },

    #[error("Session {index} of model '{model}' is poisoned")]
    SessionPoisoned { model: String, index: usize },
}

/// Deployment defects: the vocabulary, model, and nutrition dataset disagree.
#[derive(Debug, thiserror::Error)]
pub enum DataIntegrityError {
    #[error("Vocabulary is empty")]
    EmptyVocabulary,

    #[error("Vocabulary contains duplicate label '{label}'")]
    DuplicateLabel { label: String },

    #[error("Vocabulary has {vocabulary} labels but the model produces {model_outputs} outputs")]
    VocabularyMismatch {
        vocabulary: usize,
        model_outputs: usize,
    },

    #[error("No nutrition record for label '{label}'")]
    MissingNutrition { label: String },

    #[error("Nutrition record for '{label}' is invalid: {reason}")]
    InvalidNutrition { label: String, reason: String },

    #[error("Failed to read nutrition dataset {path}: {reason}")]
    NutritionDataset { path: PathBuf, reason: String },
}

/// Per-request failures, all surfaced to clients as the same bad-request signal.
#[derive(Debug, thiserror::Error)]
pub enum PredictionError {
    #[error("Request has no image upload in field '{field}'")]
    MissingUpload { field: String },

    #[error(transparent)]
    InvalidImage(#[from] InvalidImage),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    DataIntegrity(#[from] DataIntegrityError),

    #[error("Failed to encode echo image: {0}")]
    Encode(String),

    #[error("Prediction timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Prediction abandoned by its caller")]
    Cancelled,

    #[error("Prediction task failed: {0}")]
    Internal(String),
}

impl PredictionError {
    /// Stable short name used as the `kind` field in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingUpload { .. } => "missing_upload",
            Self::InvalidImage(_) => "invalid_image",
            Self::Inference(_) => "inference",
            Self::DataIntegrity(_) => "data_integrity",
            Self::Encode(_) => "encode",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled => "cancelled",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether the failure points at a defect in the service rather than bad input.
    pub fn is_defect(&self) -> bool {
        matches!(
            self,
            Self::Inference(_) | Self::DataIntegrity(_) | Self::Encode(_) | Self::Internal(_)
        )
    }
}
