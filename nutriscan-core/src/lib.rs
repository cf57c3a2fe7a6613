//! # Nutriscan Core
//!
//! Core library for the nutriscan food image classifier.
//! Provides model provisioning, image preprocessing, ONNX inference, ranking,
//! nutrition lookup, the request pipeline, and the HTTP gateway.

pub mod bootstrap;
pub mod config;
pub mod echo;
pub mod error;
pub mod gateway;
pub mod inference;
pub mod model_store;
pub mod nutrition;
pub mod pipeline;
pub mod preprocess;
pub mod ranking;
pub mod vocabulary;

// Re-export commonly used types at the crate root.
pub use bootstrap::{bootstrap, build_context, provision_model};
pub use config::{NutriscanConfig, load_config};
pub use error::{
    ConfigError, DataIntegrityError, InferenceError, InvalidImage, NutriscanError,
    PredictionError, ProvisioningError,
};
pub use gateway::GatewayConfig;
pub use inference::{Classifier, MockClassifier, OnnxClassifier};
pub use model_store::{ArtifactState, ModelManifest, ModelStore};
pub use nutrition::{NutritionRecord, NutritionTable};
pub use pipeline::{
    PredictionContext, PredictionResponse, RequestFailure, RequestProgress, RequestStage,
};
pub use preprocess::{ImagePreprocessor, Tensor4D};
pub use ranking::{RankedResult, ScoredLabel, rank};
pub use vocabulary::Vocabulary;
