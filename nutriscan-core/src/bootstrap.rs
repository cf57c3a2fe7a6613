//! Startup sequence: provision the model, load every dataset, and assemble the
//! prediction context. Any failure here aborts the process before the gateway
//! binds its listener.

use crate::config::{ModelConfig, NutriscanConfig};
use crate::echo::EchoOptions;
use crate::error::{InferenceError, NutriscanError};
use crate::inference::{Classifier, OnnxClassifier};
use crate::model_store::ModelStore;
use crate::nutrition::NutritionTable;
use crate::pipeline::PredictionContext;
use crate::preprocess::ImagePreprocessor;
use crate::vocabulary::Vocabulary;
use std::path::PathBuf;
use std::sync::Arc;

/// Make sure a verified model artifact is on disk and return its path.
pub async fn provision_model(config: &ModelConfig) -> Result<PathBuf, NutriscanError> {
    let store = ModelStore::from_config(config)?;
    Ok(store.ensure_available().await?)
}

/// Assemble a context around an already loaded classifier.
pub fn build_context(
    config: &NutriscanConfig,
    classifier: Arc<dyn Classifier>,
) -> Result<PredictionContext, NutriscanError> {
    let vocabulary = Vocabulary::new(config.pipeline.vocabulary.iter().cloned())?;
    let preprocessor = ImagePreprocessor::from_config(&config.preprocess);

    let mut builder = PredictionContext::builder(classifier, vocabulary).preprocessor(preprocessor);
    if config.pipeline.nutrition_enabled {
        builder = builder.nutrition(NutritionTable::load(&config.pipeline.nutrition_path)?);
    }
    if config.pipeline.echo_image {
        builder = builder.echo(EchoOptions {
            format: config.pipeline.echo_format,
            quality: config.pipeline.echo_quality,
        });
    }
    builder.build()
}

/// Full startup: validate, provision, load the ONNX model, build the context.
pub async fn bootstrap(config: &NutriscanConfig) -> Result<PredictionContext, NutriscanError> {
    config.validate()?;
    let model_path = provision_model(&config.model).await?;

    let input_shape = ImagePreprocessor::from_config(&config.preprocess).output_shape();
    let model_config = config.model.clone();
    let load_path = model_path.clone();
    let classifier = tokio::task::spawn_blocking(move || {
        OnnxClassifier::load(&load_path, &model_config, input_shape)
    })
    .await
    .map_err(|e| InferenceError::Load {
        path: model_path,
        message: format!("model loading task failed: {e}"),
    })??;

    build_context(config, Arc::new(classifier))
}
