//! # Prediction pipeline
//!
//! [`PredictionContext`] is built once at startup and shared read-only by every
//! request. One request moves through
//! `Received -> Queued -> Decoding -> Inferring -> Ranking -> NutritionJoin -> Responding`;
//! a failure at any stage ends it with a [`RequestFailure`] carrying the stage.
//! A [`RequestProgress`] shared with the caller records the current stage and
//! lets an abandoned request stop at the next stage boundary.

use crate::echo::{EchoOptions, encode_data_uri};
use crate::error::{NutriscanError, PredictionError};
use crate::inference::Classifier;
use crate::nutrition::{NutritionRecord, NutritionTable};
use crate::preprocess::ImagePreprocessor;
use crate::ranking::{RankedResult, ScoredLabel, rank};
use crate::vocabulary::Vocabulary;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Instant;

/// Where a request is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RequestStage {
    Received,
    /// Waiting for a free prediction slot.
    Queued,
    Decoding,
    Inferring,
    Ranking,
    NutritionJoin,
    Responding,
}

impl fmt::Display for RequestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Queued => "queued",
            Self::Decoding => "decoding",
            Self::Inferring => "inferring",
            Self::Ranking => "ranking",
            Self::NutritionJoin => "nutrition_join",
            Self::Responding => "responding",
        };
        f.write_str(name)
    }
}

impl RequestStage {
    const ALL: [RequestStage; 7] = [
        Self::Received,
        Self::Queued,
        Self::Decoding,
        Self::Inferring,
        Self::Ranking,
        Self::NutritionJoin,
        Self::Responding,
    ];

    fn from_index(index: u8) -> Self {
        Self::ALL
            .get(usize::from(index))
            .copied()
            .unwrap_or(Self::Responding)
    }
}

/// Progress of one request, shared between the caller and the thread running
/// the pipeline.
#[derive(Debug, Default)]
pub struct RequestProgress {
    stage: AtomicU8,
    cancelled: AtomicBool,
}

impl RequestProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last stage the request entered.
    pub fn stage(&self) -> RequestStage {
        RequestStage::from_index(self.stage.load(Ordering::Acquire))
    }

    /// Ask the pipeline to stop at the next stage boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Record entry into `stage`. Fails once the request has been cancelled.
    pub fn enter(&self, stage: RequestStage) -> Result<(), RequestFailure> {
        self.stage.store(stage as u8, Ordering::Release);
        if self.is_cancelled() {
            tracing::debug!(stage = %stage, "Abandoned request stopped");
            return Err(RequestFailure::new(stage, PredictionError::Cancelled));
        }
        Ok(())
    }
}

/// Terminal failure of one request.
#[derive(Debug, thiserror::Error)]
#[error("prediction failed while {stage}: {error}")]
pub struct RequestFailure {
    pub stage: RequestStage,
    #[source]
    pub error: PredictionError,
}

impl RequestFailure {
    pub fn new(stage: RequestStage, error: impl Into<PredictionError>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }

    /// Record the failure in the process log. Defects log at error level,
    /// bad input at warn.
    pub fn log(&self) {
        let kind = self.error.kind();
        if self.error.is_defect() {
            tracing::error!(stage = %self.stage, kind, error = %self.error, "Prediction failed");
        } else {
            tracing::warn!(stage = %self.stage, kind, error = %self.error, "Prediction rejected");
        }
    }
}

/// Successful prediction payload.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionResponse {
    pub top: ScoredLabel,
    pub others: Vec<ScoredLabel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nutrition: Option<NutritionRecord>,
    /// The upload re-encoded as a `data:` URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Immutable, shareable state for serving predictions.
pub struct PredictionContext {
    classifier: Arc<dyn Classifier>,
    preprocessor: ImagePreprocessor,
    vocabulary: Vocabulary,
    nutrition: Option<NutritionTable>,
    echo: Option<EchoOptions>,
}

impl fmt::Debug for PredictionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredictionContext")
            .field("classifier", &self.classifier.name())
            .field("preprocessor", &self.preprocessor)
            .field("vocabulary", &self.vocabulary)
            .field("nutrition", &self.nutrition.as_ref().map(NutritionTable::len))
            .field("echo", &self.echo)
            .finish()
    }
}

/// Assembles a [`PredictionContext`] and checks that its parts agree.
pub struct PredictionContextBuilder {
    classifier: Arc<dyn Classifier>,
    vocabulary: Vocabulary,
    preprocessor: ImagePreprocessor,
    nutrition: Option<NutritionTable>,
    echo: Option<EchoOptions>,
}

impl PredictionContextBuilder {
    pub fn preprocessor(mut self, preprocessor: ImagePreprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    /// Attach nutrition records to responses.
    pub fn nutrition(mut self, table: NutritionTable) -> Self {
        self.nutrition = Some(table);
        self
    }

    /// Echo the uploaded image back in responses.
    pub fn echo(mut self, options: EchoOptions) -> Self {
        self.echo = Some(options);
        self
    }

    /// Validate and build.
    ///
    /// Fails when the preprocessor output does not fit the model input, when
    /// the model output length differs from the vocabulary, or when a label
    /// lacks a nutrition record.
    pub fn build(self) -> Result<PredictionContext, NutriscanError> {
        let produced = self.preprocessor.output_shape();
        let accepted = self.classifier.input_shape();
        if produced != accepted {
            return Err(crate::error::InferenceError::ShapeMismatch {
                model: self.classifier.name().to_string(),
                expected: accepted.to_vec(),
                actual: produced.to_vec(),
            }
            .into());
        }

        let outputs = self.classifier.output_len()?;
        self.vocabulary.ensure_matches_outputs(outputs)?;

        if let Some(table) = &self.nutrition {
            table.validate(&self.vocabulary)?;
        }

        tracing::info!(
            model = self.classifier.name(),
            labels = self.vocabulary.len(),
            nutrition = self.nutrition.is_some(),
            echo = self.echo.is_some(),
            "Prediction context ready"
        );

        Ok(PredictionContext {
            classifier: self.classifier,
            preprocessor: self.preprocessor,
            vocabulary: self.vocabulary,
            nutrition: self.nutrition,
            echo: self.echo,
        })
    }
}

impl PredictionContext {
    pub fn builder(classifier: Arc<dyn Classifier>, vocabulary: Vocabulary) -> PredictionContextBuilder {
        PredictionContextBuilder {
            classifier,
            vocabulary,
            preprocessor: ImagePreprocessor::default(),
            nutrition: None,
            echo: None,
        }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn model_name(&self) -> &str {
        self.classifier.name()
    }

    pub fn nutrition_enabled(&self) -> bool {
        self.nutrition.is_some()
    }

    pub fn echo_enabled(&self) -> bool {
        self.echo.is_some()
    }

    /// Run one request through every stage. Blocking; call from a blocking
    /// thread when serving async traffic.
    pub fn predict(&self, bytes: &[u8]) -> Result<PredictionResponse, RequestFailure> {
        self.predict_tracked(bytes, &RequestProgress::new())
    }

    /// [`predict`](Self::predict), reporting each stage to `progress` and
    /// stopping early once it is cancelled.
    pub fn predict_tracked(
        &self,
        bytes: &[u8],
        progress: &RequestProgress,
    ) -> Result<PredictionResponse, RequestFailure> {
        let started = Instant::now();
        tracing::debug!(stage = %progress.stage(), bytes = bytes.len(), "Prediction request");

        progress.enter(RequestStage::Decoding)?;
        let image = self
            .preprocessor
            .decode(bytes)
            .map_err(|e| RequestFailure::new(RequestStage::Decoding, e))?;
        let tensor = self
            .preprocessor
            .prepare_image(&image)
            .map_err(|e| RequestFailure::new(RequestStage::Decoding, e))?;

        progress.enter(RequestStage::Inferring)?;
        let scores = self
            .classifier
            .predict(&tensor)
            .map_err(|e| RequestFailure::new(RequestStage::Inferring, e))?;

        progress.enter(RequestStage::Ranking)?;
        let RankedResult { top, others } = rank(&scores, &self.vocabulary)
            .map_err(|e| RequestFailure::new(RequestStage::Ranking, e))?;

        progress.enter(RequestStage::NutritionJoin)?;
        let nutrition = match &self.nutrition {
            Some(table) => Some(
                table
                    .lookup(&top.label)
                    .map_err(|e| RequestFailure::new(RequestStage::NutritionJoin, e))?
                    .clone(),
            ),
            None => None,
        };

        progress.enter(RequestStage::Responding)?;
        let image = match self.echo {
            Some(options) => Some(encode_data_uri(&image, options).map_err(|e| {
                RequestFailure::new(
                    RequestStage::Responding,
                    PredictionError::Encode(e.to_string()),
                )
            })?),
            None => None,
        };

        tracing::info!(
            label = %top.label,
            confidence = top.confidence,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Prediction complete"
        );

        Ok(PredictionResponse {
            top,
            others,
            nutrition,
            image,
        })
    }
}
