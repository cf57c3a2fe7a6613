//! Prediction gateway server built on axum.

use super::GatewayConfig;
use crate::error::{InvalidImage, PredictionError};
use crate::pipeline::{
    PredictionContext, PredictionResponse, RequestFailure, RequestProgress, RequestStage,
};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tower_http::trace::TraceLayer;

/// Multipart form field carrying the uploaded image.
pub const UPLOAD_FIELD: &str = "file";

/// Shared handler state. Cloned per request; the context itself is never locked.
#[derive(Clone)]
pub struct GatewayState {
    context: Arc<PredictionContext>,
    request_timeout: Duration,
    /// One permit per decode and inference pass in flight.
    slots: Arc<Semaphore>,
    started_at: Instant,
}

impl GatewayState {
    pub fn new(context: Arc<PredictionContext>, config: &GatewayConfig) -> Self {
        Self {
            context,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            slots: Arc::new(Semaphore::new(config.max_concurrent_predictions.max(1))),
            started_at: Instant::now(),
        }
    }

    /// Uptime in seconds since the state was created.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Build an axum Router with `/predict`, `/health` and `/api/labels` routes.
pub fn router(context: Arc<PredictionContext>, config: &GatewayConfig) -> Router {
    Router::new()
        .route("/predict", post(predict_handler))
        .route("/health", get(health_handler))
        .route("/api/labels", get(labels_handler))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(GatewayState::new(context, config))
}

/// Classify one uploaded image.
async fn predict_handler(
    State(state): State<GatewayState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    match predict(&state, multipart).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(failure) => {
            failure.log();
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

async fn predict(
    state: &GatewayState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<PredictionResponse, RequestFailure> {
    let progress = Arc::new(RequestProgress::new());
    let _abandon = AbandonOnDrop(Arc::clone(&progress));

    // upload, queueing, decode and inference share one deadline
    let work = run_prediction(state, multipart, &progress);
    match tokio::time::timeout(state.request_timeout, work).await {
        Ok(result) => result,
        Err(_) => Err(RequestFailure::new(
            progress.stage(),
            PredictionError::Timeout {
                timeout_secs: state.request_timeout.as_secs(),
            },
        )),
    }
}

async fn run_prediction(
    state: &GatewayState,
    multipart: Result<Multipart, MultipartRejection>,
    progress: &Arc<RequestProgress>,
) -> Result<PredictionResponse, RequestFailure> {
    let multipart = multipart.map_err(|e| {
        RequestFailure::new(
            RequestStage::Received,
            InvalidImage::new(format!("malformed upload: {e}")),
        )
    })?;
    let bytes = read_upload(multipart).await?;

    progress.enter(RequestStage::Queued)?;
    let permit = Arc::clone(&state.slots).acquire_owned().await.map_err(|e| {
        RequestFailure::new(RequestStage::Queued, PredictionError::Internal(e.to_string()))
    })?;

    let context = Arc::clone(&state.context);
    let task_progress = Arc::clone(progress);
    let task = tokio::task::spawn_blocking(move || {
        // the slot stays taken until the pass stops, even after a timeout
        let _permit = permit;
        context.predict_tracked(&bytes, &task_progress)
    });

    task.await.map_err(|join_error| {
        RequestFailure::new(
            progress.stage(),
            PredictionError::Internal(join_error.to_string()),
        )
    })?
}

/// Cancels the pipeline pass once the handler stops waiting for it, on
/// timeout or client disconnect.
struct AbandonOnDrop(Arc<RequestProgress>);

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Pull the bytes of the upload field out of the form.
async fn read_upload(mut multipart: Multipart) -> Result<Bytes, RequestFailure> {
    let malformed = |e: axum::extract::multipart::MultipartError| {
        RequestFailure::new(
            RequestStage::Received,
            InvalidImage::new(format!("malformed upload: {e}")),
        )
    };

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        if field.name() == Some(UPLOAD_FIELD) {
            return field.bytes().await.map_err(malformed);
        }
    }
    Err(RequestFailure::new(
        RequestStage::Received,
        PredictionError::MissingUpload {
            field: UPLOAD_FIELD.to_string(),
        },
    ))
}

/// Health check endpoint.
async fn health_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "model": state.context.model_name(),
        "labels": state.context.vocabulary().len(),
        "uptime_secs": state.uptime_secs(),
    }))
}

/// The vocabulary in model output order.
async fn labels_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(state.context.vocabulary().clone())
}

/// Bind the configured address and serve until `shutdown` resolves.
pub async fn run(
    context: Arc<PredictionContext>,
    config: &GatewayConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let app = router(context, config);
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!("Gateway stopped");
    Ok(())
}
