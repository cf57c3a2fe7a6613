//! End-to-end tests: bootstrap-equivalent context over the bundled datasets,
//! driven through the HTTP router.

use axum::body::Body;
use axum::http::StatusCode;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use nutriscan_core::config::{DEFAULT_VOCABULARY, NutriscanConfig};
use nutriscan_core::gateway::{self, GatewayConfig};
use nutriscan_core::{MockClassifier, NutriscanError, build_context};
use pretty_assertions::assert_eq;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;
use tracing_subscriber::fmt::MakeWriter;

const BOUNDARY: &str = "XnutriscanBoundaryX";

fn bundled_nutrition() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../data/nutrition.yaml")
}

fn carrot_jpeg() -> Vec<u8> {
    let img = RgbImage::from_fn(320, 240, |x, _| {
        if x % 40 < 20 {
            Rgb([237, 145, 33])
        } else {
            Rgb([250, 160, 40])
        }
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Jpeg)
        .unwrap();
    buf.into_inner()
}

fn upload(payload: &[u8]) -> axum::http::Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"carrot.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    axum::http::Request::builder()
        .method("POST")
        .uri("/predict")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn carrot_scores() -> Vec<f32> {
    vec![0.02, 0.01, 0.01, 0.01, 0.03, 0.08, 0.04, 0.01, 0.02, 0.77]
}

fn app_with(classifier: Arc<MockClassifier>, config: &NutriscanConfig) -> axum::Router {
    let context = build_context(config, classifier).unwrap();
    gateway::router(Arc::new(context), &config.gateway)
}

fn default_config() -> NutriscanConfig {
    let mut config = NutriscanConfig::default();
    config.pipeline.nutrition_path = bundled_nutrition();
    config
}

/// In-memory sink for formatted log lines.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Route this thread's log events into a buffer until the guard drops.
fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let logs = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}

fn rejection_lines(logs: &str) -> Vec<&str> {
    logs.lines()
        .filter(|line| line.contains("Prediction rejected"))
        .collect()
}

async fn send(app: axum::Router, req: axum::http::Request<Body>) -> (StatusCode, Vec<u8>) {
    let resp = ServiceExt::<axum::http::Request<Body>>::oneshot(app, req)
        .await
        .unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), 50_000_000)
        .await
        .unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn test_carrot_photo_full_response() {
    let classifier = Arc::new(MockClassifier::new(carrot_scores()));
    let app = app_with(classifier.clone(), &default_config());

    let (status, body) = send(app, upload(&carrot_jpeg())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(classifier.calls(), 1);

    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["top"]["label"], "Wortel");
    let top_confidence = json["top"]["confidence"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&top_confidence));

    let others = json["others"].as_array().unwrap();
    assert_eq!(others.len(), DEFAULT_VOCABULARY.len() - 1);
    let mut previous = top_confidence;
    for entry in others {
        let c = entry["confidence"].as_f64().unwrap();
        assert!(c <= previous);
        previous = c;
        assert!(DEFAULT_VOCABULARY.contains(&entry["label"].as_str().unwrap()));
    }

    assert_eq!(json["nutrition"]["calories_kcal"], 41.0);
    assert_eq!(json["nutrition"]["serving"], "100 g");
    // extra dataset fields are carried through
    assert!(json["nutrition"].get("vitamin_a_ug").is_some());
    assert!(
        json["image"]
            .as_str()
            .unwrap()
            .starts_with("data:image/jpeg;base64,")
    );
}

#[tokio::test]
async fn test_empty_upload_is_rejected_before_inference() {
    let classifier = Arc::new(MockClassifier::new(carrot_scores()));
    let app = app_with(classifier.clone(), &default_config());

    let (status, body) = send(app, upload(&[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.is_empty());
    assert_eq!(classifier.calls(), 0);
}

#[tokio::test]
async fn test_empty_upload_is_logged_before_the_400() {
    let (logs, _guard) = capture_logs();
    let app = app_with(Arc::new(MockClassifier::new(carrot_scores())), &default_config());

    let (status, body) = send(app, upload(&[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.is_empty());

    let logs = logs.contents();
    let rejected = rejection_lines(&logs);
    assert_eq!(rejected.len(), 1, "{logs}");
    assert!(rejected[0].contains("WARN"), "{logs}");
    assert!(rejected[0].contains("stage=decoding"), "{logs}");
    assert!(rejected[0].contains("invalid_image"), "{logs}");
}

#[tokio::test]
async fn test_timeouts_report_the_stage_reached() {
    let (logs, _guard) = capture_logs();
    let classifier =
        Arc::new(MockClassifier::new(carrot_scores()).with_delay(Duration::from_secs(3)));
    let mut config = default_config();
    config.gateway.request_timeout_secs = 1;
    config.gateway.max_concurrent_predictions = 1;
    let app = app_with(classifier.clone(), &config);

    let (first, _) = send(app.clone(), upload(&carrot_jpeg())).await;
    let (second, _) = send(app, upload(&carrot_jpeg())).await;
    assert_eq!(first, StatusCode::BAD_REQUEST);
    assert_eq!(second, StatusCode::BAD_REQUEST);
    assert_eq!(classifier.calls(), 1);

    let logs = logs.contents();
    let rejected = rejection_lines(&logs);
    assert_eq!(rejected.len(), 2, "{logs}");
    assert!(rejected[0].contains("stage=inferring"), "{logs}");
    assert!(rejected[0].contains("timeout"), "{logs}");
    assert!(rejected[1].contains("stage=queued"), "{logs}");
    assert!(rejected[1].contains("timeout"), "{logs}");
}

#[tokio::test]
async fn test_minimal_variant_response() {
    let mut config = default_config();
    config.pipeline.nutrition_enabled = false;
    config.pipeline.echo_image = false;
    let app = app_with(Arc::new(MockClassifier::new(carrot_scores())), &config);

    let (status, body) = send(app, upload(&carrot_jpeg())).await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(keys.len(), 2);
    assert!(json.get("top").is_some());
    assert!(json.get("others").is_some());
}

#[tokio::test]
async fn test_repeated_requests_are_independent() {
    let classifier = Arc::new(MockClassifier::new(carrot_scores()));
    let context = build_context(&default_config(), classifier.clone()).unwrap();
    let context = Arc::new(context);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let app = gateway::router(Arc::clone(&context), &GatewayConfig::default());
        handles.push(tokio::spawn(async move {
            let (status, _) = send(app, upload(&carrot_jpeg())).await;
            status
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }
    assert_eq!(classifier.calls(), 4);
}

#[test]
fn test_vocabulary_mismatch_aborts_startup() {
    let err = build_context(&default_config(), Arc::new(MockClassifier::uniform(9))).unwrap_err();
    assert!(matches!(err, NutriscanError::DataIntegrity(_)));
    assert!(err.to_string().contains("10 labels"));
}
