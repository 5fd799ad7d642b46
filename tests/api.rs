use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use handsign_stream::{
    classifier::{Classification, ClassifierError, GestureClassifier},
    config::AnnotationConfig,
    detector::{DetectorError, LandmarkDetector},
    frame::Frame,
    landmarks::{HandLandmarkSet, Point},
    server::{app_router, SharedState},
    slots::{FrameSlot, ResultStore},
    worker::RecognitionWorker,
    Annotator, Metrics, PredictResponse,
};
use http_body_util::BodyExt;
use image::{ImageFormat, Rgb, RgbImage};
use std::{io::Cursor, sync::Arc};
use tokio::sync::broadcast;
use tower::ServiceExt;

/// Sees a hand in every frame that is not black.
struct StubDetector;

impl LandmarkDetector for StubDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<HandLandmarkSet>, DetectorError> {
        if frame.pixels().get_pixel(0, 0).0 == [0, 0, 0] {
            return Ok(vec![]);
        }
        let points = (0..21)
            .map(|i| Point::new(0.3 + i as f32 * 0.01, 0.4 + i as f32 * 0.02))
            .collect();
        Ok(vec![HandLandmarkSet::new(points)])
    }
}

struct StubClassifier;

impl GestureClassifier for StubClassifier {
    fn expected_len(&self) -> usize {
        42
    }

    fn classify(&self, _features: &[f32]) -> Result<Classification, ClassifierError> {
        Ok(Classification::Probabilistic {
            label: "A".into(),
            probabilities: vec![0.01, 0.97, 0.02],
        })
    }
}

struct TestApp {
    router: Router,
    shutdown_tx: broadcast::Sender<()>,
}

impl TestApp {
    fn spawn(response_wait_ms: u64) -> Self {
        let frame_slot = Arc::new(FrameSlot::new());
        let result_store = Arc::new(ResultStore::new());
        let metrics = Arc::new(Metrics::new().unwrap());

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        RecognitionWorker::new(
            frame_slot.clone(),
            result_store.clone(),
            Arc::new(StubDetector),
            Arc::new(StubClassifier),
            Arc::new(Annotator::new(&AnnotationConfig::default()).unwrap()),
            metrics.clone(),
            5,
        )
        .start(shutdown_rx);

        let state = SharedState {
            frame_slot,
            result_store,
            metrics,
            response_wait_ms,
            dev_password: "secret".into(),
        };

        Self {
            router: app_router(state),
            shutdown_tx,
        }
    }

    async fn get(&self, uri: &str) -> axum::response::Response {
        self.router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn post_json(&self, uri: &str, body: serde_json::Value) -> axum::response::Response {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn predict(&self, image: &str) -> PredictResponse {
        let response = self
            .post_json("/predict", serde_json::json!({ "image": image }))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

fn data_uri(color: [u8; 3]) -> String {
    let image = RgbImage::from_pixel(64, 48, Rgb(color));
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png).unwrap();
    format!("data:image/png;base64,{}", STANDARD.encode(buf.into_inner()))
}

const HAND: [u8; 3] = [200, 180, 160];
const NO_HAND: [u8; 3] = [0, 0, 0];

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn predict_returns_recognised_gesture() {
    let app = TestApp::spawn(300);

    let response = app.predict(&data_uri(HAND)).await;

    assert_eq!(response.character, "A");
    assert_eq!(response.confidence, 97.0);
    assert!(response.image.starts_with("data:image/jpeg;base64,"));
    assert!(response.processing_time >= 300.0);
    assert!(response.landmarks.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn handless_frames_report_default_then_last_prediction() {
    let app = TestApp::spawn(300);

    let first = app.predict(&data_uri(NO_HAND)).await;
    assert_eq!(first.character, "-");
    assert_eq!(first.confidence, 0.0);

    let second = app.predict(&data_uri(HAND)).await;
    assert_eq!(second.character, "A");

    let third = app.predict(&data_uri(NO_HAND)).await;
    assert_eq!(third.character, "A");
    assert_eq!(third.confidence, 97.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn debug_flag_includes_feature_vector() {
    let app = TestApp::spawn(300);

    let response = app
        .post_json(
            "/predict?debug=true",
            serde_json::json!({ "image": data_uri(HAND) }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    let landmarks = body["landmarks"].as_array().unwrap();
    assert_eq!(landmarks.len(), 42);
    assert_eq!(landmarks[0].as_f64(), Some(0.0));
    assert_eq!(landmarks[1].as_f64(), Some(0.0));
}

#[tokio::test]
async fn debug_flag_without_prediction_returns_empty_landmarks() {
    let app = TestApp::spawn(0);

    let response = app
        .post_json(
            "/predict?debug=true",
            serde_json::json!({ "image": data_uri(NO_HAND) }),
        )
        .await;
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["char"], "-");
    assert_eq!(body["landmarks"], serde_json::json!([]));
}

#[tokio::test]
async fn malformed_payloads_are_client_errors() {
    let app = TestApp::spawn(0);

    let response = app
        .post_json("/predict", serde_json::json!({ "image": "not a data uri" }))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert!(body["error"].as_str().unwrap().contains("Invalid image payload"));

    let response = app
        .post_json(
            "/predict",
            serde_json::json!({ "image": "data:image/png;base64,!!!!" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_json("/predict", serde_json::json!({ "picture": "x" }))
        .await;
    assert!(response.status().is_client_error());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_requests_share_one_channel() {
    let app = TestApp::spawn(100);

    let hand = data_uri(HAND);
    let no_hand = data_uri(NO_HAND);
    let (a, b) = tokio::join!(app.predict(&hand), app.predict(&no_hand));

    // Either frame may have been overwritten before the worker drained it, and
    // each response may reflect the other request's frame.
    for response in [&a, &b] {
        assert!(response.character == "A" || response.character == "-");
    }
}

#[tokio::test]
async fn pages_and_dev_gate() {
    let app = TestApp::spawn(0);

    let response = app.get("/").await;
    assert!(response.status().is_redirection());
    assert_eq!(response.headers()[header::LOCATION], "/user");

    let response = app.get("/user").await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.get("/dev?password=wrong").await;
    assert!(response.status().is_redirection());
    assert_eq!(response.headers()[header::LOCATION], "/dev-login");

    let response = app.get("/dev").await;
    assert_eq!(response.headers()[header::LOCATION], "/dev-login");

    let response = app.get("/dev?password=secret").await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.get("/dev-login").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_and_metrics() {
    let app = TestApp::spawn(0);

    let response = app.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["status"], "Available");
    assert_eq!(body["result_available"], false);

    let response = app.get("/metrics").await;
    assert_eq!(response.status(), StatusCode::OK);
}
