use crate::{
    frame::{Frame, FrameError},
    server::SharedState,
    slots::PublishedResult,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;
use tokio::time::{sleep, Duration};
use tracing::instrument;

const DEFAULT_LABEL: &str = "-";

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("Invalid image payload: {0}")]
    InvalidImage(#[from] FrameError),
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        let status = match self {
            PredictError::InvalidImage(_) => StatusCode::BAD_REQUEST,
        };
        tracing::warn!("Rejecting /predict request: {}", self);
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Deserialize, Debug)]
pub struct PredictRequest {
    /// `<prefix>,<base64 image bytes>`
    pub image: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct PredictParams {
    #[serde(default)]
    pub debug: Option<String>,
}

impl PredictParams {
    fn debug(&self) -> bool {
        self.debug.as_deref() == Some("true")
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct PredictResponse {
    pub image: String,
    #[serde(rename = "char")]
    pub character: String,
    pub confidence: f64,
    pub processing_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmarks: Option<Vec<f32>>,
}

impl PredictResponse {
    fn from_result(result: PublishedResult, processing_time: f64, debug: bool) -> Self {
        let (character, confidence, features) = match result.prediction {
            Some(prediction) => (prediction.label, prediction.confidence, prediction.features),
            None => (DEFAULT_LABEL.to_string(), 0.0, Vec::new()),
        };

        Self {
            image: result.annotated_image,
            character,
            confidence,
            processing_time,
            landmarks: debug.then_some(features),
        }
    }
}

fn round_ms(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}

/// Hands the frame to the recognition worker, gives it one short wait, then
/// returns whatever result is current. That result may come from a frame
/// submitted by another request.
#[instrument(skip(state, request))]
pub async fn predict(
    State(state): State<SharedState>,
    Query(params): Query<PredictParams>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, PredictError> {
    let started = Instant::now();
    state.metrics.record_request("/predict");

    let frame = Frame::from_data_uri(&request.image)?;
    if state.frame_slot.deposit(frame) {
        tracing::debug!("Overwrote a frame the worker had not drained yet");
        state.metrics.record_frame_dropped();
    }

    sleep(Duration::from_millis(state.response_wait_ms)).await;

    let result = state.result_store.snapshot();
    let processing_time = round_ms(started.elapsed().as_secs_f64() * 1000.0);
    state.metrics.record_predict_duration(processing_time);

    Ok(Json(PredictResponse::from_result(
        result,
        processing_time,
        params.debug(),
    )))
}
