use crate::server::SharedState;
use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug)]
pub struct Status {
    pub status: String,
    /// Whether the worker has published at least one frame.
    pub result_available: bool,
    pub frame_pending: bool,
}

pub async fn healthcheck(State(state): State<SharedState>) -> Json<Status> {
    Json(Status {
        status: "Available".into(),
        result_available: state.result_store.has_image(),
        frame_pending: state.frame_slot.is_dirty(),
    })
}
