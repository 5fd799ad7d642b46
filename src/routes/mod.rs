mod health;
mod metrics;
mod pages;
mod predict;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};

pub use health::Status;
pub use predict::{PredictRequest, PredictResponse};

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(pages::index))
        .route("/user", get(pages::user_page))
        .route("/dev", get(pages::dev_page))
        .route("/dev-login", get(pages::dev_login))
        .route("/predict", post(predict::predict))
        .route("/health", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler))
}
