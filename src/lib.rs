mod annotation;
mod routes;
mod telemetry;

pub mod app;
pub mod classifier;
pub mod config;
pub mod detector;
pub mod frame;
pub mod landmarks;
pub mod server;
pub mod slots;
pub mod worker;

pub use annotation::{Annotator, BoundingBox};
pub use app::start_app;
pub use routes::{PredictRequest, PredictResponse, Status};
pub use telemetry::Metrics;
