use crate::{
    config::Config,
    routes::api_routes,
    slots::{FrameSlot, ResultStore},
    telemetry::Metrics,
};
use axum::Router;
use axum_otel_metrics::HttpMetricsLayerBuilder;
use std::sync::Arc;
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};

/// Handles shared by every request. The two slots are the same instances the
/// recognition worker holds.
#[derive(Clone)]
pub struct SharedState {
    pub frame_slot: Arc<FrameSlot>,
    pub result_store: Arc<ResultStore>,
    pub metrics: Arc<Metrics>,
    pub response_wait_ms: u64,
    pub dev_password: String,
}

impl SharedState {
    pub fn new(
        frame_slot: Arc<FrameSlot>,
        result_store: Arc<ResultStore>,
        metrics: Arc<Metrics>,
        config: &Config,
    ) -> Self {
        Self {
            frame_slot,
            result_store,
            metrics,
            response_wait_ms: config.recognition.response_wait_ms,
            dev_password: config.dev.password.clone(),
        }
    }
}

pub fn app_router(state: SharedState) -> Router {
    let metrics_layer = HttpMetricsLayerBuilder::new().build();

    Router::new()
        .merge(api_routes())
        .with_state(state)
        .layer(metrics_layer)
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(state: SharedState, config: &Config) -> anyhow::Result<Self> {
        let addr = config.server.get_address();
        let router = app_router(state);
        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(
        self,
        mut shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    shutdown_rx.recv().await.ok();
                })
                .await?;
            Ok(())
        });

        Ok(server_handle)
    }
}
