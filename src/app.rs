use crate::{
    annotation::Annotator,
    classifier::{GestureClassifier, OrtClassifier},
    config::Config,
    detector::OrtLandmarkDetector,
    server::{HttpServer, SharedState},
    slots::{FrameSlot, ResultStore},
    telemetry::Metrics,
    worker::RecognitionWorker,
};

use std::{error::Error, sync::Arc};
use tokio::{signal, sync::broadcast, task::JoinError};

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    ort::init().with_name("handsign_stream").commit()?;

    let classifier = match OrtClassifier::new(&config.classifier) {
        Ok(classifier) => Arc::new(classifier),
        Err(e) => {
            tracing::error!("Failed to load classifier: {:?}", e);
            return Err(Box::new(e));
        }
    };
    tracing::info!(
        "Classifier expects {} features ({:?})",
        classifier.expected_len(),
        classifier.capability()
    );

    let detector = match OrtLandmarkDetector::new(&config.detector) {
        Ok(detector) => Arc::new(detector),
        Err(e) => {
            tracing::error!("Failed to load landmark detector: {:?}", e);
            return Err(Box::new(e));
        }
    };

    let annotator = Arc::new(Annotator::new(&config.annotation)?);
    let metrics = Arc::new(Metrics::new()?);
    let frame_slot = Arc::new(FrameSlot::new());
    let result_store = Arc::new(ResultStore::new());

    let state = SharedState::new(
        frame_slot.clone(),
        result_store.clone(),
        metrics.clone(),
        &config,
    );
    let server = HttpServer::new(state, &config).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_shutdown_rx = shutdown_tx.subscribe();
    let worker_shutdown_rx = shutdown_tx.subscribe();

    let worker_handle = RecognitionWorker::new(
        frame_slot,
        result_store,
        detector,
        classifier,
        annotator,
        metrics,
        config.recognition.get_worker_delay_ms(),
    )
    .start(worker_shutdown_rx);

    let mut server_handle = server.run(server_shutdown_rx).await?;

    let early_exit = tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received, starting graceful shutdown.");
            None
        }
        result = &mut server_handle => Some(result),
    };

    let _ = shutdown_tx.send(());
    if let Err(e) = worker_handle.await {
        tracing::error!("Recognition worker task failed: {}", e);
    }

    let server_result = match early_exit {
        Some(result) => result,
        None => server_handle.await,
    };
    server_outcome(server_result)?;

    Ok(())
}

fn server_outcome(result: Result<anyhow::Result<()>, JoinError>) -> anyhow::Result<()> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            tracing::error!("HTTP server failed: {:?}", e);
            Err(e)
        }
        Err(e) => {
            tracing::error!("HTTP server task aborted: {}", e);
            Err(e.into())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
