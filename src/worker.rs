use crate::{
    annotation::Annotator,
    classifier::{ClassifierError, GestureClassifier},
    detector::{DetectorError, LandmarkDetector},
    frame::{Frame, FrameError},
    landmarks::{normalize, LandmarkError},
    slots::{FrameSlot, Prediction, ResultStore},
    telemetry::Metrics,
};
use std::{sync::Arc, time::Instant};
use thiserror::Error;
use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time::{sleep, Duration},
};
use tracing::instrument;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Landmark detection failed: {0}")]
    Detector(#[from] DetectorError),
    #[error("Classification failed: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("Invalid landmarks: {0}")]
    Landmarks(#[from] LandmarkError),
    #[error("Frame encoding failed: {0}")]
    Frame(#[from] FrameError),
}

/// Background consumer: drains the frame slot at a fixed cadence, recognises
/// the newest frame and publishes the annotated result.
#[derive(Clone)]
pub struct RecognitionWorker {
    frame_slot: Arc<FrameSlot>,
    result_store: Arc<ResultStore>,
    detector: Arc<dyn LandmarkDetector>,
    classifier: Arc<dyn GestureClassifier>,
    annotator: Arc<Annotator>,
    metrics: Arc<Metrics>,
    poll_interval: Duration,
}

impl RecognitionWorker {
    pub fn new(
        frame_slot: Arc<FrameSlot>,
        result_store: Arc<ResultStore>,
        detector: Arc<dyn LandmarkDetector>,
        classifier: Arc<dyn GestureClassifier>,
        annotator: Arc<Annotator>,
        metrics: Arc<Metrics>,
        poll_interval_ms: u64,
    ) -> Self {
        Self {
            frame_slot,
            result_store,
            detector,
            classifier,
            annotator,
            metrics,
            poll_interval: Duration::from_millis(poll_interval_ms),
        }
    }

    pub fn start(self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                "Recognition worker started, polling every {:?}",
                self.poll_interval
            );
            loop {
                tokio::select! {
                    _ = self.tick() => {},
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Recognition worker received shutdown signal");
                        break;
                    }
                }

                sleep(self.poll_interval).await;
            }
            tracing::info!("Recognition worker stopped");
        })
    }

    /// Runs one worker cycle. Returns the number of detected hands, or `None`
    /// when no frame was pending or the pass failed.
    pub async fn tick(&self) -> Option<usize> {
        let frame = self.frame_slot.take()?;

        let worker = self.clone();
        let started = Instant::now();
        match tokio::task::spawn_blocking(move || worker.process_frame(frame)).await {
            Ok(Ok(hands)) => {
                let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                self.metrics.record_worker_cycle(elapsed_ms, hands);
                Some(hands)
            }
            Ok(Err(err)) => {
                tracing::error!("Skipping frame: {}", err);
                None
            }
            Err(err) => {
                tracing::error!("Recognition pipeline aborted: {}", err);
                None
            }
        }
    }

    #[instrument(skip_all, fields(width = frame.width(), height = frame.height()))]
    fn process_frame(&self, mut frame: Frame) -> Result<usize, WorkerError> {
        let order = self.detector.channel_order();
        let converted;
        let detector_input = if frame.channel_order() == order {
            &frame
        } else {
            converted = frame.to_channel_order(order);
            &converted
        };

        let hands = self.detector.detect(detector_input)?;
        tracing::debug!("Detected {} hand(s)", hands.len());

        let mut prediction = None;
        for hand in &hands {
            let features = match normalize(hand, self.classifier.expected_len()) {
                Ok(features) => features,
                Err(err) => {
                    tracing::warn!("Ignoring hand: {}", err);
                    continue;
                }
            };

            let classification = self.classifier.classify(&features)?;
            let confidence = classification.confidence();
            let label = classification.into_label();

            self.annotator.annotate(&mut frame, hand, &label)?;
            tracing::debug!("Recognised {:?} ({:.2}%)", label, confidence);

            prediction = Some(Prediction {
                label,
                confidence,
                features,
            });
        }

        let image = frame.to_data_uri()?;
        self.result_store.publish(image, prediction);

        Ok(hands.len())
    }
}
