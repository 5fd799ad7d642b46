//! The two single-value mailboxes shared by the request handlers and the
//! recognition worker. Each lock is held only long enough to move a value in
//! or out.

use crate::frame::Frame;
use crate::landmarks::FeatureVector;
use parking_lot::Mutex;

/// Holds at most one frame waiting to be processed. A new deposit replaces
/// whatever has not been drained yet.
#[derive(Debug, Default)]
pub struct FrameSlot {
    pending: Mutex<Option<Frame>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when an undrained frame was overwritten.
    pub fn deposit(&self, frame: Frame) -> bool {
        self.pending.lock().replace(frame).is_some()
    }

    /// Moves the pending frame out and clears the dirty state.
    pub fn take(&self) -> Option<Frame> {
        self.pending.lock().take()
    }

    pub fn is_dirty(&self) -> bool {
        self.pending.lock().is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub confidence: f64,
    pub features: FeatureVector,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishedResult {
    /// `data:image/jpeg;base64,...`, empty until the first frame is processed.
    pub annotated_image: String,
    pub prediction: Option<Prediction>,
}

#[derive(Debug, Default)]
pub struct ResultStore {
    current: Mutex<PublishedResult>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the published image. The prediction is only replaced when a new
    /// one is given, so the last successful recognition stays visible.
    pub fn publish(&self, annotated_image: String, prediction: Option<Prediction>) {
        let mut current = self.current.lock();
        current.annotated_image = annotated_image;
        if let Some(prediction) = prediction {
            current.prediction = Some(prediction);
        }
    }

    pub fn snapshot(&self) -> PublishedResult {
        self.current.lock().clone()
    }

    pub fn has_image(&self) -> bool {
        !self.current.lock().annotated_image.is_empty()
    }
}
