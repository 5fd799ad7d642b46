use crate::config::{DetectorConfig, Validatable};
use crate::frame::{ChannelOrder, Frame};
use crate::landmarks::{HandLandmarkSet, Point};
use image::imageops::{self, FilterType};
use ndarray::{Array, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    tensor::TensorElementType,
    value::{TensorRef, ValueType},
};
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("Model is missing output `{0}`")]
    MissingOutput(String),
    #[error("Unexpected landmark tensor size {got}, expected at least {expected}")]
    UnexpectedOutputSize { got: usize, expected: usize },
    #[error("Invalid model: {0}")]
    InvalidModel(String),
}

/// Finds hand keypoints in a frame.
pub trait LandmarkDetector: Send + Sync + 'static {
    /// Channel order the detector expects its input frame in.
    fn channel_order(&self) -> ChannelOrder {
        ChannelOrder::Rgb
    }

    fn detect(&self, frame: &Frame) -> Result<Vec<HandLandmarkSet>, DetectorError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TensorLayout {
    Nchw,
    Nhwc,
}

fn transform_frame(frame: &Frame, input_size: u32, layout: TensorLayout) -> Array<f32, Ix4> {
    let size = input_size as usize;
    let resized = imageops::resize(frame.pixels(), input_size, input_size, FilterType::Triangle);

    let mut input = match layout {
        TensorLayout::Nchw => Array::zeros((1, 3, size, size)),
        TensorLayout::Nhwc => Array::zeros((1, size, size, 3)),
    };
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for (c, value) in pixel.0.iter().enumerate() {
            let value = *value as f32 / 255.;
            match layout {
                TensorLayout::Nchw => input[[0, c, y, x]] = value,
                TensorLayout::Nhwc => input[[0, y, x, c]] = value,
            }
        }
    }
    input
}

/// Runs a single-hand landmark model (MediaPipe style: a flat tensor of
/// `num_landmarks` keypoints in input pixel units, plus an optional hand
/// presence score).
pub struct OrtLandmarkDetector {
    session: Mutex<Session>,
    input_size: u32,
    layout: TensorLayout,
    num_landmarks: usize,
    presence_threshold: f32,
    landmark_output: String,
    presence_output: Option<String>,
}

impl OrtLandmarkDetector {
    pub fn new(config: &DetectorConfig) -> Result<Self, DetectorError> {
        config.validate().map_err(DetectorError::InvalidModel)?;

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.num_threads)?
            .commit_from_file(config.get_path())?;

        let layout = match session
            .inputs
            .first()
            .and_then(|input| input.input_type.tensor_shape())
        {
            Some(shape) if shape.len() == 4 && shape[1] == 3 => TensorLayout::Nchw,
            Some(shape) if shape.len() == 4 => TensorLayout::Nhwc,
            _ => {
                return Err(DetectorError::InvalidModel(
                    "expected a single 4-dimensional image input".into(),
                ))
            }
        };

        let declared: Vec<(&str, &ValueType)> = session
            .outputs
            .iter()
            .map(|output| (output.name.as_str(), &output.output_type))
            .collect();
        let (landmark_output, presence_output) = select_outputs(
            &declared,
            config.landmark_output.as_deref(),
            config.presence_output.as_deref(),
        )?;

        tracing::info!(
            "Loaded landmark detector {:?} ({:?}, landmarks output `{}`, presence output {:?})",
            config.get_path(),
            layout,
            landmark_output,
            presence_output
        );

        Ok(Self {
            session: Mutex::new(session),
            input_size: config.input_size,
            layout,
            num_landmarks: config.num_landmarks,
            presence_threshold: config.presence_threshold,
            landmark_output,
            presence_output,
        })
    }
}

impl LandmarkDetector for OrtLandmarkDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<HandLandmarkSet>, DetectorError> {
        let input = transform_frame(frame, self.input_size, self.layout);

        let mut session = self.session.lock();
        let tensor = TensorRef::from_array_view(input.view())?;
        let outputs = session.run(ort::inputs![tensor])?;

        if let Some(name) = &self.presence_output {
            let (_, score) = outputs
                .get(name)
                .ok_or_else(|| DetectorError::MissingOutput(name.clone()))?
                .try_extract_tensor::<f32>()?;
            let score = score.first().copied().unwrap_or_default();
            if score < self.presence_threshold {
                tracing::debug!("No hand present (score {:.3})", score);
                return Ok(vec![]);
            }
        }

        let (_, data) = outputs
            .get(&self.landmark_output)
            .ok_or_else(|| DetectorError::MissingOutput(self.landmark_output.clone()))?
            .try_extract_tensor::<f32>()?;

        let hand = landmarks_from_tensor(data, self.num_landmarks, self.input_size as f32)?;
        Ok(vec![hand])
    }
}

/// Picks the landmark and presence outputs. Configured names win; otherwise the
/// first output holds the landmarks and the first other output with exactly
/// one element is read as the presence score.
fn select_outputs(
    outputs: &[(&str, &ValueType)],
    landmark_name: Option<&str>,
    presence_name: Option<&str>,
) -> Result<(String, Option<String>), DetectorError> {
    let find = |wanted: &str| {
        outputs
            .iter()
            .find(|(name, _)| *name == wanted)
            .map(|(name, _)| name.to_string())
            .ok_or_else(|| DetectorError::MissingOutput(wanted.to_string()))
    };

    let landmark_output = match landmark_name {
        Some(name) => find(name)?,
        None => outputs
            .first()
            .map(|(name, _)| name.to_string())
            .ok_or_else(|| DetectorError::InvalidModel("model has no outputs".into()))?,
    };

    let presence_output = match presence_name {
        Some(name) => Some(find(name)?),
        None => outputs
            .iter()
            .filter(|(name, _)| *name != landmark_output)
            .find(|(_, value_type)| is_scalar(value_type))
            .map(|(name, _)| name.to_string()),
    };

    Ok((landmark_output, presence_output))
}

/// True for float tensors holding a single value. Dynamic dimensions count as 1.
fn is_scalar(value_type: &ValueType) -> bool {
    match value_type {
        ValueType::Tensor {
            ty: TensorElementType::Float32,
            shape,
            ..
        } => shape.iter().all(|&dim| dim == 1 || dim == -1),
        _ => false,
    }
}

fn landmarks_from_tensor(
    data: &[f32],
    num_landmarks: usize,
    input_size: f32,
) -> Result<HandLandmarkSet, DetectorError> {
    let stride = if num_landmarks == 0 {
        0
    } else {
        data.len() / num_landmarks
    };
    if stride < 2 {
        return Err(DetectorError::UnexpectedOutputSize {
            got: data.len(),
            expected: num_landmarks * 2,
        });
    }

    let points = data
        .chunks_exact(stride)
        .take(num_landmarks)
        .map(|keypoint| Point::new(keypoint[0] / input_size, keypoint[1] / input_size))
        .collect();
    Ok(HandLandmarkSet::new(points))
}
