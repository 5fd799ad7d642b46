use crate::config::{ClassifierConfig, Validatable};
use ndarray::Array2;
use ort::{
    memory::Allocator,
    session::{builder::GraphOptimizationLevel, Session, SessionOutputs},
    tensor::TensorElementType,
    value::{DynMapValueType, TensorRef, ValueType},
};
use parking_lot::Mutex;
use std::{
    fs::File,
    io::{self, BufRead},
    path::Path,
};
use thiserror::Error;

const SPACE_LABEL: &str = "space";

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("Failed to load labels: {0}")]
    Labels(#[from] io::Error),
    #[error("Invalid model: {0}")]
    InvalidModel(String),
    #[error("Feature vector has length {got}, model expects {expected}")]
    FeatureLength { got: usize, expected: usize },
    #[error("Model produced no label")]
    EmptyOutput,
}

/// What a classifier can report about its decision, fixed when the model is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierCapability {
    Probabilistic,
    Plain,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Probabilistic {
        label: String,
        probabilities: Vec<f32>,
    },
    Plain {
        label: String,
    },
}

impl Classification {
    /// Reported for classifiers that cannot produce a probability distribution.
    pub const PLACEHOLDER_CONFIDENCE: f64 = 85.0;

    /// Highest class probability as a percentage, rounded to two decimals.
    pub fn confidence(&self) -> f64 {
        match self {
            Classification::Probabilistic { probabilities, .. } => {
                let max = probabilities
                    .iter()
                    .copied()
                    .fold(f32::NEG_INFINITY, f32::max);
                if max.is_finite() {
                    (max as f64 * 100.0 * 100.0).round() / 100.0
                } else {
                    0.0
                }
            }
            Classification::Plain { .. } => Self::PLACEHOLDER_CONFIDENCE,
        }
    }

    /// Label as exposed to clients: `"space"` becomes a literal space.
    pub fn into_label(self) -> String {
        let label = match self {
            Classification::Probabilistic { label, .. } | Classification::Plain { label } => label,
        };
        if label == SPACE_LABEL {
            " ".to_string()
        } else {
            label
        }
    }
}

pub trait GestureClassifier: Send + Sync + 'static {
    /// Length of the feature vector the model was trained on.
    fn expected_len(&self) -> usize;

    fn classify(&self, features: &[f32]) -> Result<Classification, ClassifierError>;
}

pub fn load_labels(filepath: &Path) -> io::Result<Vec<String>> {
    let file = File::open(filepath)?;
    let reader = io::BufReader::new(file);
    let mut labels = Vec::new();

    for line_result in reader.lines() {
        let line = line_result?;
        let label = line.trim();
        if !label.is_empty() {
            labels.push(label.to_string());
        }
    }

    Ok(labels)
}

#[derive(Debug)]
enum LabelKind {
    Strings,
    ClassIds(Vec<String>),
}

/// Where the class probabilities come from. skl2onnx exports them either as a
/// plain float tensor (`zipmap=False`) or as a sequence of class-to-probability
/// maps (the default ZipMap).
#[derive(Debug, Clone, PartialEq)]
enum ProbabilityOutput {
    Tensor(String),
    ZipMap { name: String, key: TensorElementType },
}

#[derive(Debug, PartialEq)]
struct OutputSelection {
    label_output: String,
    label_type: TensorElementType,
    probabilities: Option<ProbabilityOutput>,
}

fn select_outputs(outputs: &[(&str, &ValueType)]) -> Result<OutputSelection, ClassifierError> {
    let (label_output, label_type) = outputs
        .iter()
        .find_map(|(name, value_type)| match value_type {
            ValueType::Tensor {
                ty: ty @ (TensorElementType::String | TensorElementType::Int64),
                ..
            } => Some((name.to_string(), *ty)),
            _ => None,
        })
        .ok_or_else(|| ClassifierError::InvalidModel("no label output".into()))?;

    let tensor = outputs.iter().find_map(|(name, value_type)| match value_type {
        ValueType::Tensor {
            ty: TensorElementType::Float32,
            ..
        } => Some(ProbabilityOutput::Tensor(name.to_string())),
        _ => None,
    });
    let probabilities = tensor.or_else(|| {
        outputs.iter().find_map(|(name, value_type)| match value_type {
            ValueType::Sequence(inner) => match inner.as_ref() {
                ValueType::Map {
                    key: key @ (TensorElementType::String | TensorElementType::Int64),
                    value: TensorElementType::Float32,
                } => Some(ProbabilityOutput::ZipMap {
                    name: name.to_string(),
                    key: *key,
                }),
                _ => None,
            },
            _ => None,
        })
    });

    Ok(OutputSelection {
        label_output,
        label_type,
        probabilities,
    })
}

/// Classifier exported from scikit-learn to ONNX. The label output may carry
/// strings or class ids; the probability output, when present, is read as the
/// class distribution.
pub struct OrtClassifier {
    session: Mutex<Session>,
    expected_len: usize,
    label_output: String,
    label_kind: LabelKind,
    probability_output: Option<ProbabilityOutput>,
}

impl OrtClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        config.validate().map_err(ClassifierError::InvalidModel)?;

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.num_threads)?
            .commit_from_file(config.get_path())?;

        let expected_len = session
            .inputs
            .first()
            .and_then(|input| input.input_type.tensor_shape())
            .and_then(|shape| shape.last().copied())
            .filter(|&dim| dim > 0)
            .ok_or_else(|| {
                ClassifierError::InvalidModel("input has no fixed feature dimension".into())
            })? as usize;

        let declared: Vec<(&str, &ValueType)> = session
            .outputs
            .iter()
            .map(|output| (output.name.as_str(), &output.output_type))
            .collect();
        let selection = select_outputs(&declared)?;

        let label_kind = match selection.label_type {
            TensorElementType::String => LabelKind::Strings,
            _ => {
                let path = config.get_labels_path().ok_or_else(|| {
                    ClassifierError::InvalidModel(
                        "model emits class ids but no labels file is configured".into(),
                    )
                })?;
                LabelKind::ClassIds(load_labels(&path)?)
            }
        };

        let classifier = Self {
            session: Mutex::new(session),
            expected_len,
            label_output: selection.label_output,
            label_kind,
            probability_output: selection.probabilities,
        };
        tracing::info!(
            "Loaded classifier {:?}: {} features, {:?}",
            config.get_path(),
            classifier.expected_len,
            classifier.capability()
        );

        Ok(classifier)
    }

    pub fn capability(&self) -> ClassifierCapability {
        match self.probability_output {
            Some(_) => ClassifierCapability::Probabilistic,
            None => ClassifierCapability::Plain,
        }
    }

    fn read_probabilities(
        &self,
        output: &ProbabilityOutput,
        outputs: &SessionOutputs<'_>,
    ) -> Result<Vec<f32>, ClassifierError> {
        match output {
            ProbabilityOutput::Tensor(name) => {
                let (_, probabilities) = outputs
                    .get(name)
                    .ok_or(ClassifierError::EmptyOutput)?
                    .try_extract_tensor::<f32>()?;
                Ok(probabilities.to_vec())
            }
            ProbabilityOutput::ZipMap { name, key } => {
                let maps = outputs
                    .get(name)
                    .ok_or(ClassifierError::EmptyOutput)?
                    .try_extract_sequence::<DynMapValueType>(&Allocator::default())?;
                let map = maps.first().ok_or(ClassifierError::EmptyOutput)?;
                let probabilities = match key {
                    TensorElementType::String => map
                        .try_extract_key_values::<String, f32>()?
                        .into_iter()
                        .map(|(_, p)| p)
                        .collect(),
                    _ => map
                        .try_extract_key_values::<i64, f32>()?
                        .into_iter()
                        .map(|(_, p)| p)
                        .collect(),
                };
                Ok(probabilities)
            }
        }
    }
}

impl GestureClassifier for OrtClassifier {
    fn expected_len(&self) -> usize {
        self.expected_len
    }

    fn classify(&self, features: &[f32]) -> Result<Classification, ClassifierError> {
        if features.len() != self.expected_len {
            return Err(ClassifierError::FeatureLength {
                got: features.len(),
                expected: self.expected_len,
            });
        }

        let input = Array2::from_shape_vec((1, self.expected_len), features.to_vec())
            .map_err(|e| ClassifierError::InvalidModel(e.to_string()))?;

        let mut session = self.session.lock();
        let tensor = TensorRef::from_array_view(input.view())?;
        let outputs = session.run(ort::inputs![tensor])?;

        let label_value = outputs
            .get(&self.label_output)
            .ok_or(ClassifierError::EmptyOutput)?;
        let label = match &self.label_kind {
            LabelKind::Strings => {
                let (_, labels) = label_value.try_extract_strings()?;
                labels.into_iter().next().ok_or(ClassifierError::EmptyOutput)?
            }
            LabelKind::ClassIds(names) => {
                let (_, ids) = label_value.try_extract_tensor::<i64>()?;
                let id = *ids.first().ok_or(ClassifierError::EmptyOutput)?;
                usize::try_from(id)
                    .ok()
                    .and_then(|index| names.get(index).cloned())
                    .unwrap_or_else(|| id.to_string())
            }
        };

        match &self.probability_output {
            Some(output) => Ok(Classification::Probabilistic {
                label,
                probabilities: self.read_probabilities(output, &outputs)?,
            }),
            None => Ok(Classification::Plain { label }),
        }
    }
}
