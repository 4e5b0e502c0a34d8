//! Emotion classification via ONNX Runtime.
//!
//! Wraps the FER+ model: a 64x64 grayscale crop in, eight emotion logits
//! out. Scores are softmaxed and reported as percentages.

use crate::types::{ClassifierResult, Emotion};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

// --- Named constants ---
const FER_INPUT_SIZE: u32 = 64;
/// FER+ output order.
const FER_LABELS: [Emotion; 8] = [
    Emotion::Neutral,
    Emotion::Happy,
    Emotion::Surprise,
    Emotion::Sad,
    Emotion::Angry,
    Emotion::Disgust,
    Emotion::Fear,
    Emotion::Contempt,
];

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("model file not found: {0}; place the emotion ONNX model in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("empty frame")]
    EmptyFrame,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Coarse emotion classifier. `frame` is the face crop when a face was
/// located, else the whole frame.
///
/// Failures are returned, not swallowed; the caller decides on a fallback.
pub trait EmotionClassifier {
    fn classify(&mut self, frame: &RgbImage) -> Result<ClassifierResult, ClassifierError>;
}

/// FER+ emotion classifier (`emotion-ferplus-8.onnx`).
pub struct FerClassifier {
    session: Session,
}

impl FerClassifier {
    /// Load the FER+ ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, ClassifierError> {
        if !Path::new(model_path).exists() {
            return Err(ClassifierError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded FER+ model"
        );

        Ok(Self { session })
    }

    /// Grayscale, resize to 64x64 and lay out as NCHW with raw 0–255 values.
    fn preprocess(frame: &RgbImage) -> Array4<f32> {
        let size = FER_INPUT_SIZE;
        let gray = imageops::grayscale(frame);
        let resized = imageops::resize(&gray, size, size, FilterType::Triangle);

        let s = size as usize;
        let mut tensor = Array4::<f32>::zeros((1, 1, s, s));
        for (x, y, pixel) in resized.enumerate_pixels() {
            tensor[[0, 0, y as usize, x as usize]] = pixel[0] as f32;
        }
        tensor
    }
}

impl EmotionClassifier for FerClassifier {
    fn classify(&mut self, frame: &RgbImage) -> Result<ClassifierResult, ClassifierError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(ClassifierError::EmptyFrame);
        }

        let input = Self::preprocess(frame);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, logits) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::InferenceFailed(format!("emotion logits: {e}")))?;

        scores_from_logits(logits)
    }
}

/// Softmax FER+ logits into percentage scores keyed by emotion.
fn scores_from_logits(logits: &[f32]) -> Result<ClassifierResult, ClassifierError> {
    if logits.len() != FER_LABELS.len() {
        return Err(ClassifierError::InferenceFailed(format!(
            "expected {} logits, got {}",
            FER_LABELS.len(),
            logits.len()
        )));
    }

    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if !sum.is_finite() || sum <= 0.0 {
        return Err(ClassifierError::InferenceFailed(
            "non-finite emotion logits".into(),
        ));
    }

    let scores: BTreeMap<Emotion, f32> = FER_LABELS
        .iter()
        .zip(exps)
        .map(|(&label, e)| (label, e / sum * 100.0))
        .collect();

    ClassifierResult::from_scores(scores)
        .ok_or_else(|| ClassifierError::InferenceFailed("no emotion scores".into()))
}
