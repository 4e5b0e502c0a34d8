//! Face-mesh landmark extraction via ONNX Runtime.
//!
//! Runs a 468-point face-mesh model on a letterboxed RGB face crop and maps
//! the points back into coordinates normalized to that crop. The engine
//! places them in the full frame with [`crate::detector::FaceCrop`].

use crate::letterbox::Letterbox;
use crate::types::{LandmarkSet, FACE_MESH_POINTS};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

/// Canonical face-mesh indices used by the geometric features.
pub mod mesh {
    pub const LEFT_EYE_UPPER: usize = 159;
    pub const LEFT_EYE_LOWER: usize = 145;
    pub const RIGHT_EYE_UPPER: usize = 386;
    pub const RIGHT_EYE_LOWER: usize = 374;
    pub const UPPER_INNER_LIP: usize = 13;
    pub const LOWER_INNER_LIP: usize = 14;
    pub const MOUTH_LEFT: usize = 61;
    pub const MOUTH_RIGHT: usize = 291;
    pub const LEFT_EYEBROW: usize = 70;
    pub const NOSE_TIP: usize = 1;
    pub const NOSTRIL_LEFT: usize = 98;
    pub const NOSTRIL_RIGHT: usize = 327;
}

// --- Named constants ---
const MESH_INPUT_SIZE: u32 = 192;
/// Values per landmark in the model output (x, y, z).
const MESH_VALUES_PER_POINT: usize = 3;
const MESH_PAD_VALUE: u8 = 0;
/// Minimum face-presence probability to accept the landmarks.
const MESH_PRESENCE_THRESHOLD: f32 = 0.5;

#[derive(Error, Debug)]
pub enum LandmarkError {
    #[error("model file not found: {0}; place the face-mesh ONNX model in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("landmark set too small: expected at least {expected} points, got {actual}")]
    TooFewPoints { expected: usize, actual: usize },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Finds facial landmarks in a frame.
pub trait LandmarkExtractor {
    /// Returns `Ok(None)` when no face is present.
    fn detect(&mut self, frame: &RgbImage) -> Result<Option<LandmarkSet>, LandmarkError>;
}

/// Face-mesh landmark extractor (MediaPipe face-landmark model exported to ONNX).
///
/// Expects an NHWC `[1, 192, 192, 3]` input scaled to [0, 1] and two outputs:
/// 468×3 landmark coordinates in input pixels and a face-presence logit.
pub struct FaceMeshExtractor {
    session: Session,
    landmarks_idx: usize,
    presence_idx: Option<usize>,
}

impl FaceMeshExtractor {
    /// Load the face-mesh ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, LandmarkError> {
        if !Path::new(model_path).exists() {
            return Err(LandmarkError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded face-mesh model"
        );

        if output_names.is_empty() {
            return Err(LandmarkError::InferenceFailed(
                "face-mesh model has no outputs".into(),
            ));
        }

        let (landmarks_idx, presence_idx) = discover_outputs(&output_names);
        tracing::debug!(landmarks_idx, ?presence_idx, "face-mesh output mapping");

        Ok(Self {
            session,
            landmarks_idx,
            presence_idx,
        })
    }

    /// Letterbox the face crop into the square model input as an NHWC tensor.
    fn preprocess(frame: &RgbImage) -> (Array4<f32>, Letterbox) {
        let (canvas, letterbox) = Letterbox::render(frame, MESH_INPUT_SIZE, MESH_PAD_VALUE);

        let s = MESH_INPUT_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, s, s, 3));
        for (x, y, pixel) in canvas.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, y as usize, x as usize, c]] = pixel[c] as f32 / 255.0;
            }
        }

        (tensor, letterbox)
    }
}

impl LandmarkExtractor for FaceMeshExtractor {
    fn detect(&mut self, frame: &RgbImage) -> Result<Option<LandmarkSet>, LandmarkError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(None);
        }

        let (input, letterbox) = Self::preprocess(frame);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        if let Some(idx) = self.presence_idx {
            let (_, logit) = outputs[idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| LandmarkError::InferenceFailed(format!("face presence: {e}")))?;
            let presence = sigmoid(logit.first().copied().unwrap_or(f32::NEG_INFINITY));
            if presence < MESH_PRESENCE_THRESHOLD {
                tracing::trace!(presence, "no face in frame");
                return Ok(None);
            }
        }

        let (_, raw) = outputs[self.landmarks_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| LandmarkError::InferenceFailed(format!("landmarks: {e}")))?;

        decode_landmarks(raw, &letterbox).map(Some)
    }
}

/// Pick the landmark and face-presence outputs.
///
/// Exports name them inconsistently, so match on known names first and fall
/// back to positional order `[landmarks, presence]`.
fn discover_outputs(names: &[String]) -> (usize, Option<usize>) {
    let find = |candidates: &[&str]| {
        names
            .iter()
            .position(|n| candidates.iter().any(|c| n.eq_ignore_ascii_case(c)))
    };

    let landmarks = find(&["landmarks", "conv2d_21", "output_mesh_identity"]).unwrap_or(0);
    let presence = find(&["face_flag", "conv2d_31", "output_face_flag"])
        .or_else(|| (names.len() > 1).then(|| if landmarks == 0 { 1 } else { 0 }));

    (landmarks, presence)
}

fn decode_landmarks(raw: &[f32], letterbox: &Letterbox) -> Result<LandmarkSet, LandmarkError> {
    let count = raw.len() / MESH_VALUES_PER_POINT;
    if count < FACE_MESH_POINTS {
        return Err(LandmarkError::TooFewPoints {
            expected: FACE_MESH_POINTS,
            actual: count,
        });
    }

    let points = raw
        .chunks_exact(MESH_VALUES_PER_POINT)
        .map(|p| letterbox.to_normalized(p[0], p[1]))
        .collect();

    LandmarkSet::new(points)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
