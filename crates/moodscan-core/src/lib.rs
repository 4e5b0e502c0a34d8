//! moodscan-core: Facial emotion analysis primitives.
//!
//! An SCRFD detector locates the face; face-mesh landmarks and FER+ emotion
//! scores come from ONNX models run on that crop. The geometric feature
//! extractor and the correction rules turn them into one emotion verdict
//! per frame.

pub mod classifier;
pub mod correction;
pub mod detector;
pub mod features;
pub mod landmarks;
mod letterbox;
pub mod types;

pub use classifier::{ClassifierError, EmotionClassifier, FerClassifier};
pub use correction::{correct, Correction, CorrectionRule};
pub use detector::{largest_face, DetectorError, FaceBox, FaceCrop, FaceDetector, FaceLocator};
pub use features::{extract_features, BlinkState, FeatureExtractor, BLINK_THRESHOLD};
pub use landmarks::{FaceMeshExtractor, LandmarkError, LandmarkExtractor};
pub use types::{
    AnalysisRow, ClassifierResult, Emotion, GeometricFeatures, Landmark, LandmarkSet, TimeSeries,
};

use std::path::PathBuf;

/// Default file name of the SCRFD face detector model.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// Default file name of the face-mesh landmark model.
pub const LANDMARK_MODEL_FILE: &str = "face_landmark.onnx";
/// Default file name of the FER+ emotion model.
pub const EMOTION_MODEL_FILE: &str = "emotion-ferplus-8.onnx";

/// Model directory: `$XDG_DATA_HOME/moodscan/models`, else
/// `~/.local/share/moodscan/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("moodscan")
        .join("models")
}
