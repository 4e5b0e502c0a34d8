use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Number of points in the face-mesh landmark scheme.
pub const FACE_MESH_POINTS: usize = 468;

/// Confidence reported by [`ClassifierResult::fallback`].
pub const FALLBACK_CONFIDENCE: f32 = 40.0;

/// Emotion labels produced by the classifier and the correction rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Angry,
    Disgust,
    Fear,
    Happy,
    Sad,
    Surprise,
    Neutral,
    Contempt,
}

impl Emotion {
    pub const ALL: [Emotion; 8] = [
        Emotion::Angry,
        Emotion::Disgust,
        Emotion::Fear,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Surprise,
        Emotion::Neutral,
        Emotion::Contempt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Angry => "angry",
            Emotion::Disgust => "disgust",
            Emotion::Fear => "fear",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Surprise => "surprise",
            Emotion::Neutral => "neutral",
            Emotion::Contempt => "contempt",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown emotion label: {0}")]
pub struct UnknownEmotion(pub String);

impl FromStr for Emotion {
    type Err = UnknownEmotion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Emotion::ALL
            .into_iter()
            .find(|e| e.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownEmotion(s.to_string()))
    }
}

/// A single face landmark in normalized image coordinates ([0, 1]).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Face-mesh landmarks for one detected face.
///
/// Always holds at least [`FACE_MESH_POINTS`] points so the canonical
/// indices in [`crate::landmarks::mesh`] are valid.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: Vec<Landmark>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Landmark>) -> Result<Self, crate::landmarks::LandmarkError> {
        if points.len() < FACE_MESH_POINTS {
            return Err(crate::landmarks::LandmarkError::TooFewPoints {
                expected: FACE_MESH_POINTS,
                actual: points.len(),
            });
        }
        Ok(Self { points })
    }

    /// Landmark at a mesh index. Indices below [`FACE_MESH_POINTS`] never panic.
    pub fn point(&self, index: usize) -> Landmark {
        self.points[index]
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Facial metrics derived from one [`LandmarkSet`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeometricFeatures {
    pub blink: bool,
    pub avg_eye_aperture: f32,
    pub mouth_open: f32,
    pub mouth_width: f32,
    /// Eyebrow y minus upper-eyelid y. A raised brow is more negative.
    pub eyebrow_lift: f32,
    pub nose_x: f32,
    pub nose_flare: f32,
}

/// Output of the emotion classifier for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierResult {
    pub dominant: Emotion,
    /// Per-label scores as percentages (0–100).
    pub scores: BTreeMap<Emotion, f32>,
}

impl ClassifierResult {
    /// Build a result from raw scores, picking the highest-scoring label.
    ///
    /// Returns `None` when `scores` is empty.
    pub fn from_scores(scores: BTreeMap<Emotion, f32>) -> Option<Self> {
        let dominant = scores
            .iter()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(e, _)| *e)?;
        Some(Self { dominant, scores })
    }

    /// Result substituted when the classifier fails.
    pub fn fallback() -> Self {
        Self {
            dominant: Emotion::Neutral,
            scores: BTreeMap::from([(Emotion::Neutral, FALLBACK_CONFIDENCE)]),
        }
    }

    pub fn score(&self, emotion: Emotion) -> Option<f32> {
        self.scores.get(&emotion).copied()
    }
}

/// One output row per sampled frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRow {
    pub timestamp_secs: u64,
    pub emotion: Emotion,
    pub confidence: f32,
    /// `None` when no face was detected in the frame.
    pub features: Option<GeometricFeatures>,
}

impl AnalysisRow {
    /// 1 when a blink started on this frame, else 0 (including no-face rows).
    pub fn blink(&self) -> u8 {
        match self.features {
            Some(f) if f.blink => 1,
            _ => 0,
        }
    }

    pub fn has_face(&self) -> bool {
        self.features.is_some()
    }
}

/// Rows in sampling order, with non-decreasing timestamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    rows: Vec<AnalysisRow>,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: AnalysisRow) {
        debug_assert!(
            self.rows
                .last()
                .map_or(true, |last| last.timestamp_secs <= row.timestamp_secs),
            "time series timestamps must be non-decreasing"
        );
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[AnalysisRow] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AnalysisRow> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<AnalysisRow> {
        self.rows
    }
}

impl<'a> IntoIterator for &'a TimeSeries {
    type Item = &'a AnalysisRow;
    type IntoIter = std::slice::Iter<'a, AnalysisRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
