//! Rule-based correction of the classifier's label using face geometry.
//!
//! The classifier is coarse and tends to miss tight-lipped anger and
//! open-mouth smiles; landmark geometry catches those. Rules run in a fixed
//! order and later rules overwrite earlier ones.

use crate::types::{ClassifierResult, Emotion, GeometricFeatures};

// --- Rule thresholds (normalized landmark units) ---
const ANGRY_EYEBROW_MAX: f32 = -0.03;
const ANGRY_MOUTH_OPEN_MAX: f32 = 0.02;
const ANGRY_CONFIDENCE_FLOOR: f32 = 80.0;

const HAPPY_MOUTH_OPEN_MIN: f32 = 0.028;
const HAPPY_MOUTH_WIDTH_MIN: f32 = 0.11;
const HAPPY_CONFIDENCE_FLOOR: f32 = 80.0;

const FEAR_EYEBROW_MIN: f32 = 0.02;
const FEAR_MOUTH_OPEN_MIN: f32 = 0.02;
const FEAR_MOUTH_OPEN_MAX: f32 = 0.045;
const FEAR_MOUTH_WIDTH_MAX: f32 = 0.105;
const FEAR_CONFIDENCE_FLOOR: f32 = 82.0;

/// Fear below this confidence is demoted to neutral.
const FEAR_MIN_CONFIDENCE: f32 = 85.0;

/// Confidence used when the classifier has no score for its own dominant label.
pub const MISSING_SCORE_CONFIDENCE: f32 = 50.0;

/// Which rule last wrote the emotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionRule {
    Angry,
    Happy,
    Fear,
    FearSuppressed,
}

/// Final label and confidence for one sampled frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correction {
    pub emotion: Emotion,
    pub confidence: f32,
    pub rule: Option<CorrectionRule>,
}

/// Merge classifier output with geometric features into a final verdict.
///
/// Without features (no face) the classifier's answer is returned as-is.
pub fn correct(result: &ClassifierResult, features: Option<&GeometricFeatures>) -> Correction {
    let mut out = Correction {
        emotion: result.dominant,
        confidence: result
            .score(result.dominant)
            .unwrap_or(MISSING_SCORE_CONFIDENCE),
        rule: None,
    };

    let Some(f) = features else {
        return out;
    };

    if f.eyebrow_lift < ANGRY_EYEBROW_MAX && f.mouth_open < ANGRY_MOUTH_OPEN_MAX {
        out.set(Emotion::Angry, ANGRY_CONFIDENCE_FLOOR, CorrectionRule::Angry);
    }

    if f.mouth_open > HAPPY_MOUTH_OPEN_MIN && f.mouth_width > HAPPY_MOUTH_WIDTH_MIN {
        out.set(Emotion::Happy, HAPPY_CONFIDENCE_FLOOR, CorrectionRule::Happy);
    }

    if f.eyebrow_lift > FEAR_EYEBROW_MIN
        && f.mouth_open > FEAR_MOUTH_OPEN_MIN
        && f.mouth_open < FEAR_MOUTH_OPEN_MAX
        && f.mouth_width < FEAR_MOUTH_WIDTH_MAX
    {
        out.set(Emotion::Fear, FEAR_CONFIDENCE_FLOOR, CorrectionRule::Fear);
    }

    if out.emotion == Emotion::Fear && out.confidence < FEAR_MIN_CONFIDENCE {
        out.emotion = Emotion::Neutral;
        out.rule = Some(CorrectionRule::FearSuppressed);
    }

    out
}

impl Correction {
    fn set(&mut self, emotion: Emotion, floor: f32, rule: CorrectionRule) {
        self.emotion = emotion;
        self.confidence = self.confidence.max(floor);
        self.rule = Some(rule);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn classified(emotion: Emotion, confidence: f32) -> ClassifierResult {
        ClassifierResult {
            dominant: emotion,
            scores: BTreeMap::from([(emotion, confidence)]),
        }
    }

    fn geometry(eyebrow_lift: f32, mouth_open: f32, mouth_width: f32) -> GeometricFeatures {
        GeometricFeatures {
            blink: false,
            avg_eye_aperture: 0.03,
            mouth_open,
            mouth_width,
            eyebrow_lift,
            nose_x: 0.5,
            nose_flare: 0.05,
        }
    }

    #[test]
    fn test_no_features_returns_classifier_verdict() {
        let c = correct(&classified(Emotion::Sad, 63.5), None);
        assert_eq!(c.emotion, Emotion::Sad);
        assert_eq!(c.confidence, 63.5);
        assert_eq!(c.rule, None);
    }

    #[test]
    fn test_no_features_skips_fear_suppression() {
        let c = correct(&classified(Emotion::Fear, 60.0), None);
        assert_eq!(c.emotion, Emotion::Fear);
        assert_eq!(c.confidence, 60.0);
    }

    #[test]
    fn test_missing_dominant_score_uses_default() {
        let result = ClassifierResult {
            dominant: Emotion::Surprise,
            scores: BTreeMap::from([(Emotion::Happy, 10.0)]),
        };
        let c = correct(&result, None);
        assert_eq!(c.confidence, MISSING_SCORE_CONFIDENCE);
    }

    #[test]
    fn test_angry_rule() {
        let c = correct(
            &classified(Emotion::Neutral, 55.0),
            Some(&geometry(-0.05, 0.01, 0.09)),
        );
        assert_eq!(c.emotion, Emotion::Angry);
        assert_eq!(c.confidence, 80.0);
        assert_eq!(c.rule, Some(CorrectionRule::Angry));
    }

    #[test]
    fn test_happy_rule() {
        let c = correct(
            &classified(Emotion::Neutral, 55.0),
            Some(&geometry(-0.01, 0.03, 0.12)),
        );
        assert_eq!(c.emotion, Emotion::Happy);
        assert_eq!(c.confidence, 80.0);
    }

    #[test]
    fn test_angry_and_happy_are_exclusive_on_mouth_open() {
        // The angry case fails the happy predicate and vice versa.
        let angry = geometry(-0.05, 0.01, 0.12);
        let happy = geometry(-0.05, 0.03, 0.12);
        assert_eq!(correct(&classified(Emotion::Sad, 30.0), Some(&angry)).emotion, Emotion::Angry);
        assert_eq!(correct(&classified(Emotion::Sad, 30.0), Some(&happy)).emotion, Emotion::Happy);
    }

    #[test]
    fn test_floor_keeps_higher_classifier_confidence() {
        let c = correct(
            &classified(Emotion::Happy, 96.0),
            Some(&geometry(0.0, 0.03, 0.12)),
        );
        assert_eq!(c.emotion, Emotion::Happy);
        assert_eq!(c.confidence, 96.0);
    }

    #[test]
    fn test_fear_suppressed_below_threshold() {
        let c = correct(
            &classified(Emotion::Sad, 70.0),
            Some(&geometry(0.03, 0.03, 0.10)),
        );
        assert_eq!(c.emotion, Emotion::Neutral);
        assert_eq!(c.confidence, 82.0);
        assert_eq!(c.rule, Some(CorrectionRule::FearSuppressed));
    }

    #[test]
    fn test_fear_kept_with_high_base_confidence() {
        let c = correct(
            &classified(Emotion::Sad, 90.0),
            Some(&geometry(0.03, 0.03, 0.10)),
        );
        assert_eq!(c.emotion, Emotion::Fear);
        assert_eq!(c.confidence, 90.0);
        assert_eq!(c.rule, Some(CorrectionRule::Fear));
    }

    #[test]
    fn test_classifier_fear_demoted_when_weak() {
        // Geometry matches no rule, but the face is present so suppression runs.
        let c = correct(
            &classified(Emotion::Fear, 60.0),
            Some(&geometry(0.0, 0.0, 0.09)),
        );
        assert_eq!(c.emotion, Emotion::Neutral);
        assert_eq!(c.confidence, 60.0);
    }

    #[test]
    fn test_classifier_fear_kept_when_strong() {
        let c = correct(
            &classified(Emotion::Fear, 88.0),
            Some(&geometry(0.0, 0.0, 0.09)),
        );
        assert_eq!(c.emotion, Emotion::Fear);
        assert_eq!(c.rule, None);
    }

    #[test]
    fn test_fear_boundaries_are_exclusive() {
        // mouth_open exactly 0.02 is not inside (0.02, 0.045).
        let c = correct(
            &classified(Emotion::Neutral, 50.0),
            Some(&geometry(0.03, 0.02, 0.10)),
        );
        assert_eq!(c.emotion, Emotion::Neutral);
        assert_eq!(c.rule, None);
    }
}
