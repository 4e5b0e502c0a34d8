//! Geometric facial metrics from face-mesh landmarks, with edge-triggered
//! blink detection.

use crate::landmarks::mesh;
use crate::types::{GeometricFeatures, LandmarkSet};

/// Eye aperture (normalized units) below which the eyes count as closed.
pub const BLINK_THRESHOLD: f32 = 0.02;

/// Blink tracking carried from frame to frame within one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlinkState {
    pub eye_closed_previous: bool,
    pub blink_count: u32,
}

impl BlinkState {
    /// Feed one aperture sample. Returns true only on an open→closed edge.
    pub fn observe(&mut self, aperture: f32, threshold: f32) -> bool {
        if aperture < threshold {
            if self.eye_closed_previous {
                return false;
            }
            self.eye_closed_previous = true;
            self.blink_count += 1;
            true
        } else {
            self.eye_closed_previous = false;
            false
        }
    }
}

/// Compute [`GeometricFeatures`] for one landmark set, updating `state`.
pub fn extract_features(
    landmarks: &LandmarkSet,
    state: &mut BlinkState,
    blink_threshold: f32,
) -> GeometricFeatures {
    let p = |index| landmarks.point(index);

    let left_eye = p(mesh::LEFT_EYE_LOWER).y - p(mesh::LEFT_EYE_UPPER).y;
    let right_eye = p(mesh::RIGHT_EYE_LOWER).y - p(mesh::RIGHT_EYE_UPPER).y;
    let avg_eye_aperture = (left_eye + right_eye) / 2.0;

    let blink = state.observe(avg_eye_aperture, blink_threshold);

    let mouth_open = (p(mesh::UPPER_INNER_LIP).y - p(mesh::LOWER_INNER_LIP).y).abs();
    let mouth_width = (p(mesh::MOUTH_LEFT).x - p(mesh::MOUTH_RIGHT).x).abs();
    // Sign kept as-is: the correction thresholds are calibrated to it.
    let eyebrow_lift = p(mesh::LEFT_EYEBROW).y - p(mesh::LEFT_EYE_UPPER).y;
    let nose_x = p(mesh::NOSE_TIP).x;
    let nose_flare = (p(mesh::NOSTRIL_LEFT).x - p(mesh::NOSTRIL_RIGHT).x).abs();

    GeometricFeatures {
        blink,
        avg_eye_aperture,
        mouth_open,
        mouth_width,
        eyebrow_lift,
        nose_x,
        nose_flare,
    }
}

/// Per-session feature extractor owning its [`BlinkState`].
///
/// Create one per analysis session; blink counts must never leak between
/// sessions.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    blink_threshold: f32,
    state: BlinkState,
}

impl FeatureExtractor {
    pub fn new(blink_threshold: f32) -> Self {
        Self {
            blink_threshold,
            state: BlinkState::default(),
        }
    }

    pub fn extract(&mut self, landmarks: &LandmarkSet) -> GeometricFeatures {
        extract_features(landmarks, &mut self.state, self.blink_threshold)
    }

    pub fn blink_count(&self) -> u32 {
        self.state.blink_count
    }

    pub fn state(&self) -> BlinkState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = BlinkState::default();
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(BLINK_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Landmark, FACE_MESH_POINTS};

    /// Landmark set with every point at the center and the listed overrides.
    fn face(overrides: &[(usize, f32, f32)]) -> LandmarkSet {
        let mut points = vec![Landmark::new(0.5, 0.5); FACE_MESH_POINTS];
        for &(idx, x, y) in overrides {
            points[idx] = Landmark::new(x, y);
        }
        LandmarkSet::new(points).unwrap()
    }

    fn face_with_aperture(aperture: f32) -> LandmarkSet {
        face(&[
            (mesh::LEFT_EYE_UPPER, 0.35, 0.40),
            (mesh::LEFT_EYE_LOWER, 0.35, 0.40 + aperture),
            (mesh::RIGHT_EYE_UPPER, 0.65, 0.40),
            (mesh::RIGHT_EYE_LOWER, 0.65, 0.40 + aperture),
        ])
    }

    #[test]
    fn test_blink_is_edge_triggered() {
        let mut state = BlinkState::default();
        let apertures = [0.05, 0.01, 0.01, 0.01, 0.05, 0.01];
        let fired: Vec<usize> = apertures
            .iter()
            .enumerate()
            .filter(|&(_, &a)| state.observe(a, BLINK_THRESHOLD))
            .map(|(i, _)| i)
            .collect();

        assert_eq!(fired, vec![1, 5]);
        assert_eq!(state.blink_count, 2);
    }

    #[test]
    fn test_blink_at_threshold_counts_as_open() {
        let mut state = BlinkState {
            eye_closed_previous: true,
            blink_count: 3,
        };
        assert!(!state.observe(BLINK_THRESHOLD, BLINK_THRESHOLD));
        assert!(!state.eye_closed_previous);
        assert_eq!(state.blink_count, 3);
    }

    #[test]
    fn test_extractor_counts_blinks_across_frames() {
        let mut extractor = FeatureExtractor::default();
        let blinks: Vec<bool> = [0.05, 0.01, 0.01, 0.01, 0.05, 0.01]
            .iter()
            .map(|&a| extractor.extract(&face_with_aperture(a)).blink)
            .collect();

        assert_eq!(blinks, vec![false, true, false, false, false, true]);
        assert_eq!(extractor.blink_count(), 2);

        extractor.reset();
        assert_eq!(extractor.state(), BlinkState::default());
    }

    #[test]
    fn test_eye_aperture_is_mean_of_both_eyes() {
        let lms = face(&[
            (mesh::LEFT_EYE_UPPER, 0.35, 0.40),
            (mesh::LEFT_EYE_LOWER, 0.35, 0.44),
            (mesh::RIGHT_EYE_UPPER, 0.65, 0.40),
            (mesh::RIGHT_EYE_LOWER, 0.65, 0.42),
        ]);
        let f = FeatureExtractor::default().extract(&lms);
        assert!((f.avg_eye_aperture - 0.03).abs() < 1e-5, "got {}", f.avg_eye_aperture);
        assert!(!f.blink);
    }

    #[test]
    fn test_mouth_and_nose_metrics() {
        let lms = face(&[
            (mesh::UPPER_INNER_LIP, 0.50, 0.70),
            (mesh::LOWER_INNER_LIP, 0.50, 0.74),
            (mesh::MOUTH_LEFT, 0.44, 0.72),
            (mesh::MOUTH_RIGHT, 0.56, 0.72),
            (mesh::NOSE_TIP, 0.52, 0.55),
            (mesh::NOSTRIL_LEFT, 0.47, 0.60),
            (mesh::NOSTRIL_RIGHT, 0.53, 0.60),
        ]);
        let f = FeatureExtractor::default().extract(&lms);
        assert!((f.mouth_open - 0.04).abs() < 1e-5);
        assert!((f.mouth_width - 0.12).abs() < 1e-5);
        assert!((f.nose_x - 0.52).abs() < 1e-6);
        assert!((f.nose_flare - 0.06).abs() < 1e-5);
    }

    #[test]
    fn test_eyebrow_lift_sign_convention() {
        // Brow above the eyelid (smaller y) gives a negative lift.
        let lms = face(&[
            (mesh::LEFT_EYEBROW, 0.35, 0.33),
            (mesh::LEFT_EYE_UPPER, 0.35, 0.38),
        ]);
        let f = FeatureExtractor::default().extract(&lms);
        assert!((f.eyebrow_lift + 0.05).abs() < 1e-5, "got {}", f.eyebrow_lift);
    }

    #[test]
    fn test_separate_extractors_do_not_share_state() {
        let mut a = FeatureExtractor::default();
        let mut b = FeatureExtractor::default();
        a.extract(&face_with_aperture(0.01));
        assert_eq!(a.blink_count(), 1);
        assert_eq!(b.blink_count(), 0);
        assert!(b.extract(&face_with_aperture(0.01)).blink);
    }
}
