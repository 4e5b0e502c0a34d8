//! Session summary: dominant emotion, label frequencies, blink totals.

use crate::table::ReportRecord;
use moodscan_core::Emotion;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotionCount {
    pub emotion: Emotion,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Most frequent label; ties go to the label seen first. `None` when empty.
    pub dominant_emotion: Option<Emotion>,
    /// Label counts in first-seen order.
    pub frequency_by_emotion: Vec<EmotionCount>,
    pub total_rows: usize,
    pub face_rows: usize,
    pub total_blinks: u64,
    pub mean_confidence: Option<f32>,
}

impl Summary {
    pub fn count(&self, emotion: Emotion) -> usize {
        self.frequency_by_emotion
            .iter()
            .find(|c| c.emotion == emotion)
            .map_or(0, |c| c.count)
    }
}

/// Aggregate report rows into a [`Summary`].
pub fn summarize(records: &[ReportRecord]) -> Summary {
    let mut frequency: Vec<EmotionCount> = Vec::new();
    let mut face_rows = 0;
    let mut total_blinks = 0u64;
    let mut confidence_sum = 0.0f64;

    for r in records {
        match frequency.iter_mut().find(|c| c.emotion == r.emotion) {
            Some(c) => c.count += 1,
            None => frequency.push(EmotionCount {
                emotion: r.emotion,
                count: 1,
            }),
        }
        if r.has_face() {
            face_rows += 1;
        }
        total_blinks += u64::from(r.blink);
        confidence_sum += f64::from(r.confidence);
    }

    // Strictly greater keeps the earliest label on ties.
    let mut dominant: Option<EmotionCount> = None;
    for c in &frequency {
        if dominant.map_or(true, |d| c.count > d.count) {
            dominant = Some(*c);
        }
    }

    let mean_confidence =
        (!records.is_empty()).then(|| (confidence_sum / records.len() as f64) as f32);

    Summary {
        dominant_emotion: dominant.map(|d| d.emotion),
        frequency_by_emotion: frequency,
        total_rows: records.len(),
        face_rows,
        total_blinks,
        mean_confidence,
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.dominant_emotion {
            Some(e) => writeln!(f, "Most frequent emotion: {e} ({} times)", self.count(e))?,
            None => writeln!(f, "No emotions recorded")?,
        }
        writeln!(f, "Rows: {} ({} with a face)", self.total_rows, self.face_rows)?;
        writeln!(f, "Blinks: {}", self.total_blinks)?;
        if let Some(mean) = self.mean_confidence {
            writeln!(f, "Mean confidence: {mean:.1}")?;
        }
        for c in &self.frequency_by_emotion {
            writeln!(f, "  {:<10} {}", c.emotion.as_str(), c.count)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(
        time_secs: u64,
        emotion: Emotion,
        confidence: f32,
        blink: u8,
        face: bool,
    ) -> ReportRecord {
        let geo = face.then_some(0.03);
        ReportRecord {
            time_secs,
            emotion,
            confidence,
            blink,
            eye_distance: geo,
            mouth_open: geo,
            mouth_width: geo,
            eyebrow_lift: geo,
            nose_x: geo,
            nose_flare: geo,
        }
    }

    #[test]
    fn test_empty_has_no_dominant() {
        let summary = summarize(&[]);
        assert_eq!(summary.dominant_emotion, None);
        assert_eq!(summary.total_rows, 0);
        assert_eq!(summary.mean_confidence, None);
        assert!(summary.frequency_by_emotion.is_empty());
    }

    #[test]
    fn test_most_frequent_wins() {
        let records = [
            record(0, Emotion::Sad, 60.0, 0, true),
            record(1, Emotion::Happy, 80.0, 1, true),
            record(2, Emotion::Happy, 90.0, 0, false),
        ];
        let summary = summarize(&records);
        assert_eq!(summary.dominant_emotion, Some(Emotion::Happy));
        assert_eq!(summary.count(Emotion::Happy), 2);
        assert_eq!(summary.count(Emotion::Angry), 0);
        assert_eq!(summary.face_rows, 2);
        assert_eq!(summary.total_blinks, 1);
        let mean = summary.mean_confidence.unwrap();
        assert!((mean - 76.666_67).abs() < 1e-3);
    }

    #[test]
    fn test_tie_goes_to_first_seen() {
        let records = [
            record(0, Emotion::Neutral, 50.0, 0, true),
            record(1, Emotion::Angry, 80.0, 0, true),
            record(2, Emotion::Angry, 80.0, 0, true),
            record(3, Emotion::Neutral, 50.0, 0, true),
        ];
        assert_eq!(summarize(&records).dominant_emotion, Some(Emotion::Neutral));
    }

    #[test]
    fn test_frequency_keeps_first_seen_order() {
        let records = [
            record(0, Emotion::Surprise, 50.0, 0, false),
            record(1, Emotion::Angry, 50.0, 0, false),
            record(2, Emotion::Surprise, 50.0, 0, false),
        ];
        let order: Vec<Emotion> = summarize(&records)
            .frequency_by_emotion
            .iter()
            .map(|c| c.emotion)
            .collect();
        assert_eq!(order, vec![Emotion::Surprise, Emotion::Angry]);
    }

    #[test]
    fn test_display_names_dominant() {
        let summary = summarize(&[record(0, Emotion::Fear, 90.0, 0, true)]);
        let text = summary.to_string();
        assert!(text.starts_with("Most frequent emotion: fear (1 times)"));
    }
}
