//! Writes a complete report directory for one session.

use crate::plot::{render_confidence_timeline, render_emotion_timeline};
use crate::summary::{summarize, Summary};
use crate::table::{write_records_csv, ReportRecord};
use crate::ReportError;
use chrono::{DateTime, Utc};
use moodscan_core::TimeSeries;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const CSV_FILE: &str = "emotion_results.csv";
pub const EMOTION_PLOT_FILE: &str = "emotion_timeline.png";
pub const CONFIDENCE_PLOT_FILE: &str = "confidence_timeline.png";
pub const SUMMARY_FILE: &str = "summary.json";

/// Paths produced by [`ReportWriter::persist`]. Plots are skipped for empty
/// series.
#[derive(Debug, Clone)]
pub struct ReportFiles {
    pub csv: PathBuf,
    pub summary: PathBuf,
    pub emotion_plot: Option<PathBuf>,
    pub confidence_plot: Option<PathBuf>,
}

#[derive(Serialize)]
struct SummaryDocument<'a> {
    generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
    #[serde(flatten)]
    summary: &'a Summary,
}

/// A session's rows plus the summary derived from them.
pub struct ReportWriter {
    records: Vec<ReportRecord>,
    summary: Summary,
    session_id: Option<String>,
}

impl ReportWriter {
    pub fn new(records: Vec<ReportRecord>) -> Self {
        let summary = summarize(&records);
        Self {
            records,
            summary,
            session_id: None,
        }
    }

    pub fn from_series(series: &TimeSeries) -> Self {
        Self::new(series.iter().map(ReportRecord::from).collect())
    }

    /// Tag `summary.json` with the session that produced the rows.
    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    pub fn records(&self) -> &[ReportRecord] {
        &self.records
    }

    /// Write the CSV, both timeline plots and `summary.json` into `dir`,
    /// creating it if needed.
    pub fn persist(&self, dir: &Path) -> Result<ReportFiles, ReportError> {
        std::fs::create_dir_all(dir)?;

        let csv = dir.join(CSV_FILE);
        write_records_csv(&self.records, &csv)?;

        let (emotion_plot, confidence_plot) = if self.records.is_empty() {
            tracing::warn!("no rows recorded; skipping timeline plots");
            (None, None)
        } else {
            let emotion = dir.join(EMOTION_PLOT_FILE);
            render_emotion_timeline(&self.records, &emotion)?;
            let confidence = dir.join(CONFIDENCE_PLOT_FILE);
            render_confidence_timeline(&self.records, &confidence)?;
            (Some(emotion), Some(confidence))
        };

        let summary = dir.join(SUMMARY_FILE);
        let doc = SummaryDocument {
            generated_at: Utc::now(),
            session_id: self.session_id.as_deref(),
            summary: &self.summary,
        };
        std::fs::write(&summary, serde_json::to_string_pretty(&doc)?)?;

        tracing::info!(
            dir = %dir.display(),
            rows = self.records.len(),
            dominant = ?self.summary.dominant_emotion,
            "report written"
        );

        Ok(ReportFiles {
            csv,
            summary,
            emotion_plot,
            confidence_plot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::read_csv;
    use moodscan_core::{AnalysisRow, Emotion};

    fn series(emotions: &[Emotion]) -> TimeSeries {
        let mut series = TimeSeries::new();
        for (i, e) in emotions.iter().enumerate() {
            series.push(AnalysisRow {
                timestamp_secs: i as u64,
                emotion: *e,
                confidence: 70.0,
                features: None,
            });
        }
        series
    }

    #[test]
    fn test_persist_writes_all_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("session");
        let rows = series(&[Emotion::Sad, Emotion::Sad, Emotion::Happy]);
        let writer = ReportWriter::from_series(&rows).with_session_id("abc-123");

        let files = writer.persist(&out).unwrap();

        assert!(files.csv.exists());
        assert!(files.summary.exists());
        assert!(files.emotion_plot.as_ref().unwrap().exists());
        assert!(files.confidence_plot.as_ref().unwrap().exists());
        assert_eq!(read_csv(&files.csv).unwrap().len(), 3);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&files.summary).unwrap()).unwrap();
        assert_eq!(json["dominant_emotion"], "sad");
        assert_eq!(json["total_rows"], 3);
        assert_eq!(json["session_id"], "abc-123");
        assert_eq!(json["frequency_by_emotion"][0]["emotion"], "sad");
        assert_eq!(json["frequency_by_emotion"][0]["count"], 2);
        assert!(json["generated_at"].is_string());
    }

    #[test]
    fn test_persist_empty_series_skips_plots() {
        let dir = tempfile::tempdir().unwrap();
        let files = ReportWriter::from_series(&TimeSeries::new())
            .persist(dir.path())
            .unwrap();

        assert!(files.csv.exists());
        assert!(files.emotion_plot.is_none());
        assert!(!dir.path().join(EMOTION_PLOT_FILE).exists());

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&files.summary).unwrap()).unwrap();
        assert!(json["dominant_emotion"].is_null());
        assert!(json.get("session_id").is_none());
    }
}
