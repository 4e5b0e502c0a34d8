//! moodscan-report: Report sink for analysis sessions.
//!
//! Flat CSV export and import, summary statistics and PNG timeline plots.

pub mod plot;
pub mod summary;
pub mod table;
pub mod writer;

use thiserror::Error;

pub use plot::{
    confidence_timeline_image, emotion_timeline_image, render_confidence_timeline,
    render_emotion_timeline,
};
pub use summary::{summarize, EmotionCount, Summary};
pub use table::{
    read_csv, to_csv_string, write_csv, write_records_csv, ReportRecord, CSV_HEADERS,
};
pub use writer::{ReportFiles, ReportWriter};

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("image: {0}")]
    Image(#[from] image::ImageError),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected csv header: expected {expected:?}, found {found:?}")]
    Header {
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("nothing to plot")]
    EmptySeries,
}
