//! CSV export and import of a session's time series.

use crate::ReportError;
use moodscan_core::{AnalysisRow, Emotion, TimeSeries};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

/// Column headers, in file order.
pub const CSV_HEADERS: [&str; 10] = [
    "Time (s)",
    "Emotion",
    "Confidence",
    "Blink",
    "Eye_Distance",
    "Mouth_Open",
    "Mouth_Width",
    "Eyebrow_Lift",
    "Nose_X",
    "Nose_Flare",
];

/// One CSV row. Geometric columns are empty when no face was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    #[serde(rename = "Time (s)")]
    pub time_secs: u64,
    #[serde(rename = "Emotion")]
    pub emotion: Emotion,
    #[serde(rename = "Confidence")]
    pub confidence: f32,
    #[serde(rename = "Blink")]
    pub blink: u8,
    #[serde(rename = "Eye_Distance")]
    pub eye_distance: Option<f32>,
    #[serde(rename = "Mouth_Open")]
    pub mouth_open: Option<f32>,
    #[serde(rename = "Mouth_Width")]
    pub mouth_width: Option<f32>,
    #[serde(rename = "Eyebrow_Lift")]
    pub eyebrow_lift: Option<f32>,
    #[serde(rename = "Nose_X")]
    pub nose_x: Option<f32>,
    #[serde(rename = "Nose_Flare")]
    pub nose_flare: Option<f32>,
}

impl From<&AnalysisRow> for ReportRecord {
    fn from(row: &AnalysisRow) -> Self {
        let f = row.features.as_ref();
        Self {
            time_secs: row.timestamp_secs,
            emotion: row.emotion,
            confidence: row.confidence,
            blink: row.blink(),
            eye_distance: f.map(|f| f.avg_eye_aperture),
            mouth_open: f.map(|f| f.mouth_open),
            mouth_width: f.map(|f| f.mouth_width),
            eyebrow_lift: f.map(|f| f.eyebrow_lift),
            nose_x: f.map(|f| f.nose_x),
            nose_flare: f.map(|f| f.nose_flare),
        }
    }
}

impl ReportRecord {
    pub fn has_face(&self) -> bool {
        self.eye_distance.is_some()
    }
}

/// Write `series` to `path`, header first, overwriting any existing file.
pub fn write_csv(series: &TimeSeries, path: &Path) -> Result<(), ReportError> {
    let records: Vec<ReportRecord> = series.iter().map(ReportRecord::from).collect();
    write_records_csv(&records, path)
}

/// Write already-flattened rows to `path`.
pub fn write_records_csv(records: &[ReportRecord], path: &Path) -> Result<(), ReportError> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    write_records(&mut wtr, records.iter().cloned())?;
    wtr.flush()?;

    tracing::info!(path = %path.display(), rows = records.len(), "wrote csv report");
    Ok(())
}

/// Render `series` as CSV text.
pub fn to_csv_string(series: &TimeSeries) -> Result<String, ReportError> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    write_records(&mut wtr, series.iter().map(ReportRecord::from))?;
    let bytes = wtr.into_inner().map_err(|e| ReportError::Io(e.into_error()))?;
    String::from_utf8(bytes)
        .map_err(|e| ReportError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
}

/// Load a report previously written by [`write_csv`].
pub fn read_csv(path: &Path) -> Result<Vec<ReportRecord>, ReportError> {
    let file = std::fs::File::open(path)?;
    let records = read_records(file)?;
    tracing::info!(path = %path.display(), rows = records.len(), "read csv report");
    Ok(records)
}

fn write_records<W: io::Write>(
    wtr: &mut csv::Writer<W>,
    records: impl IntoIterator<Item = ReportRecord>,
) -> Result<(), ReportError> {
    // Headers are written by hand so an empty series still gets them.
    wtr.write_record(CSV_HEADERS)?;
    for record in records {
        wtr.serialize(record)?;
    }
    Ok(())
}

fn read_records<R: io::Read>(reader: R) -> Result<Vec<ReportRecord>, ReportError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let found: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    if found != CSV_HEADERS {
        return Err(ReportError::Header {
            expected: CSV_HEADERS.iter().map(|h| h.to_string()).collect(),
            found,
        });
    }

    let mut records = Vec::new();
    for record in rdr.deserialize() {
        records.push(record?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use moodscan_core::GeometricFeatures;

    fn features(blink: bool) -> GeometricFeatures {
        GeometricFeatures {
            blink,
            avg_eye_aperture: 0.025,
            mouth_open: 0.03,
            mouth_width: 0.12,
            eyebrow_lift: -0.05,
            nose_x: 0.5,
            nose_flare: 0.04,
        }
    }

    fn sample_series() -> TimeSeries {
        let mut series = TimeSeries::new();
        series.push(AnalysisRow {
            timestamp_secs: 0,
            emotion: Emotion::Happy,
            confidence: 80.0,
            features: Some(features(true)),
        });
        series.push(AnalysisRow {
            timestamp_secs: 1,
            emotion: Emotion::Neutral,
            confidence: 40.0,
            features: None,
        });
        series
    }

    #[test]
    fn test_header_order() {
        let text = to_csv_string(&sample_series()).unwrap();
        let header = text.lines().next().unwrap();
        assert_eq!(
            header,
            "Time (s),Emotion,Confidence,Blink,Eye_Distance,Mouth_Open,Mouth_Width,Eyebrow_Lift,Nose_X,Nose_Flare"
        );
    }

    #[test]
    fn test_no_face_row_has_empty_cells() {
        let text = to_csv_string(&sample_series()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "0,happy,80.0,1,0.025,0.03,0.12,-0.05,0.5,0.04");
        assert_eq!(lines[2], "1,neutral,40.0,0,,,,,,");
    }

    #[test]
    fn test_empty_series_still_has_header() {
        let text = to_csv_string(&TimeSeries::new()).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("Time (s),"));
    }

    #[test]
    fn test_read_back_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emotion_results.csv");
        let series = sample_series();

        write_csv(&series, &path).unwrap();
        let records = read_csv(&path).unwrap();

        let expected: Vec<ReportRecord> = series.iter().map(ReportRecord::from).collect();
        assert_eq!(records, expected);
        assert!(records[0].has_face());
        assert!(!records[1].has_face());
    }

    #[test]
    fn test_read_accepts_float_formatting_from_other_writers() {
        let text = "Time (s),Emotion,Confidence,Blink,Eye_Distance,Mouth_Open,Mouth_Width,Eyebrow_Lift,Nose_X,Nose_Flare\n\
                    3,fear,82,0,0.03,0.025,0.1,0.03,0.51,0.05\n";
        let records = read_records(text.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].emotion, Emotion::Fear);
        assert_eq!(records[0].confidence, 82.0);
        assert_eq!(records[0].eyebrow_lift, Some(0.03));
    }

    #[test]
    fn test_read_rejects_wrong_header() {
        let text = "time,emotion\n1,happy\n";
        assert!(matches!(
            read_records(text.as_bytes()),
            Err(ReportError::Header { .. })
        ));
    }

    #[test]
    fn test_read_rejects_unknown_emotion() {
        let text = "Time (s),Emotion,Confidence,Blink,Eye_Distance,Mouth_Open,Mouth_Width,Eyebrow_Lift,Nose_X,Nose_Flare\n\
                    1,bored,50.0,0,,,,,,\n";
        assert!(matches!(read_records(text.as_bytes()), Err(ReportError::Csv(_))));
    }
}
