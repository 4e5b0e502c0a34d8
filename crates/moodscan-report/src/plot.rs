//! PNG timeline plots drawn straight into an `RgbImage`.
//!
//! Time runs along x. The emotion plot has one horizontal band per label
//! (in [`Emotion::ALL`] order, bottom to top); the confidence plot spans
//! 0–100 with a gridline every 20.

use crate::table::ReportRecord;
use crate::ReportError;
use image::{Rgb, RgbImage};
use moodscan_core::Emotion;
use std::path::Path;

// --- Named constants ---
const PLOT_WIDTH: u32 = 800;
const PLOT_HEIGHT: u32 = 400;
const MARGIN: u32 = 40;
const MARKER_RADIUS: i64 = 3;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([40, 40, 40]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);
const TRACE: Rgb<u8> = Rgb([150, 150, 150]);
const CONFIDENCE: Rgb<u8> = Rgb([46, 139, 87]);

const CONFIDENCE_MAX: f32 = 100.0;
const CONFIDENCE_GRID_STEP: f32 = 20.0;

/// Marker color for each label.
fn emotion_color(emotion: Emotion) -> Rgb<u8> {
    match emotion {
        Emotion::Angry => Rgb([214, 39, 40]),
        Emotion::Disgust => Rgb([140, 86, 75]),
        Emotion::Fear => Rgb([148, 103, 189]),
        Emotion::Happy => Rgb([255, 187, 0]),
        Emotion::Sad => Rgb([31, 119, 180]),
        Emotion::Surprise => Rgb([23, 190, 207]),
        Emotion::Neutral => Rgb([127, 127, 127]),
        Emotion::Contempt => Rgb([188, 189, 34]),
    }
}

fn emotion_band(emotion: Emotion) -> f32 {
    Emotion::ALL
        .iter()
        .position(|e| *e == emotion)
        .unwrap_or_default() as f32
}

/// Plot area with value-to-pixel mapping.
struct Canvas {
    img: RgbImage,
    t_min: f32,
    t_max: f32,
    y_min: f32,
    y_max: f32,
}

impl Canvas {
    fn new(records: &[ReportRecord], y_min: f32, y_max: f32) -> Self {
        let t_min = records.iter().map(|r| r.time_secs).min().unwrap_or(0) as f32;
        let t_max = records.iter().map(|r| r.time_secs).max().unwrap_or(0) as f32;
        Self {
            img: RgbImage::from_pixel(PLOT_WIDTH, PLOT_HEIGHT, BACKGROUND),
            t_min,
            t_max,
            y_min,
            y_max,
        }
    }

    fn x(&self, t: f32) -> i64 {
        let span = (PLOT_WIDTH - 2 * MARGIN) as f32;
        let frac = if self.t_max > self.t_min {
            (t - self.t_min) / (self.t_max - self.t_min)
        } else {
            0.5
        };
        (MARGIN as f32 + frac * span).round() as i64
    }

    fn y(&self, v: f32) -> i64 {
        let span = (PLOT_HEIGHT - 2 * MARGIN) as f32;
        let frac = ((v - self.y_min) / (self.y_max - self.y_min)).clamp(0.0, 1.0);
        ((PLOT_HEIGHT - MARGIN) as f32 - frac * span).round() as i64
    }

    fn put(&mut self, x: i64, y: i64, color: Rgb<u8>) {
        if x >= 0 && y >= 0 && (x as u32) < PLOT_WIDTH && (y as u32) < PLOT_HEIGHT {
            self.img.put_pixel(x as u32, y as u32, color);
        }
    }

    /// Bresenham line between two pixel positions.
    fn line(&mut self, (x0, y0): (i64, i64), (x1, y1): (i64, i64), color: Rgb<u8>) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let (mut x, mut y, mut err) = (x0, y0, dx + dy);
        loop {
            self.put(x, y, color);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    fn marker(&mut self, (cx, cy): (i64, i64), color: Rgb<u8>) {
        for dy in -MARKER_RADIUS..=MARKER_RADIUS {
            for dx in -MARKER_RADIUS..=MARKER_RADIUS {
                if dx * dx + dy * dy <= MARKER_RADIUS * MARKER_RADIUS {
                    self.put(cx + dx, cy + dy, color);
                }
            }
        }
    }

    fn gridline(&mut self, v: f32) {
        let y = self.y(v);
        let (left, right) = (MARGIN as i64, (PLOT_WIDTH - MARGIN) as i64);
        self.line((left, y), (right, y), GRID);
    }

    fn axes(&mut self) {
        let (left, right) = (MARGIN as i64, (PLOT_WIDTH - MARGIN) as i64);
        let (top, bottom) = (MARGIN as i64, (PLOT_HEIGHT - MARGIN) as i64);
        self.line((left, bottom), (right, bottom), AXIS);
        self.line((left, top), (left, bottom), AXIS);
    }

    /// Connect the points with a trace, then mark each one.
    fn series(&mut self, points: &[(f32, f32, Rgb<u8>)], trace: Rgb<u8>) {
        let pixels: Vec<(i64, i64)> =
            points.iter().map(|&(t, v, _)| (self.x(t), self.y(v))).collect();
        for pair in pixels.windows(2) {
            self.line(pair[0], pair[1], trace);
        }
        for (p, &(_, _, color)) in pixels.iter().zip(points) {
            self.marker(*p, color);
        }
    }
}

/// Emotion label over time as an image.
pub fn emotion_timeline_image(records: &[ReportRecord]) -> Result<RgbImage, ReportError> {
    if records.is_empty() {
        return Err(ReportError::EmptySeries);
    }

    let top = (Emotion::ALL.len() - 1) as f32;
    let mut canvas = Canvas::new(records, -0.5, top + 0.5);
    for band in 0..Emotion::ALL.len() {
        canvas.gridline(band as f32);
    }
    canvas.axes();

    let points: Vec<(f32, f32, Rgb<u8>)> = records
        .iter()
        .map(|r| (r.time_secs as f32, emotion_band(r.emotion), emotion_color(r.emotion)))
        .collect();
    canvas.series(&points, TRACE);
    Ok(canvas.img)
}

/// Confidence (0–100) over time as an image.
pub fn confidence_timeline_image(records: &[ReportRecord]) -> Result<RgbImage, ReportError> {
    if records.is_empty() {
        return Err(ReportError::EmptySeries);
    }

    let mut canvas = Canvas::new(records, 0.0, CONFIDENCE_MAX);
    let mut level = CONFIDENCE_GRID_STEP;
    while level <= CONFIDENCE_MAX {
        canvas.gridline(level);
        level += CONFIDENCE_GRID_STEP;
    }
    canvas.axes();

    let points: Vec<(f32, f32, Rgb<u8>)> = records
        .iter()
        .map(|r| (r.time_secs as f32, r.confidence, CONFIDENCE))
        .collect();
    canvas.series(&points, CONFIDENCE);
    Ok(canvas.img)
}

pub fn render_emotion_timeline(records: &[ReportRecord], path: &Path) -> Result<(), ReportError> {
    emotion_timeline_image(records)?.save(path)?;
    tracing::debug!(path = %path.display(), points = records.len(), "rendered emotion timeline");
    Ok(())
}

pub fn render_confidence_timeline(
    records: &[ReportRecord],
    path: &Path,
) -> Result<(), ReportError> {
    confidence_timeline_image(records)?.save(path)?;
    tracing::debug!(path = %path.display(), points = records.len(), "rendered confidence timeline");
    Ok(())
}
