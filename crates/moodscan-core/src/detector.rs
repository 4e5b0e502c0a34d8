//! Face localization ahead of the landmark and emotion models.
//!
//! [`FaceDetector`] runs SCRFD (anchor-free, three strides, NMS) on the full
//! frame. The largest box is padded into a [`FaceCrop`]; both face models
//! see only the crop, and mesh points found in it are mapped back to
//! frame-normalized coordinates.

use crate::landmarks::LandmarkError;
use crate::letterbox::Letterbox;
use crate::types::{Landmark, LandmarkSet};
use image::imageops;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants ---
const SCRFD_INPUT_SIZE: u32 = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_PAD_VALUE: u8 = 128;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;
/// Margin added on every side of the face box, as a fraction of its longer edge.
pub const FACE_CROP_MARGIN: f32 = 0.25;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}; place the SCRFD ONNX model in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A detected face in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl FaceBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Finds faces in a frame.
pub trait FaceLocator {
    /// All faces found, in no particular order. Empty when there is none.
    fn locate(&mut self, frame: &RgbImage) -> Result<Vec<FaceBox>, DetectorError>;
}

/// The face with the largest box, if any.
pub fn largest_face(faces: &[FaceBox]) -> Option<&FaceBox> {
    faces.iter().max_by(|a, b| a.area().total_cmp(&b.area()))
}

/// A square region cut around a face, clamped to the frame.
#[derive(Debug, Clone)]
pub struct FaceCrop {
    pub image: RgbImage,
    pub left: u32,
    pub top: u32,
    frame_width: u32,
    frame_height: u32,
}

impl FaceCrop {
    /// Cut the box plus [`FACE_CROP_MARGIN`] per side out of `frame`.
    ///
    /// Returns `None` when the padded box lies entirely outside the frame.
    pub fn around(frame: &RgbImage, face: &FaceBox) -> Option<Self> {
        let (fw, fh) = frame.dimensions();
        let side = face.width.max(face.height) * (1.0 + 2.0 * FACE_CROP_MARGIN);
        let cx = face.x + face.width / 2.0;
        let cy = face.y + face.height / 2.0;

        let x0 = (cx - side / 2.0).floor().clamp(0.0, fw as f32) as u32;
        let y0 = (cy - side / 2.0).floor().clamp(0.0, fh as f32) as u32;
        let x1 = (cx + side / 2.0).ceil().clamp(0.0, fw as f32) as u32;
        let y1 = (cy + side / 2.0).ceil().clamp(0.0, fh as f32) as u32;
        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        let image = imageops::crop_imm(frame, x0, y0, x1 - x0, y1 - y0).to_image();
        Some(Self {
            image,
            left: x0,
            top: y0,
            frame_width: fw,
            frame_height: fh,
        })
    }

    /// Crop-normalized point → frame-normalized point.
    pub fn to_frame(&self, point: Landmark) -> Landmark {
        let x = (self.left as f32 + point.x * self.image.width() as f32) / self.frame_width as f32;
        let y = (self.top as f32 + point.y * self.image.height() as f32) / self.frame_height as f32;
        Landmark::new(x.clamp(0.0, 1.0), y.clamp(0.0, 1.0))
    }

    /// Place a landmark set found inside the crop into the full frame.
    pub fn landmarks_to_frame(&self, set: &LandmarkSet) -> Result<LandmarkSet, LandmarkError> {
        LandmarkSet::new(set.points().iter().map(|&p| self.to_frame(p)).collect())
    }
}

/// Output tensor indices for one stride: (score_idx, bbox_idx).
type StrideOutputs = (usize, usize);

/// SCRFD face detector (`det_10g.onnx`).
pub struct FaceDetector {
    session: Session,
    stride_outputs: [StrideOutputs; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = model_path,
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if output_names.len() < 6 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model needs score and bbox outputs for 3 strides, got {} outputs",
                output_names.len()
            )));
        }

        let stride_outputs = discover_outputs(&output_names);
        tracing::debug!(?stride_outputs, "SCRFD output mapping");

        Ok(Self {
            session,
            stride_outputs,
        })
    }

    /// Letterbox to 640x640 and normalize into an NCHW RGB tensor.
    fn preprocess(frame: &RgbImage) -> (Array4<f32>, Letterbox) {
        let (canvas, letterbox) = Letterbox::render(frame, SCRFD_INPUT_SIZE, SCRFD_PAD_VALUE);

        let s = SCRFD_INPUT_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, s, s));
        for (x, y, pixel) in canvas.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
            }
        }

        (tensor, letterbox)
    }
}

impl FaceLocator for FaceDetector {
    fn locate(&mut self, frame: &RgbImage) -> Result<Vec<FaceBox>, DetectorError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(Vec::new());
        }

        let (input, letterbox) = Self::preprocess(frame);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (&stride, &(score_idx, bbox_idx)) in SCRFD_STRIDES.iter().zip(&self.stride_outputs) {
            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| {
                    DetectorError::InferenceFailed(format!("scores stride {stride}: {e}"))
                })?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| {
                    DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}"))
                })?;

            candidates.extend(decode_stride(scores, bboxes, stride, &letterbox));
        }

        let faces = nms(candidates, SCRFD_NMS_THRESHOLD);
        tracing::trace!(faces = faces.len(), "faces located");
        Ok(faces)
    }
}

/// Match `score_<stride>` / `bbox_<stride>` names, else the standard
/// positional layout `[scores 8/16/32, bboxes 8/16/32, kps ...]`.
fn discover_outputs(names: &[String]) -> [StrideOutputs; 3] {
    let find = |prefix: &str, stride: usize| {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let named: Option<Vec<StrideOutputs>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| Some((find("score", stride)?, find("bbox", stride)?)))
        .collect();

    match named {
        Some(found) => [found[0], found[1], found[2]],
        None => [(0, 3), (1, 4), (2, 5)],
    }
}

/// Decode one stride level into frame-space boxes above the score threshold.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    letterbox: &Letterbox,
) -> Vec<FaceBox> {
    let grid = SCRFD_INPUT_SIZE as usize / stride;
    let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let step = stride as f32;

    (0..anchors)
        .filter_map(|idx| {
            let score = *scores.get(idx)?;
            if score <= SCRFD_CONFIDENCE_THRESHOLD {
                return None;
            }
            let offsets = bboxes.get(idx * 4..idx * 4 + 4)?;

            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let ax = (cell % grid) as f32 * step;
            let ay = (cell / grid) as f32 * step;

            let (x1, y1) = letterbox.to_source(ax - offsets[0] * step, ay - offsets[1] * step);
            let (x2, y2) = letterbox.to_source(ax + offsets[2] * step, ay + offsets[3] * step);
            Some(FaceBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
            })
        })
        .collect()
}

/// Keep the most confident of each group of overlapping boxes.
fn nms(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<FaceBox> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|k| iou(k, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

fn iou(a: &FaceBox, b: &FaceBox) -> f32 {
    let w = ((a.x + a.width).min(b.x + b.width) - a.x.max(b.x)).max(0.0);
    let h = ((a.y + a.height).min(b.y + b.height) - a.y.max(b.y)).max(0.0);
    let inter = w * h;
    let union = a.area() + b.area() - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FACE_MESH_POINTS;
    use image::Rgb;

    fn face(x: f32, y: f32, w: f32, h: f32, confidence: f32) -> FaceBox {
        FaceBox {
            x,
            y,
            width: w,
            height: h,
            confidence,
        }
    }

    #[test]
    fn test_largest_face_prefers_area_over_confidence() {
        let faces = [face(0.0, 0.0, 40.0, 40.0, 0.99), face(100.0, 100.0, 120.0, 150.0, 0.6)];
        assert_eq!(largest_face(&faces).map(|f| f.confidence), Some(0.6));
        assert!(largest_face(&[]).is_none());
    }

    #[test]
    fn test_crop_is_padded_square_around_face() {
        let frame = RgbImage::from_pixel(640, 480, Rgb([1, 2, 3]));
        let crop = FaceCrop::around(&frame, &face(270.0, 190.0, 100.0, 100.0, 0.9)).unwrap();
        assert_eq!((crop.left, crop.top), (245, 165));
        assert_eq!(crop.image.dimensions(), (150, 150));
    }

    #[test]
    fn test_crop_is_clamped_at_frame_edge() {
        let frame = RgbImage::from_pixel(640, 480, Rgb([1, 2, 3]));
        let crop = FaceCrop::around(&frame, &face(0.0, 0.0, 100.0, 100.0, 0.9)).unwrap();
        assert_eq!((crop.left, crop.top), (0, 0));
        assert_eq!(crop.image.dimensions(), (125, 125));

        assert!(FaceCrop::around(&frame, &face(900.0, 900.0, 50.0, 50.0, 0.9)).is_none());
    }

    #[test]
    fn test_crop_points_map_back_to_frame() {
        let frame = RgbImage::from_pixel(640, 480, Rgb([0, 0, 0]));
        let crop = FaceCrop::around(&frame, &face(270.0, 190.0, 100.0, 100.0, 0.9)).unwrap();

        // Crop origin and far corner land on the crop's frame-pixel bounds.
        let origin = crop.to_frame(Landmark::new(0.0, 0.0));
        assert!((origin.x - 245.0 / 640.0).abs() < 1e-6);
        assert!((origin.y - 165.0 / 480.0).abs() < 1e-6);
        let corner = crop.to_frame(Landmark::new(1.0, 1.0));
        assert!((corner.x - 395.0 / 640.0).abs() < 1e-6);
        assert!((corner.y - 315.0 / 480.0).abs() < 1e-6);

        // The crop center is the face center.
        let set = LandmarkSet::new(vec![Landmark::new(0.5, 0.5); FACE_MESH_POINTS]).unwrap();
        let mapped = crop.landmarks_to_frame(&set).unwrap();
        assert_eq!(mapped.len(), FACE_MESH_POINTS);
        assert!((mapped.point(0).x - 320.0 / 640.0).abs() < 1e-6);
        assert!((mapped.point(0).y - 240.0 / 480.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou() {
        let a = face(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = face(5.0, 0.0, 10.0, 10.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
        assert!(iou(&a, &face(20.0, 20.0, 10.0, 10.0, 1.0)).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_best_of_overlapping() {
        let kept = nms(
            vec![
                face(5.0, 5.0, 100.0, 100.0, 0.8),
                face(0.0, 0.0, 100.0, 100.0, 0.9),
                face(200.0, 200.0, 50.0, 50.0, 0.7),
            ],
            SCRFD_NMS_THRESHOLD,
        );
        let confidences: Vec<f32> = kept.iter().map(|f| f.confidence).collect();
        assert_eq!(confidences, vec![0.9, 0.7]);
    }

    #[test]
    fn test_decode_stride_maps_to_frame_pixels() {
        // 320x240 frame: scale 2, 80 px of vertical padding.
        let letterbox = Letterbox::fit(320, 240, SCRFD_INPUT_SIZE);
        let stride = 32;
        let grid = SCRFD_INPUT_SIZE as usize / stride;
        let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;

        let mut scores = vec![0.0f32; anchors];
        let mut bboxes = vec![0.0f32; anchors * 4];
        // Cell (x=5, y=5) → anchor center (160, 160) in input pixels.
        let idx = (5 * grid + 5) * SCRFD_ANCHORS_PER_CELL;
        scores[idx] = 0.9;
        bboxes[idx * 4..idx * 4 + 4].copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);

        let faces = decode_stride(&scores, &bboxes, stride, &letterbox);
        assert_eq!(faces.len(), 1);
        let f = faces[0];
        assert!((f.x - 64.0).abs() < 1e-4, "x = {}", f.x);
        assert!((f.y - 24.0).abs() < 1e-4, "y = {}", f.y);
        assert!((f.width - 32.0).abs() < 1e-4);
        assert!((f.height - 32.0).abs() < 1e-4);
    }

    #[test]
    fn test_discover_outputs() {
        let named: Vec<String> = ["bbox_8", "score_8", "bbox_16", "score_16", "bbox_32", "score_32"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(discover_outputs(&named), [(1, 0), (3, 2), (5, 4)]);

        let numeric: Vec<String> = (0..9).map(|i: usize| i.to_string()).collect();
        assert_eq!(discover_outputs(&numeric), [(0, 3), (1, 4), (2, 5)]);
    }
}
