//! Video file decoding through OpenCV's `videoio` module.
//!
//! Only available with the `opencv` feature; without it [`VideoFile::open`]
//! fails with [`SourceError::VideoUnsupported`].

use crate::frame::Frame;
use crate::source::{FrameSource, SourceError};
use std::path::Path;

#[cfg(feature = "opencv")]
use opencv::{core::Mat, imgproc, prelude::*, videoio};

/// A decodable video file.
pub struct VideoFile {
    path: String,
    fps: Option<f64>,
    #[cfg(feature = "opencv")]
    sequence: u32,
    #[cfg(feature = "opencv")]
    capture: Option<videoio::VideoCapture>,
}

impl VideoFile {
    #[cfg(feature = "opencv")]
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let display = path.display().to_string();
        if !path.exists() {
            return Err(SourceError::NotFound(display));
        }

        let capture = videoio::VideoCapture::from_file(&display, videoio::CAP_ANY).map_err(|e| {
            SourceError::Open {
                path: display.clone(),
                reason: e.to_string(),
            }
        })?;

        let opened = capture.is_opened().map_err(|e| SourceError::Open {
            path: display.clone(),
            reason: e.to_string(),
        })?;
        if !opened {
            return Err(SourceError::Open {
                path: display,
                reason: "no decoder accepted the file".into(),
            });
        }

        let fps = capture
            .get(videoio::CAP_PROP_FPS)
            .ok()
            .filter(|f| f.is_finite() && *f > 0.0);

        tracing::info!(path = %display, fps = ?fps, "opened video file");

        Ok(Self {
            path: display,
            fps,
            sequence: 0,
            capture: Some(capture),
        })
    }

    #[cfg(not(feature = "opencv"))]
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        if !path.exists() {
            return Err(SourceError::NotFound(path.display().to_string()));
        }
        Err(SourceError::VideoUnsupported)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    #[cfg(feature = "opencv")]
    fn decode_next(&mut self) -> Result<Option<Frame>, SourceError> {
        let Some(capture) = self.capture.as_mut() else {
            return Ok(None);
        };

        let mut bgr = Mat::default();
        let ok = capture
            .read(&mut bgr)
            .map_err(|e| SourceError::Decode(e.to_string()))?;
        if !ok || bgr.empty() {
            return Ok(None);
        }

        let mut rgb = Mat::default();
        imgproc::cvt_color(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0)
            .map_err(|e| SourceError::Decode(e.to_string()))?;

        let width = rgb.cols() as u32;
        let height = rgb.rows() as u32;
        let data = rgb
            .data_bytes()
            .map_err(|e| SourceError::Decode(e.to_string()))?
            .to_vec();
        let image = image::RgbImage::from_raw(width, height, data).ok_or_else(|| {
            SourceError::Decode(format!("frame buffer does not match {width}x{height}"))
        })?;

        let frame = Frame::new(image, self.sequence);
        self.sequence += 1;
        Ok(Some(frame))
    }

    #[cfg(not(feature = "opencv"))]
    fn decode_next(&mut self) -> Result<Option<Frame>, SourceError> {
        Ok(None)
    }
}

impl FrameSource for VideoFile {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        self.decode_next()
    }

    fn frame_rate(&self) -> Option<f64> {
        self.fps
    }

    fn close(&mut self) {
        #[cfg(feature = "opencv")]
        if let Some(mut capture) = self.capture.take() {
            if let Err(e) = capture.release() {
                tracing::warn!(path = %self.path, error = %e, "video release failed");
            }
            tracing::debug!(path = %self.path, frames = self.sequence, "video closed");
        }
    }
}

impl Drop for VideoFile {
    fn drop(&mut self) {
        self.close();
    }
}
