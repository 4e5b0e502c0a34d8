//! Frame source abstraction and the in-memory frame batch.

use crate::camera::CameraError;
use crate::frame::{Frame, FrameError};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Image extensions picked up by [`FrameBatch::from_dir`].
const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("cannot open {path}: {reason}")]
    Open { path: String, reason: String },
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("video decoding unavailable: built without the `opencv` feature")]
    VideoUnsupported,
    #[error("image: {0}")]
    Image(#[from] image::ImageError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// A stream of frames: live camera, video file, or pre-captured batch.
///
/// Sources are exclusively owned by one session. `close` must be idempotent,
/// and a closed source reports end of stream.
pub trait FrameSource {
    /// Next frame, or `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;

    /// Native frame rate, when the source knows it.
    fn frame_rate(&self) -> Option<f64> {
        None
    }

    /// Release the underlying device or file handle.
    fn close(&mut self);
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        (**self).next_frame()
    }

    fn frame_rate(&self) -> Option<f64> {
        (**self).frame_rate()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Pre-captured frames replayed in order.
#[derive(Debug, Default)]
pub struct FrameBatch {
    frames: VecDeque<Frame>,
    frame_rate: Option<f64>,
}

impl FrameBatch {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
            frame_rate: None,
        }
    }

    /// Replay the frames as if they came from a source at `fps`.
    pub fn with_frame_rate(mut self, fps: f64) -> Self {
        self.frame_rate = Some(fps);
        self
    }

    /// Load every image file in `dir`, sorted by file name.
    pub fn from_dir(dir: &Path) -> Result<Self, SourceError> {
        if !dir.is_dir() {
            return Err(SourceError::NotFound(dir.display().to_string()));
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_image_file(p))
            .collect();
        paths.sort();

        let mut frames = Vec::with_capacity(paths.len());
        for (i, path) in paths.iter().enumerate() {
            let image = image::open(path)?.to_rgb8();
            frames.push(Frame::new(image, i as u32));
        }

        tracing::info!(dir = %dir.display(), frames = frames.len(), "loaded frame batch");
        Ok(Self::new(frames))
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn into_frames(self) -> Vec<Frame> {
        self.frames.into()
    }
}

impl FrameSource for FrameBatch {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        Ok(self.frames.pop_front())
    }

    fn frame_rate(&self) -> Option<f64> {
        self.frame_rate
    }

    fn close(&mut self) {
        self.frames.clear();
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}
