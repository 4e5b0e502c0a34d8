//! moodscan-hw: Frame sources for the analysis pipeline.
//!
//! V4L2 webcam capture, OpenCV-backed video file decoding (feature
//! `opencv`) and in-memory frame batches, all behind [`FrameSource`].

pub mod camera;
pub mod frame;
pub mod source;
pub mod video;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::Frame;
pub use source::{FrameBatch, FrameSource, SourceError};
pub use video::VideoFile;
