//! V4L2 webcam capture via the `v4l` crate.

use crate::frame::{self, Frame};
use crate::source::{FrameSource, SourceError};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::capability::Flags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

// --- Named constants ---
const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;
/// `/dev/video0` .. `/dev/video15` are probed by [`Camera::list_devices`].
const MAX_VIDEO_NODES: u32 = 16;
/// Linux `EBUSY`, returned when another process holds the device.
const EBUSY: i32 = 16;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("camera not found: {0}")]
    NotFound(String),
    #[error("camera {0} is in use by another process")]
    Busy(String),
    #[error("cannot open camera {path}: {reason}")]
    Open { path: String, reason: String },
    #[error("{0} is not a video capture device")]
    NotCaptureDevice(String),
    #[error("no supported pixel format (driver offered {0})")]
    UnsupportedFormat(String),
    #[error("capture failed: {0}")]
    Capture(String),
}

/// A V4L2 capture node found by [`Camera::list_devices`].
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Pixel layouts the camera can decode, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed YUYV 4:2:2.
    Yuyv,
    /// Motion JPEG, one JPEG per buffer.
    Mjpeg,
    /// 8-bit luma only.
    Grey,
}

impl PixelFormat {
    const PREFERRED: [PixelFormat; 3] = [PixelFormat::Yuyv, PixelFormat::Mjpeg, PixelFormat::Grey];

    fn fourcc(self) -> FourCC {
        match self {
            PixelFormat::Yuyv => FourCC::new(b"YUYV"),
            PixelFormat::Mjpeg => FourCC::new(b"MJPG"),
            PixelFormat::Grey => FourCC::new(b"GREY"),
        }
    }

    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        Self::PREFERRED.into_iter().find(|f| f.fourcc() == fourcc)
    }

    fn decode(
        self,
        buf: &[u8],
        width: u32,
        height: u32,
    ) -> Result<image::RgbImage, frame::FrameError> {
        match self {
            PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, width, height),
            PixelFormat::Mjpeg => frame::mjpeg_to_rgb(buf),
            PixelFormat::Grey => frame::grey_to_rgb(buf, width, height),
        }
    }
}

/// Webcam opened for RGB capture. The mmap stream starts on the first read
/// and is released by [`FrameSource::close`] or on drop.
pub struct Camera {
    device: Device,
    stream: Option<MmapStream<'static>>,
    pub device_path: String,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    frames: u32,
    closed: bool,
}

impl Camera {
    /// Open a capture device (e.g. "/dev/video0") and negotiate 640x480.
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::NotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.raw_os_error() == Some(EBUSY) {
                CameraError::Busy(device_path.to_string())
            } else {
                CameraError::Open {
                    path: device_path.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let caps = device.query_caps().map_err(|e| CameraError::Open {
            path: device_path.to_string(),
            reason: format!("capability query failed: {e}"),
        })?;
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE | Flags::STREAMING) {
            return Err(CameraError::NotCaptureDevice(device_path.to_string()));
        }

        let (width, height, pixel_format) = negotiate(&device)?;

        tracing::info!(
            device = device_path,
            card = %caps.card,
            driver = %caps.driver,
            width,
            height,
            format = ?pixel_format,
            "camera opened"
        );

        Ok(Self {
            device,
            stream: None,
            device_path: device_path.to_string(),
            width,
            height,
            pixel_format,
            frames: 0,
            closed: false,
        })
    }

    /// Dequeue the next buffer and convert it to RGB.
    pub fn capture_frame(&mut self) -> Result<Frame, CameraError> {
        if self.stream.is_none() {
            let stream =
                MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
                    .map_err(|e| CameraError::Capture(format!("stream setup: {e}")))?;
            self.stream = Some(stream);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(CameraError::Capture("stream not started".into()));
        };

        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::Capture(format!("dequeue: {e}")))?;
        let image = self
            .pixel_format
            .decode(buf, self.width, self.height)
            .map_err(|e| CameraError::Capture(e.to_string()))?;

        tracing::trace!(driver_seq = meta.sequence, seq = self.frames, "frame captured");
        let frame = Frame::new(image, self.frames);
        self.frames += 1;
        Ok(frame)
    }

    /// Capture-capable V4L2 nodes present on this machine.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..MAX_VIDEO_NODES)
            .map(|i| format!("/dev/video{i}"))
            .filter(|path| Path::new(path).exists())
            .filter_map(|path| probe(&path))
            .collect()
    }
}

/// Ask for each preferred format at the target size and keep the first one
/// the driver accepts. Drivers may adjust the size; the adjusted size wins.
fn negotiate(device: &Device) -> Result<(u32, u32, PixelFormat), CameraError> {
    let mut fmt = device
        .format()
        .map_err(|e| CameraError::Capture(format!("format query: {e}")))?;
    let mut offered = Vec::new();

    for wanted in PixelFormat::PREFERRED {
        fmt.fourcc = wanted.fourcc();
        fmt.width = CAPTURE_WIDTH;
        fmt.height = CAPTURE_HEIGHT;
        let Ok(actual) = device.set_format(&fmt) else {
            continue;
        };
        match PixelFormat::from_fourcc(actual.fourcc) {
            Some(pf) => return Ok((actual.width, actual.height, pf)),
            None => offered.push(format!("{:?}", actual.fourcc)),
        }
    }

    Err(CameraError::UnsupportedFormat(offered.join(", ")))
}

fn probe(path: &str) -> Option<DeviceInfo> {
    let caps = Device::with_path(path).ok()?.query_caps().ok()?;
    caps.capabilities
        .contains(Flags::VIDEO_CAPTURE)
        .then(|| DeviceInfo {
            path: path.to_string(),
            name: caps.card,
            driver: caps.driver,
            bus: caps.bus,
        })
}

impl FrameSource for Camera {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        if self.closed {
            return Ok(None);
        }
        Ok(Some(self.capture_frame()?))
    }

    fn frame_rate(&self) -> Option<f64> {
        let interval = self.device.params().ok()?.interval;
        (interval.numerator > 0)
            .then(|| f64::from(interval.denominator) / f64::from(interval.numerator))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        // Dropping the stream unmaps the buffers and stops streaming.
        self.stream = None;
        tracing::info!(device = %self.device_path, frames = self.frames, "camera closed");
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_device() {
        assert!(matches!(
            Camera::open("/dev/moodscan-no-such-camera"),
            Err(CameraError::NotFound(_))
        ));
    }

    #[test]
    fn test_pixel_format_fourcc_mapping() {
        for pf in PixelFormat::PREFERRED {
            assert_eq!(PixelFormat::from_fourcc(pf.fourcc()), Some(pf));
        }
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"NV12")), None);
    }

    #[test]
    fn test_grey_decode_expands_to_rgb() {
        let rgb = PixelFormat::Grey.decode(&[9, 9, 9, 9], 2, 2).unwrap();
        assert_eq!(rgb.get_pixel(1, 1).0, [9, 9, 9]);
    }
}
