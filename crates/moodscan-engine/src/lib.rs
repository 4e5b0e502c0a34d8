//! moodscan-engine: Frame sampling and per-session analysis.
//!
//! Runs a [`moodscan_hw::FrameSource`] through the classifier, landmark
//! extractor and correction rules, producing one [`moodscan_core::TimeSeries`]
//! per session.

pub mod engine;
pub mod session;

pub use engine::{record_frames, Engine, EngineError, SamplerConfig, DEFAULT_VIDEO_FPS};
pub use session::{Clock, EndReason, SessionReport, SessionStats, StopSignal, SystemClock};
