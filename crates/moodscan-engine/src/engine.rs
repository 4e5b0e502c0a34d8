use crate::session::{
    Clock, EndReason, SessionReport, SessionStats, SourceGuard, StopSignal, SystemClock,
};
use image::RgbImage;
use moodscan_core::{
    correct, largest_face, AnalysisRow, ClassifierResult, EmotionClassifier, FaceCrop,
    FaceLocator, FeatureExtractor, LandmarkExtractor, LandmarkSet, TimeSeries, BLINK_THRESHOLD,
};
use moodscan_hw::{Frame, FrameSource};
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

/// Frame rate assumed when a video does not report one.
pub const DEFAULT_VIDEO_FPS: u64 = 25;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Sampling parameters shared by all session modes.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerConfig {
    /// Sampling cadence: seconds for live capture and video, frames for batches.
    pub frame_interval: u32,
    /// Upper bound on a live capture session.
    pub session_duration: Duration,
    pub blink_threshold: f32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            frame_interval: 1,
            session_duration: Duration::from_secs(60),
            blink_threshold: BLINK_THRESHOLD,
        }
    }
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.frame_interval == 0 {
            return Err(EngineError::InvalidConfig(
                "frame_interval must be at least 1".into(),
            ));
        }
        if !(self.blink_threshold > 0.0 && self.blink_threshold < 1.0) {
            return Err(EngineError::InvalidConfig(format!(
                "blink_threshold must be in (0, 1), got {}",
                self.blink_threshold
            )));
        }
        Ok(())
    }
}

/// Where the face models look in one frame.
enum FaceRegion {
    /// No locator configured: the models see the whole frame.
    Frame,
    Crop(FaceCrop),
    NoFace,
    LocatorFailed,
}

/// Result of running one frame through the pipeline.
struct Sample {
    row: AnalysisRow,
    classifier_failed: bool,
    landmark_failed: bool,
}

/// Mutable state for one session: fresh blink tracking, rows, counters.
struct SessionRun {
    id: Uuid,
    extractor: FeatureExtractor,
    series: TimeSeries,
    stats: SessionStats,
}

impl SessionRun {
    fn new(blink_threshold: f32) -> Self {
        Self {
            id: Uuid::new_v4(),
            extractor: FeatureExtractor::new(blink_threshold),
            series: TimeSeries::new(),
            stats: SessionStats::default(),
        }
    }

    fn record(&mut self, sample: Sample) {
        self.stats.frames_sampled += 1;
        if sample.row.has_face() {
            self.stats.faces_detected += 1;
        }
        if sample.classifier_failed {
            self.stats.classifier_fallbacks += 1;
        }
        if sample.landmark_failed {
            self.stats.landmark_failures += 1;
        }
        self.series.push(sample.row);
    }

    fn finish(mut self, end: EndReason) -> SessionReport {
        self.stats.blinks = self.extractor.blink_count();
        tracing::info!(
            rows = self.series.len(),
            frames_read = self.stats.frames_read,
            faces = self.stats.faces_detected,
            blinks = self.stats.blinks,
            fallbacks = self.stats.classifier_fallbacks,
            end = ?end,
            "session finished"
        );
        SessionReport {
            id: self.id,
            series: self.series,
            stats: self.stats,
            end,
        }
    }
}

/// Drives frame sources through classification, landmark geometry and
/// correction, one sampled frame at a time.
///
/// Each `analyze_*` call is an independent session with its own blink state.
pub struct Engine<C, L> {
    classifier: C,
    landmarks: L,
    locator: Option<Box<dyn FaceLocator>>,
    config: SamplerConfig,
    clock: Box<dyn Clock>,
}

impl<C: EmotionClassifier, L: LandmarkExtractor> Engine<C, L> {
    pub fn new(classifier: C, landmarks: L, config: SamplerConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            classifier,
            landmarks,
            locator: None,
            config,
            clock: Box::new(SystemClock),
        })
    }

    /// Replace the wall clock (used for deterministic sessions).
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Locate the face first and run both models on a padded crop of the
    /// largest one. Without a locator the models see whole frames.
    pub fn with_face_locator(mut self, locator: impl FaceLocator + 'static) -> Self {
        self.locator = Some(Box::new(locator));
        self
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Run one frame through the pipeline and build its row.
    pub fn process_one_sample(
        &mut self,
        extractor: &mut FeatureExtractor,
        frame: &RgbImage,
        timestamp_secs: u64,
    ) -> AnalysisRow {
        self.sample(extractor, frame, timestamp_secs).row
    }

    fn sample(
        &mut self,
        extractor: &mut FeatureExtractor,
        frame: &RgbImage,
        timestamp_secs: u64,
    ) -> Sample {
        let region = self.locate(frame, timestamp_secs);
        let face_image = match &region {
            FaceRegion::Crop(crop) => &crop.image,
            _ => frame,
        };

        let (classified, classifier_failed) = match self.classifier.classify(face_image) {
            Ok(result) => (result, false),
            Err(e) => {
                tracing::warn!(
                    t = timestamp_secs,
                    error = %e,
                    "classifier failed; using neutral fallback"
                );
                (ClassifierResult::fallback(), true)
            }
        };

        let (landmarks, landmark_failed) = match &region {
            FaceRegion::NoFace => (None, false),
            FaceRegion::LocatorFailed => (None, true),
            _ => match self.landmarks_in(face_image, &region) {
                Ok(lms) => (lms, false),
                Err(e) => {
                    tracing::warn!(
                        t = timestamp_secs,
                        error = %e,
                        "landmark detection failed; treating as no face"
                    );
                    (None, true)
                }
            },
        };

        let features = landmarks.as_ref().map(|lms| extractor.extract(lms));
        let verdict = correct(&classified, features.as_ref());

        tracing::debug!(
            t = timestamp_secs,
            classifier = %classified.dominant,
            emotion = %verdict.emotion,
            confidence = verdict.confidence,
            rule = ?verdict.rule,
            face = features.is_some(),
            "sampled frame"
        );

        Sample {
            row: AnalysisRow {
                timestamp_secs,
                emotion: verdict.emotion,
                confidence: verdict.confidence,
                features,
            },
            classifier_failed,
            landmark_failed,
        }
    }

    fn locate(&mut self, frame: &RgbImage, timestamp_secs: u64) -> FaceRegion {
        let Some(locator) = self.locator.as_mut() else {
            return FaceRegion::Frame;
        };
        match locator.locate(frame) {
            Ok(faces) => largest_face(&faces)
                .and_then(|face| FaceCrop::around(frame, face))
                .map_or(FaceRegion::NoFace, FaceRegion::Crop),
            Err(e) => {
                tracing::warn!(
                    t = timestamp_secs,
                    error = %e,
                    "face detection failed; treating as no face"
                );
                FaceRegion::LocatorFailed
            }
        }
    }

    /// Mesh points in frame-normalized coordinates.
    fn landmarks_in(
        &mut self,
        image: &RgbImage,
        region: &FaceRegion,
    ) -> Result<Option<LandmarkSet>, moodscan_core::LandmarkError> {
        let Some(found) = self.landmarks.detect(image)? else {
            return Ok(None);
        };
        match region {
            FaceRegion::Crop(crop) => crop.landmarks_to_frame(&found).map(Some),
            _ => Ok(Some(found)),
        }
    }

    fn elapsed_secs(&self, start: Instant) -> u64 {
        self.clock.now().saturating_duration_since(start).as_secs()
    }

    /// Live capture, bounded by the session duration and the stop signal.
    ///
    /// Samples a frame whenever the whole elapsed seconds are a multiple of
    /// the frame interval.
    pub fn analyze_live<S: FrameSource + ?Sized>(
        &mut self,
        source: &mut S,
        stop: &StopSignal,
    ) -> SessionReport {
        let mut run = SessionRun::new(self.config.blink_threshold);
        let span = tracing::info_span!("session", id = %run.id, mode = "live");
        let _enter = span.enter();

        let mut source = SourceGuard::new(source);
        let interval = u64::from(self.config.frame_interval);
        let limit = self.config.session_duration.as_secs();
        let start = self.clock.now();

        let end = loop {
            if stop.is_stopped() {
                break EndReason::Stopped;
            }
            if self.elapsed_secs(start) >= limit {
                break EndReason::DurationElapsed;
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break EndReason::Exhausted,
                Err(e) => {
                    tracing::warn!(error = %e, "frame read failed; ending session");
                    break EndReason::SourceFailed;
                }
            };
            run.stats.frames_read += 1;

            let t = self.elapsed_secs(start);
            if t % interval == 0 {
                let sample = self.sample(&mut run.extractor, &frame.image, t);
                run.record(sample);
            }
        };

        run.finish(end)
    }

    /// Video file: one sample every `fps * frame_interval` frames, stamped
    /// with the whole seconds of video time.
    pub fn analyze_video<S: FrameSource + ?Sized>(
        &mut self,
        source: &mut S,
        stop: &StopSignal,
    ) -> SessionReport {
        let mut run = SessionRun::new(self.config.blink_threshold);
        let span = tracing::info_span!("session", id = %run.id, mode = "video");
        let _enter = span.enter();

        let fps = effective_fps(source.frame_rate());
        let step = fps.saturating_mul(u64::from(self.config.frame_interval));
        tracing::info!(fps, step, "video sampling cadence");

        let mut source = SourceGuard::new(source);
        let mut index = 0u64;

        let end = loop {
            if stop.is_stopped() {
                break EndReason::Stopped;
            }
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break EndReason::Exhausted,
                Err(e) => {
                    tracing::warn!(frame = index + 1, error = %e, "decode failed; ending session");
                    break EndReason::SourceFailed;
                }
            };
            index += 1;
            run.stats.frames_read += 1;

            if index % step == 0 {
                let sample = self.sample(&mut run.extractor, &frame.image, index / fps);
                run.record(sample);
            }
        };

        run.finish(end)
    }

    /// Pre-captured frames: every `frame_interval`-th frame by index,
    /// stamped with wall-clock time since the session started.
    pub fn analyze_frames(&mut self, frames: &[Frame]) -> SessionReport {
        let mut run = SessionRun::new(self.config.blink_threshold);
        let span = tracing::info_span!("session", id = %run.id, mode = "batch");
        let _enter = span.enter();

        let interval = self.config.frame_interval as usize;
        let start = self.clock.now();

        for (i, frame) in frames.iter().enumerate() {
            run.stats.frames_read += 1;
            let t = self.elapsed_secs(start);
            if i % interval == 0 {
                let sample = self.sample(&mut run.extractor, &frame.image, t);
                run.record(sample);
            }
        }

        run.finish(EndReason::Exhausted)
    }
}

/// Whole frames per second used for video sampling.
fn effective_fps(rate: Option<f64>) -> u64 {
    rate.filter(|r| r.is_finite() && *r >= 1.0)
        .map(|r| r.trunc() as u64)
        .unwrap_or(DEFAULT_VIDEO_FPS)
}

/// Capture frames into memory until the source ends, the duration elapses,
/// or the stop signal is raised. The frames are analyzed afterwards with
/// [`Engine::analyze_frames`].
pub fn record_frames<S: FrameSource + ?Sized>(
    source: &mut S,
    duration: Duration,
    stop: &StopSignal,
    clock: &dyn Clock,
) -> (Vec<Frame>, EndReason) {
    let mut source = SourceGuard::new(source);
    let mut frames = Vec::new();
    let start = clock.now();

    let end = loop {
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break EndReason::Exhausted,
            Err(e) => {
                tracing::warn!(error = %e, "frame read failed; ending recording");
                break EndReason::SourceFailed;
            }
        };
        frames.push(frame);

        if clock.now().saturating_duration_since(start) >= duration {
            break EndReason::DurationElapsed;
        }
        if stop.is_stopped() {
            break EndReason::Stopped;
        }
    };

    tracing::info!(frames = frames.len(), end = ?end, "recording finished");
    (frames, end)
}
