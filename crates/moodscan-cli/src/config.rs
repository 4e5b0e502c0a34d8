//! Layered configuration: defaults, TOML file, `MOODSCAN_*` environment
//! variables, then CLI flags (applied by the caller).

use anyhow::{bail, Context, Result};
use moodscan_engine::SamplerConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";
/// Live webcam analysis length when none is configured.
pub const LIVE_SESSION_SECS: u64 = 300;
/// Record-then-analyze length when none is configured.
pub const RECORD_SESSION_SECS: u64 = 60;

/// One configuration layer. Unset keys leave lower layers untouched.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    pub camera_device: Option<String>,
    pub model_dir: Option<PathBuf>,
    pub detector_model: Option<String>,
    pub landmark_model: Option<String>,
    pub emotion_model: Option<String>,
    pub frame_interval: Option<u32>,
    pub session_duration_secs: Option<u64>,
    pub blink_threshold: Option<f32>,
    pub output_dir: Option<PathBuf>,
}

impl ConfigLayer {
    /// Parse a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Read `MOODSCAN_*` variables through `lookup`.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            camera_device: lookup("MOODSCAN_CAMERA_DEVICE"),
            model_dir: lookup("MOODSCAN_MODEL_DIR").map(PathBuf::from),
            detector_model: lookup("MOODSCAN_DETECTOR_MODEL"),
            landmark_model: lookup("MOODSCAN_LANDMARK_MODEL"),
            emotion_model: lookup("MOODSCAN_EMOTION_MODEL"),
            frame_interval: parse_var(&lookup, "MOODSCAN_FRAME_INTERVAL"),
            session_duration_secs: parse_var(&lookup, "MOODSCAN_SESSION_DURATION_SECS"),
            blink_threshold: parse_var(&lookup, "MOODSCAN_BLINK_THRESHOLD"),
            output_dir: lookup("MOODSCAN_OUTPUT_DIR").map(PathBuf::from),
        }
    }

    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Overlay `other` on top of `self`.
    pub fn merge(&mut self, other: ConfigLayer) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field;
                })*
            };
        }
        take!(
            camera_device,
            model_dir,
            detector_model,
            landmark_model,
            emotion_model,
            frame_interval,
            session_duration_secs,
            blink_threshold,
            output_dir
        );
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment variable");
            None
        }
    }
}

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// V4L2 device path.
    pub camera_device: String,
    /// Directory holding the ONNX models.
    pub model_dir: PathBuf,
    pub detector_model: String,
    pub landmark_model: String,
    pub emotion_model: String,
    /// Seconds between samples (frames, for batches).
    pub frame_interval: u32,
    /// Unset means the command's own default.
    pub session_duration_secs: Option<u64>,
    pub blink_threshold: f32,
    /// Where report files are written.
    pub output_dir: PathBuf,
}

impl Config {
    /// Load defaults, then the config file, then the environment, then
    /// `overrides` (CLI flags).
    ///
    /// An explicit `path` must exist; the XDG default may be absent.
    pub fn load(path: Option<&Path>, overrides: ConfigLayer) -> Result<Self> {
        let mut layer = ConfigLayer::default();

        match path {
            Some(p) => layer.merge(ConfigLayer::from_file(p)?),
            None => {
                if let Some(p) = xdg_config_path().filter(|p| p.exists()) {
                    tracing::info!(path = %p.display(), "loading config");
                    layer.merge(ConfigLayer::from_file(&p)?);
                }
            }
        }

        layer.merge(ConfigLayer::from_env());
        layer.merge(overrides);
        Self::resolve(layer)
    }

    /// Fill unset keys with defaults and validate.
    pub fn resolve(layer: ConfigLayer) -> Result<Self> {
        let config = Self {
            camera_device: layer
                .camera_device
                .unwrap_or_else(|| DEFAULT_CAMERA_DEVICE.to_string()),
            model_dir: layer.model_dir.unwrap_or_else(moodscan_core::default_model_dir),
            detector_model: layer
                .detector_model
                .unwrap_or_else(|| moodscan_core::DETECTOR_MODEL_FILE.to_string()),
            landmark_model: layer
                .landmark_model
                .unwrap_or_else(|| moodscan_core::LANDMARK_MODEL_FILE.to_string()),
            emotion_model: layer
                .emotion_model
                .unwrap_or_else(|| moodscan_core::EMOTION_MODEL_FILE.to_string()),
            frame_interval: layer.frame_interval.unwrap_or(1),
            session_duration_secs: layer.session_duration_secs,
            blink_threshold: layer
                .blink_threshold
                .unwrap_or(moodscan_core::BLINK_THRESHOLD),
            output_dir: layer.output_dir.unwrap_or_else(|| PathBuf::from(".")),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.frame_interval == 0 {
            bail!("frame_interval must be at least 1");
        }
        if !(self.blink_threshold > 0.0 && self.blink_threshold < 1.0) {
            bail!("blink_threshold must be in (0, 1), got {}", self.blink_threshold);
        }
        if self.session_duration_secs == Some(0) {
            bail!("session_duration_secs must be at least 1");
        }
        Ok(())
    }

    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join(&self.detector_model)
            .to_string_lossy()
            .into_owned()
    }

    pub fn landmark_model_path(&self) -> String {
        self.model_dir
            .join(&self.landmark_model)
            .to_string_lossy()
            .into_owned()
    }

    pub fn emotion_model_path(&self) -> String {
        self.model_dir
            .join(&self.emotion_model)
            .to_string_lossy()
            .into_owned()
    }

    /// Sampler settings; `default_secs` applies when no duration is configured.
    pub fn sampler(&self, default_secs: u64) -> SamplerConfig {
        SamplerConfig {
            frame_interval: self.frame_interval,
            session_duration: Duration::from_secs(
                self.session_duration_secs.unwrap_or(default_secs),
            ),
            blink_threshold: self.blink_threshold,
        }
    }
}

/// `$XDG_CONFIG_HOME/moodscan/config.toml`, else `~/.config/moodscan/config.toml`.
fn xdg_config_path() -> Option<PathBuf> {
    let base = match std::env::var("XDG_CONFIG_HOME") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(std::env::var("HOME").ok()?).join(".config"),
    };
    Some(base.join("moodscan").join("config.toml"))
}
