use crate::engine::EngineSettings;
use anyhow::{Context, Result};
use rollcall_core::{DataLayout, LbphParams, DEFAULT_CONFIDENCE_THRESHOLD};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Name of the optional config file inside the data root.
pub const CONFIG_FILE: &str = "rollcall.toml";

/// Runtime configuration.
///
/// Defaults, then `<data_dir>/rollcall.toml`, then `ROLLCALL_*` environment
/// variables, each overriding the last.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Root holding TrainingImage/, StudentDetails/, TrainingImageLabel/ and Attendance/.
    pub data_dir: PathBuf,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing det_10g.onnx.
    pub model_dir: PathBuf,
    /// LBPH distance below which a face counts as recognized.
    pub confidence_threshold: f64,
    /// Samples to capture per registration.
    pub sample_target: u32,
    /// Pause between frames while capturing samples.
    pub capture_delay_ms: u64,
    /// Pause between frames while taking attendance.
    pub track_delay_ms: u64,
    /// Frames discarded after opening the camera (auto-exposure settling).
    pub warmup_frames: usize,
    /// Faces with a shorter side than this are not saved as samples.
    pub min_face_px: u32,
    /// Log each student at most once per attendance session.
    pub dedupe_attendance: bool,
    /// Show the live preview window.
    pub preview: bool,
    /// Address printed by `rollcall contact`.
    pub contact: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            camera_device: "/dev/video0".to_string(),
            model_dir: rollcall_core::default_model_dir(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            sample_target: 100,
            capture_delay_ms: 100,
            track_delay_ms: 1,
            warmup_frames: 4,
            min_face_px: 48,
            dedupe_attendance: true,
            preview: true,
            contact: "contact@attendance.com".to_string(),
        }
    }
}

impl Config {
    /// Load from the process environment and the config file in the data root.
    ///
    /// `data_dir` (from `--data-dir`) wins over `ROLLCALL_DATA_DIR`.
    pub fn load(data_dir: Option<PathBuf>) -> Result<Self> {
        Self::load_with(data_dir, |key| std::env::var(key).ok())
    }

    fn load_with(
        data_dir: Option<PathBuf>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let data_dir = data_dir
            .or_else(|| lookup("ROLLCALL_DATA_DIR").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."));

        let mut config = Self::from_file(&data_dir.join(CONFIG_FILE))?;
        config.data_dir = data_dir;
        config.apply_env(lookup);
        config.clamp_min_face();
        Ok(config)
    }

    /// Parse a config file; a missing file yields the defaults.
    fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let config = toml::from_str(&text)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("ROLLCALL_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        if let Some(v) = lookup("ROLLCALL_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        set_parsed(&lookup, "ROLLCALL_CONFIDENCE_THRESHOLD", &mut self.confidence_threshold);
        set_parsed(&lookup, "ROLLCALL_SAMPLE_TARGET", &mut self.sample_target);
        set_parsed(&lookup, "ROLLCALL_CAPTURE_DELAY_MS", &mut self.capture_delay_ms);
        set_parsed(&lookup, "ROLLCALL_TRACK_DELAY_MS", &mut self.track_delay_ms);
        set_parsed(&lookup, "ROLLCALL_WARMUP_FRAMES", &mut self.warmup_frames);
        set_parsed(&lookup, "ROLLCALL_MIN_FACE_PX", &mut self.min_face_px);
        if let Some(v) = lookup("ROLLCALL_RECORD_EVERY_MATCH") {
            self.dedupe_attendance = v == "0";
        }
        if let Some(v) = lookup("ROLLCALL_PREVIEW") {
            self.preview = v != "0";
        }
        if let Some(v) = lookup("ROLLCALL_CONTACT") {
            self.contact = v;
        }
    }

    /// Samples smaller than the recognizer grid could never be trained on.
    fn clamp_min_face(&mut self) {
        let (min_w, min_h) = LbphParams::default().min_image_size();
        let floor = min_w.max(min_h);
        if self.min_face_px < floor {
            tracing::warn!(
                configured = self.min_face_px,
                using = floor,
                "min_face_px below the recognizer minimum"
            );
            self.min_face_px = floor;
        }
    }

    pub fn layout(&self) -> DataLayout {
        DataLayout::new(&self.data_dir)
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> PathBuf {
        self.model_dir.join("det_10g.onnx")
    }

    pub fn engine_settings(&self, frame_delay_ms: u64) -> EngineSettings {
        EngineSettings {
            camera_device: self.camera_device.clone(),
            detector_path: self.scrfd_model_path(),
            warmup_frames: self.warmup_frames,
            frame_delay: Duration::from_millis(frame_delay_ms),
        }
    }
}

/// Overwrite `slot` when `key` is set and parses; ignore it with a warning otherwise.
fn set_parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.parse() {
        Ok(v) => *slot = v,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable environment variable"),
    }
}
