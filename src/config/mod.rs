//! Configuration management
//!
//! `AppConfig` carries the hard-coded defaults of the pipeline (muxer presets,
//! camera caps, overlay style, inference config path) and can be overridden
//! from a TOML file. Declarative source files for the config-driven branch are
//! handled by [`deepstream`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{HeadcountError, HeadcountResult};

pub mod deepstream;

pub use deepstream::{DeepStreamConfig, SourceGroup, SourceType, StreammuxGroup};

/// Class id the detector assigns to people
pub const PERSON_CLASS_ID: i32 = 0;

/// Inference stage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Config file handed to the inference element, format owned by it
    pub config_path: PathBuf,
    /// GPU used by the converters, the OSD and inference
    pub gpu_id: u32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("dstest1_usb_pgie_config.yml"),
            gpu_id: 0,
        }
    }
}

/// Batch aggregator parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxerConfig {
    pub batch_size: u32,
    /// Flush timeout since the first unflushed frame, in microseconds
    pub batched_push_timeout_us: u32,
    /// Output resolution [width, height] for the camera branch
    pub camera_resolution: [u32; 2],
    /// Output resolution [width, height] for the file branch
    pub file_resolution: [u32; 2],
}

impl Default for MuxerConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            batched_push_timeout_us: 40_000,
            camera_resolution: [1280, 720],
            file_resolution: [1920, 1080],
        }
    }
}

/// Camera capture configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub device: PathBuf,
    /// Caps forced right after capture
    pub raw_caps: String,
    /// Caps of the accelerated converter output
    pub nvmm_caps: String,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from(crate::source::DEFAULT_CAMERA_DEVICE),
            raw_caps: "video/x-raw".to_string(),
            nvmm_caps: "video/x-raw(memory:NVMM), format=NV12, framerate=30/1".to_string(),
        }
    }
}

/// Overlay text configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub font_name: String,
    pub font_size: u32,
    pub x_offset: u32,
    pub y_offset: u32,
    /// Labels of the tracked classes, indexed by class id
    pub class_labels: Vec<String>,
    /// Class whose count is displayed
    pub display_class_id: i32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            font_name: "Serif".to_string(),
            font_size: 10,
            x_offset: 10,
            y_offset: 12,
            class_labels: vec!["Person".to_string(), "Bag".to_string(), "Face".to_string()],
            display_class_id: PERSON_CLASS_ID,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Render to a window; otherwise frames are discarded by a fakesink
    pub display: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { display: true }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub inference: InferenceConfig,
    pub muxer: MuxerConfig,
    pub camera: CameraConfig,
    pub overlay: OverlayConfig,
    pub output: OutputConfig,
}

impl AppConfig {
    /// Defaults, or the given TOML file layered over them
    pub fn load(path: Option<&Path>) -> HeadcountResult<Self> {
        match path {
            Some(path) => Self::from_toml_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from TOML file
    pub fn from_toml_file(path: &Path) -> HeadcountResult<Self> {
        if !path.exists() {
            return Err(HeadcountError::ConfigNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_toml_file(&self, path: &Path) -> HeadcountResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| HeadcountError::ConfigParse(format!("TOML serialize error: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> HeadcountResult<()> {
        if self.muxer.batch_size == 0 {
            return Err(invalid("muxer.batch_size", self.muxer.batch_size));
        }
        if self.muxer.batched_push_timeout_us == 0 {
            return Err(invalid(
                "muxer.batched_push_timeout_us",
                self.muxer.batched_push_timeout_us,
            ));
        }
        for (field, [w, h]) in [
            ("muxer.camera_resolution", self.muxer.camera_resolution),
            ("muxer.file_resolution", self.muxer.file_resolution),
        ] {
            if w == 0 || h == 0 {
                return Err(invalid(field, format!("{}x{}", w, h)));
            }
        }
        if self.overlay.font_size == 0 {
            return Err(invalid("overlay.font_size", self.overlay.font_size));
        }
        if self.overlay.class_labels.is_empty() {
            return Err(invalid("overlay.class_labels", "[]"));
        }
        let displayed = self.overlay.display_class_id;
        if displayed < 0 || displayed as usize >= self.overlay.class_labels.len() {
            return Err(invalid("overlay.display_class_id", displayed));
        }
        if self.camera.raw_caps.trim().is_empty() {
            return Err(invalid("camera.raw_caps", "\"\""));
        }
        if !self.camera.nvmm_caps.contains("memory:NVMM") {
            return Err(invalid("camera.nvmm_caps", &self.camera.nvmm_caps));
        }
        Ok(())
    }

    /// Label of the displayed class
    pub fn display_label(&self) -> &str {
        self.overlay
            .class_labels
            .get(self.overlay.display_class_id as usize)
            .map(String::as_str)
            .unwrap_or("Person")
    }
}

fn invalid(field: &str, value: impl ToString) -> HeadcountError {
    HeadcountError::InvalidConfigValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}
