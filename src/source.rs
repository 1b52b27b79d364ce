//! Source descriptor parsed from the single positional argument

use crate::error::{HeadcountError, HeadcountResult};
use std::fmt;
use std::path::{Path, PathBuf};

/// V4L2 device opened by the camera branch
pub const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";

/// Where frames come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    Camera { device_path: PathBuf },
    EncodedFile { path: PathBuf },
    ConfigDriven { config_path: PathBuf },
}

/// Discriminant of [`SourceDescriptor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Camera,
    EncodedFile,
    ConfigDriven,
}

impl SourceDescriptor {
    /// Classify the command line argument.
    ///
    /// `camera` selects the camera, `*.h264` an elementary stream file and
    /// `*.yml`/`*.yaml` a declarative source configuration.
    pub fn parse(arg: &str) -> HeadcountResult<Self> {
        if arg == "camera" {
            return Ok(SourceDescriptor::Camera {
                device_path: PathBuf::from(DEFAULT_CAMERA_DEVICE),
            });
        }
        if arg.ends_with(".h264") {
            return Ok(SourceDescriptor::EncodedFile {
                path: PathBuf::from(arg),
            });
        }
        if arg.ends_with(".yml") || arg.ends_with(".yaml") {
            return Ok(SourceDescriptor::ConfigDriven {
                config_path: PathBuf::from(arg),
            });
        }
        Err(HeadcountError::Argument(format!(
            "unrecognized source '{}': expected 'camera', an .h264 file or a .yml/.yaml config",
            arg
        )))
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            SourceDescriptor::Camera { .. } => SourceKind::Camera,
            SourceDescriptor::EncodedFile { .. } => SourceKind::EncodedFile,
            SourceDescriptor::ConfigDriven { .. } => SourceKind::ConfigDriven,
        }
    }

    /// Replace the capture device of a camera descriptor
    pub fn with_camera_device(self, device: impl AsRef<Path>) -> Self {
        match self {
            SourceDescriptor::Camera { .. } => SourceDescriptor::Camera {
                device_path: device.as_ref().to_path_buf(),
            },
            other => other,
        }
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDescriptor::Camera { device_path } => {
                write!(f, "camera ({})", device_path.display())
            }
            SourceDescriptor::EncodedFile { path } => write!(f, "{}", path.display()),
            SourceDescriptor::ConfigDriven { config_path } => {
                write!(f, "{}", config_path.display())
            }
        }
    }
}
