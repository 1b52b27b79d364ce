//! Compute device capability probe
//!
//! The integrated/discrete answer gates several branches of graph assembly,
//! so it is queried exactly once before the builder runs.

use crate::error::{HeadcountError, HeadcountResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Whether the active GPU shares memory with the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityFlag {
    /// Shared-memory device (Jetson / Tegra)
    Integrated,
    /// PCIe card with its own memory
    Discrete,
}

impl CapabilityFlag {
    pub fn is_integrated(self) -> bool {
        matches!(self, CapabilityFlag::Integrated)
    }
}

impl fmt::Display for CapabilityFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityFlag::Integrated => write!(f, "integrated"),
            CapabilityFlag::Discrete => write!(f, "discrete"),
        }
    }
}

impl FromStr for CapabilityFlag {
    type Err = HeadcountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "integrated" | "igpu" | "tegra" => Ok(CapabilityFlag::Integrated),
            "discrete" | "dgpu" => Ok(CapabilityFlag::Discrete),
            other => Err(HeadcountError::Argument(format!(
                "unknown GPU kind '{}', expected 'integrated' or 'discrete'",
                other
            ))),
        }
    }
}

/// Properties of the active compute device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProperties {
    pub device_id: u32,
    pub name: String,
    pub integrated: bool,
}

impl DeviceProperties {
    pub fn capability(&self) -> CapabilityFlag {
        if self.integrated {
            CapabilityFlag::Integrated
        } else {
            CapabilityFlag::Discrete
        }
    }
}

/// Device query. Failure is a fatal startup error for the caller.
pub trait CapabilityProbe {
    fn probe(&self) -> HeadcountResult<DeviceProperties>;
}

/// Probe that always answers with the same device
#[derive(Debug, Clone)]
pub struct FixedProbe {
    properties: DeviceProperties,
}

impl FixedProbe {
    pub fn new(flag: CapabilityFlag) -> Self {
        Self {
            properties: DeviceProperties {
                device_id: 0,
                name: format!("{} GPU (override)", flag),
                integrated: flag.is_integrated(),
            },
        }
    }
}

impl CapabilityProbe for FixedProbe {
    fn probe(&self) -> HeadcountResult<DeviceProperties> {
        Ok(self.properties.clone())
    }
}

const TEGRA_RELEASE: &str = "etc/nv_tegra_release";
const DEVICE_TREE_COMPATIBLE: &str = "proc/device-tree/compatible";
const NVIDIA_GPUS_DIR: &str = "proc/driver/nvidia/gpus";

/// Inspects the host filesystem for Tegra markers or the NVIDIA driver.
#[derive(Debug, Clone)]
pub struct SystemProbe {
    root: PathBuf,
    device_id: u32,
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new(0)
    }
}

impl SystemProbe {
    pub fn new(device_id: u32) -> Self {
        Self::with_root("/", device_id)
    }

    /// Probe a different filesystem root (containers, tests)
    pub fn with_root(root: impl Into<PathBuf>, device_id: u32) -> Self {
        Self {
            root: root.into(),
            device_id,
        }
    }

    fn is_tegra(&self) -> bool {
        if self.root.join(TEGRA_RELEASE).exists() {
            return true;
        }
        // device-tree strings are NUL separated
        std::fs::read(self.root.join(DEVICE_TREE_COMPATIBLE))
            .map(|bytes| {
                bytes
                    .split(|b| *b == 0)
                    .any(|entry| entry.starts_with(b"nvidia,tegra"))
            })
            .unwrap_or(false)
    }

    fn discrete_model(&self) -> Option<String> {
        let gpus = self.root.join(NVIDIA_GPUS_DIR);
        let mut entries: Vec<PathBuf> = std::fs::read_dir(&gpus)
            .ok()?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        entries.sort();
        let gpu = entries.get(self.device_id as usize)?;
        Some(read_model(&gpu.join("information")).unwrap_or_else(|| "NVIDIA GPU".to_string()))
    }
}

fn read_model(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    content
        .lines()
        .find_map(|line| line.strip_prefix("Model:"))
        .map(|model| model.trim().to_string())
}

impl CapabilityProbe for SystemProbe {
    fn probe(&self) -> HeadcountResult<DeviceProperties> {
        if self.is_tegra() {
            tracing::debug!("tegra markers found under {}", self.root.display());
            return Ok(DeviceProperties {
                device_id: self.device_id,
                name: "NVIDIA Tegra".to_string(),
                integrated: true,
            });
        }

        match self.discrete_model() {
            Some(name) => Ok(DeviceProperties {
                device_id: self.device_id,
                name,
                integrated: false,
            }),
            None => Err(HeadcountError::DeviceQueryUnavailable(format!(
                "no NVIDIA device {} found (checked {} and {})",
                self.device_id,
                self.root.join(TEGRA_RELEASE).display(),
                self.root.join(NVIDIA_GPUS_DIR).display()
            ))),
        }
    }
}

/// Asks the CUDA driver for `CU_DEVICE_ATTRIBUTE_INTEGRATED`, falling back
/// to host markers when the driver or the device is unavailable.
#[cfg(feature = "cuda")]
#[derive(Debug, Clone)]
pub struct CudaProbe {
    device_id: u32,
    fallback: SystemProbe,
}

#[cfg(feature = "cuda")]
impl CudaProbe {
    pub fn new(device_id: u32) -> Self {
        Self::with_fallback(device_id, SystemProbe::new(device_id))
    }

    pub fn with_fallback(device_id: u32, fallback: SystemProbe) -> Self {
        Self {
            device_id,
            fallback,
        }
    }

    fn query(&self) -> Result<DeviceProperties, cudarc::driver::DriverError> {
        use cudarc::driver::sys::CUdevice_attribute;
        use cudarc::driver::CudaDevice;

        let device = CudaDevice::new(self.device_id as usize)?;
        let integrated =
            device.attribute(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_INTEGRATED)? != 0;
        Ok(DeviceProperties {
            device_id: self.device_id,
            name: device.name()?,
            integrated,
        })
    }
}

#[cfg(feature = "cuda")]
impl CapabilityProbe for CudaProbe {
    fn probe(&self) -> HeadcountResult<DeviceProperties> {
        match self.query() {
            Ok(props) => Ok(props),
            Err(err) => {
                tracing::warn!(
                    device_id = self.device_id,
                    error = ?err,
                    "CUDA device query failed, checking host markers"
                );
                self.fallback.probe()
            }
        }
    }
}

/// Probe used when the GPU kind is not given on the command line
pub fn default_probe(device_id: u32) -> Box<dyn CapabilityProbe> {
    #[cfg(feature = "cuda")]
    {
        Box::new(CudaProbe::new(device_id))
    }
    #[cfg(not(feature = "cuda"))]
    {
        Box::new(SystemProbe::new(device_id))
    }
}
