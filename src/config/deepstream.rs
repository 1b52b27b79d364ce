//! Loader for DeepStream-style YAML pipeline files
//!
//! Only the `source` and `streammux` groups are read. Keys follow the element
//! property names (`batch-size`, `batched-push-timeout`, ...). Anything absent
//! keeps the built-in default.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{HeadcountError, HeadcountResult};

/// Shape of the source chain the file asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    #[default]
    File,
    Camera,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceGroup {
    #[serde(rename = "type", default)]
    pub kind: SourceType,
    /// Elementary stream location, relative paths resolve against the YAML file
    pub location: Option<PathBuf>,
    pub device: Option<PathBuf>,
}

/// DeepStream writes booleans either as `true` or as `1`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Flag {
    Bool(bool),
    Int(i64),
}

impl Flag {
    pub fn as_bool(self) -> bool {
        match self {
            Flag::Bool(b) => b,
            Flag::Int(i) => i != 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StreammuxGroup {
    pub batch_size: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Microseconds
    pub batched_push_timeout: Option<u32>,
    pub live_source: Option<Flag>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeepStreamConfig {
    #[serde(default)]
    pub source: Option<SourceGroup>,
    #[serde(default)]
    pub streammux: Option<StreammuxGroup>,
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl DeepStreamConfig {
    pub fn from_yaml_file(path: &Path) -> HeadcountResult<Self> {
        if !path.exists() {
            return Err(HeadcountError::ConfigNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let mut config = crate::headcount_context!(
            Self::from_yaml_str(&content),
            &format!("parsing {}", path.display())
        )?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> HeadcountResult<Self> {
        let config: DeepStreamConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> HeadcountResult<()> {
        if let Some(mux) = &self.streammux {
            for (field, value) in [
                ("streammux.batch-size", mux.batch_size),
                ("streammux.width", mux.width),
                ("streammux.height", mux.height),
                ("streammux.batched-push-timeout", mux.batched_push_timeout),
            ] {
                if value == Some(0) {
                    return Err(HeadcountError::InvalidConfigValue {
                        field: field.to_string(),
                        value: "0".to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn source_type(&self) -> SourceType {
        self.source.as_ref().map(|s| s.kind).unwrap_or_default()
    }

    /// Stream location with relative paths resolved against the YAML file
    pub fn location(&self) -> Option<PathBuf> {
        let location = self.source.as_ref()?.location.as_ref()?;
        match &self.base_dir {
            Some(base) if location.is_relative() => Some(base.join(location)),
            _ => Some(location.clone()),
        }
    }

    pub fn device(&self) -> Option<&Path> {
        self.source.as_ref()?.device.as_deref()
    }

    pub fn streammux(&self) -> StreammuxGroup {
        self.streammux.clone().unwrap_or_default()
    }
}
