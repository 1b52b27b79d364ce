//! Recorded detection scripts for driving the pipeline without hardware
//!
//! A script is a JSON document listing batches of per-frame detections, with
//! an optional fatal error raised once all batches were delivered:
//!
//! ```json
//! {
//!   "batches": [
//!     { "at_us": 0, "frames": [[{ "class_id": 0, "bbox": [10, 10, 40, 80] }]] },
//!     { "at_us": 33333, "frames": [[]] }
//!   ],
//!   "error": { "element": "nvv4l2-decoder", "message": "stream error" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{HeadcountError, HeadcountResult};
use crate::utils::meta::{BBox, BatchMeta, FrameMeta, ObjectMeta};

fn default_confidence() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptObject {
    pub class_id: i32,
    /// `[left, top, width, height]`
    #[serde(default)]
    pub bbox: [f32; 4],
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptBatch {
    /// Delivery timestamp; batches without one follow the previous at a fixed
    /// frame interval
    #[serde(default)]
    pub at_us: Option<u64>,
    #[serde(default)]
    pub frames: Vec<Vec<ScriptObject>>,
}

/// Fatal error posted by a named element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptError {
    pub element: String,
    pub message: String,
    #[serde(default)]
    pub debug: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayScript {
    #[serde(default)]
    pub batches: Vec<ScriptBatch>,
    #[serde(default)]
    pub error: Option<ScriptError>,
}

/// Spacing for batches without a timestamp, 30 fps
pub const DEFAULT_INTERVAL_US: u64 = 33_333;

impl ReplayScript {
    pub fn from_json_file(path: &Path) -> HeadcountResult<Self> {
        if !path.exists() {
            return Err(HeadcountError::ConfigNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        crate::headcount_context!(
            Self::from_json_str(&content),
            &format!("parsing {}", path.display())
        )
    }

    pub fn from_json_str(content: &str) -> HeadcountResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Batches paired with their delivery timestamps, in script order
    pub fn timeline(&self) -> Vec<(u64, BatchMeta)> {
        let mut now = 0u64;
        let mut first = true;
        let mut frame_num = 0u64;

        self.batches
            .iter()
            .map(|batch| {
                now = match batch.at_us {
                    Some(at) => at,
                    None if first => 0,
                    None => now.saturating_add(DEFAULT_INTERVAL_US),
                };
                first = false;

                let frames = batch
                    .frames
                    .iter()
                    .enumerate()
                    .map(|(source_id, objects)| {
                        FrameMeta::new(
                            source_id as u32,
                            frame_num,
                            objects.iter().map(ScriptObject::to_meta).collect(),
                        )
                    })
                    .collect();
                frame_num += 1;
                (now, BatchMeta::new(frames))
            })
            .collect()
    }
}

impl ScriptObject {
    fn to_meta(&self) -> ObjectMeta {
        let [left, top, width, height] = self.bbox;
        ObjectMeta::new(
            self.class_id,
            BBox::new(left, top, width, height),
            self.confidence,
        )
    }
}
