//! Batch, frame and object metadata exchanged with the inference stage

use serde::{Deserialize, Serialize};
use std::fmt;

/// Object bounding box in muxer output coordinates
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    /// Left X coordinate
    pub left: f32,
    /// Top Y coordinate
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl BBox {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

/// One detection reported by the inference stage. Read-only to the aggregator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub class_id: i32,
    pub rect: BBox,
    /// Confidence score (0.0 to 1.0)
    pub confidence: f32,
}

impl ObjectMeta {
    pub fn new(class_id: i32, rect: BBox, confidence: f32) -> Self {
        Self {
            class_id,
            rect,
            confidence,
        }
    }
}

impl fmt::Display for ObjectMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Object(class={}, confidence={:.2}, bbox=({:.1}, {:.1}, {:.1}, {:.1}))",
            self.class_id,
            self.confidence,
            self.rect.left,
            self.rect.top,
            self.rect.width,
            self.rect.height
        )
    }
}

/// RGBA color with components in `0.0..=1.0`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
    pub alpha: f64,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::new(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Rgba = Rgba::new(0.0, 0.0, 0.0, 1.0);

    pub const fn new(red: f64, green: f64, blue: f64, alpha: f64) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FontDescriptor {
    pub name: String,
    pub size: u32,
    pub color: Rgba,
}

/// A text annotation the renderer draws on a frame
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverlayRecord {
    pub text: String,
    pub x_offset: u32,
    pub y_offset: u32,
    pub font: FontDescriptor,
    /// Opaque text background, drawn only when set
    pub background: Option<Rgba>,
}

/// Metadata for one frame of a batch.
///
/// Detections are fixed at construction; overlays can only be appended.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameMeta {
    pub source_id: u32,
    pub frame_num: u64,
    objects: Vec<ObjectMeta>,
    overlays: Vec<OverlayRecord>,
}

impl FrameMeta {
    pub fn new(source_id: u32, frame_num: u64, objects: Vec<ObjectMeta>) -> Self {
        Self {
            source_id,
            frame_num,
            objects,
            overlays: Vec::new(),
        }
    }

    pub fn objects(&self) -> &[ObjectMeta] {
        &self.objects
    }

    pub fn overlays(&self) -> &[OverlayRecord] {
        &self.overlays
    }

    /// Hand an overlay over to the frame's render-annotation list
    pub fn add_overlay(&mut self, overlay: OverlayRecord) {
        self.overlays.push(overlay);
    }
}

/// Metadata for one flushed batch, frames in arrival order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchMeta {
    frames: Vec<FrameMeta>,
}

impl BatchMeta {
    pub fn new(frames: Vec<FrameMeta>) -> Self {
        Self { frames }
    }

    pub fn frames(&self) -> &[FrameMeta] {
        &self.frames
    }

    pub fn frames_mut(&mut self) -> &mut [FrameMeta] {
        &mut self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }
}
