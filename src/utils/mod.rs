//! Utility types and functions

pub mod meta;

pub use meta::{BBox, BatchMeta, FontDescriptor, FrameMeta, ObjectMeta, OverlayRecord, Rgba};
