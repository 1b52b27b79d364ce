//! Headcount
//!
//! Assembles a DeepStream-style people-counting pipeline from declarative
//! chain templates and aggregates per-batch detection metadata into count
//! overlays and a throughput figure.

pub mod aggregator;
pub mod capability;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod osd;
pub mod pipeline;
pub mod replay;
pub mod source;
pub mod utils;

// Re-export commonly used types
pub use aggregator::{on_batch, BatchContext, BatchSummary, ClassTally, SharedContext};
pub use capability::{
    default_probe, CapabilityFlag, CapabilityProbe, DeviceProperties, FixedProbe, SystemProbe,
};
pub use config::{AppConfig, DeepStreamConfig, PERSON_CLASS_ID};
pub use error::{HeadcountError, HeadcountResult};
pub use lifecycle::{RunOutcome, Session, StopReason};
pub use metrics::{Clock, ManualClock, MonotonicClock, PerfCounter, PerfReport, PerformanceMonitor};
pub use osd::{OverlayBuilder, OverlayStyle};
pub use pipeline::{Engine, GraphBuilder, GraphTopology, SimulatedEngine};
pub use replay::ReplayScript;
pub use source::SourceDescriptor;
pub use utils::{BatchMeta, FrameMeta, ObjectMeta, OverlayRecord};

/// Current version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
