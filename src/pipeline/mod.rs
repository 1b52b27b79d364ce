//! Pipeline planning and realization

pub mod builder;
pub mod engine;
#[cfg(feature = "gst")]
pub mod gst_engine;
pub mod templates;
pub mod topology;

pub use builder::GraphBuilder;
pub use engine::{Engine, EngineState, SimulatedEngine, StopReason};
#[cfg(feature = "gst")]
pub use gst_engine::{GstEngine, MetaBridge, RoiMetaBridge};
pub use templates::{plan_topology, ChainKind, MuxerSettings, ResolvedSource, PIPELINE_NAME};
pub use topology::{GraphTopology, LinkKind, LinkSpec, NodeRole, NodeSpec, PropValue};
