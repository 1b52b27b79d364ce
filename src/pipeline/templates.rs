//! Chain templates and the source adapter
//!
//! Every branch of graph assembly is declared here as data. The planner picks
//! one source chain by `{ChainKind × CapabilityFlag}` and one sink chain by
//! `{CapabilityFlag × display}`, then fills in node properties.

use std::path::PathBuf;

use crate::capability::CapabilityFlag;
use crate::config::{AppConfig, DeepStreamConfig, SourceType};
use crate::error::{HeadcountError, HeadcountResult};
use crate::pipeline::topology::{GraphTopology, NodeRole, NodeSpec, PropValue};
use crate::source::SourceDescriptor;

/// Name of the pipeline container
pub const PIPELINE_NAME: &str = "dstest1-usb-cam-pipeline";

/// Shape of the source-side chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainKind {
    Camera,
    EncodedFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeTemplate {
    pub role: NodeRole,
    pub factory: &'static str,
    pub name: &'static str,
}

const fn node(role: NodeRole, factory: &'static str, name: &'static str) -> NodeTemplate {
    NodeTemplate {
        role,
        factory,
        name,
    }
}

const CAPTURE: NodeTemplate = node(NodeRole::Capture, "v4l2src", "src_elem");
const RAW_FILTER: NodeTemplate = node(NodeRole::RawFormatFilter, "capsfilter", "src_cap_filter1");
const GENERIC_CONVERT: NodeTemplate = node(NodeRole::GenericConvert, "videoconvert", "nvvidconv1");
const ACCEL_CONVERT: NodeTemplate =
    node(NodeRole::AcceleratedConvert, "nvvideoconvert", "nvvidconv2");
const NVMM_FILTER: NodeTemplate = node(NodeRole::NvmmCapsFilter, "capsfilter", "src_cap_filter");
const FILE_READ: NodeTemplate = node(NodeRole::FileRead, "filesrc", "file-source");
const PARSE: NodeTemplate = node(NodeRole::Parse, "h264parse", "h264-parser");
const DECODE: NodeTemplate = node(NodeRole::Decode, "nvv4l2decoder", "nvv4l2-decoder");

const BATCHER: NodeTemplate = node(NodeRole::Batcher, "nvstreammux", "stream-muxer");
const INFERENCE: NodeTemplate = node(NodeRole::Inference, "nvinfer", "primary-nvinference-engine");
const POST_CONVERT: NodeTemplate = node(NodeRole::PostConvert, "nvvideoconvert", "osd_conv");
const OSD: NodeTemplate = node(NodeRole::Osd, "nvdsosd", "nv-onscreendisplay");
const EGL_TRANSFORM: NodeTemplate =
    node(NodeRole::HardwareTransform, "nvegltransform", "nvegl-transform");
const EGL_SINK: NodeTemplate = node(NodeRole::RenderSink, "nveglglessink", "nvvideo-renderer");
const FAKE_SINK: NodeTemplate = node(NodeRole::RenderSink, "fakesink", "nvvideo-renderer");

const CAMERA_DISCRETE: &[NodeTemplate] =
    &[CAPTURE, RAW_FILTER, GENERIC_CONVERT, ACCEL_CONVERT, NVMM_FILTER];
const CAMERA_INTEGRATED: &[NodeTemplate] = &[CAPTURE, RAW_FILTER, ACCEL_CONVERT, NVMM_FILTER];
const ENCODED_FILE: &[NodeTemplate] = &[FILE_READ, PARSE, DECODE];

const SINK_DISCRETE: &[NodeTemplate] = &[BATCHER, INFERENCE, POST_CONVERT, OSD, EGL_SINK];
const SINK_INTEGRATED: &[NodeTemplate] =
    &[BATCHER, INFERENCE, POST_CONVERT, OSD, EGL_TRANSFORM, EGL_SINK];
const SINK_HEADLESS: &[NodeTemplate] = &[BATCHER, INFERENCE, POST_CONVERT, OSD, FAKE_SINK];

/// Source chains; `None` matches either capability
const SOURCE_CHAINS: &[(ChainKind, Option<CapabilityFlag>, &[NodeTemplate])] = &[
    (
        ChainKind::Camera,
        Some(CapabilityFlag::Discrete),
        CAMERA_DISCRETE,
    ),
    (
        ChainKind::Camera,
        Some(CapabilityFlag::Integrated),
        CAMERA_INTEGRATED,
    ),
    (ChainKind::EncodedFile, None, ENCODED_FILE),
];

/// Sink chains keyed by capability and whether frames are displayed
const SINK_CHAINS: &[(Option<CapabilityFlag>, bool, &[NodeTemplate])] = &[
    (Some(CapabilityFlag::Discrete), true, SINK_DISCRETE),
    (Some(CapabilityFlag::Integrated), true, SINK_INTEGRATED),
    (None, false, SINK_HEADLESS),
];

pub fn source_template(chain: ChainKind, capability: CapabilityFlag) -> &'static [NodeTemplate] {
    SOURCE_CHAINS
        .iter()
        .find(|(kind, flag, _)| *kind == chain && flag.map_or(true, |f| f == capability))
        .map(|(_, _, template)| *template)
        .unwrap_or(&[])
}

pub fn sink_template(capability: CapabilityFlag, display: bool) -> &'static [NodeTemplate] {
    SINK_CHAINS
        .iter()
        .find(|(flag, shown, _)| *shown == display && flag.map_or(true, |f| f == capability))
        .map(|(_, _, template)| *template)
        .unwrap_or(&[])
}

/// Batch aggregator parameters fixed at build time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuxerSettings {
    pub batch_size: u32,
    pub width: u32,
    pub height: u32,
    pub batched_push_timeout_us: u32,
    pub live_source: bool,
}

impl MuxerSettings {
    /// Built-in preset: live, narrower output for the camera; wide for files
    pub fn preset(chain: ChainKind, config: &AppConfig) -> Self {
        let [width, height] = match chain {
            ChainKind::Camera => config.muxer.camera_resolution,
            ChainKind::EncodedFile => config.muxer.file_resolution,
        };
        Self {
            batch_size: config.muxer.batch_size,
            width,
            height,
            batched_push_timeout_us: config.muxer.batched_push_timeout_us,
            live_source: chain == ChainKind::Camera,
        }
    }
}

/// A source descriptor with every input the planner needs resolved
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSource {
    pub chain: ChainKind,
    pub location: Option<PathBuf>,
    pub device: PathBuf,
    pub muxer: MuxerSettings,
}

impl ResolvedSource {
    /// Resolve the descriptor, reading the YAML file for the config-driven branch
    pub fn resolve(descriptor: &SourceDescriptor, config: &AppConfig) -> HeadcountResult<Self> {
        match descriptor {
            SourceDescriptor::Camera { device_path } => Ok(Self {
                chain: ChainKind::Camera,
                location: None,
                device: device_path.clone(),
                muxer: MuxerSettings::preset(ChainKind::Camera, config),
            }),
            SourceDescriptor::EncodedFile { path } => Ok(Self {
                chain: ChainKind::EncodedFile,
                location: Some(path.clone()),
                device: config.camera.device.clone(),
                muxer: MuxerSettings::preset(ChainKind::EncodedFile, config),
            }),
            SourceDescriptor::ConfigDriven { config_path } => {
                let loaded = DeepStreamConfig::from_yaml_file(config_path)?;
                Self::from_deepstream(&loaded, config)
            }
        }
    }

    /// The loaded file decides the chain shape; its streammux group overrides
    /// the preset key by key.
    pub fn from_deepstream(loaded: &DeepStreamConfig, config: &AppConfig) -> HeadcountResult<Self> {
        let chain = match loaded.source_type() {
            SourceType::File => ChainKind::EncodedFile,
            SourceType::Camera => ChainKind::Camera,
        };

        let location = loaded.location();
        if chain == ChainKind::EncodedFile && location.is_none() {
            return Err(HeadcountError::InvalidConfigValue {
                field: "source.location".to_string(),
                value: "<missing>".to_string(),
            });
        }

        let mut muxer = MuxerSettings::preset(chain, config);
        let group = loaded.streammux();
        if let Some(v) = group.batch_size {
            muxer.batch_size = v;
        }
        if let Some(v) = group.width {
            muxer.width = v;
        }
        if let Some(v) = group.height {
            muxer.height = v;
        }
        if let Some(v) = group.batched_push_timeout {
            muxer.batched_push_timeout_us = v;
        }
        if let Some(v) = group.live_source {
            muxer.live_source = v.as_bool();
        }

        Ok(Self {
            chain,
            location,
            device: loaded
                .device()
                .map(PathBuf::from)
                .unwrap_or_else(|| config.camera.device.clone()),
            muxer,
        })
    }
}

/// Produce the full topology for a resolved source on the given device
pub fn plan_topology(
    source: &ResolvedSource,
    capability: CapabilityFlag,
    config: &AppConfig,
) -> HeadcountResult<GraphTopology> {
    let source_chain = instantiate(source_template(source.chain, capability), source, config);
    let sink_chain = instantiate(
        sink_template(capability, config.output.display),
        source,
        config,
    );
    GraphTopology::assemble(PIPELINE_NAME, source_chain, sink_chain, NodeRole::Osd)
}

fn instantiate(
    template: &[NodeTemplate],
    source: &ResolvedSource,
    config: &AppConfig,
) -> Vec<NodeSpec> {
    template
        .iter()
        .map(|t| NodeSpec {
            name: t.name.to_string(),
            factory: t.factory.to_string(),
            role: t.role,
            properties: properties_for(t, source, config),
        })
        .collect()
}

fn properties_for(
    template: &NodeTemplate,
    source: &ResolvedSource,
    config: &AppConfig,
) -> Vec<(String, PropValue)> {
    let gpu_id = PropValue::UInt(u64::from(config.inference.gpu_id));
    let props = match template.role {
        NodeRole::Capture => vec![(
            "device",
            PropValue::Str(source.device.display().to_string()),
        )],
        NodeRole::RawFormatFilter => vec![("caps", PropValue::Caps(config.camera.raw_caps.clone()))],
        NodeRole::AcceleratedConvert => vec![("nvbuf-memory-type", PropValue::Int(0))],
        NodeRole::NvmmCapsFilter => {
            vec![("caps", PropValue::Caps(config.camera.nvmm_caps.clone()))]
        }
        NodeRole::FileRead => source
            .location
            .as_ref()
            .map(|path| vec![("location", PropValue::Str(path.display().to_string()))])
            .unwrap_or_default(),
        NodeRole::Batcher => {
            let mux = &source.muxer;
            vec![
                ("batch-size", PropValue::UInt(u64::from(mux.batch_size))),
                ("width", PropValue::UInt(u64::from(mux.width))),
                ("height", PropValue::UInt(u64::from(mux.height))),
                (
                    "batched-push-timeout",
                    PropValue::Int(i64::from(mux.batched_push_timeout_us)),
                ),
                ("live-source", PropValue::Bool(mux.live_source)),
            ]
        }
        NodeRole::Inference => vec![(
            "config-file-path",
            PropValue::Str(config.inference.config_path.display().to_string()),
        )],
        NodeRole::PostConvert => vec![
            ("gpu-id", gpu_id),
            ("nvbuf-memory-type", PropValue::Int(0)),
        ],
        NodeRole::Osd => vec![("gpu-id", gpu_id)],
        NodeRole::RenderSink if template.factory == "fakesink" => {
            vec![("sync", PropValue::Bool(false))]
        }
        _ => Vec::new(),
    };
    props
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}
