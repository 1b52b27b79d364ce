//! GStreamer realization of the engine contract
//!
//! Nodes are created through element factories and registered in a
//! `gst::Pipeline`. Properties travel as strings and are deserialized to the
//! type of the element's own param spec, so enum and caps properties need no
//! special casing. The batch probe sits on the OSD sink pad.

use std::collections::HashMap;
use std::sync::Arc;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_video as gst_video;

use crate::aggregator::{lock_context, on_batch, SharedContext};
use crate::error::{HeadcountError, HeadcountResult};
use crate::pipeline::engine::{Engine, StopReason};
use crate::pipeline::topology::{LinkKind, LinkSpec, NodeSpec};
use crate::utils::meta::{BBox, BatchMeta, FrameMeta, ObjectMeta, OverlayRecord};

/// ROI type written for count overlays
pub const OVERLAY_ROI_TYPE: &str = "headcount/overlay";

/// Moves batch metadata between buffers and the aggregator
pub trait MetaBridge: Send + Sync + 'static {
    fn read_batch(&self, buffer: &gst::BufferRef) -> BatchMeta;

    fn write_overlays(&self, buffer: &mut gst::BufferRef, batch: &BatchMeta);
}

/// Bridge over `GstVideoRegionOfInterestMeta`: one frame per buffer, one
/// detection per ROI whose type names a tracked class.
#[derive(Debug, Clone)]
pub struct RoiMetaBridge {
    class_labels: Vec<String>,
}

impl RoiMetaBridge {
    pub fn new(class_labels: Vec<String>) -> Self {
        Self { class_labels }
    }

    fn class_id(&self, roi_type: &str) -> i32 {
        self.class_labels
            .iter()
            .position(|label| label.eq_ignore_ascii_case(roi_type))
            .map_or(-1, |idx| idx as i32)
    }
}

impl MetaBridge for RoiMetaBridge {
    fn read_batch(&self, buffer: &gst::BufferRef) -> BatchMeta {
        let objects = buffer
            .iter_meta::<gst_video::VideoRegionOfInterestMeta>()
            .filter(|roi| roi.roi_type() != OVERLAY_ROI_TYPE)
            .map(|roi| {
                let (x, y, w, h) = roi.rect();
                let confidence = roi
                    .param("detection")
                    .and_then(|s| s.get::<f64>("confidence").ok())
                    .unwrap_or(1.0);
                ObjectMeta::new(
                    self.class_id(roi.roi_type()),
                    BBox::new(x as f32, y as f32, w as f32, h as f32),
                    confidence as f32,
                )
            })
            .collect();
        let frame_num = buffer.offset();
        BatchMeta::new(vec![FrameMeta::new(0, frame_num, objects)])
    }

    fn write_overlays(&self, buffer: &mut gst::BufferRef, batch: &BatchMeta) {
        for frame in batch.frames() {
            for overlay in frame.overlays() {
                let mut meta = gst_video::VideoRegionOfInterestMeta::add(
                    buffer,
                    OVERLAY_ROI_TYPE,
                    (overlay.x_offset, overlay.y_offset, 0, 0),
                );
                meta.add_param(overlay_structure(overlay));
            }
        }
    }
}

fn overlay_structure(overlay: &OverlayRecord) -> gst::Structure {
    let mut builder = gst::Structure::builder("overlay")
        .field("text", overlay.text.as_str())
        .field("font", overlay.font.name.as_str())
        .field("font-size", overlay.font.size)
        .field(
            "font-color",
            gst::Array::new([
                overlay.font.color.red,
                overlay.font.color.green,
                overlay.font.color.blue,
                overlay.font.color.alpha,
            ]),
        );
    if let Some(bg) = overlay.background {
        builder = builder.field(
            "background",
            gst::Array::new([bg.red, bg.green, bg.blue, bg.alpha]),
        );
    }
    builder.build()
}

pub struct GstEngine {
    pipeline: Option<gst::Pipeline>,
    elements: HashMap<String, gst::Element>,
    bridge: Arc<dyn MetaBridge>,
}

impl GstEngine {
    /// Initialize GStreamer once for the process
    pub fn new(bridge: Arc<dyn MetaBridge>) -> HeadcountResult<Self> {
        gst::init()?;
        Ok(Self {
            pipeline: None,
            elements: HashMap::new(),
            bridge,
        })
    }

    fn pipeline(&self) -> HeadcountResult<&gst::Pipeline> {
        self.pipeline
            .as_ref()
            .ok_or_else(|| HeadcountError::StateChange("no pipeline container".to_string()))
    }

    fn element(&self, name: &str) -> Option<&gst::Element> {
        self.elements.get(name)
    }

    fn apply_properties(element: &gst::Element, spec: &NodeSpec) -> HeadcountResult<()> {
        for (key, value) in &spec.properties {
            let creation_error = |reason: String| HeadcountError::ElementCreation {
                name: spec.name.clone(),
                factory: spec.factory.clone(),
                reason,
            };
            let pspec = element
                .find_property(key)
                .ok_or_else(|| creation_error(format!("no property '{}'", key)))?;
            let value = glib::Value::deserialize(&value.to_string(), pspec.value_type())
                .map_err(|err| creation_error(format!("property '{}': {}", key, err)))?;
            element.set_property_from_value(key, &value);
        }
        Ok(())
    }
}

impl Engine for GstEngine {
    fn create_container(&mut self, name: &str) -> HeadcountResult<()> {
        self.pipeline = Some(gst::Pipeline::with_name(name));
        Ok(())
    }

    fn create_node(&mut self, spec: &NodeSpec) -> HeadcountResult<()> {
        let element = gst::ElementFactory::make(spec.factory.as_str())
            .name(spec.name.as_str())
            .build()
            .map_err(|err| HeadcountError::ElementCreation {
                name: spec.name.clone(),
                factory: spec.factory.clone(),
                reason: err.to_string(),
            })?;
        Self::apply_properties(&element, spec)?;

        self.pipeline()?
            .add(&element)
            .map_err(|err| HeadcountError::ElementCreation {
                name: spec.name.clone(),
                factory: spec.factory.clone(),
                reason: err.to_string(),
            })?;
        tracing::debug!(name = %spec.name, factory = %spec.factory, "element added");
        self.elements.insert(spec.name.clone(), element);
        Ok(())
    }

    fn link(&mut self, link: &LinkSpec) -> HeadcountResult<()> {
        let link_error = |reason: String| HeadcountError::Link {
            upstream: link.upstream.clone(),
            downstream: link.downstream.clone(),
            reason,
        };
        let upstream = self
            .element(&link.upstream)
            .ok_or_else(|| link_error("upstream element missing".to_string()))?;
        let downstream = self
            .element(&link.downstream)
            .ok_or_else(|| link_error("downstream element missing".to_string()))?;

        match &link.kind {
            LinkKind::Static => upstream
                .link(downstream)
                .map_err(|err| link_error(err.to_string())),
            LinkKind::RequestPad(pad) => {
                let sink_pad = downstream
                    .request_pad_simple(pad)
                    .ok_or_else(|| link_error(format!("request sink pad '{}' failed", pad)))?;
                let src_pad = upstream
                    .static_pad("src")
                    .ok_or_else(|| link_error("request src pad failed".to_string()))?;
                src_pad
                    .link(&sink_pad)
                    .map(|_| ())
                    .map_err(|err| link_error(format!("{:?}", err)))
            }
        }
    }

    fn attach_batch_probe(&mut self, node: &str, context: SharedContext) -> HeadcountResult<()> {
        let pad = self
            .element(node)
            .and_then(|element| element.static_pad("sink"))
            .ok_or_else(|| {
                HeadcountError::InvalidTopology(format!("unable to get sink pad of '{}'", node))
            })?;
        let bridge = Arc::clone(&self.bridge);

        pad.add_probe(gst::PadProbeType::BUFFER, move |_, info| {
            if let Some(gst::PadProbeData::Buffer(ref mut buffer)) = info.data {
                let buffer = buffer.make_mut();
                let mut batch = bridge.read_batch(buffer);
                on_batch(&mut batch, &mut lock_context(&context));
                bridge.write_overlays(buffer, &batch);
            }
            gst::PadProbeReturn::Ok
        })
        .ok_or_else(|| HeadcountError::InvalidTopology(format!("probe on '{}' refused", node)))?;
        Ok(())
    }

    fn play(&mut self) -> HeadcountResult<()> {
        self.pipeline()?
            .set_state(gst::State::Playing)
            .map_err(|err| HeadcountError::StateChange(err.to_string()))?;
        Ok(())
    }

    fn wait_for_stop(&mut self) -> StopReason {
        let bus = match self.pipeline.as_ref().and_then(|p| p.bus()) {
            Some(bus) => bus,
            None => {
                return StopReason::FatalError {
                    source_element: String::new(),
                    message: "pipeline has no bus".to_string(),
                    debug: None,
                }
            }
        };

        for msg in bus.iter_timed(gst::ClockTime::NONE) {
            match msg.view() {
                gst::MessageView::Eos(..) => return StopReason::EndOfStream,
                gst::MessageView::Error(err) => {
                    return StopReason::FatalError {
                        source_element: err
                            .src()
                            .map(|src| src.name().to_string())
                            .unwrap_or_default(),
                        message: err.error().to_string(),
                        debug: err.debug().map(|debug| debug.to_string()),
                    }
                }
                gst::MessageView::Warning(warning) => {
                    tracing::warn!(
                        source = ?warning.src().map(|src| src.name()),
                        "{}",
                        warning.error()
                    );
                }
                _ => {}
            }
        }

        StopReason::FatalError {
            source_element: String::new(),
            message: "bus closed without end of stream".to_string(),
            debug: None,
        }
    }

    fn stop(&mut self) -> HeadcountResult<()> {
        self.pipeline()?
            .set_state(gst::State::Null)
            .map_err(|err| HeadcountError::StateChange(err.to_string()))?;
        Ok(())
    }

    fn release(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            if let Err(err) = pipeline.set_state(gst::State::Null) {
                tracing::warn!("failed to reset pipeline: {}", err);
            }
        }
        self.elements.clear();
    }
}

impl Drop for GstEngine {
    fn drop(&mut self) {
        self.release();
    }
}
