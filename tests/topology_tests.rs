//! Graph planning across every source kind and capability

use std::io::Write;

use headcount::capability::CapabilityFlag;
use headcount::config::AppConfig;
use headcount::pipeline::engine::SimulatedEngine;
use headcount::pipeline::templates::{plan_topology, ResolvedSource};
use headcount::pipeline::topology::{GraphTopology, LinkKind, NodeRole, PropValue};
use headcount::pipeline::GraphBuilder;
use headcount::source::SourceDescriptor;
use tempfile::TempDir;

const CAPABILITIES: [CapabilityFlag; 2] = [CapabilityFlag::Integrated, CapabilityFlag::Discrete];

fn plan(arg: &str, capability: CapabilityFlag, config: &AppConfig) -> GraphTopology {
    let descriptor = SourceDescriptor::parse(arg).unwrap();
    let resolved = ResolvedSource::resolve(&descriptor, config).unwrap();
    plan_topology(&resolved, capability, config).unwrap()
}

#[test]
fn test_camera_on_integrated_omits_generic_convert() {
    let mut engine = SimulatedEngine::new();
    let topology = GraphBuilder::new(&mut engine)
        .build(
            &SourceDescriptor::parse("camera").unwrap(),
            CapabilityFlag::Integrated,
            &AppConfig::default(),
        )
        .unwrap();

    assert!(!topology.contains(NodeRole::GenericConvert));
    assert_eq!(
        topology.roles()[..4],
        [
            NodeRole::Capture,
            NodeRole::RawFormatFilter,
            NodeRole::AcceleratedConvert,
            NodeRole::NvmmCapsFilter,
        ]
    );
    assert!(!engine.node_names().contains(&"nvvidconv1"));
}

#[test]
fn test_camera_on_discrete_keeps_generic_convert_before_accelerated() {
    let topology = plan("camera", CapabilityFlag::Discrete, &AppConfig::default());
    let generic = topology.position(NodeRole::GenericConvert).unwrap();
    let accel = topology.position(NodeRole::AcceleratedConvert).unwrap();
    assert!(generic < accel);
    assert_eq!(topology.node(NodeRole::GenericConvert).unwrap().name, "nvvidconv1");
}

#[test]
fn test_file_chain_is_capability_independent() {
    let config = AppConfig::default();
    for capability in CAPABILITIES {
        let topology = plan("sample_720p.h264", capability, &config);
        assert_eq!(
            topology.roles()[..3],
            [NodeRole::FileRead, NodeRole::Parse, NodeRole::Decode]
        );
        assert!(!topology.contains(NodeRole::Capture));
        assert_eq!(
            topology.node(NodeRole::FileRead).unwrap().property("location"),
            Some(&PropValue::Str("sample_720p.h264".to_string()))
        );
    }
}

#[test]
fn test_every_branch_has_one_of_each_core_stage() {
    let config = AppConfig::default();
    for arg in ["camera", "clip.h264"] {
        for capability in CAPABILITIES {
            let topology = plan(arg, capability, &config);
            for role in [
                NodeRole::Batcher,
                NodeRole::Inference,
                NodeRole::PostConvert,
                NodeRole::Osd,
                NodeRole::RenderSink,
            ] {
                assert_eq!(topology.count(role), 1, "{:?} in {} on {}", role, arg, capability);
            }
            assert_eq!(
                topology.contains(NodeRole::HardwareTransform),
                capability.is_integrated()
            );
            assert!(topology.position(NodeRole::Osd) < topology.position(NodeRole::RenderSink));
        }
    }
}

#[test]
fn test_links_form_a_single_chain() {
    let topology = plan("camera", CapabilityFlag::Discrete, &AppConfig::default());
    let nodes = topology.nodes();
    assert_eq!(topology.links().len(), nodes.len() - 1);

    for (link, pair) in topology.links().iter().zip(nodes.windows(2)) {
        assert_eq!(link.upstream, pair[0].name);
        assert_eq!(link.downstream, pair[1].name);
    }

    let request: Vec<_> = topology
        .links()
        .iter()
        .filter(|link| matches!(link.kind, LinkKind::RequestPad(_)))
        .collect();
    assert_eq!(request.len(), 1);
    assert_eq!(request[0].upstream, "src_cap_filter");
    assert_eq!(request[0].downstream, "stream-muxer");
    assert_eq!(request[0].kind, LinkKind::RequestPad("sink_0".to_string()));
}

#[test]
fn test_probe_is_on_osd() {
    for capability in CAPABILITIES {
        let topology = plan("clip.h264", capability, &AppConfig::default());
        assert_eq!(topology.probe_node(), "nv-onscreendisplay");
    }
}

#[test]
fn test_topology_is_deterministic() {
    let config = AppConfig::default();
    assert_eq!(
        plan("camera", CapabilityFlag::Integrated, &config),
        plan("camera", CapabilityFlag::Integrated, &config)
    );
}

#[test]
fn test_yaml_source_drives_chain_and_muxer() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("source.yml");
    std::fs::write(
        &path,
        "source:\n  location: streams/clip.h264\nstreammux:\n  batch-size: 1\n  width: 960\n  height: 540\n  batched-push-timeout: 33000\n",
    )
    .unwrap();

    let topology = plan(
        path.to_str().unwrap(),
        CapabilityFlag::Discrete,
        &AppConfig::default(),
    );
    let location = dir.path().join("streams/clip.h264");
    assert_eq!(
        topology.node(NodeRole::FileRead).unwrap().property("location"),
        Some(&PropValue::Str(location.display().to_string()))
    );

    let mux = topology.node(NodeRole::Batcher).unwrap();
    assert_eq!(mux.property("width"), Some(&PropValue::UInt(960)));
    assert_eq!(mux.property("height"), Some(&PropValue::UInt(540)));
    assert_eq!(mux.property("batched-push-timeout"), Some(&PropValue::Int(33_000)));
    assert_eq!(mux.property("live-source"), Some(&PropValue::Bool(false)));
}

#[test]
fn test_yaml_camera_source() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(b"source:\n  type: camera\n  device: /dev/video2\n")
        .unwrap();

    let topology = plan(
        file.path().to_str().unwrap(),
        CapabilityFlag::Integrated,
        &AppConfig::default(),
    );
    let capture = topology.node(NodeRole::Capture).unwrap();
    assert_eq!(
        capture.property("device"),
        Some(&PropValue::Str("/dev/video2".to_string()))
    );
    let mux = topology.node(NodeRole::Batcher).unwrap();
    assert_eq!(mux.property("width"), Some(&PropValue::UInt(1280)));
    assert_eq!(mux.property("live-source"), Some(&PropValue::Bool(true)));
}

#[test]
fn test_inference_and_osd_properties() {
    let mut config = AppConfig::default();
    config.inference.gpu_id = 1;
    let topology = plan("camera", CapabilityFlag::Discrete, &config);

    assert_eq!(
        topology.node(NodeRole::Inference).unwrap().property("config-file-path"),
        Some(&PropValue::Str("dstest1_usb_pgie_config.yml".to_string()))
    );
    assert_eq!(
        topology.node(NodeRole::Osd).unwrap().property("gpu-id"),
        Some(&PropValue::UInt(1))
    );
    let filter = topology.node(NodeRole::NvmmCapsFilter).unwrap();
    assert_eq!(
        filter.property("caps"),
        Some(&PropValue::Caps(
            "video/x-raw(memory:NVMM), format=NV12, framerate=30/1".to_string()
        ))
    );
}

#[test]
fn test_dry_run_rendering_lists_every_node() {
    let topology = plan("camera", CapabilityFlag::Integrated, &AppConfig::default());
    let text = topology.to_string();
    assert!(text.starts_with("dstest1-usb-cam-pipeline:"));
    for node in topology.nodes() {
        assert!(text.contains(&node.name));
    }
    assert!(text.contains("src_cap_filter -> stream-muxer.sink_0"));
}
