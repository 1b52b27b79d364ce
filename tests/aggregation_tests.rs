//! Batch aggregation and throughput behavior over whole runs

use std::sync::Arc;

use headcount::aggregator::{lock_context, on_batch, BatchContext};
use headcount::capability::CapabilityFlag;
use headcount::config::{AppConfig, PERSON_CLASS_ID};
use headcount::lifecycle::{Session, StopReason};
use headcount::metrics::{ManualClock, PerformanceMonitor};
use headcount::pipeline::engine::SimulatedEngine;
use headcount::replay::ReplayScript;
use headcount::source::SourceDescriptor;
use headcount::utils::meta::{BBox, BatchMeta, FrameMeta, ObjectMeta};

fn frame(classes: &[i32]) -> FrameMeta {
    let objects = classes
        .iter()
        .enumerate()
        .map(|(i, &class_id)| {
            ObjectMeta::new(
                class_id,
                BBox::new(i as f32 * 20.0, 10.0, 16.0, 48.0),
                0.8,
            )
        })
        .collect();
    FrameMeta::new(0, 0, objects)
}

fn quiet_context(clock: &ManualClock) -> BatchContext {
    BatchContext::with_clock(&AppConfig::default(), Box::new(clock.clone())).quiet()
}

#[test]
fn test_scenario_three_frames_from_file() {
    let script = ReplayScript::from_json_str(
        r#"{ "batches": [
            { "frames": [[{ "class_id": 0, "bbox": [10, 10, 40, 90] },
                          { "class_id": 0, "bbox": [80, 12, 38, 85] }]] },
            { "frames": [[]] },
            { "frames": [[{ "class_id": 0, "bbox": [5, 5, 30, 70] },
                          { "class_id": 1, "bbox": [50, 50, 20, 20] }]] }
        ] }"#,
    )
    .unwrap();
    let clock = ManualClock::new(0);
    let context = quiet_context(&clock).shared();
    let mut engine = SimulatedEngine::new()
        .with_script(script)
        .with_clock(clock);

    let outcome = Session::build(
        &mut engine,
        SourceDescriptor::parse("sample_720p.h264").unwrap(),
        CapabilityFlag::Discrete,
        &AppConfig::default(),
        Arc::clone(&context),
    )
    .unwrap()
    .run()
    .unwrap();

    assert_eq!(outcome.reason, StopReason::EndOfStream);
    let texts: Vec<String> = engine
        .delivered()
        .iter()
        .map(|batch| batch.frames()[0].overlays()[0].text.clone())
        .collect();
    assert_eq!(texts, ["Person = 2 ", "Person = 0 ", "Person = 1 "]);

    let ctx = lock_context(&context);
    assert_eq!(ctx.frame_number(), 3);
    assert_eq!(
        ctx.last_summary().unwrap().to_string(),
        "Frame Number = 2 Number of objects = 1 Person Count = 1"
    );
}

#[test]
fn test_summary_lines_per_batch() {
    let clock = ManualClock::new(0);
    let mut ctx = quiet_context(&clock);
    let mut lines = Vec::new();

    for classes in [&[0, 0][..], &[][..], &[0, 1][..]] {
        on_batch(&mut BatchMeta::new(vec![frame(classes)]), &mut ctx);
        lines.push(ctx.last_summary().unwrap().to_string());
    }

    assert_eq!(
        lines,
        [
            "Frame Number = 0 Number of objects = 2 Person Count = 2",
            "Frame Number = 1 Number of objects = 0 Person Count = 0",
            "Frame Number = 2 Number of objects = 1 Person Count = 1",
        ]
    );
}

#[test]
fn test_overlay_text_matches_person_count_for_all_frames() {
    let clock = ManualClock::new(0);
    let mut ctx = quiet_context(&clock);

    // deterministic mix of classes, including ids outside the tracked set
    let mut seed = 7u32;
    for _ in 0..50 {
        let frames: Vec<FrameMeta> = (0..(seed % 4) as usize)
            .map(|_| {
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                let classes: Vec<i32> = (0..(seed >> 16) % 9)
                    .map(|i| ((seed >> (i % 16)) % 5) as i32 - 1)
                    .collect();
                frame(&classes)
            })
            .collect();
        seed = seed.wrapping_add(3);

        let mut batch = BatchMeta::new(frames);
        on_batch(&mut batch, &mut ctx);

        for frame in batch.frames() {
            let persons = frame
                .objects()
                .iter()
                .filter(|obj| obj.class_id == PERSON_CLASS_ID)
                .count();
            assert_eq!(frame.overlays().len(), 1);
            assert_eq!(frame.overlays()[0].text, format!("Person = {} ", persons));
        }
    }
}

#[test]
fn test_frame_index_advances_only_on_non_empty_batches() {
    let clock = ManualClock::new(0);
    let mut ctx = quiet_context(&clock);
    let sizes = [1usize, 0, 3, 0, 0, 2, 1, 0];

    let mut expected = 0;
    for size in sizes {
        let before = ctx.frame_number();
        let frames = (0..size).map(|_| frame(&[PERSON_CLASS_ID])).collect();
        on_batch(&mut BatchMeta::new(frames), &mut ctx);

        let step = if size == 0 { 0 } else { 1 };
        expected += step;
        assert_eq!(ctx.frame_number(), before + step);
    }
    assert_eq!(ctx.frame_number(), expected);
}

#[test]
fn test_empty_batches_do_not_touch_throughput() {
    let clock = ManualClock::new(0);
    let mut ctx = quiet_context(&clock);

    on_batch(&mut BatchMeta::new(vec![frame(&[])]), &mut ctx);
    clock.advance(10_000);
    on_batch(&mut BatchMeta::default(), &mut ctx);
    clock.advance(10_000);
    on_batch(&mut BatchMeta::new(vec![frame(&[])]), &mut ctx);

    assert_eq!(ctx.perf().counter().sample_count(), 1);
    assert_eq!(ctx.perf().counter().accumulated_us(), Some(20_000));
}

#[test]
fn test_report_after_n_batches() {
    for n in 1..=12u64 {
        let mut monitor = PerformanceMonitor::new();
        for i in 0..n {
            monitor.observe(1_000 + i * 25_000);
        }
        match n {
            1 => assert_eq!(monitor.report(), None),
            _ => {
                let accumulated = (n - 1) * 25_000;
                let samples = n - 1;
                let expected = (samples - 1) as f64 * 1_000_000.0 / accumulated as f64;
                let fps = monitor.report().unwrap();
                assert!((fps - expected).abs() < 1e-9, "n = {}", n);
            }
        }
    }
}

#[test]
fn test_multi_class_config_counts_displayed_class() {
    let mut config = AppConfig::default();
    config.overlay.class_labels = vec![
        "Person".to_string(),
        "Bag".to_string(),
        "Face".to_string(),
        "Car".to_string(),
    ];
    config.overlay.display_class_id = 3;
    let mut ctx = BatchContext::with_clock(&config, Box::new(ManualClock::new(0))).quiet();

    let mut batch = BatchMeta::new(vec![frame(&[3, 0, 3, 3, 2])]);
    on_batch(&mut batch, &mut ctx);
    assert_eq!(batch.frames()[0].overlays()[0].text, "Car = 3 ");
}
