//! Per-batch metadata aggregation
//!
//! [`on_batch`] runs once for every flushed batch on the streaming thread. It
//! tallies detections by class, appends one count overlay per frame and
//! updates the throughput counter held in [`BatchContext`].

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::AppConfig;
use crate::metrics::{Clock, MonotonicClock, PerfReport, PerformanceMonitor};
use crate::osd::{OverlayBuilder, OverlayStyle};
use crate::utils::meta::{BatchMeta, ObjectMeta};

/// Per-frame object counts, one counter per tracked class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassTally {
    counts: Vec<usize>,
    untracked: usize,
}

impl ClassTally {
    pub fn new(tracked_classes: usize) -> Self {
        Self {
            counts: vec![0; tracked_classes],
            untracked: 0,
        }
    }

    /// Tally a frame's detections in list order
    pub fn from_objects(tracked_classes: usize, objects: &[ObjectMeta]) -> Self {
        let mut tally = Self::new(tracked_classes);
        for obj in objects {
            tally.record(obj.class_id);
        }
        tally
    }

    pub fn record(&mut self, class_id: i32) {
        match usize::try_from(class_id)
            .ok()
            .and_then(|idx| self.counts.get_mut(idx))
        {
            Some(count) => *count += 1,
            None => self.untracked += 1,
        }
    }

    pub fn count(&self, class_id: i32) -> usize {
        usize::try_from(class_id)
            .ok()
            .and_then(|idx| self.counts.get(idx))
            .copied()
            .unwrap_or(0)
    }

    /// Detections whose class id is outside the tracked set
    pub fn untracked(&self) -> usize {
        self.untracked
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum::<usize>() + self.untracked
    }
}

/// Operator log line for one processed batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub frame_number: u64,
    pub num_rects: usize,
    pub person_count: usize,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame Number = {} Number of objects = {} Person Count = {}",
            self.frame_number, self.num_rects, self.person_count
        )
    }
}

/// Process-wide state of the batch path: frame index and throughput counter.
///
/// Created once before the pipeline starts; only [`on_batch`] mutates it.
pub struct BatchContext {
    frame_number: u64,
    perf: PerformanceMonitor,
    overlay: OverlayBuilder,
    tracked_classes: usize,
    display_class_id: i32,
    clock: Box<dyn Clock>,
    last_summary: Option<BatchSummary>,
    echo: bool,
}

/// Context shared with the streaming thread
pub type SharedContext = Arc<Mutex<BatchContext>>;

impl BatchContext {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_clock(config, Box::new(MonotonicClock::default()))
    }

    pub fn with_clock(config: &AppConfig, clock: Box<dyn Clock>) -> Self {
        Self {
            frame_number: 0,
            perf: PerformanceMonitor::new(),
            overlay: OverlayBuilder::new(
                config.display_label(),
                OverlayStyle::from(&config.overlay),
            ),
            tracked_classes: config.overlay.class_labels.len(),
            display_class_id: config.overlay.display_class_id,
            clock,
            last_summary: None,
            echo: true,
        }
    }

    /// Keep batch lines off stdout
    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    pub fn shared(self) -> SharedContext {
        Arc::new(Mutex::new(self))
    }

    /// Number of non-empty batches processed so far
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn perf(&self) -> &PerformanceMonitor {
        &self.perf
    }

    pub fn last_summary(&self) -> Option<BatchSummary> {
        self.last_summary
    }

    pub fn report(&self) -> PerfReport {
        self.perf.snapshot(self.frame_number)
    }
}

impl fmt::Debug for BatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchContext")
            .field("frame_number", &self.frame_number)
            .field("perf", &self.perf)
            .field("last_summary", &self.last_summary)
            .finish()
    }
}

/// Lock the shared context, recovering from a poisoned lock
pub fn lock_context(context: &SharedContext) -> MutexGuard<'_, BatchContext> {
    context.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Consume one flushed batch. An empty batch is a no-op.
pub fn on_batch(batch: &mut BatchMeta, ctx: &mut BatchContext) {
    if batch.is_empty() {
        tracing::debug!("empty batch ignored");
        return;
    }

    let now = ctx.clock.now_micros();
    ctx.perf.observe(now);

    let mut num_rects = 0;
    let mut person_count = 0;
    for frame in batch.frames_mut() {
        let tally = ClassTally::from_objects(ctx.tracked_classes, frame.objects());
        person_count = tally.count(ctx.display_class_id);
        // only the displayed class contributes rectangles
        num_rects = person_count;
        tracing::trace!(
            frame_num = frame.frame_num,
            total = tally.total(),
            untracked = tally.untracked(),
            "frame tallied"
        );
        frame.add_overlay(ctx.overlay.build(person_count));
    }

    let summary = BatchSummary {
        frame_number: ctx.frame_number,
        num_rects,
        person_count,
    };
    if ctx.echo {
        println!("{}", summary);
    }
    ctx.frame_number += 1;
    ctx.last_summary = Some(summary);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ManualClock;
    use crate::utils::meta::{BBox, FrameMeta};

    fn detections(classes: &[i32]) -> Vec<ObjectMeta> {
        classes
            .iter()
            .map(|&class_id| ObjectMeta::new(class_id, BBox::new(0.0, 0.0, 10.0, 10.0), 0.9))
            .collect()
    }

    fn batch(frames: &[&[i32]]) -> BatchMeta {
        BatchMeta::new(
            frames
                .iter()
                .enumerate()
                .map(|(i, classes)| FrameMeta::new(0, i as u64, detections(classes)))
                .collect(),
        )
    }

    fn context(clock: &ManualClock) -> BatchContext {
        BatchContext::with_clock(&AppConfig::default(), Box::new(clock.clone())).quiet()
    }

    #[test]
    fn test_tally_counts_tracked_classes() {
        let tally = ClassTally::from_objects(3, &detections(&[0, 2, 0, 1, 7, -1]));
        assert_eq!(tally.count(0), 2);
        assert_eq!(tally.count(1), 1);
        assert_eq!(tally.count(2), 1);
        assert_eq!(tally.count(7), 0);
        assert_eq!(tally.untracked(), 2);
        assert_eq!(tally.total(), 6);
    }

    #[test]
    fn test_overlay_per_frame() {
        let clock = ManualClock::new(0);
        let mut ctx = context(&clock);
        let mut b = batch(&[&[0, 0, 1]]);

        on_batch(&mut b, &mut ctx);

        let frame = &b.frames()[0];
        assert_eq!(frame.overlays().len(), 1);
        assert_eq!(frame.overlays()[0].text, "Person = 2 ");
        assert_eq!(frame.objects().len(), 3);
    }

    #[test]
    fn test_frame_without_detections_still_gets_overlay() {
        let clock = ManualClock::new(0);
        let mut ctx = context(&clock);
        let mut b = batch(&[&[]]);

        on_batch(&mut b, &mut ctx);

        assert_eq!(b.frames()[0].overlays()[0].text, "Person = 0 ");
        assert_eq!(
            ctx.last_summary().unwrap().to_string(),
            "Frame Number = 0 Number of objects = 0 Person Count = 0"
        );
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let clock = ManualClock::new(0);
        let mut ctx = context(&clock);

        on_batch(&mut BatchMeta::default(), &mut ctx);
        assert_eq!(ctx.frame_number(), 0);
        assert_eq!(ctx.last_summary(), None);
        assert_eq!(ctx.perf().counter().previous_us(), None);

        on_batch(&mut batch(&[&[0]]), &mut ctx);
        on_batch(&mut BatchMeta::default(), &mut ctx);
        assert_eq!(ctx.frame_number(), 1);
    }

    #[test]
    fn test_summary_reports_last_frame_of_batch() {
        let clock = ManualClock::new(0);
        let mut ctx = context(&clock);
        let mut b = batch(&[&[0, 0, 0], &[0, 2]]);

        on_batch(&mut b, &mut ctx);

        assert_eq!(b.frames()[0].overlays()[0].text, "Person = 3 ");
        assert_eq!(b.frames()[1].overlays()[0].text, "Person = 1 ");
        let summary = ctx.last_summary().unwrap();
        assert_eq!(summary.num_rects, 1);
        assert_eq!(summary.person_count, 1);
        assert_eq!(ctx.frame_number(), 1);
    }

    #[test]
    fn test_perf_updated_per_batch() {
        let clock = ManualClock::new(1_000);
        let mut ctx = context(&clock);

        on_batch(&mut batch(&[&[0]]), &mut ctx);
        assert_eq!(ctx.perf().report(), None);

        for _ in 0..4 {
            clock.advance(50_000);
            on_batch(&mut batch(&[&[0]]), &mut ctx);
        }
        assert_eq!(ctx.perf().counter().sample_count(), 4);
        assert_eq!(ctx.perf().counter().accumulated_us(), Some(200_000));
        let fps = ctx.perf().report().unwrap();
        assert!((fps - 15.0).abs() < 1e-9);
        assert_eq!(ctx.report().frames, 5);
    }

    #[test]
    fn test_displayed_class_is_configurable() {
        let mut config = AppConfig::default();
        config.overlay.display_class_id = 2;
        let clock = ManualClock::new(0);
        let mut ctx = BatchContext::with_clock(&config, Box::new(clock)).quiet();
        let mut b = batch(&[&[2, 2, 0]]);

        on_batch(&mut b, &mut ctx);
        assert_eq!(b.frames()[0].overlays()[0].text, "Face = 2 ");
    }

    #[test]
    fn test_shared_context_lock() {
        let shared = BatchContext::with_clock(&AppConfig::default(), Box::new(ManualClock::new(0)))
            .quiet()
            .shared();
        on_batch(&mut batch(&[&[0]]), &mut lock_context(&shared));
        assert_eq!(lock_context(&shared).frame_number(), 1);
    }
}
