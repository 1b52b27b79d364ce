//! Throughput measurement for the batch probe
//!
//! Intervals are taken between successive batches from a monotonic clock in
//! microseconds. The first batch only establishes the baseline timestamp.

use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::error::HeadcountResult;

/// Converts accumulated microseconds to "per second"
pub const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// Monotonic time source in microseconds
pub trait Clock: Send {
    fn now_micros(&self) -> u64;
}

/// Wall-independent clock anchored at construction
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now_micros(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// Clock moved by hand; clones share the same time
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_us: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_us)),
        }
    }

    pub fn set(&self, now_us: u64) {
        self.now.store(now_us, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_us: u64) {
        self.now.fetch_add(delta_us, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Running interval total between batches
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PerfCounter {
    previous_us: Option<u64>,
    accumulated_us: Option<u64>,
    sample_count: u64,
}

impl PerfCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one batch timestamp
    pub fn observe(&mut self, now_us: u64) {
        match self.previous_us {
            None => {
                self.previous_us = Some(now_us);
            }
            Some(previous) => {
                let delta = now_us.saturating_sub(previous);
                self.accumulated_us = Some(match self.accumulated_us {
                    None => delta,
                    Some(total) => total + delta,
                });
                self.sample_count += 1;
                self.previous_us = Some(now_us);
            }
        }
    }

    pub fn previous_us(&self) -> Option<u64> {
        self.previous_us
    }

    pub fn accumulated_us(&self) -> Option<u64> {
        self.accumulated_us
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }
}

/// Owns the process-wide [`PerfCounter`] and reports the average at shutdown
#[derive(Debug, Clone)]
pub struct PerformanceMonitor {
    counter: PerfCounter,
    scale: f64,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::with_scale(MICROS_PER_SECOND)
    }

    /// `scale` converts the clock unit to seconds
    pub fn with_scale(scale: f64) -> Self {
        Self {
            counter: PerfCounter::new(),
            scale,
        }
    }

    pub fn observe(&mut self, now_us: u64) {
        self.counter.observe(now_us);
    }

    pub fn counter(&self) -> &PerfCounter {
        &self.counter
    }

    /// Average throughput: `(samples - 1) * scale / accumulated`.
    ///
    /// `None` until a second batch produced an interval, or when all
    /// intervals were zero.
    pub fn report(&self) -> Option<f64> {
        let accumulated = self.counter.accumulated_us?;
        if accumulated == 0 {
            return None;
        }
        let samples = self.counter.sample_count.saturating_sub(1);
        Some(samples as f64 * self.scale / accumulated as f64)
    }

    /// Shutdown line, absent without a valid average
    pub fn format_summary(&self) -> Option<String> {
        self.report().map(|fps| format!("Average fps {:.6}", fps))
    }

    pub fn snapshot(&self, frames: u64) -> PerfReport {
        PerfReport {
            frames,
            samples: self.counter.sample_count,
            accumulated_us: self.counter.accumulated_us,
            average_fps: self.report(),
        }
    }
}

/// Final run statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerfReport {
    /// Batches counted by the probe
    pub frames: u64,
    pub samples: u64,
    pub accumulated_us: Option<u64>,
    pub average_fps: Option<f64>,
}

impl PerfReport {
    pub fn write_json(&self, path: &Path) -> HeadcountResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_observation_is_baseline() {
        let mut counter = PerfCounter::new();
        counter.observe(1_000);

        assert_eq!(counter.previous_us(), Some(1_000));
        assert_eq!(counter.accumulated_us(), None);
        assert_eq!(counter.sample_count(), 0);
    }

    #[test]
    fn test_intervals_accumulate() {
        let mut counter = PerfCounter::new();
        for t in [100, 150, 230, 300] {
            counter.observe(t);
        }
        assert_eq!(counter.accumulated_us(), Some(200));
        assert_eq!(counter.sample_count(), 3);
        assert_eq!(counter.previous_us(), Some(300));
    }

    #[test]
    fn test_report_needs_an_interval() {
        let mut monitor = PerformanceMonitor::new();
        assert_eq!(monitor.report(), None);

        monitor.observe(0);
        assert_eq!(monitor.report(), None);
        assert_eq!(monitor.format_summary(), None);

        monitor.observe(33_333);
        assert_eq!(monitor.report(), Some(0.0));
    }

    #[test]
    fn test_report_formula() {
        let mut monitor = PerformanceMonitor::new();
        for i in 0..=10u64 {
            monitor.observe(i * 40_000);
        }
        // 10 intervals of 40ms: (10 - 1) * 1e6 / 400_000
        assert_eq!(monitor.counter().sample_count(), 10);
        let fps = monitor.report().unwrap();
        assert!((fps - 22.5).abs() < 1e-9);
        assert_eq!(
            monitor.format_summary().as_deref(),
            Some("Average fps 22.500000")
        );
    }

    #[test]
    fn test_zero_interval_reports_nothing() {
        let mut monitor = PerformanceMonitor::new();
        monitor.observe(5);
        monitor.observe(5);
        assert_eq!(monitor.report(), None);
    }

    #[test]
    fn test_manual_clock_shared() {
        let clock = ManualClock::new(10);
        let handle = clock.clone();
        handle.advance(5);
        assert_eq!(clock.now_micros(), 15);
        handle.set(100);
        assert_eq!(clock.now_micros(), 100);
    }

    #[test]
    fn test_monotonic_clock_does_not_go_back() {
        let clock = MonotonicClock::default();
        let a = clock.now_micros();
        let b = clock.now_micros();
        assert!(b >= a);
    }

    #[test]
    fn test_snapshot_json() {
        let mut monitor = PerformanceMonitor::new();
        monitor.observe(0);
        monitor.observe(100_000);
        monitor.observe(200_000);

        let report = monitor.snapshot(3);
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("report.json");
        report.write_json(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["frames"], 3);
        assert_eq!(value["samples"], 2);
        assert_eq!(value["accumulated_us"], 200_000);
        assert_eq!(value["average_fps"], 5.0);
    }
}
