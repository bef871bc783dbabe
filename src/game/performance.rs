//! Tick performance monitoring
//!
//! Keeps a rolling window of simulation tick durations measured against the
//! tick budget (`1 / tick_rate`). The headless driver uses the resulting
//! status to decide whether eliminated bots may respawn.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Samples kept (~2 seconds at 60Hz)
const WINDOW: usize = 120;
/// Samples needed before the status moves off its initial value
const MIN_SAMPLES: usize = 10;

/// Budget fractions separating the status bands
const EXCELLENT_BELOW: f32 = 0.3;
const GOOD_BELOW: f32 = 0.7;
const WARNING_BELOW: f32 = 0.9;
const CRITICAL_BELOW: f32 = 1.5;

/// Performance status levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceStatus {
    Excellent,
    Good,
    Warning,
    Critical,
    /// Sustained overload
    Catastrophic,
}

impl PerformanceStatus {
    fn from_budget_fraction(fraction: f32) -> Self {
        if fraction < EXCELLENT_BELOW {
            PerformanceStatus::Excellent
        } else if fraction < GOOD_BELOW {
            PerformanceStatus::Good
        } else if fraction < WARNING_BELOW {
            PerformanceStatus::Warning
        } else if fraction < CRITICAL_BELOW {
            PerformanceStatus::Critical
        } else {
            PerformanceStatus::Catastrophic
        }
    }

    /// Eliminated bots come back only while there is headroom
    pub fn can_respawn_bots(&self) -> bool {
        matches!(
            self,
            PerformanceStatus::Excellent | PerformanceStatus::Good | PerformanceStatus::Warning
        )
    }

    pub fn is_overloaded(&self) -> bool {
        matches!(self, PerformanceStatus::Critical | PerformanceStatus::Catastrophic)
    }
}

/// Point-in-time view for logging
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub status: PerformanceStatus,
    pub average_ms: f32,
    pub p95_ms: f32,
    pub budget_percent: f32,
    pub entity_count: usize,
}

/// Rolling tick-duration monitor
#[derive(Debug)]
pub struct PerformanceMonitor {
    samples: VecDeque<Duration>,
    budget: Duration,
    status: PerformanceStatus,
    started: Option<Instant>,
    entity_count: usize,
}

impl PerformanceMonitor {
    pub fn new(tick_rate: u32) -> Self {
        Self {
            samples: VecDeque::with_capacity(WINDOW),
            budget: Duration::from_secs_f32(1.0 / tick_rate.max(1) as f32),
            status: PerformanceStatus::Excellent,
            started: None,
            entity_count: 0,
        }
    }

    pub fn begin_tick(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Close the tick opened by [`begin_tick`](Self::begin_tick)
    pub fn end_tick(&mut self, entity_count: usize) {
        if let Some(start) = self.started.take() {
            self.record(start.elapsed(), entity_count);
        }
    }

    pub fn record(&mut self, duration: Duration, entity_count: usize) {
        self.samples.push_back(duration);
        while self.samples.len() > WINDOW {
            self.samples.pop_front();
        }
        self.entity_count = entity_count;

        if self.samples.len() >= MIN_SAMPLES {
            self.status = PerformanceStatus::from_budget_fraction(self.budget_fraction());
        }
    }

    pub fn average(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        self.samples.iter().sum::<Duration>() / self.samples.len() as u32
    }

    /// 95th percentile tick duration
    pub fn p95(&self) -> Duration {
        let mut sorted: Vec<Duration> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        let idx = (sorted.len() as f32 * 0.95) as usize;
        sorted
            .get(idx.min(sorted.len().saturating_sub(1)))
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    fn budget_fraction(&self) -> f32 {
        self.average().as_secs_f32() / self.budget.as_secs_f32()
    }

    pub fn budget_usage_percent(&self) -> f32 {
        self.budget_fraction() * 100.0
    }

    pub fn status(&self) -> PerformanceStatus {
        self.status
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn report(&self) -> PerformanceReport {
        PerformanceReport {
            status: self.status,
            average_ms: self.average().as_secs_f32() * 1000.0,
            p95_ms: self.p95().as_secs_f32() * 1000.0,
            budget_percent: self.budget_usage_percent(),
            entity_count: self.entity_count,
        }
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(crate::game::constants::physics::TICK_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(millis: u64) -> PerformanceMonitor {
        let mut monitor = PerformanceMonitor::new(60);
        for _ in 0..20 {
            monitor.record(Duration::from_millis(millis), 100);
        }
        monitor
    }

    #[test]
    fn test_starts_excellent() {
        let monitor = PerformanceMonitor::new(60);
        assert_eq!(monitor.status(), PerformanceStatus::Excellent);
        assert_eq!(monitor.average(), Duration::ZERO);
        assert_eq!(monitor.p95(), Duration::ZERO);
    }

    #[test]
    fn test_status_bands() {
        // Budget at 60Hz is ~16.67ms
        assert_eq!(filled(2).status(), PerformanceStatus::Excellent);
        assert_eq!(filled(8).status(), PerformanceStatus::Good);
        assert_eq!(filled(13).status(), PerformanceStatus::Warning);
        assert_eq!(filled(18).status(), PerformanceStatus::Critical);
        assert_eq!(filled(30).status(), PerformanceStatus::Catastrophic);
    }

    #[test]
    fn test_bot_respawn_policy() {
        assert!(filled(13).status().can_respawn_bots());
        assert!(!filled(18).status().can_respawn_bots());
        assert!(filled(30).status().is_overloaded());
    }

    #[test]
    fn test_needs_samples_before_changing_status() {
        let mut monitor = PerformanceMonitor::new(60);
        for _ in 0..(MIN_SAMPLES - 1) {
            monitor.record(Duration::from_millis(40), 1);
        }
        assert_eq!(monitor.status(), PerformanceStatus::Excellent);
        monitor.record(Duration::from_millis(40), 1);
        assert_eq!(monitor.status(), PerformanceStatus::Catastrophic);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut monitor = PerformanceMonitor::new(60);
        for _ in 0..(WINDOW * 2) {
            monitor.record(Duration::from_millis(1), 1);
        }
        assert_eq!(monitor.sample_count(), WINDOW);
    }

    #[test]
    fn test_tick_timing() {
        let mut monitor = PerformanceMonitor::new(60);
        monitor.begin_tick();
        std::thread::sleep(Duration::from_millis(1));
        monitor.end_tick(42);

        assert_eq!(monitor.sample_count(), 1);
        let report = monitor.report();
        assert_eq!(report.entity_count, 42);
        assert!(report.average_ms >= 1.0);
    }
}
