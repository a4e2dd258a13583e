//! Accountant: cycle performance tracking and health escalation.
//!
//! Records one `CycleRecord` per scan cycle in a bounded window, derives
//! average cycle duration and success rate from it, and downgrades the
//! scanner's health when whole cycles fail repeatedly.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::ScanHealth;

/// Cycle records kept for the rolling averages.
pub const PERFORMANCE_WINDOW: usize = 100;

/// Below this success rate the latest cycle reads as degraded.
const DEGRADED_SUCCESS_RATE: f64 = 0.5;

// ---------------------------------------------------------------------------
// Cycle record
// ---------------------------------------------------------------------------

/// Summary of one scan cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub cycle_number: u64,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Symbols scheduled this cycle
    pub attempted: usize,
    /// Symbols that produced a profile
    pub succeeded: usize,
    /// Symbols whose market data could not be fetched
    pub failed: usize,
    /// Symbols fetched but not profiled (too few bars, malformed data)
    pub skipped: usize,
    pub opportunities: usize,
    /// Set when the cycle could not run at all (e.g. universe bootstrap failed)
    #[serde(default)]
    pub error: Option<String>,
}

impl CycleRecord {
    /// Fraction of attempted symbols that produced a profile.
    pub fn success_rate(&self) -> f64 {
        if self.error.is_some() {
            return 0.0;
        }
        if self.attempted == 0 {
            return 1.0;
        }
        self.succeeded as f64 / self.attempted as f64
    }

    /// Whether nothing in the cycle succeeded.
    pub fn is_total_failure(&self) -> bool {
        self.error.is_some() || (self.attempted > 0 && self.succeeded == 0)
    }
}

// ---------------------------------------------------------------------------
// Performance summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceSummary {
    /// Mean cycle duration over the window, in milliseconds
    pub avg_scan_time_ms: f64,
    /// Succeeded / attempted over the window
    pub success_rate: f64,
    pub cycles_recorded: usize,
}

// ---------------------------------------------------------------------------
// Accountant
// ---------------------------------------------------------------------------

pub struct ScanAccountant {
    records: VecDeque<CycleRecord>,
    consecutive_failures: usize,
    escalation_threshold: usize,
}

impl ScanAccountant {
    pub fn new(escalation_threshold: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(PERFORMANCE_WINDOW),
            consecutive_failures: 0,
            escalation_threshold: escalation_threshold.max(1),
        }
    }

    /// Record a finished cycle.
    pub fn record(&mut self, record: CycleRecord) {
        if record.is_total_failure() {
            self.consecutive_failures += 1;
            if self.consecutive_failures == self.escalation_threshold {
                warn!(
                    cycle = record.cycle_number,
                    consecutive = self.consecutive_failures,
                    "Scanner unhealthy: repeated total cycle failures"
                );
            }
        } else {
            if self.consecutive_failures >= self.escalation_threshold {
                info!(cycle = record.cycle_number, "Scanner recovered");
            }
            self.consecutive_failures = 0;
        }

        if self.records.len() == PERFORMANCE_WINDOW {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn last(&self) -> Option<&CycleRecord> {
        self.records.back()
    }

    pub fn records(&self) -> impl Iterator<Item = &CycleRecord> {
        self.records.iter()
    }

    pub fn consecutive_failures(&self) -> usize {
        self.consecutive_failures
    }

    pub fn summary(&self) -> PerformanceSummary {
        if self.records.is_empty() {
            return PerformanceSummary {
                avg_scan_time_ms: 0.0,
                success_rate: 1.0,
                cycles_recorded: 0,
            };
        }
        let n = self.records.len();
        let avg = self.records.iter().map(|r| r.duration_ms as f64).sum::<f64>() / n as f64;

        let attempted: usize = self.records.iter().map(|r| r.attempted).sum();
        let succeeded: usize = self.records.iter().map(|r| r.succeeded).sum();
        let errored = self.records.iter().filter(|r| r.error.is_some()).count();
        // A cycle that could not run counts as one failed attempt
        let denominator = attempted + errored;
        let success_rate = if denominator == 0 {
            1.0
        } else {
            succeeded as f64 / denominator as f64
        };

        PerformanceSummary {
            avg_scan_time_ms: avg,
            success_rate,
            cycles_recorded: n,
        }
    }

    pub fn health(&self) -> ScanHealth {
        if self.consecutive_failures >= self.escalation_threshold {
            return ScanHealth::Unhealthy;
        }
        match self.records.back() {
            Some(last) if last.success_rate() < DEGRADED_SUCCESS_RATE => ScanHealth::Degraded,
            _ => ScanHealth::Healthy,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn record(cycle: u64, attempted: usize, succeeded: usize, duration_ms: u64) -> CycleRecord {
        CycleRecord {
            cycle_number: cycle,
            started_at: Utc::now(),
            duration_ms,
            attempted,
            succeeded,
            failed: attempted - succeeded,
            skipped: 0,
            opportunities: 0,
            error: None,
        }
    }

    #[test]
    fn test_summary_averages() {
        let mut acc = ScanAccountant::new(3);
        acc.record(record(1, 10, 10, 1000));
        acc.record(record(2, 10, 5, 3000));
        let s = acc.summary();
        assert_eq!(s.cycles_recorded, 2);
        assert_eq!(s.avg_scan_time_ms, 2000.0);
        assert_eq!(s.success_rate, 0.75);
    }

    #[test]
    fn test_empty_summary() {
        let acc = ScanAccountant::new(3);
        assert_eq!(acc.summary().success_rate, 1.0);
        assert_eq!(acc.health(), ScanHealth::Healthy);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut acc = ScanAccountant::new(3);
        for i in 0..250 {
            acc.record(record(i, 1, 1, 10));
        }
        assert_eq!(acc.records().count(), PERFORMANCE_WINDOW);
        assert_eq!(acc.records().next().unwrap().cycle_number, 150);
    }

    #[test]
    fn test_degraded_on_low_success() {
        let mut acc = ScanAccountant::new(3);
        acc.record(record(1, 10, 4, 100));
        assert_eq!(acc.health(), ScanHealth::Degraded);
        acc.record(record(2, 10, 9, 100));
        assert_eq!(acc.health(), ScanHealth::Healthy);
    }

    #[test]
    fn test_escalates_after_consecutive_total_failures() {
        let mut acc = ScanAccountant::new(3);
        acc.record(record(1, 10, 0, 100));
        acc.record(record(2, 10, 0, 100));
        assert_eq!(acc.health(), ScanHealth::Degraded);
        acc.record(record(3, 10, 0, 100));
        assert_eq!(acc.health(), ScanHealth::Unhealthy);
        assert_eq!(acc.consecutive_failures(), 3);

        // One good cycle resets the streak
        acc.record(record(4, 10, 10, 100));
        assert_eq!(acc.health(), ScanHealth::Healthy);
        assert_eq!(acc.consecutive_failures(), 0);
    }

    #[test]
    fn test_errored_cycle_counts_as_failure() {
        let mut acc = ScanAccountant::new(1);
        let mut r = record(1, 0, 0, 5);
        r.error = Some("bootstrap failed".into());
        assert!(r.is_total_failure());
        acc.record(r);
        assert_eq!(acc.health(), ScanHealth::Unhealthy);
        assert_eq!(acc.summary().success_rate, 0.0);
    }
}
