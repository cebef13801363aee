//! Aggregate statistics derived from a run's operation records
//!
//! Summaries are always recomputed from the full record list; nothing is
//! maintained incrementally while the run is in flight.

use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::metrics::OperationRecord;

/// Percentiles are only reported once a run has this many operations.
pub const PERCENTILE_MIN_OPERATIONS: usize = 10;

/// Summary keys written by [`RunStatistics::apply_to`]
pub mod keys {
    pub const OPERATION_COUNT: &str = "operationCount";
    pub const TOTAL_DURATION: &str = "totalDuration";
    pub const AVERAGE_DURATION: &str = "averageDuration";
    pub const TOTAL_ITEMS: &str = "totalItems";
    pub const TOTAL_BYTES: &str = "totalBytes";
    pub const SUCCESS_COUNT: &str = "successCount";
    pub const ERROR_COUNT: &str = "errorCount";
    pub const SUCCESS_RATE: &str = "successRate";
    pub const THROUGHPUT_ITEMS: &str = "throughputItems";
    pub const THROUGHPUT_BYTES: &str = "throughputBytes";
    pub const COLD_START_COUNT: &str = "coldStartCount";
    pub const P50: &str = "p50";
    pub const P90: &str = "p90";
    pub const P99: &str = "p99";
}

/// Nearest-rank latency percentiles in nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Percentiles {
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
}

/// Typed view of a run summary
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatistics {
    pub operation_count: u64,
    /// Sum of per-operation durations, in nanoseconds
    pub total_duration: u64,
    pub average_duration: u64,
    pub total_items: u64,
    pub total_bytes: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub success_rate: f64,
    /// Items per second of run wall-clock time
    pub throughput_items: f64,
    pub throughput_bytes: f64,
    pub cold_start_count: u64,
    pub percentiles: Option<Percentiles>,
}

/// Value at `floor(n * p / 100)` of an ascending slice.
///
/// This is an index-based nearest-rank percentile with no interpolation
/// between neighbouring samples. Returns `None` for an empty slice.
pub fn percentile_nearest_rank(sorted: &[u64], p: u32) -> Option<u64> {
    if sorted.is_empty() {
        return None;
    }
    let index = sorted.len() * p as usize / 100;
    sorted.get(index.min(sorted.len() - 1)).copied()
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

fn per_second(total: u64, run_duration: Duration) -> f64 {
    let secs = run_duration.as_secs_f64();
    if secs > 0.0 {
        total as f64 / secs
    } else {
        0.0
    }
}

impl RunStatistics {
    /// Compute statistics for `records` over a run that lasted `run_duration`.
    pub fn compute(records: &[OperationRecord], run_duration: Duration) -> Self {
        let mut total_duration: u64 = 0;
        let mut total_items: u64 = 0;
        let mut total_bytes: u64 = 0;
        let mut success_count: u64 = 0;
        let mut error_count: u64 = 0;
        let mut cold_start_count: u64 = 0;

        for record in records {
            total_duration = total_duration.saturating_add(nanos(record.duration()));
            total_items = total_items.saturating_add(record.item_count);
            total_bytes = total_bytes.saturating_add(record.byte_count);
            if record.is_success() {
                success_count += 1;
            } else {
                error_count += 1;
            }
            if record.is_cold_start {
                cold_start_count += 1;
            }
        }

        let operation_count = records.len() as u64;
        let (average_duration, success_rate) = if operation_count > 0 {
            (
                total_duration / operation_count,
                success_count as f64 / operation_count as f64,
            )
        } else {
            (0, 0.0)
        };

        let percentiles = if records.len() >= PERCENTILE_MIN_OPERATIONS {
            let mut durations: Vec<u64> = records.iter().map(|r| nanos(r.duration())).collect();
            durations.sort_unstable();
            match (
                percentile_nearest_rank(&durations, 50),
                percentile_nearest_rank(&durations, 90),
                percentile_nearest_rank(&durations, 99),
            ) {
                (Some(p50), Some(p90), Some(p99)) => Some(Percentiles { p50, p90, p99 }),
                _ => None,
            }
        } else {
            None
        };

        Self {
            operation_count,
            total_duration,
            average_duration,
            total_items,
            total_bytes,
            success_count,
            error_count,
            success_rate,
            throughput_items: per_second(total_items, run_duration),
            throughput_bytes: per_second(total_bytes, run_duration),
            cold_start_count,
            percentiles,
        }
    }

    /// Write the computed keys into `summary`, leaving every other key
    /// (custom metrics) untouched. Percentile keys are removed when the
    /// run is too small to report them.
    pub fn apply_to(&self, summary: &mut Map<String, Value>) {
        let float = |f: f64| serde_json::Number::from_f64(f).map_or(Value::from(0.0), Value::Number);

        summary.insert(keys::OPERATION_COUNT.into(), Value::from(self.operation_count));
        summary.insert(keys::TOTAL_DURATION.into(), Value::from(self.total_duration));
        summary.insert(keys::AVERAGE_DURATION.into(), Value::from(self.average_duration));
        summary.insert(keys::TOTAL_ITEMS.into(), Value::from(self.total_items));
        summary.insert(keys::TOTAL_BYTES.into(), Value::from(self.total_bytes));
        summary.insert(keys::SUCCESS_COUNT.into(), Value::from(self.success_count));
        summary.insert(keys::ERROR_COUNT.into(), Value::from(self.error_count));
        summary.insert(keys::SUCCESS_RATE.into(), float(self.success_rate));
        summary.insert(keys::THROUGHPUT_ITEMS.into(), float(self.throughput_items));
        summary.insert(keys::THROUGHPUT_BYTES.into(), float(self.throughput_bytes));
        summary.insert(keys::COLD_START_COUNT.into(), Value::from(self.cold_start_count));

        match self.percentiles {
            Some(p) => {
                summary.insert(keys::P50.into(), Value::from(p.p50));
                summary.insert(keys::P90.into(), Value::from(p.p90));
                summary.insert(keys::P99.into(), Value::from(p.p99));
            }
            None => {
                for key in [keys::P50, keys::P90, keys::P99] {
                    summary.remove(key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::OperationKind;
    use chrono::Utc;
    use proptest::prelude::*;

    fn record(nanos: u64, error: bool) -> OperationRecord {
        OperationRecord::new(
            OperationKind::Read,
            Utc::now(),
            Duration::from_nanos(nanos),
            1,
            100,
            false,
            error.then(|| "boom".to_string()),
        )
    }

    #[test]
    fn test_nearest_rank_indexing() {
        let sorted: Vec<u64> = (1..=10).collect();
        // floor(10 * 50 / 100) = 5 -> sixth element
        assert_eq!(percentile_nearest_rank(&sorted, 50), Some(6));
        assert_eq!(percentile_nearest_rank(&sorted, 90), Some(10));
        assert_eq!(percentile_nearest_rank(&sorted, 99), Some(10));
        assert_eq!(percentile_nearest_rank(&[], 50), None);
    }

    #[test]
    fn test_empty_run_reports_zeros() {
        let stats = RunStatistics::compute(&[], Duration::ZERO);
        assert_eq!(stats.operation_count, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(stats.throughput_items, 0.0);
        assert!(stats.percentiles.is_none());

        let mut summary = Map::new();
        stats.apply_to(&mut summary);
        assert_eq!(summary[keys::OPERATION_COUNT], 0);
        assert_eq!(summary[keys::SUCCESS_RATE], 0.0);
    }

    #[test]
    fn test_throughput_uses_run_duration() {
        let records: Vec<_> = (0..4).map(|_| record(1_000, false)).collect();
        let stats = RunStatistics::compute(&records, Duration::from_secs(2));
        assert_eq!(stats.total_items, 4);
        assert_eq!(stats.throughput_items, 2.0);
        assert_eq!(stats.throughput_bytes, 200.0);
        assert_eq!(stats.average_duration, 1_000);
    }

    #[test]
    fn test_apply_preserves_custom_keys_and_drops_stale_percentiles() {
        let mut summary = Map::new();
        summary.insert("region".into(), Value::from("eu-west-1"));
        summary.insert(keys::P50.into(), Value::from(1u64));

        let stats = RunStatistics::compute(&[record(5, false)], Duration::from_secs(1));
        stats.apply_to(&mut summary);

        assert_eq!(summary["region"], "eu-west-1");
        assert!(!summary.contains_key(keys::P50));
        assert_eq!(summary[keys::SUCCESS_COUNT], 1);
    }

    proptest! {
        #[test]
        fn prop_percentiles_are_ordered_and_bounded(
            durations in prop::collection::vec(0u64..10_000_000, 10..200)
        ) {
            let records: Vec<_> = durations.iter().map(|d| record(*d, false)).collect();
            let stats = RunStatistics::compute(&records, Duration::from_secs(1));
            let p = stats.percentiles.expect("percentiles for n >= 10");
            let min = *durations.iter().min().unwrap();
            let max = *durations.iter().max().unwrap();

            prop_assert!(p.p50 <= p.p90);
            prop_assert!(p.p90 <= p.p99);
            prop_assert!(p.p50 >= min && p.p99 <= max);
        }

        #[test]
        fn prop_success_and_errors_add_up(outcomes in prop::collection::vec(any::<bool>(), 0..100)) {
            let records: Vec<_> = outcomes.iter().map(|failed| record(10, *failed)).collect();
            let stats = RunStatistics::compute(&records, Duration::from_millis(5));

            prop_assert_eq!(stats.success_count + stats.error_count, stats.operation_count);
            prop_assert_eq!(stats.error_count, outcomes.iter().filter(|f| **f).count() as u64);
        }
    }
}
