//! Benchmark run bookkeeping and summary statistics

pub mod collector;
pub mod export;
pub mod record;
pub mod summary;

pub use collector::Collector;
pub use export::PrometheusExporter;
pub use record::{BenchmarkRun, OperationKind, OperationRecord, RunSpec};
pub use summary::{percentile_nearest_rank, Percentiles, RunStatistics};
