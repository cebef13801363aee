//! Crossbench: cross-database benchmarking harness
//!
//! This crate drives standardized workloads against pluggable storage
//! backends and turns the measurements into comparable summaries:
//!
//! - A storage abstraction that every backend adapter implements
//! - A thread-safe metrics collector with nearest-rank percentiles
//! - Read, write, query and ledger workload strategies with bounded
//!   concurrency and partial-failure reporting
//! - Factories mapping type strings to operations and backends
//! - A thin orchestrator turning requests into responses

pub mod error;
pub mod metrics;
pub mod models;
pub mod operations;
pub mod orchestrator;
pub mod params;
pub mod storage;

pub use error::{
    CollectorError, ConfigError, FactoryError, HarnessError, OperationError, Result, StorageError,
};
pub use metrics::{
    BenchmarkRun, Collector, OperationKind, OperationRecord, PrometheusExporter, RunSpec,
    RunStatistics,
};
pub use models::{RecordGenerator, RecordKey, Transaction, TransactionType};
pub use operations::{
    ExecutionOutcome, ItemFailure, Operation, OperationFactory, OperationResult, OperationType,
};
pub use orchestrator::{BenchmarkRequest, BenchmarkResponse, Orchestrator};
pub use params::{ParamMap, ParamValue};
pub use storage::{BackendRegistry, MemoryStore, RequestContext, Storage};

/// Crate version, reported by the CLI
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
