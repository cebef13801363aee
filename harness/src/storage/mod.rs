//! Storage abstraction implemented by every benchmarked backend
//!
//! Operation strategies only ever talk to `dyn Storage`. Vendor adapters
//! live outside this crate; [`MemoryStore`] is the in-process simulated
//! backend used for local runs and tests.

pub mod context;
pub mod memory;
pub mod registry;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageResult;
use crate::models::{RecordKey, Transaction};

pub use context::RequestContext;
pub use memory::{FailurePolicy, MemoryStore, MemoryStoreBuilder};
pub use registry::BackendRegistry;

/// Options for single-record reads
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadOptions {
    pub consistent_read: bool,
    pub index_name: Option<String>,
    pub limit: Option<usize>,
    /// Ask the backend to verify the record against its stored digest
    pub verified: bool,
}

/// Options for single-record writes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteOptions {
    /// Conditional-write expression, e.g. `attribute_not_exists(uuid)`
    pub condition: Option<String>,
    pub return_old_item: bool,
}

/// Options for partition and time-range queries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    pub scan_forward: bool,
    pub limit: Option<usize>,
    pub consistent_read: bool,
}

/// Options for batch reads and writes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOptions {
    pub max_batch_size: Option<usize>,
}

/// Backend capability set consumed by the operation strategies.
///
/// Backends may ignore option fields that do not apply to them.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Tag identifying the backend in run metadata.
    fn name(&self) -> &str;

    async fn initialize(&self, ctx: &RequestContext) -> StorageResult<()>;

    async fn close(&self) -> StorageResult<()>;

    async fn read_one(
        &self,
        ctx: &RequestContext,
        key: &RecordKey,
        options: &ReadOptions,
    ) -> StorageResult<Transaction>;

    async fn write_one(
        &self,
        ctx: &RequestContext,
        record: &Transaction,
        options: &WriteOptions,
    ) -> StorageResult<()>;

    async fn delete_one(&self, ctx: &RequestContext, key: &RecordKey) -> StorageResult<()>;

    async fn query_by_partition(
        &self,
        ctx: &RequestContext,
        partition: &str,
        options: &QueryOptions,
    ) -> StorageResult<Vec<Transaction>>;

    async fn query_by_time_range(
        &self,
        ctx: &RequestContext,
        partition: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        options: &QueryOptions,
    ) -> StorageResult<Vec<Transaction>>;

    async fn batch_read(
        &self,
        ctx: &RequestContext,
        keys: &[RecordKey],
        options: &BatchOptions,
    ) -> StorageResult<Vec<Transaction>>;

    async fn batch_write(
        &self,
        ctx: &RequestContext,
        records: &[Transaction],
        options: &BatchOptions,
    ) -> StorageResult<()>;

    /// All-or-nothing multi-record write.
    async fn transactional_write(
        &self,
        ctx: &RequestContext,
        records: &[Transaction],
    ) -> StorageResult<()>;

    /// Backend-side counters for diagnostics.
    fn metrics(&self) -> BTreeMap<String, serde_json::Value>;

    fn reset_metrics(&self);
}
