//! In-process simulated storage backend
//!
//! Keeps records in memory and simulates per-call latency and failures so
//! the harness can be exercised without a real database. Latency sleeps go
//! through the request context, so cancellation and deadlines behave the
//! way they would against a remote backend.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{StorageError, StorageResult};
use crate::models::{RecordGenerator, RecordKey, Transaction};
use crate::params::ParamMap;
use crate::storage::{
    BatchOptions, QueryOptions, ReadOptions, RequestContext, Storage, WriteOptions,
};

const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// `value` given in units of 1/`per_second` seconds; must be finite,
/// non-negative and representable as a `Duration`.
fn scaled_duration(key: &str, value: f64, per_second: f64) -> StorageResult<Duration> {
    if value < 0.0 {
        return Err(StorageError::InvalidConfig {
            reason: format!("{} must be non-negative, got {}", key, value),
        });
    }
    Duration::try_from_secs_f64(value / per_second).map_err(|_| StorageError::InvalidConfig {
        reason: format!("{} is not a usable duration: {}", key, value),
    })
}

/// Which calls the simulated backend should fail
#[derive(Debug, Clone, Default)]
pub enum FailurePolicy {
    #[default]
    Never,
    Always,
    /// Fail each call independently with this probability
    Fraction(f64),
    /// Fail any call touching one of these record ids
    Ids(HashSet<String>),
}

impl FailurePolicy {
    fn should_fail<'a>(&self, mut ids: impl Iterator<Item = &'a str>) -> bool {
        match self {
            FailurePolicy::Never => false,
            FailurePolicy::Always => true,
            FailurePolicy::Fraction(p) => rand::random::<f64>() < *p,
            FailurePolicy::Ids(set) => ids.any(|id| set.contains(id)),
        }
    }
}

#[derive(Default)]
struct StoreCounters {
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    queries: AtomicU64,
    batch_reads: AtomicU64,
    batch_writes: AtomicU64,
    transactions: AtomicU64,
    total: AtomicU64,
    failed: AtomicU64,
}

impl StoreCounters {
    fn reset(&self) {
        for counter in [
            &self.reads,
            &self.writes,
            &self.deletes,
            &self.queries,
            &self.batch_reads,
            &self.batch_writes,
            &self.transactions,
            &self.total,
            &self.failed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

struct StoredRecord {
    record: Transaction,
    digest: String,
}

/// Simulated key-value/time-series store
pub struct MemoryStore {
    name: String,
    records: RwLock<BTreeMap<RecordKey, StoredRecord>>,
    initialized: AtomicBool,
    latency: Duration,
    latency_per_kib: Duration,
    failure: FailurePolicy,
    max_batch_size: usize,
    counters: StoreCounters,
}

/// Builder for [`MemoryStore`]
#[derive(Debug, Clone)]
pub struct MemoryStoreBuilder {
    name: String,
    latency: Duration,
    latency_per_kib: Duration,
    failure: FailurePolicy,
    max_batch_size: usize,
    seed: Option<RecordGenerator>,
    seed_count: usize,
}

impl Default for MemoryStoreBuilder {
    fn default() -> Self {
        Self {
            name: "memory".to_string(),
            latency: Duration::ZERO,
            latency_per_kib: Duration::ZERO,
            failure: FailurePolicy::Never,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            seed: None,
            seed_count: 0,
        }
    }
}

impl MemoryStoreBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Fixed latency added to every call.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Extra latency per KiB of payload moved.
    pub fn latency_per_kib(mut self, latency: Duration) -> Self {
        self.latency_per_kib = latency;
        self
    }

    pub fn failure(mut self, failure: FailurePolicy) -> Self {
        self.failure = failure;
        self
    }

    pub fn fail_ids<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failure(FailurePolicy::Ids(ids.into_iter().map(Into::into).collect()))
    }

    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size.max(1);
        self
    }

    /// Pre-populate the store with `count` deterministic records
    /// (`{account}-tx-0` onwards), so read workloads have data to hit.
    pub fn seed_records(mut self, account_id: impl Into<String>, count: usize, data_size: usize) -> Self {
        self.seed = Some(RecordGenerator::new(account_id, data_size, false));
        self.seed_count = count;
        self
    }

    /// Apply backend settings from `db.`-stripped request parameters:
    /// `name`, `latencyMs`, `latencyPerKibUs`, `failureRate`, `maxBatchSize`,
    /// `seedCount`, `seedAccountId` and `seedDataSize`.
    pub fn from_params(params: &ParamMap) -> StorageResult<Self> {
        let mut builder = Self::default();

        if let Some(name) = params.get("name").and_then(|v| v.as_str()) {
            builder = builder.name(name);
        }
        if let Some(ms) = params.get("latencyMs").and_then(|v| v.as_float()) {
            builder = builder.latency(scaled_duration("latencyMs", ms, 1_000.0)?);
        }
        if let Some(us) = params.get("latencyPerKibUs").and_then(|v| v.as_float()) {
            builder = builder.latency_per_kib(scaled_duration("latencyPerKibUs", us, 1_000_000.0)?);
        }
        if let Some(rate) = params.get("failureRate").and_then(|v| v.as_float()) {
            if !(0.0..=1.0).contains(&rate) {
                return Err(StorageError::InvalidConfig {
                    reason: format!("failureRate must be within [0, 1], got {}", rate),
                });
            }
            builder = builder.failure(FailurePolicy::Fraction(rate));
        }
        if let Some(size) = params.get("maxBatchSize").and_then(|v| v.as_usize()) {
            builder = builder.max_batch_size(size);
        }
        if let Some(count) = params.get("seedCount").and_then(|v| v.as_usize()) {
            let account = params
                .get("seedAccountId")
                .and_then(|v| v.as_str())
                .unwrap_or("test-account");
            let data_size = params
                .get("seedDataSize")
                .and_then(|v| v.as_usize())
                .unwrap_or(1024);
            builder = builder.seed_records(account, count, data_size);
        }

        Ok(builder)
    }

    pub fn build(self) -> MemoryStore {
        let store = MemoryStore {
            name: self.name,
            records: RwLock::new(BTreeMap::new()),
            initialized: AtomicBool::new(false),
            latency: self.latency,
            latency_per_kib: self.latency_per_kib,
            failure: self.failure,
            max_batch_size: self.max_batch_size,
            counters: StoreCounters::default(),
        };
        if let Some(generator) = &self.seed {
            store.seed(generator.generate_batch(self.seed_count));
        }
        store
    }
}

impl MemoryStore {
    pub fn builder() -> MemoryStoreBuilder {
        MemoryStoreBuilder::default()
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.read_records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert records directly, bypassing latency, failures and counters.
    pub fn seed<I: IntoIterator<Item = Transaction>>(&self, records: I) {
        let mut store = self.write_records();
        for record in records {
            store.insert(record.key(), Self::stored(record));
        }
    }

    /// Flip a payload byte without updating the digest, so a verified read
    /// of `key` reports a mismatch.
    pub fn corrupt(&self, key: &RecordKey) -> bool {
        let mut store = self.write_records();
        match store.get_mut(key) {
            Some(stored) => {
                match stored.record.metadata.first_mut() {
                    Some(byte) => *byte ^= 0xff,
                    None => stored.record.amount += 1.0,
                }
                true
            }
            None => false,
        }
    }

    fn stored(record: Transaction) -> StoredRecord {
        let digest = record.digest();
        StoredRecord { record, digest }
    }

    fn read_records(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, BTreeMap<RecordKey, StoredRecord>> {
        self.records.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_records(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, BTreeMap<RecordKey, StoredRecord>> {
        self.records.write().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_initialized(&self) -> StorageResult<()> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StorageError::NotInitialized {
                backend: self.name.clone(),
            })
        }
    }

    /// Common prologue: count the call, check state, then sleep for the
    /// simulated latency of moving `bytes`.
    async fn begin(&self, ctx: &RequestContext, counter: &AtomicU64, bytes: usize) -> StorageResult<()> {
        counter.fetch_add(1, Ordering::Relaxed);
        self.counters.total.fetch_add(1, Ordering::Relaxed);
        self.ensure_initialized()?;

        let kib = u32::try_from((bytes as u64).div_ceil(1024)).unwrap_or(u32::MAX);
        let delay = self
            .latency_per_kib
            .checked_mul(kib)
            .map_or(Duration::MAX, |per_kib| self.latency.saturating_add(per_kib));
        if delay.is_zero() {
            ctx.check()
        } else {
            ctx.run(async {
                tokio::time::sleep(delay).await;
                Ok(())
            })
            .await
        }
    }

    fn inject<'a>(&self, ids: impl Iterator<Item = &'a str>) -> StorageResult<()> {
        if self.failure.should_fail(ids) {
            Err(StorageError::Unavailable {
                reason: "injected failure".to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn check_batch(&self, size: usize) -> StorageResult<()> {
        if size > self.max_batch_size {
            Err(StorageError::BatchTooLarge {
                size,
                limit: self.max_batch_size,
            })
        } else {
            Ok(())
        }
    }

    fn check_condition(
        store: &BTreeMap<RecordKey, StoredRecord>,
        record: &Transaction,
        condition: Option<&str>,
    ) -> StorageResult<()> {
        let exists = store.contains_key(&record.key());
        let failed = match condition {
            Some(expr) if expr.starts_with("attribute_not_exists") => exists,
            Some(expr) if expr.starts_with("attribute_exists") => !exists,
            _ => false,
        };
        if failed {
            Err(StorageError::ConditionFailed {
                id: record.uuid.clone(),
            })
        } else {
            Ok(())
        }
    }

    fn track<T>(&self, result: StorageResult<T>) -> StorageResult<T> {
        if result.is_err() {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    fn sorted(mut records: Vec<Transaction>, options: &QueryOptions) -> Vec<Transaction> {
        records.sort_by_key(|r| r.timestamp);
        if !options.scan_forward {
            records.reverse();
        }
        if let Some(limit) = options.limit {
            records.truncate(limit);
        }
        records
    }

    fn partition(&self, partition: &str) -> Vec<Transaction> {
        self.read_records()
            .iter()
            .filter(|(key, _)| key.account_id == partition)
            .map(|(_, stored)| stored.record.clone())
            .collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self, ctx: &RequestContext) -> StorageResult<()> {
        ctx.check()?;
        self.initialized.store(true, Ordering::Release);
        tracing::debug!(backend = %self.name, "memory store initialized");
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        self.initialized.store(false, Ordering::Release);
        Ok(())
    }

    async fn read_one(
        &self,
        ctx: &RequestContext,
        key: &RecordKey,
        options: &ReadOptions,
    ) -> StorageResult<Transaction> {
        let result = async {
            self.begin(ctx, &self.counters.reads, 0).await?;
            self.inject(std::iter::once(key.uuid.as_str()))?;

            let store = self.read_records();
            let stored = store.get(key).ok_or_else(|| StorageError::NotFound {
                partition: key.account_id.clone(),
                id: key.uuid.clone(),
            })?;
            if options.verified && stored.record.digest() != stored.digest {
                return Err(StorageError::VerificationFailed {
                    id: key.uuid.clone(),
                });
            }
            Ok(stored.record.clone())
        }
        .await;
        self.track(result)
    }

    async fn write_one(
        &self,
        ctx: &RequestContext,
        record: &Transaction,
        options: &WriteOptions,
    ) -> StorageResult<()> {
        let result = async {
            self.begin(ctx, &self.counters.writes, record.approximate_size())
                .await?;
            self.inject(std::iter::once(record.uuid.as_str()))?;

            let mut store = self.write_records();
            Self::check_condition(&store, record, options.condition.as_deref())?;
            store.insert(record.key(), Self::stored(record.clone()));
            Ok(())
        }
        .await;
        self.track(result)
    }

    async fn delete_one(&self, ctx: &RequestContext, key: &RecordKey) -> StorageResult<()> {
        let result = async {
            self.begin(ctx, &self.counters.deletes, 0).await?;
            self.inject(std::iter::once(key.uuid.as_str()))?;
            self.write_records().remove(key);
            Ok(())
        }
        .await;
        self.track(result)
    }

    async fn query_by_partition(
        &self,
        ctx: &RequestContext,
        partition: &str,
        options: &QueryOptions,
    ) -> StorageResult<Vec<Transaction>> {
        let result = async {
            self.begin(ctx, &self.counters.queries, 0).await?;
            self.inject(std::iter::empty())?;
            Ok(Self::sorted(self.partition(partition), options))
        }
        .await;
        self.track(result)
    }

    async fn query_by_time_range(
        &self,
        ctx: &RequestContext,
        partition: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        options: &QueryOptions,
    ) -> StorageResult<Vec<Transaction>> {
        let result = async {
            self.begin(ctx, &self.counters.queries, 0).await?;
            self.inject(std::iter::empty())?;
            let matching = self
                .partition(partition)
                .into_iter()
                .filter(|r| r.timestamp >= start && r.timestamp <= end)
                .collect();
            Ok(Self::sorted(matching, options))
        }
        .await;
        self.track(result)
    }

    async fn batch_read(
        &self,
        ctx: &RequestContext,
        keys: &[RecordKey],
        _options: &BatchOptions,
    ) -> StorageResult<Vec<Transaction>> {
        let result = async {
            self.begin(ctx, &self.counters.batch_reads, 0).await?;
            self.check_batch(keys.len())?;
            self.inject(keys.iter().map(|k| k.uuid.as_str()))?;

            let store = self.read_records();
            Ok(keys
                .iter()
                .filter_map(|key| store.get(key).map(|s| s.record.clone()))
                .collect())
        }
        .await;
        self.track(result)
    }

    async fn batch_write(
        &self,
        ctx: &RequestContext,
        records: &[Transaction],
        _options: &BatchOptions,
    ) -> StorageResult<()> {
        let bytes = records.iter().map(Transaction::approximate_size).sum();
        let result = async {
            self.begin(ctx, &self.counters.batch_writes, bytes).await?;
            self.check_batch(records.len())?;
            self.inject(records.iter().map(|r| r.uuid.as_str()))?;

            let mut store = self.write_records();
            for record in records {
                store.insert(record.key(), Self::stored(record.clone()));
            }
            Ok(())
        }
        .await;
        self.track(result)
    }

    async fn transactional_write(
        &self,
        ctx: &RequestContext,
        records: &[Transaction],
    ) -> StorageResult<()> {
        let bytes = records.iter().map(Transaction::approximate_size).sum();
        let result = async {
            self.begin(ctx, &self.counters.transactions, bytes).await?;
            self.check_batch(records.len())?;
            self.inject(records.iter().map(|r| r.uuid.as_str()))?;

            let mut store = self.write_records();
            let mut seen = HashSet::new();
            for record in records {
                if !seen.insert(record.key()) {
                    return Err(StorageError::ConditionFailed {
                        id: record.uuid.clone(),
                    });
                }
            }
            for record in records {
                store.insert(record.key(), Self::stored(record.clone()));
            }
            Ok(())
        }
        .await;
        self.track(result)
    }

    fn metrics(&self) -> BTreeMap<String, serde_json::Value> {
        let c = &self.counters;
        let load = |counter: &AtomicU64| serde_json::Value::from(counter.load(Ordering::Relaxed));

        [
            ("readOperations", load(&c.reads)),
            ("writeOperations", load(&c.writes)),
            ("deleteOperations", load(&c.deletes)),
            ("queryOperations", load(&c.queries)),
            ("batchReadOperations", load(&c.batch_reads)),
            ("batchWriteOperations", load(&c.batch_writes)),
            ("transactionOperations", load(&c.transactions)),
            ("totalOperations", load(&c.total)),
            ("failedOperations", load(&c.failed)),
            ("recordCount", serde_json::Value::from(self.len())),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    fn reset_metrics(&self) {
        self.counters.reset();
    }
}
