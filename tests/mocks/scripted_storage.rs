use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crossbench::storage::{BatchOptions, QueryOptions, ReadOptions, WriteOptions};
use crossbench::{RecordKey, RequestContext, Storage, StorageError, Transaction, TransactionType};

type StorageResult<T> = Result<T, StorageError>;

/// Call log entry recorded by [`ScriptedStorage`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageCall {
    Initialize,
    Close,
    ReadOne(String),
    WriteOne(String),
    DeleteOne(String),
    QueryByPartition(String),
    QueryByTimeRange(String),
    BatchRead(usize),
    BatchWrite(usize),
    TransactionalWrite(usize),
}

/// Mock backend for testing failure and concurrency scenarios
///
/// Reads of ids that were never written succeed with a synthesized record,
/// so read workloads need no seeding. Ids in the failing set fail every
/// call that touches them; `fail_all` fails every data call and
/// `fail_every(n)` fails every n-th data call in arrival order.
pub struct ScriptedStorage {
    latency: Duration,
    failing_ids: HashSet<String>,
    fail_all: bool,
    fail_every: Option<usize>,
    fail_initialize: bool,
    records: Mutex<HashMap<String, Transaction>>,
    calls: Mutex<Vec<StorageCall>>,
    data_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

struct InFlight<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedStorage {
    pub fn new() -> Self {
        Self {
            latency: Duration::ZERO,
            failing_ids: HashSet::new(),
            fail_all: false,
            fail_every: None,
            fail_initialize: false,
            records: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            data_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn failing_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failing_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn fail_all(mut self) -> Self {
        self.fail_all = true;
        self
    }

    /// Fail every `n`-th data call. Useful when the ids are minted by the
    /// operation and cannot be scripted up front.
    pub fn fail_every(mut self, n: usize) -> Self {
        self.fail_every = Some(n.max(1));
        self
    }

    pub fn fail_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    /// Highest number of data calls observed running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<StorageCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Sizes of every `batch_write` call, in call order.
    pub fn batch_write_sizes(&self) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StorageCall::BatchWrite(size) => Some(size),
                _ => None,
            })
            .collect()
    }

    pub fn stored(&self, uuid: &str) -> Option<Transaction> {
        self.records.lock().unwrap().get(uuid).cloned()
    }

    fn log(&self, call: StorageCall) {
        self.calls.lock().unwrap().push(call);
    }

    /// Track the call as in flight, wait out the latency through the
    /// context, then apply the failure script to `ids`.
    async fn enter<'a, I>(&self, ctx: &RequestContext, ids: I) -> StorageResult<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight {
            counter: &self.in_flight,
        };

        let latency = self.latency;
        ctx.run(async move {
            tokio::time::sleep(latency).await;
            Ok(())
        })
        .await?;

        let seq = self.data_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let scheduled = self.fail_every.map_or(false, |n| seq % n == 0);
        let mut ids = ids.into_iter();
        if self.fail_all || scheduled || ids.any(|id| self.failing_ids.contains(id)) {
            return Err(StorageError::Unavailable {
                reason: "scripted failure".to_string(),
            });
        }
        Ok(())
    }

    fn synthesize(key: &RecordKey) -> Transaction {
        Transaction {
            account_id: key.account_id.clone(),
            uuid: key.uuid.clone(),
            timestamp: Utc::now(),
            amount: 1.0,
            transaction_type: TransactionType::Deposit,
            metadata: vec![0; 16],
        }
    }
}

impl Default for ScriptedStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for ScriptedStorage {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn initialize(&self, _ctx: &RequestContext) -> StorageResult<()> {
        self.log(StorageCall::Initialize);
        if self.fail_initialize {
            return Err(StorageError::Unavailable {
                reason: "scripted initialize failure".to_string(),
            });
        }
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        self.log(StorageCall::Close);
        Ok(())
    }

    async fn read_one(
        &self,
        ctx: &RequestContext,
        key: &RecordKey,
        _options: &ReadOptions,
    ) -> StorageResult<Transaction> {
        self.log(StorageCall::ReadOne(key.uuid.clone()));
        self.enter(ctx, [key.uuid.as_str()]).await?;
        Ok(self
            .stored(&key.uuid)
            .unwrap_or_else(|| Self::synthesize(key)))
    }

    async fn write_one(
        &self,
        ctx: &RequestContext,
        record: &Transaction,
        _options: &WriteOptions,
    ) -> StorageResult<()> {
        self.log(StorageCall::WriteOne(record.uuid.clone()));
        self.enter(ctx, [record.uuid.as_str()]).await?;
        self.records
            .lock()
            .unwrap()
            .insert(record.uuid.clone(), record.clone());
        Ok(())
    }

    async fn delete_one(&self, ctx: &RequestContext, key: &RecordKey) -> StorageResult<()> {
        self.log(StorageCall::DeleteOne(key.uuid.clone()));
        self.enter(ctx, [key.uuid.as_str()]).await?;
        self.records.lock().unwrap().remove(&key.uuid);
        Ok(())
    }

    async fn query_by_partition(
        &self,
        ctx: &RequestContext,
        partition: &str,
        options: &QueryOptions,
    ) -> StorageResult<Vec<Transaction>> {
        self.log(StorageCall::QueryByPartition(partition.to_string()));
        self.enter(ctx, std::iter::empty()).await?;
        let records = self.records.lock().unwrap();
        let mut matches: Vec<_> = records
            .values()
            .filter(|r| r.account_id == partition)
            .cloned()
            .collect();
        if let Some(limit) = options.limit {
            matches.truncate(limit);
        }
        Ok(matches)
    }

    async fn query_by_time_range(
        &self,
        ctx: &RequestContext,
        partition: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        options: &QueryOptions,
    ) -> StorageResult<Vec<Transaction>> {
        self.log(StorageCall::QueryByTimeRange(partition.to_string()));
        self.enter(ctx, std::iter::empty()).await?;
        let records = self.records.lock().unwrap();
        let mut matches: Vec<_> = records
            .values()
            .filter(|r| r.account_id == partition && r.timestamp >= start && r.timestamp <= end)
            .cloned()
            .collect();
        if let Some(limit) = options.limit {
            matches.truncate(limit);
        }
        Ok(matches)
    }

    async fn batch_read(
        &self,
        ctx: &RequestContext,
        keys: &[RecordKey],
        _options: &BatchOptions,
    ) -> StorageResult<Vec<Transaction>> {
        self.log(StorageCall::BatchRead(keys.len()));
        self.enter(ctx, keys.iter().map(|k| k.uuid.as_str())).await?;
        Ok(keys
            .iter()
            .map(|key| self.stored(&key.uuid).unwrap_or_else(|| Self::synthesize(key)))
            .collect())
    }

    async fn batch_write(
        &self,
        ctx: &RequestContext,
        records: &[Transaction],
        _options: &BatchOptions,
    ) -> StorageResult<()> {
        self.log(StorageCall::BatchWrite(records.len()));
        self.enter(ctx, records.iter().map(|r| r.uuid.as_str())).await?;
        let mut stored = self.records.lock().unwrap();
        for record in records {
            stored.insert(record.uuid.clone(), record.clone());
        }
        Ok(())
    }

    async fn transactional_write(
        &self,
        ctx: &RequestContext,
        records: &[Transaction],
    ) -> StorageResult<()> {
        self.log(StorageCall::TransactionalWrite(records.len()));
        self.enter(ctx, records.iter().map(|r| r.uuid.as_str())).await?;
        let mut stored = self.records.lock().unwrap();
        for record in records {
            stored.insert(record.uuid.clone(), record.clone());
        }
        Ok(())
    }

    fn metrics(&self) -> BTreeMap<String, serde_json::Value> {
        let mut metrics = BTreeMap::new();
        metrics.insert("calls".to_string(), serde_json::Value::from(self.calls().len()));
        metrics.insert(
            "peakInFlight".to_string(),
            serde_json::Value::from(self.peak_in_flight()),
        );
        metrics
    }

    fn reset_metrics(&self) {
        self.calls.lock().unwrap().clear();
        self.peak_in_flight.store(0, Ordering::SeqCst);
    }
}
