//! Ledger-store workloads
//!
//! Same measurement logic as the generic strategies, shaped around an
//! immutable ledger's primitives: writes always mint fresh uuids, reads can
//! ask for server-side verification, and batch reads go through a single
//! `batch_read` call.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{OperationError, OperationOutcome, StorageResult};
use crate::metrics::{Collector, OperationKind};
use crate::models::{RecordGenerator, RecordKey, Transaction};
use crate::operations::pool::run_bounded;
use crate::operations::{
    conclude, ItemFailure, LedgerQueryConfig, LedgerReadConfig, LedgerWriteConfig, Operation,
    OperationResult,
};
use crate::storage::{BatchOptions, QueryOptions, ReadOptions, RequestContext, Storage, WriteOptions};

pub const UUIDS_KEY: &str = "uuids";
pub const ACCOUNT_ID_KEY: &str = "accountID";
pub const TRANSACTIONS_KEY: &str = "transactions";

fn transactions_value(records: &[Transaction]) -> serde_json::Value {
    serde_json::to_value(records).unwrap_or_default()
}

fn require_account(account_id: &str) -> Result<(), OperationError> {
    if account_id.is_empty() {
        return Err(OperationError::InvalidParameters {
            reason: "no accountID provided".to_string(),
        });
    }
    Ok(())
}

/// Writes `numTransactions` fresh records under one account, either as
/// parallel individual writes or as one measured batch.
pub struct LedgerWriteOperation {
    config: LedgerWriteConfig,
}

impl LedgerWriteOperation {
    pub fn new(config: LedgerWriteConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LedgerWriteConfig {
        &self.config
    }
}

#[async_trait]
impl Operation for LedgerWriteOperation {
    fn kind(&self) -> OperationKind {
        if self.config.parallel {
            OperationKind::Write
        } else {
            OperationKind::Batch
        }
    }

    async fn execute(
        &self,
        ctx: &RequestContext,
        backend: Arc<dyn Storage>,
        collector: &Collector,
    ) -> OperationOutcome {
        let config = &self.config;
        let records = RecordGenerator::new(config.account_id.as_str(), config.data_size, true)
            .generate_batch(config.num_transactions);
        let store = backend.as_ref();

        let mut result = OperationResult::default();
        result.set_data(
            UUIDS_KEY,
            records.iter().map(|r| r.uuid.clone()).collect::<Vec<_>>(),
        );
        result.set_data(ACCOUNT_ID_KEY, config.account_id.clone());

        let started = Instant::now();
        let attempted = if config.parallel {
            let options = &WriteOptions::default();
            let tasks: Vec<_> = records
                .iter()
                .map(|record| {
                    collector.measure(
                        OperationKind::Write,
                        1,
                        record.approximate_size() as u64,
                        config.is_cold_start,
                        move || store.write_one(ctx, record, options),
                    )
                })
                .collect();
            for (index, outcome) in run_bounded(tasks, config.concurrency).await {
                let uuid = records[index].uuid.as_str();
                match outcome {
                    Ok(Ok(())) => result.items_processed += 1,
                    Ok(Err(e)) => result.errors.push(ItemFailure::new(uuid, e)),
                    Err(panic) => result.errors.push(ItemFailure::new(uuid, panic)),
                }
            }
            records.len()
        } else {
            let bytes: usize = records.iter().map(Transaction::approximate_size).sum();
            let options = BatchOptions::default();
            let outcome: StorageResult<()> = collector
                .measure(
                    OperationKind::Batch,
                    records.len() as u64,
                    bytes as u64,
                    config.is_cold_start,
                    || store.batch_write(ctx, &records, &options),
                )
                .await;
            match outcome {
                Ok(()) => result.items_processed = records.len(),
                Err(e) => result.errors.push(ItemFailure::new("batch-0", e)),
            }
            1
        };

        result.total_duration = started.elapsed();
        conclude(self.kind(), attempted, result)
    }
}

/// Reads back known uuids of one account, individually in parallel or with
/// a single batch read. `verified` asks the backend to check each record
/// against its stored digest.
pub struct LedgerReadOperation {
    config: LedgerReadConfig,
}

impl LedgerReadOperation {
    pub fn new(config: LedgerReadConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LedgerReadConfig {
        &self.config
    }
}

#[async_trait]
impl Operation for LedgerReadOperation {
    fn kind(&self) -> OperationKind {
        if self.config.parallel {
            OperationKind::Read
        } else {
            OperationKind::Batch
        }
    }

    async fn execute(
        &self,
        ctx: &RequestContext,
        backend: Arc<dyn Storage>,
        collector: &Collector,
    ) -> OperationOutcome {
        let config = &self.config;
        if config.uuids.is_empty() {
            return Err(OperationError::InvalidParameters {
                reason: "no uuids provided for ledger read".to_string(),
            });
        }
        require_account(&config.account_id)?;

        let store = backend.as_ref();
        let keys: Vec<RecordKey> = config
            .uuids
            .iter()
            .map(|uuid| RecordKey::new(config.account_id.as_str(), uuid.as_str()))
            .collect();
        let mut transactions = Vec::with_capacity(keys.len());
        let mut result = OperationResult::default();

        debug!(
            account = %config.account_id,
            items = keys.len(),
            parallel = config.parallel,
            verified = config.verified,
            "dispatching ledger reads"
        );

        let started = Instant::now();
        let attempted = if config.parallel {
            let options = &ReadOptions {
                verified: config.verified,
                ..Default::default()
            };
            let tasks: Vec<_> = keys
                .iter()
                .map(|key| {
                    collector.measure(
                        OperationKind::Read,
                        1,
                        key.size() as u64,
                        config.is_cold_start,
                        move || store.read_one(ctx, key, options),
                    )
                })
                .collect();
            for (index, outcome) in run_bounded(tasks, config.concurrency).await {
                let uuid = keys[index].uuid.as_str();
                match outcome {
                    Ok(Ok(tx)) => transactions.push(tx),
                    Ok(Err(e)) => result.errors.push(ItemFailure::new(uuid, e)),
                    Err(panic) => result.errors.push(ItemFailure::new(uuid, panic)),
                }
            }
            keys.len()
        } else {
            let bytes: usize = keys.iter().map(RecordKey::size).sum();
            let options = BatchOptions::default();
            let outcome: StorageResult<Vec<Transaction>> = collector
                .measure(
                    OperationKind::Batch,
                    keys.len() as u64,
                    bytes as u64,
                    config.is_cold_start,
                    || store.batch_read(ctx, &keys, &options),
                )
                .await;
            match outcome {
                Ok(found) => transactions = found,
                Err(e) => result.errors.push(ItemFailure::new("batch-0", e)),
            }
            1
        };

        result.total_duration = started.elapsed();
        result.items_processed = transactions.len();
        result.set_data(TRANSACTIONS_KEY, transactions_value(&transactions));
        conclude(self.kind(), attempted, result)
    }
}

/// Lists one account's records, optionally restricted to a time window.
pub struct LedgerQueryOperation {
    config: LedgerQueryConfig,
}

impl LedgerQueryOperation {
    pub fn new(config: LedgerQueryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LedgerQueryConfig {
        &self.config
    }
}

#[async_trait]
impl Operation for LedgerQueryOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::Query
    }

    async fn execute(
        &self,
        ctx: &RequestContext,
        backend: Arc<dyn Storage>,
        collector: &Collector,
    ) -> OperationOutcome {
        let config = &self.config;
        require_account(&config.account_id)?;

        let options = QueryOptions {
            limit: config.limit,
            scan_forward: true,
            ..Default::default()
        };
        // Result size is unknown up front; only the request is sized.
        let mut request_size = config.account_id.len() as u64;
        if config.time_range {
            request_size += 16;
        }

        let started = Instant::now();
        let outcome: StorageResult<Vec<Transaction>> = collector
            .measure(OperationKind::Query, 0, request_size, config.is_cold_start, || {
                if config.time_range {
                    backend.query_by_time_range(
                        ctx,
                        &config.account_id,
                        config.start_time,
                        config.end_time,
                        &options,
                    )
                } else {
                    backend.query_by_partition(ctx, &config.account_id, &options)
                }
            })
            .await;

        let mut result = OperationResult::default();
        let transactions = match outcome {
            Ok(found) => found,
            Err(e) => {
                result
                    .errors
                    .push(ItemFailure::new(config.account_id.as_str(), e));
                Vec::new()
            }
        };

        result.total_duration = started.elapsed();
        result.items_processed = transactions.len();
        result.set_data(TRANSACTIONS_KEY, transactions_value(&transactions));
        conclude(OperationKind::Query, 1, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RunSpec;
    use crate::params;
    use crate::params::ParamMap;
    use crate::storage::MemoryStore;

    async fn ready() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.initialize(&RequestContext::new()).await.unwrap();
        store
    }

    fn collector() -> Collector {
        let collector = Collector::new();
        collector.start_test(RunSpec::new("ledger")).unwrap();
        collector
    }

    #[tokio::test]
    async fn test_write_then_verified_read() {
        let store = ready().await;
        let collector = collector();
        let ctx = RequestContext::new();

        let written = LedgerWriteOperation::new(LedgerWriteConfig::from_params(&params! {
            "numTransactions" => 6i64,
            "accountID" => "acct-ledger",
            "parallel" => true,
            "dataSize" => 16i64,
        }))
        .execute(&ctx, store.clone(), &collector)
        .await
        .unwrap();
        assert_eq!(written.items_processed, 6);
        assert_eq!(written.data[ACCOUNT_ID_KEY], "acct-ledger");
        let uuids = written.data_strings(UUIDS_KEY).unwrap();
        assert_eq!(uuids.len(), 6);

        let read = LedgerReadOperation::new(LedgerReadConfig::from_params(&params! {
            "uuids" => uuids.clone(),
            "accountID" => "acct-ledger",
            "parallel" => true,
            "verified" => true,
        }))
        .execute(&ctx, store.clone(), &collector)
        .await
        .unwrap();
        assert_eq!(read.items_processed, 6);
        assert_eq!(read.data[TRANSACTIONS_KEY].as_array().unwrap().len(), 6);

        // corrupting one record makes exactly that verified read fail
        store.corrupt(&RecordKey::new("acct-ledger", uuids[2].as_str()));
        let read = LedgerReadOperation::new(LedgerReadConfig::from_params(&params! {
            "uuids" => uuids.clone(),
            "accountID" => "acct-ledger",
            "parallel" => true,
            "verified" => true,
        }))
        .execute(&ctx, store, &collector)
        .await
        .unwrap();
        assert_eq!(read.items_processed, 5);
        assert_eq!(read.errors.len(), 1);
        assert_eq!(read.errors[0].target, uuids[2]);
    }

    #[tokio::test]
    async fn test_batch_write_and_batch_read() {
        let store = ready().await;
        let collector = collector();
        let ctx = RequestContext::new();

        let written = LedgerWriteOperation::new(LedgerWriteConfig::from_params(&params! {
            "numTransactions" => 4i64,
            "accountID" => "acct-batch",
        }))
        .execute(&ctx, store.clone(), &collector)
        .await
        .unwrap();
        assert_eq!(store.metrics()["batchWriteOperations"], 1);

        let read = LedgerReadOperation::new(LedgerReadConfig::from_params(&params! {
            "uuids" => written.data_strings(UUIDS_KEY).unwrap(),
            "accountID" => "acct-batch",
        }))
        .execute(&ctx, store.clone(), &collector)
        .await
        .unwrap();
        assert_eq!(read.items_processed, 4);

        let run = collector.end_test("ledger").unwrap();
        assert_eq!(run.operations.len(), 2);
        assert!(run.operations.iter().all(|r| r.kind == OperationKind::Batch));
        assert_eq!(run.operations[1].item_count, 4);
    }

    #[tokio::test]
    async fn test_read_requires_uuids_and_account() {
        let store = ready().await;
        let collector = collector();
        let ctx = RequestContext::new();

        let missing_uuids = LedgerReadOperation::new(LedgerReadConfig::from_params(&params! {
            "accountID" => "acct",
        }));
        assert!(matches!(
            missing_uuids.execute(&ctx, store.clone(), &collector).await,
            Err(OperationError::InvalidParameters { .. })
        ));

        let missing_account = LedgerReadOperation::new(LedgerReadConfig::from_params(&params! {
            "uuids" => vec!["u1".to_string()],
        }));
        assert!(matches!(
            missing_account.execute(&ctx, store, &collector).await,
            Err(OperationError::InvalidParameters { .. })
        ));
    }

    #[tokio::test]
    async fn test_query_by_account_and_time_range() {
        let store = ready().await;
        let collector = collector();
        let ctx = RequestContext::new();
        store.seed(RecordGenerator::new("acct-q", 8, true).generate_batch(3));
        store.seed(RecordGenerator::new("acct-other", 8, true).generate_batch(2));

        let by_account = LedgerQueryOperation::new(LedgerQueryConfig::from_params(&params! {
            "accountID" => "acct-q",
        }))
        .execute(&ctx, store.clone(), &collector)
        .await
        .unwrap();
        assert_eq!(by_account.items_processed, 3);

        let in_window = LedgerQueryOperation::new(LedgerQueryConfig::from_params(&params! {
            "accountID" => "acct-q",
            "timeRange" => true,
            "startTime" => "2000-01-01T00:00:00Z",
            "endTime" => "2000-01-02T00:00:00Z",
        }))
        .execute(&ctx, store.clone(), &collector)
        .await
        .unwrap();
        assert_eq!(in_window.items_processed, 0);

        let no_account = LedgerQueryOperation::new(LedgerQueryConfig::from_params(&ParamMap::new()));
        assert!(no_account.execute(&ctx, store, &collector).await.is_err());
    }
}
