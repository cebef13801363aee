//! Point reads, sequential or across a bounded worker pool

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{OperationError, OperationOutcome, StorageResult};
use crate::metrics::{Collector, OperationKind};
use crate::models::{deterministic_id, RecordKey, Transaction};
use crate::operations::pool::run_bounded;
use crate::operations::{conclude, ItemFailure, Operation, OperationResult, ReadConfig, TRANSACTION_IDS_KEY};
use crate::storage::{ReadOptions, RequestContext, Storage};

pub struct ReadOperation {
    config: ReadConfig,
}

impl ReadOperation {
    pub fn new(config: ReadConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReadConfig {
        &self.config
    }

    /// Ids to read: explicit ids first, otherwise deterministic ones.
    /// Random ids cannot be re-derived, so asking for them without an
    /// explicit list is an error.
    fn target_ids(&self) -> Result<Vec<String>, OperationError> {
        if let Some(ids) = &self.config.transaction_ids {
            if ids.is_empty() {
                return Err(OperationError::InvalidParameters {
                    reason: "transactionIDs is empty".to_string(),
                });
            }
            return Ok(ids.clone());
        }
        if self.config.use_random_ids {
            return Err(OperationError::InvalidParameters {
                reason: "random-id reads need the written ids passed as transactionIDs".to_string(),
            });
        }
        Ok((0..self.config.item_count)
            .map(|i| deterministic_id(&self.config.account_id, i))
            .collect())
    }

    async fn read_one(
        &self,
        ctx: &RequestContext,
        store: &dyn Storage,
        collector: &Collector,
        options: &ReadOptions,
        id: &str,
    ) -> StorageResult<Transaction> {
        let key = RecordKey::new(self.config.account_id.as_str(), id);
        collector
            .measure(
                OperationKind::Read,
                1,
                self.config.data_size as u64,
                self.config.is_cold_start,
                || store.read_one(ctx, &key, options),
            )
            .await
    }
}

#[async_trait]
impl Operation for ReadOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::Read
    }

    async fn execute(
        &self,
        ctx: &RequestContext,
        backend: Arc<dyn Storage>,
        collector: &Collector,
    ) -> OperationOutcome {
        let started = Instant::now();
        let ids = self.target_ids()?;
        let store = backend.as_ref();
        let options = ReadOptions {
            consistent_read: self.config.consistent_read,
            ..Default::default()
        };

        let mut result = OperationResult::default();
        result.set_data(TRANSACTION_IDS_KEY, ids.clone());

        debug!(
            items = ids.len(),
            parallel = self.config.parallel,
            concurrency = self.config.concurrency,
            "dispatching reads"
        );

        let mut record = |id: &str, outcome: Result<StorageResult<Transaction>, String>| match outcome {
            Ok(Ok(_)) => result.items_processed += 1,
            Ok(Err(e)) => result
                .errors
                .push(ItemFailure::new(id, format!("failed to read transaction {}: {}", id, e))),
            Err(panic) => result.errors.push(ItemFailure::new(id, panic)),
        };

        if self.config.parallel {
            let tasks: Vec<_> = ids
                .iter()
                .map(|id| self.read_one(ctx, store, collector, &options, id))
                .collect();
            for (index, outcome) in run_bounded(tasks, self.config.concurrency).await {
                record(&ids[index], outcome);
            }
        } else {
            for id in &ids {
                let outcome = self.read_one(ctx, store, collector, &options, id).await;
                record(id, Ok(outcome));
            }
        }

        result.total_duration = started.elapsed();
        conclude(OperationKind::Read, ids.len(), result)
    }
}
