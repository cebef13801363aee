//! Individual or batched writes of generated records

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{OperationOutcome, StorageResult};
use crate::metrics::{Collector, OperationKind};
use crate::models::{RecordGenerator, Transaction};
use crate::operations::pool::run_bounded;
use crate::operations::{conclude, ItemFailure, Operation, OperationResult, WriteConfig, TRANSACTION_IDS_KEY};
use crate::storage::{BatchOptions, RequestContext, Storage, WriteOptions};

pub struct WriteOperation {
    config: WriteConfig,
}

impl WriteOperation {
    pub fn new(config: WriteConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WriteConfig {
        &self.config
    }

    fn generate(&self) -> Vec<Transaction> {
        RecordGenerator::new(
            self.config.account_id.as_str(),
            self.config.data_size,
            self.config.use_random_ids,
        )
        .generate_batch(self.config.item_count)
    }

    async fn write_individually(
        &self,
        ctx: &RequestContext,
        store: &dyn Storage,
        collector: &Collector,
        records: &[Transaction],
        result: &mut OperationResult,
    ) -> usize {
        let options = WriteOptions::default();
        for record in records {
            let outcome: StorageResult<()> = collector
                .measure(
                    OperationKind::Write,
                    1,
                    self.config.data_size as u64,
                    self.config.is_cold_start,
                    || store.write_one(ctx, record, &options),
                )
                .await;
            match outcome {
                Ok(()) => result.items_processed += 1,
                Err(e) => result.errors.push(ItemFailure::new(
                    record.uuid.as_str(),
                    format!("failed to write transaction {}: {}", record.uuid, e),
                )),
            }
        }
        records.len()
    }

    async fn write_batches(
        &self,
        ctx: &RequestContext,
        store: &dyn Storage,
        collector: &Collector,
        records: &[Transaction],
        result: &mut OperationResult,
    ) -> usize {
        let options = &BatchOptions {
            max_batch_size: Some(self.config.batch_size),
        };
        let batches: Vec<&[Transaction]> = records.chunks(self.config.batch_size).collect();
        debug!(
            batches = batches.len(),
            batch_size = self.config.batch_size,
            concurrency = self.config.concurrency,
            "dispatching batch writes"
        );

        let tasks: Vec<_> = batches
            .iter()
            .map(|batch| {
                let items = batch.len() as u64;
                collector.measure(
                    OperationKind::Batch,
                    items,
                    items * self.config.data_size as u64,
                    self.config.is_cold_start,
                    move || store.batch_write(ctx, batch, options),
                )
            })
            .collect();

        for (index, outcome) in run_bounded(tasks, self.config.concurrency).await {
            let size = batches[index].len();
            match outcome {
                Ok(Ok(())) => result.items_processed += size,
                Ok(Err(e)) => result.errors.push(ItemFailure::new(
                    format!("batch-{}", index),
                    format!("failed to write batch {} ({} records): {}", index, size, e),
                )),
                Err(panic) => result
                    .errors
                    .push(ItemFailure::new(format!("batch-{}", index), panic)),
            }
        }
        batches.len()
    }
}

#[async_trait]
impl Operation for WriteOperation {
    fn kind(&self) -> OperationKind {
        if self.config.batch {
            OperationKind::Batch
        } else {
            OperationKind::Write
        }
    }

    async fn execute(
        &self,
        ctx: &RequestContext,
        backend: Arc<dyn Storage>,
        collector: &Collector,
    ) -> OperationOutcome {
        let started = Instant::now();
        let records = self.generate();
        let store = backend.as_ref();

        let mut result = OperationResult::default();
        result.set_data(
            TRANSACTION_IDS_KEY,
            records.iter().map(|r| r.uuid.clone()).collect::<Vec<_>>(),
        );

        let attempted = if self.config.batch {
            self.write_batches(ctx, store, collector, &records, &mut result)
                .await
        } else {
            self.write_individually(ctx, store, collector, &records, &mut result)
                .await
        };

        result.total_duration = started.elapsed();
        conclude(self.kind(), attempted, result)
    }
}
