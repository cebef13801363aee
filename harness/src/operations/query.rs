//! Single time-range query

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{OperationOutcome, StorageResult};
use crate::metrics::{Collector, OperationKind};
use crate::models::Transaction;
use crate::operations::{conclude, ItemFailure, Operation, OperationResult, QueryConfig, TRANSACTION_IDS_KEY};
use crate::storage::{QueryOptions, RequestContext, Storage};

/// Queries one account's records within a time window.
///
/// The collector is given the planned item and byte counts (`limit` and
/// `limit * dataSize`), not the size of what actually came back, so query
/// throughput figures are estimates.
pub struct QueryOperation {
    config: QueryConfig,
}

impl QueryOperation {
    pub fn new(config: QueryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }
}

#[async_trait]
impl Operation for QueryOperation {
    fn kind(&self) -> OperationKind {
        OperationKind::Query
    }

    async fn execute(
        &self,
        ctx: &RequestContext,
        backend: Arc<dyn Storage>,
        collector: &Collector,
    ) -> OperationOutcome {
        let started = Instant::now();
        let config = &self.config;
        let options = QueryOptions {
            limit: Some(config.limit),
            consistent_read: config.consistent_read,
            ..Default::default()
        };
        let (items, bytes) = config.estimated_counts();

        debug!(
            account = %config.account_id,
            start = %config.start_time,
            end = %config.end_time,
            limit = config.limit,
            "dispatching time-range query"
        );

        let outcome: StorageResult<Vec<Transaction>> = collector
            .measure(OperationKind::Query, items, bytes, config.is_cold_start, || {
                backend.query_by_time_range(
                    ctx,
                    &config.account_id,
                    config.start_time,
                    config.end_time,
                    &options,
                )
            })
            .await;

        let mut result = OperationResult::default();
        match outcome {
            Ok(records) => {
                result.items_processed = records.len();
                result.set_data(
                    TRANSACTION_IDS_KEY,
                    records.into_iter().map(|r| r.uuid).collect::<Vec<_>>(),
                );
            }
            Err(e) => result.errors.push(ItemFailure::new(
                config.account_id.as_str(),
                format!("failed to execute query: {}", e),
            )),
        }

        result.total_duration = started.elapsed();
        conclude(OperationKind::Query, 1, result)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration as ChronoDuration, Utc};

    use super::*;
    use crate::error::OperationError;
    use crate::metrics::RunSpec;
    use crate::models::RecordGenerator;
    use crate::params;
    use crate::storage::{FailurePolicy, MemoryStore};

    #[tokio::test]
    async fn test_query_reports_estimated_sizes() {
        let store = MemoryStore::new();
        store.initialize(&RequestContext::new()).await.unwrap();
        store.seed(RecordGenerator::new("test-account", 8, false).generate_batch(4));
        let collector = Collector::new();
        collector.start_test(RunSpec::new("q")).unwrap();

        let op = QueryOperation::new(QueryConfig::from_params(&params! {
            "limit" => 50i64,
            "dataSize" => 10i64,
            "endTime" => Utc::now() + ChronoDuration::minutes(1),
        }));
        let result = op
            .execute(&RequestContext::new(), Arc::new(store), &collector)
            .await
            .unwrap();
        assert_eq!(result.items_processed, 4);

        let run = collector.end_test("q").unwrap();
        assert_eq!(run.operations.len(), 1);
        assert_eq!(run.operations[0].item_count, 50);
        assert_eq!(run.operations[0].byte_count, 500);
    }

    #[tokio::test]
    async fn test_failed_query_is_an_error() {
        let store = MemoryStore::builder().failure(FailurePolicy::Always).build();
        store.initialize(&RequestContext::new()).await.unwrap();
        let collector = Collector::new();
        collector.start_test(RunSpec::new("q")).unwrap();

        let op = QueryOperation::new(QueryConfig::default());
        let err = op
            .execute(&RequestContext::new(), Arc::new(store), &collector)
            .await
            .unwrap_err();
        assert!(matches!(err, OperationError::AllFailed { attempted: 1, .. }));
        assert_eq!(collector.end_test("q").unwrap().summary_u64("errorCount"), Some(1));
    }

    #[tokio::test]
    async fn test_empty_window_succeeds() {
        let store = MemoryStore::new();
        store.initialize(&RequestContext::new()).await.unwrap();
        let collector = Collector::new();
        collector.start_test(RunSpec::new("q")).unwrap();

        let result = QueryOperation::new(QueryConfig::default())
            .execute(&RequestContext::new(), Arc::new(store), &collector)
            .await
            .unwrap();
        assert_eq!(result.items_processed, 0);
        assert!(result.errors.is_empty());
    }
}
