//! Workload strategies driven against a storage backend
//!
//! Each strategy generates its keys or records, issues storage calls
//! sequentially or through [`pool::run_bounded`], measures every call with
//! the [`Collector`] and folds per-item failures into its result. Only an
//! operation in which every dispatched unit failed returns an error.

pub mod config;
pub mod factory;
pub mod ledger;
pub mod pool;
pub mod query;
pub mod read;
pub mod write;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{OperationError, OperationOutcome};
use crate::metrics::{Collector, OperationKind};
use crate::storage::{RequestContext, Storage};

pub use config::{
    LedgerQueryConfig, LedgerReadConfig, LedgerWriteConfig, QueryConfig, ReadConfig, WriteConfig,
};
pub use factory::{OperationFactory, OperationType};
pub use ledger::{LedgerQueryOperation, LedgerReadOperation, LedgerWriteOperation};
pub use query::QueryOperation;
pub use read::ReadOperation;
pub use write::WriteOperation;

/// Data key holding the ids a generic read or write touched
pub const TRANSACTION_IDS_KEY: &str = "transactionIDs";

/// One failed item or batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    /// Record id or batch label the failure belongs to
    pub target: String,
    pub message: String,
}

impl ItemFailure {
    pub fn new(target: impl Into<String>, message: impl ToString) -> Self {
        Self {
            target: target.into(),
            message: message.to_string(),
        }
    }
}

/// Terminal state of one `execute` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    AllSucceeded,
    PartialFailure,
    AllFailed,
}

/// What an operation did, including its per-item failures
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    /// Items in successful calls
    pub items_processed: usize,
    #[serde(serialize_with = "serialize_nanos")]
    pub total_duration: Duration,
    pub errors: Vec<ItemFailure>,
    pub data: serde_json::Map<String, serde_json::Value>,
}

fn serialize_nanos<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX))
}

impl OperationResult {
    pub fn outcome(&self) -> ExecutionOutcome {
        if self.errors.is_empty() {
            ExecutionOutcome::AllSucceeded
        } else if self.items_processed == 0 {
            ExecutionOutcome::AllFailed
        } else {
            ExecutionOutcome::PartialFailure
        }
    }

    pub fn set_data(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.data.insert(key.to_string(), value.into());
    }

    /// Ids stored under `key` as a list of strings.
    pub fn data_strings(&self, key: &str) -> Option<Vec<String>> {
        self.data.get(key)?.as_array().map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
    }
}

/// A benchmark workload
#[async_trait]
pub trait Operation: Send + Sync {
    /// Kind of the primary storage call this operation measures.
    fn kind(&self) -> OperationKind;

    async fn execute(
        &self,
        ctx: &RequestContext,
        backend: Arc<dyn Storage>,
        collector: &Collector,
    ) -> OperationOutcome;
}

/// Classify a finished result, log it, and turn total failure into an error.
pub(crate) fn conclude(
    kind: OperationKind,
    attempted: usize,
    result: OperationResult,
) -> OperationOutcome {
    match result.outcome() {
        ExecutionOutcome::AllSucceeded => {
            info!(%kind, items = result.items_processed, "operation completed");
            Ok(result)
        }
        ExecutionOutcome::PartialFailure => {
            warn!(
                %kind,
                items = result.items_processed,
                errors = result.errors.len(),
                "operation completed with failures"
            );
            Ok(result)
        }
        ExecutionOutcome::AllFailed => {
            error!(%kind, attempted, errors = result.errors.len(), "operation failed entirely");
            Err(OperationError::AllFailed {
                kind,
                attempted,
                result: Box::new(result),
            })
        }
    }
}
