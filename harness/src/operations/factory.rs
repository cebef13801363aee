//! Operation construction from type strings

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{FactoryError, FactoryResult};
use crate::operations::{
    LedgerQueryConfig, LedgerQueryOperation, LedgerReadConfig, LedgerReadOperation,
    LedgerWriteConfig, LedgerWriteOperation, Operation, QueryConfig, QueryOperation, ReadConfig,
    ReadOperation, WriteConfig, WriteOperation,
};
use crate::params::ParamMap;

/// Built-in operation types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    /// Sequential unless `parallel` is set
    Read,
    ReadSequential,
    ReadParallel,
    /// Individual writes unless `batch` is set
    Write,
    WriteBatch,
    Query,
    LedgerWrite,
    LedgerRead,
    LedgerQuery,
}

impl OperationType {
    pub const ALL: [OperationType; 9] = [
        OperationType::Read,
        OperationType::ReadSequential,
        OperationType::ReadParallel,
        OperationType::Write,
        OperationType::WriteBatch,
        OperationType::Query,
        OperationType::LedgerWrite,
        OperationType::LedgerRead,
        OperationType::LedgerQuery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Read => "read",
            OperationType::ReadSequential => "read-sequential",
            OperationType::ReadParallel => "read-parallel",
            OperationType::Write => "write",
            OperationType::WriteBatch => "write-batch",
            OperationType::Query => "query",
            OperationType::LedgerWrite => "ledger-write",
            OperationType::LedgerRead => "ledger-read",
            OperationType::LedgerQuery => "ledger-query",
        }
    }

    /// Construct the operation with its config resolved from `params`.
    pub fn build(&self, params: &ParamMap) -> Box<dyn Operation> {
        match self {
            OperationType::Read => Box::new(ReadOperation::new(ReadConfig::from_params(params))),
            OperationType::ReadSequential => {
                Box::new(ReadOperation::new(ReadConfig::from_params(params).parallel(false)))
            }
            OperationType::ReadParallel => {
                Box::new(ReadOperation::new(ReadConfig::from_params(params).parallel(true)))
            }
            OperationType::Write => Box::new(WriteOperation::new(WriteConfig::from_params(params))),
            OperationType::WriteBatch => {
                Box::new(WriteOperation::new(WriteConfig::from_params(params).batch(true)))
            }
            OperationType::Query => Box::new(QueryOperation::new(QueryConfig::from_params(params))),
            OperationType::LedgerWrite => Box::new(LedgerWriteOperation::new(
                LedgerWriteConfig::from_params(params),
            )),
            OperationType::LedgerRead => Box::new(LedgerReadOperation::new(
                LedgerReadConfig::from_params(params),
            )),
            OperationType::LedgerQuery => Box::new(LedgerQueryOperation::new(
                LedgerQueryConfig::from_params(params),
            )),
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = FactoryError;

    /// Accepts `ledger_write` as well as `ledger-write`, in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        OperationType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| FactoryError::UnknownOperation { name: s.to_string() })
    }
}

type OperationBuilder = Box<dyn Fn(&ParamMap) -> Box<dyn Operation> + Send + Sync>;

/// Registry of operation constructors keyed by type string
pub struct OperationFactory {
    builders: BTreeMap<String, OperationBuilder>,
}

impl OperationFactory {
    /// Factory with every built-in [`OperationType`] registered.
    pub fn new() -> Self {
        let mut factory = Self {
            builders: BTreeMap::new(),
        };
        for op_type in OperationType::ALL {
            factory.register(op_type.as_str(), move |params| op_type.build(params));
        }
        factory
    }

    /// Add or replace the builder for `name`.
    pub fn register<F>(&mut self, name: &str, builder: F)
    where
        F: Fn(&ParamMap) -> Box<dyn Operation> + Send + Sync + 'static,
    {
        self.builders.insert(name.to_string(), Box::new(builder));
    }

    pub fn create(&self, name: &str, params: &ParamMap) -> FactoryResult<Box<dyn Operation>> {
        if let Some(builder) = self.builders.get(name) {
            return Ok(builder(params));
        }
        // Fall back to the normalized built-in spelling
        let op_type = name.parse::<OperationType>()?;
        self.builders
            .get(op_type.as_str())
            .map(|builder| builder(params))
            .ok_or_else(|| FactoryError::UnknownOperation {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.builders.keys().cloned().collect()
    }
}

impl Default for OperationFactory {
    fn default() -> Self {
        Self::new()
    }
}
