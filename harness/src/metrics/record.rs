//! Benchmark runs and the operation records they accumulate

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::params::ParamMap;

/// Kind of measured storage work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    Read,
    Write,
    Query,
    Batch,
    Transaction,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Read => "read",
            OperationKind::Write => "write",
            OperationKind::Query => "query",
            OperationKind::Batch => "batch",
            OperationKind::Transaction => "transaction",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One measured unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRecord {
    pub kind: OperationKind,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(with = "duration_nanos")]
    duration: Duration,
    pub item_count: u64,
    pub byte_count: u64,
    pub is_cold_start: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationRecord {
    /// Build a record from its measured bounds. `elapsed` comes from a
    /// monotonic clock and is the authoritative duration.
    pub(crate) fn new(
        kind: OperationKind,
        start_time: DateTime<Utc>,
        elapsed: Duration,
        item_count: u64,
        byte_count: u64,
        is_cold_start: bool,
        error: Option<String>,
    ) -> Self {
        let end_time = start_time
            + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero());
        Self {
            kind,
            start_time,
            end_time,
            duration: elapsed,
            item_count,
            byte_count,
            is_cold_start,
            error,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Identity and metadata of a run, supplied to `start_test`
#[derive(Debug, Clone, Default)]
pub struct RunSpec {
    pub name: String,
    pub description: String,
    pub backend: String,
    pub config: ParamMap,
    pub parameters: ParamMap,
}

impl RunSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = backend.into();
        self
    }

    pub fn config(mut self, config: ParamMap) -> Self {
        self.config = config;
        self
    }

    pub fn parameters(mut self, parameters: ParamMap) -> Self {
        self.parameters = parameters;
        self
    }
}

/// A named, time-bounded collection of measured operations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkRun {
    pub name: String,
    pub description: String,
    pub backend: String,
    pub config: ParamMap,
    pub parameters: ParamMap,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(with = "duration_nanos::option")]
    pub duration: Option<Duration>,
    pub operations: Vec<OperationRecord>,
    pub summary: serde_json::Map<String, serde_json::Value>,
}

impl BenchmarkRun {
    pub(crate) fn new(spec: RunSpec) -> Self {
        Self {
            name: spec.name,
            description: spec.description,
            backend: spec.backend,
            config: spec.config,
            parameters: spec.parameters,
            start_time: Utc::now(),
            end_time: None,
            duration: None,
            operations: Vec::new(),
            summary: serde_json::Map::new(),
        }
    }

    /// Whether `end_test` has stamped and summarised this run.
    pub fn is_finalized(&self) -> bool {
        self.end_time.is_some()
    }

    /// Integer summary entry, e.g. `operationCount` or `p99`.
    pub fn summary_u64(&self, key: &str) -> Option<u64> {
        self.summary.get(key).and_then(|v| v.as_u64())
    }

    /// Floating point summary entry, e.g. `successRate`.
    pub fn summary_f64(&self, key: &str) -> Option<f64> {
        self.summary.get(key).and_then(|v| v.as_f64())
    }
}

/// Durations serialized as integer nanoseconds
mod duration_nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_nanos(u64::deserialize(deserializer)?))
    }

    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            duration: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match duration {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_nanos))
        }
    }
}
