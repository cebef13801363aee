//! Typed operation configuration resolved from request parameters
//!
//! Every config starts from its documented defaults. Recognised keys
//! override them; unknown keys are ignored and a value of the wrong type
//! falls back to the default.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::debug;

use crate::params::{ParamMap, ParamValue};

pub const DEFAULT_ITEM_COUNT: usize = 100;
pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_DATA_SIZE: usize = 1024;
pub const DEFAULT_BATCH_SIZE: usize = 25;
pub const DEFAULT_ACCOUNT_ID: &str = "test-account";
pub const DEFAULT_QUERY_LIMIT: usize = 100;
pub const DEFAULT_LEDGER_TRANSACTIONS: usize = 10;

/// Typed lookups over a parameter map
struct Lookup<'a> {
    params: &'a ParamMap,
}

impl<'a> Lookup<'a> {
    fn new(params: &'a ParamMap) -> Self {
        Self { params }
    }

    fn get<T>(&self, key: &str, extract: impl FnOnce(&ParamValue) -> Option<T>) -> Option<T> {
        let value = self.params.get(key)?;
        let extracted = extract(value);
        if extracted.is_none() {
            debug!(key, ?value, "ignoring parameter of unexpected type");
        }
        extracted
    }

    fn usize(&self, key: &str, default: usize) -> usize {
        self.get(key, ParamValue::as_usize).unwrap_or(default)
    }

    fn bool(&self, key: &str, default: bool) -> bool {
        self.get(key, ParamValue::as_bool).unwrap_or(default)
    }

    fn string(&self, key: &str) -> Option<String> {
        self.get(key, |v| v.as_str().map(str::to_string))
    }

    fn strings(&self, key: &str) -> Option<Vec<String>> {
        self.get(key, ParamValue::as_string_list)
    }

    fn timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        self.get(key, ParamValue::as_timestamp)
    }
}

/// Time bounds defaulting to the 24 hours before resolution
fn time_bounds(lookup: &Lookup<'_>) -> (DateTime<Utc>, DateTime<Utc>) {
    let now = Utc::now();
    let start = lookup
        .timestamp("startTime")
        .unwrap_or_else(|| now - ChronoDuration::hours(24));
    let end = lookup.timestamp("endTime").unwrap_or(now);
    (start, end)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadConfig {
    pub item_count: usize,
    pub concurrency: usize,
    pub data_size: usize,
    pub account_id: String,
    pub use_random_ids: bool,
    pub consistent_read: bool,
    pub is_cold_start: bool,
    pub parallel: bool,
    /// Explicit ids to read; takes precedence over generated ones
    pub transaction_ids: Option<Vec<String>>,
}

impl Default for ReadConfig {
    fn default() -> Self {
        Self {
            item_count: DEFAULT_ITEM_COUNT,
            concurrency: DEFAULT_CONCURRENCY,
            data_size: DEFAULT_DATA_SIZE,
            account_id: DEFAULT_ACCOUNT_ID.to_string(),
            use_random_ids: false,
            consistent_read: true,
            is_cold_start: false,
            parallel: false,
            transaction_ids: None,
        }
    }
}

impl ReadConfig {
    pub fn from_params(params: &ParamMap) -> Self {
        let d = Self::default();
        let lookup = Lookup::new(params);
        Self {
            item_count: lookup.usize("itemCount", d.item_count),
            concurrency: lookup.usize("concurrency", d.concurrency).max(1),
            data_size: lookup.usize("dataSize", d.data_size),
            account_id: lookup.string("accountId").unwrap_or(d.account_id),
            use_random_ids: lookup.bool("useRandomIDs", d.use_random_ids),
            consistent_read: lookup.bool("consistentRead", d.consistent_read),
            is_cold_start: lookup.bool("isColdStart", d.is_cold_start),
            parallel: lookup.bool("parallel", d.parallel),
            transaction_ids: lookup.strings("transactionIDs"),
        }
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteConfig {
    pub item_count: usize,
    pub batch_size: usize,
    pub concurrency: usize,
    pub data_size: usize,
    pub account_id: String,
    pub use_random_ids: bool,
    pub is_cold_start: bool,
    pub batch: bool,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            item_count: DEFAULT_ITEM_COUNT,
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            data_size: DEFAULT_DATA_SIZE,
            account_id: DEFAULT_ACCOUNT_ID.to_string(),
            use_random_ids: false,
            is_cold_start: false,
            batch: false,
        }
    }
}

impl WriteConfig {
    pub fn from_params(params: &ParamMap) -> Self {
        let d = Self::default();
        let lookup = Lookup::new(params);
        Self {
            item_count: lookup.usize("itemCount", d.item_count),
            batch_size: lookup.usize("batchSize", d.batch_size).max(1),
            concurrency: lookup.usize("concurrency", d.concurrency).max(1),
            data_size: lookup.usize("dataSize", d.data_size),
            account_id: lookup.string("accountId").unwrap_or(d.account_id),
            use_random_ids: lookup.bool("useRandomIDs", d.use_random_ids),
            is_cold_start: lookup.bool("isColdStart", d.is_cold_start),
            batch: lookup.bool("batch", d.batch),
        }
    }

    pub fn batch(mut self, batch: bool) -> Self {
        self.batch = batch;
        self
    }

    /// Number of batches the items split into.
    pub fn batch_count(&self) -> usize {
        self.item_count.div_ceil(self.batch_size)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryConfig {
    pub account_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub limit: usize,
    pub data_size: usize,
    pub consistent_read: bool,
    pub is_cold_start: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self::from_params(&ParamMap::new())
    }
}

impl QueryConfig {
    pub fn from_params(params: &ParamMap) -> Self {
        let lookup = Lookup::new(params);
        let (start_time, end_time) = time_bounds(&lookup);
        Self {
            account_id: lookup
                .string("accountId")
                .unwrap_or_else(|| DEFAULT_ACCOUNT_ID.to_string()),
            start_time,
            end_time,
            limit: lookup.usize("limit", DEFAULT_QUERY_LIMIT),
            data_size: lookup.usize("dataSize", DEFAULT_DATA_SIZE),
            consistent_read: lookup.bool("consistentRead", true),
            is_cold_start: lookup.bool("isColdStart", false),
        }
    }

    /// Item and byte counts reported to the collector before the query
    /// returns. These are planned figures, not measured ones.
    pub fn estimated_counts(&self) -> (u64, u64) {
        let items = self.limit as u64;
        (items, items.saturating_mul(self.data_size as u64))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerWriteConfig {
    pub num_transactions: usize,
    pub account_id: String,
    pub data_size: usize,
    pub parallel: bool,
    pub concurrency: usize,
    pub is_cold_start: bool,
}

impl LedgerWriteConfig {
    pub fn from_params(params: &ParamMap) -> Self {
        let lookup = Lookup::new(params);
        Self {
            num_transactions: lookup.usize("numTransactions", DEFAULT_LEDGER_TRANSACTIONS),
            account_id: lookup.string("accountID").unwrap_or_else(generated_account_id),
            data_size: lookup.usize("dataSize", DEFAULT_DATA_SIZE),
            parallel: lookup.bool("parallel", false),
            concurrency: lookup.usize("concurrency", DEFAULT_CONCURRENCY).max(1),
            is_cold_start: lookup.bool("isColdStart", false),
        }
    }
}

fn generated_account_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("acct-{}", &id[..8])
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerReadConfig {
    pub uuids: Vec<String>,
    pub account_id: String,
    pub parallel: bool,
    pub concurrency: usize,
    pub verified: bool,
    pub is_cold_start: bool,
}

impl LedgerReadConfig {
    /// Empty `uuids` or `account_id` are rejected at execution time.
    pub fn from_params(params: &ParamMap) -> Self {
        let lookup = Lookup::new(params);
        Self {
            uuids: lookup.strings("uuids").unwrap_or_default(),
            account_id: lookup.string("accountID").unwrap_or_default(),
            parallel: lookup.bool("parallel", false),
            concurrency: lookup.usize("concurrency", DEFAULT_CONCURRENCY).max(1),
            verified: lookup.bool("verified", false),
            is_cold_start: lookup.bool("isColdStart", false),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerQueryConfig {
    pub account_id: String,
    pub time_range: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub limit: Option<usize>,
    pub is_cold_start: bool,
}

impl LedgerQueryConfig {
    pub fn from_params(params: &ParamMap) -> Self {
        let lookup = Lookup::new(params);
        let (start_time, end_time) = time_bounds(&lookup);
        Self {
            account_id: lookup.string("accountID").unwrap_or_default(),
            time_range: lookup.bool("timeRange", false),
            start_time,
            end_time,
            limit: lookup.get("limit", ParamValue::as_usize),
            is_cold_start: lookup.bool("isColdStart", false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;

    #[test]
    fn test_read_defaults() {
        let config = ReadConfig::from_params(&ParamMap::new());
        assert_eq!(config, ReadConfig::default());
        assert_eq!(config.item_count, 100);
        assert_eq!(config.concurrency, 10);
        assert_eq!(config.account_id, "test-account");
        assert!(config.consistent_read);
        assert!(config.transaction_ids.is_none());
    }

    #[test]
    fn test_overrides_and_ignored_keys() {
        let params = params! {
            "itemCount" => 7i64,
            "concurrency" => 0i64,
            "accountId" => "acct-9",
            "transactionIDs" => vec!["a".to_string(), "b".to_string()],
            "somethingElse" => true,
        };
        let config = ReadConfig::from_params(&params);
        assert_eq!(config.item_count, 7);
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.account_id, "acct-9");
        assert_eq!(config.transaction_ids, Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn test_wrong_type_falls_back_to_default() {
        let params = params! {
            "itemCount" => "lots",
            "batchSize" => -5i64,
            "useRandomIDs" => 1i64,
        };
        let config = WriteConfig::from_params(&params);
        assert_eq!(config.item_count, 100);
        assert_eq!(config.batch_size, 25);
        assert!(!config.use_random_ids);
    }

    #[test]
    fn test_batch_count() {
        let config = WriteConfig::from_params(&params! { "itemCount" => 53i64 });
        assert_eq!(config.batch_count(), 3);
        assert_eq!(WriteConfig::from_params(&params! { "itemCount" => 0i64 }).batch_count(), 0);
    }

    #[test]
    fn test_query_time_bounds() {
        let start = "2024-01-01T00:00:00Z";
        let end: DateTime<Utc> = "2024-01-02T00:00:00Z".parse().unwrap();
        let config = QueryConfig::from_params(&params! {
            "startTime" => start,
            "endTime" => end,
            "limit" => 10i64,
            "dataSize" => 100i64,
        });
        assert_eq!(config.start_time.to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert_eq!(config.end_time, end);
        assert_eq!(config.estimated_counts(), (10, 1000));
    }

    #[test]
    fn test_unparseable_time_defaults_to_last_day() {
        let config = QueryConfig::from_params(&params! { "startTime" => "yesterday-ish" });
        let span = config.end_time - config.start_time;
        assert!((span - ChronoDuration::hours(24)).num_seconds().abs() <= 1);
    }

    #[test]
    fn test_ledger_write_generates_account() {
        let config = LedgerWriteConfig::from_params(&ParamMap::new());
        assert_eq!(config.num_transactions, 10);
        assert!(config.account_id.starts_with("acct-"));
        assert_eq!(config.account_id.len(), 13);
    }
}
