//! Benchmark payload records
//!
//! Workloads read and write banking-style transaction records. Only the
//! key pair and the payload size matter for measurement; the remaining
//! fields give backends something realistic to index.

use std::fmt;

use chrono::{DateTime, Utc};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

/// Category tag of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "DEPOSIT",
            TransactionType::Withdrawal => "WITHDRAWAL",
            TransactionType::Transfer => "TRANSFER",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transaction record as stored by a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Partition key
    pub account_id: String,

    /// Unique id within the partition
    pub uuid: String,

    pub timestamp: DateTime<Utc>,

    /// Amount with two decimals of precision
    pub amount: f64,

    pub transaction_type: TransactionType,

    /// Opaque payload sized to control the record size
    #[serde(with = "hex_bytes")]
    pub metadata: Vec<u8>,
}

/// Composite key addressing one record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordKey {
    pub account_id: String,
    pub uuid: String,
}

impl RecordKey {
    pub fn new(account_id: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            uuid: uuid.into(),
        }
    }

    /// Bytes needed to address the record, used as a size estimate for reads.
    pub fn size(&self) -> usize {
        self.account_id.len() + self.uuid.len()
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account_id, self.uuid)
    }
}

impl Transaction {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.account_id.clone(), self.uuid.clone())
    }

    /// Approximate stored size: key, type tag, 8 bytes each for timestamp
    /// and amount, plus the payload.
    pub fn approximate_size(&self) -> usize {
        self.account_id.len()
            + self.uuid.len()
            + self.transaction_type.as_str().len()
            + 16
            + self.metadata.len()
    }

    /// Content digest used by verified reads.
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.account_id.as_bytes());
        hasher.update(self.uuid.as_bytes());
        hasher.update(&self.timestamp.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
        hasher.update(&self.amount.to_le_bytes());
        hasher.update(self.transaction_type.as_str().as_bytes());
        hasher.update(&self.metadata);
        hasher.finalize().to_hex().to_string()
    }
}

/// Deterministic record id: `{accountId}-tx-{index}`.
pub fn deterministic_id(account_id: &str, index: usize) -> String {
    format!("{}-tx-{}", account_id, index)
}

/// Synthesizes transaction records for write workloads
#[derive(Debug, Clone)]
pub struct RecordGenerator {
    account_id: String,
    data_size: usize,
    random_ids: bool,
}

impl RecordGenerator {
    pub fn new(account_id: impl Into<String>, data_size: usize, random_ids: bool) -> Self {
        Self {
            account_id: account_id.into(),
            data_size,
            random_ids,
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Generate the record for position `index`.
    pub fn generate(&self, index: usize) -> Transaction {
        let mut rng = rand::thread_rng();

        let uuid = if self.random_ids {
            uuid::Uuid::new_v4().to_string()
        } else {
            deterministic_id(&self.account_id, index)
        };

        let mut metadata = vec![0u8; self.data_size];
        rng.fill_bytes(&mut metadata);

        Transaction {
            account_id: self.account_id.clone(),
            uuid,
            timestamp: Utc::now(),
            amount: f64::from(rng.gen_range(0..10_000u32)) / 100.0,
            transaction_type: TransactionType::Deposit,
            metadata,
        }
    }

    pub fn generate_batch(&self, count: usize) -> Vec<Transaction> {
        (0..count).map(|i| self.generate(i)).collect()
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}
