pub mod crypto;
pub mod db;
pub mod ledger;
pub mod model;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub use db::Store;
pub use ledger::{LedgerEntry, LEDGER_CAPACITY};
pub use model::{SecretRecord, SecretState};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record already exists: {0}")]
    Duplicate(String),
    #[error("store backend failure: {0:#}")]
    Backend(#[from] anyhow::Error),
}

/// Result of the conditional consume (`consumed = true WHERE consumed = false`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// This caller flipped the flag and owns the single read.
    Consumed,
    /// Someone else got there first.
    AlreadyConsumed,
    NotFound,
}

/// Everything the lifecycle engine needs from persistence.
/// Each call is atomic for the record it touches.
pub trait RecordStore: Send + Sync {
    /// Fails with [`StoreError::Duplicate`] if the id is taken.
    fn insert(&self, record: &SecretRecord) -> Result<(), StoreError>;

    fn fetch_by_id(&self, id: &str) -> Result<Option<SecretRecord>, StoreError>;

    /// Compare-and-swap on the consumed flag. Exactly one caller per record
    /// ever sees [`ConsumeOutcome::Consumed`].
    fn mark_consumed(
        &self,
        id: &str,
        consumed_at: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, StoreError>;

    /// Returns false if the record did not exist.
    fn delete_by_id(&self, id: &str) -> Result<bool, StoreError>;

    /// Physically remove expired and consumed records. Returns the removed ids.
    fn purge(&self, now: DateTime<Utc>) -> Result<Vec<String>, StoreError>;

    /// Append to the recent-activity ledger, then evict the oldest entries
    /// so at most `keep` remain.
    fn append_ledger(&self, entry: &LedgerEntry, keep: usize) -> Result<(), StoreError>;

    /// Ledger entries, newest first.
    fn recent_ledger(&self, limit: usize) -> Result<Vec<LedgerEntry>, StoreError>;
}
