use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids;

/// How many recent shares the ledger keeps. Older entries are evicted on append.
pub const LEDGER_CAPACITY: usize = 5;

// ── LedgerEntry ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// UUIDv4 of this entry, unrelated to the secret's own id.
    pub entry_id: String,
    pub secret_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(secret_id: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            entry_id: ids::generate_record_id(),
            secret_id: secret_id.to_owned(),
            created_at,
        }
    }

    /// Leading characters of the secret id, safe to display: too short to open the share.
    pub fn secret_prefix(&self) -> &str {
        match self.secret_id.char_indices().nth(8) {
            Some((end, _)) => &self.secret_id[..end],
            None => &self.secret_id,
        }
    }
}
