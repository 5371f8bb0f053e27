use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use redb::{backends::InMemoryBackend, Database, ReadableTable, TableDefinition};
use tracing::{debug, info};

use super::ledger::LedgerEntry;
use super::model::SecretRecord;
use super::{ConsumeOutcome, RecordStore, StoreError};

const SECRETS: TableDefinition<&str, &[u8]> = TableDefinition::new("secrets");
const LEDGER: TableDefinition<u64, &[u8]> = TableDefinition::new("ledger");
const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");
const LEDGER_SEQ_KEY: &str = "ledger_seq";

/// Leading byte of every stored record. Anything else is rejected on decode.
const RECORD_V1_MARKER: u8 = 0x01;

/// Thread-safe handle to the redb store.
///
/// redb admits one write transaction at a time, so every read-modify-write
/// below is exclusive per database, which is what makes consumption a true
/// compare-and-swap.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).context("open redb database")?;
        Self::init(db)
    }

    /// A store that lives only as long as the process.
    pub fn in_memory() -> Result<Self> {
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .context("create in-memory redb database")?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self> {
        // Ensure all tables exist.
        let write_txn = db.begin_write()?;
        write_txn.open_table(SECRETS)?;
        write_txn.open_table(LEDGER)?;
        write_txn.open_table(COUNTERS)?;
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Insert a new record. Returns false (and writes nothing) if the id is taken.
    fn put(&self, record: &SecretRecord) -> Result<bool> {
        let bytes = encode(record)?;
        let write_txn = self.db.begin_write()?;
        let inserted = {
            let mut table = write_txn.open_table(SECRETS)?;
            if table.get(record.id.as_str())?.is_some() {
                false
            } else {
                table.insert(record.id.as_str(), bytes.as_slice())?;
                true
            }
        };
        write_txn.commit()?;

        if inserted {
            debug!(id = %record.id, "stored secret");
        }
        Ok(inserted)
    }

    fn get(&self, id: &str) -> Result<Option<SecretRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SECRETS)?;
        let raw_bytes: Option<Vec<u8>> = table.get(id)?.map(|guard| guard.value().to_vec());
        raw_bytes.map(|bytes| decode(&bytes)).transpose()
    }

    /// Flip `consumed` inside a single write transaction.
    fn consume(&self, id: &str, consumed_at: DateTime<Utc>) -> Result<ConsumeOutcome> {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut table = write_txn.open_table(SECRETS)?;

            // Read the raw bytes and immediately clone them so the AccessGuard
            // (which borrows `table`) is dropped before any mutation.
            let raw_bytes: Option<Vec<u8>> = table.get(id)?.map(|guard| guard.value().to_vec());

            match raw_bytes {
                None => ConsumeOutcome::NotFound,
                Some(bytes) => {
                    let mut record = decode(&bytes)?;
                    if record.consumed {
                        ConsumeOutcome::AlreadyConsumed
                    } else {
                        record.consumed = true;
                        record.consumed_at = Some(consumed_at);
                        let updated = encode(&record)?;
                        table.insert(id, updated.as_slice())?;
                        ConsumeOutcome::Consumed
                    }
                }
            }
        };
        write_txn.commit()?;

        if outcome == ConsumeOutcome::Consumed {
            debug!(id = %id, "marked secret consumed");
        }
        Ok(outcome)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(SECRETS)?;
            let removed = table.remove(id)?;
            removed.is_some()
        };
        write_txn.commit()?;
        Ok(existed)
    }

    /// Remove every expired or consumed record. Returns the removed ids.
    fn prune(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        // Collect dead ids in a read pass first.
        let dead: Vec<String> = {
            let read_txn = self.db.begin_read()?;
            let table = read_txn.open_table(SECRETS)?;
            let mut ids = Vec::new();
            for item in table.iter()? {
                let (k, v) = item?;
                let record = decode(v.value())?;
                if record.is_expired(now) || record.consumed {
                    ids.push(k.value().to_owned());
                }
            }
            ids
        };

        if dead.is_empty() {
            return Ok(vec![]);
        }

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SECRETS)?;
            for id in &dead {
                table.remove(id.as_str())?;
            }
        }
        write_txn.commit()?;

        info!(removed = dead.len(), "purged expired and consumed secrets");
        Ok(dead)
    }

    // ── Ledger ────────────────────────────────────────────────────────────

    /// Append under a monotonic sequence number from the counters table, then
    /// trim to `keep`, all in one transaction.
    fn push_ledger(&self, entry: &LedgerEntry, keep: usize) -> Result<()> {
        let bytes = bincode::serde::encode_to_vec(entry, bincode::config::standard())
            .context("bincode encode ledger entry")?;

        let write_txn = self.db.begin_write()?;
        {
            let mut counters = write_txn.open_table(COUNTERS)?;
            let seq = counters.get(LEDGER_SEQ_KEY)?.map(|g| g.value()).unwrap_or(0) + 1;
            counters.insert(LEDGER_SEQ_KEY, seq)?;

            let mut ledger = write_txn.open_table(LEDGER)?;
            ledger.insert(seq, bytes.as_slice())?;

            let mut entries = Vec::new();
            for item in ledger.iter()? {
                let (k, v) = item?;
                entries.push((k.value(), decode_entry(v.value())?.created_at));
            }
            if entries.len() > keep {
                entries.sort_by_key(|(seq, created_at)| (*created_at, *seq));
                let excess = entries.len() - keep;
                for (seq, _) in entries.into_iter().take(excess) {
                    ledger.remove(seq)?;
                }
                debug!(evicted = excess, "trimmed recent-share ledger");
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn list_ledger(&self, limit: usize) -> Result<Vec<LedgerEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(LEDGER)?;

        let mut entries = Vec::new();
        for item in table.iter()? {
            let (k, v) = item?;
            entries.push((k.value(), decode_entry(v.value())?));
        }
        entries.sort_by(|(a_seq, a), (b_seq, b)| {
            (b.created_at, *b_seq).cmp(&(a.created_at, *a_seq))
        });
        Ok(entries
            .into_iter()
            .take(limit)
            .map(|(_, entry)| entry)
            .collect())
    }
}

impl RecordStore for Store {
    fn insert(&self, record: &SecretRecord) -> Result<(), StoreError> {
        if self.put(record)? {
            Ok(())
        } else {
            Err(StoreError::Duplicate(record.id.clone()))
        }
    }

    fn fetch_by_id(&self, id: &str) -> Result<Option<SecretRecord>, StoreError> {
        Ok(self.get(id)?)
    }

    fn mark_consumed(
        &self,
        id: &str,
        consumed_at: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, StoreError> {
        Ok(self.consume(id, consumed_at)?)
    }

    fn delete_by_id(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.delete(id)?)
    }

    fn purge(&self, now: DateTime<Utc>) -> Result<Vec<String>, StoreError> {
        Ok(self.prune(now)?)
    }

    fn append_ledger(&self, entry: &LedgerEntry, keep: usize) -> Result<(), StoreError> {
        Ok(self.push_ledger(entry, keep)?)
    }

    fn recent_ledger(&self, limit: usize) -> Result<Vec<LedgerEntry>, StoreError> {
        Ok(self.list_ledger(limit)?)
    }
}

/// Encode a SecretRecord as `[RECORD_V1_MARKER] + bincode(record)`.
fn encode(record: &SecretRecord) -> Result<Vec<u8>> {
    let payload = bincode::serde::encode_to_vec(record, bincode::config::standard())
        .context("bincode encode")?;
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(RECORD_V1_MARKER);
    out.extend_from_slice(&payload);
    Ok(out)
}

fn decode(bytes: &[u8]) -> Result<SecretRecord> {
    match bytes.split_first() {
        None => anyhow::bail!("empty record"),
        Some((&RECORD_V1_MARKER, payload)) => {
            let (record, _) =
                bincode::serde::decode_from_slice(payload, bincode::config::standard())
                    .context("bincode decode")?;
            Ok(record)
        }
        Some((marker, _)) => anyhow::bail!("unknown record format marker {marker:#04x}"),
    }
}

fn decode_entry(bytes: &[u8]) -> Result<LedgerEntry> {
    let (entry, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .context("bincode decode ledger entry")?;
    Ok(entry)
}
