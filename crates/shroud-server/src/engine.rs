//! Share lifecycle: create, read-once retrieval, expiry and housekeeping.
//!
//! A share is `Active` until it is read once (`Consumed`) or its deadline
//! passes (`Expired`); the sweep or a late read then removes it for good.
//! The consumed flag is flipped by the store's compare-and-swap *before*
//! decryption, so of any number of concurrent readers at most one ever
//! holds plaintext.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::ShareError;
use crate::ids::{self, SECRET_ID_LEN};
use crate::store::{
    crypto::{self, CryptoError},
    ConsumeOutcome, LedgerEntry, RecordStore, SecretRecord, SecretState, LEDGER_CAPACITY,
};

/// Tunables for [`ShareEngine`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Base URL share links are built on, e.g. `https://shroud.example`.
    pub public_url: String,
    /// Furthest in the future an expiry may be set.
    pub max_ttl: Duration,
    pub max_content_bytes: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            public_url: "http://localhost:8080".into(),
            max_ttl: Duration::from_secs(24 * 3600),
            max_content_bytes: 1_048_576,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedShare {
    pub id: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenedShare {
    pub id: String,
    pub content: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Stateless service over an injected store and clock. Cheap to clone.
#[derive(Clone)]
pub struct ShareEngine {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
}

impl ShareEngine {
    pub fn new(store: Arc<dyn RecordStore>, settings: EngineSettings) -> Self {
        Self::with_clock(store, Arc::new(SystemClock), settings)
    }

    pub fn with_clock(
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Link handed to the recipient. It points straight at the read endpoint,
    /// so anything that fetches it (including chat link-preview bots) consumes
    /// the share. Operators fronting this with a UI should serve a click-through
    /// page at this path instead.
    pub fn share_url(&self, id: &str) -> String {
        format!("{}/shares/{}", self.settings.public_url.trim_end_matches('/'), id)
    }

    /// Encrypt `content`, persist it under a fresh id and return the link.
    ///
    /// An `expires_at` already in the past is accepted; the share is simply
    /// born expired. Nothing is returned unless the record was persisted.
    pub fn create(
        &self,
        content: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<CreatedShare, ShareError> {
        if content.trim().is_empty() {
            return Err(ShareError::Validation("content must not be empty".into()));
        }
        if content.len() > self.settings.max_content_bytes {
            return Err(ShareError::Validation(format!(
                "content exceeds {} byte limit",
                self.settings.max_content_bytes
            )));
        }

        // Stored timestamps carry millisecond precision; hand back the same values.
        let now = self.clock.now().trunc_subsecs(3);
        let expires_at = expires_at.trunc_subsecs(3);
        let max_ttl_ms = i64::try_from(self.settings.max_ttl.as_millis()).unwrap_or(i64::MAX);
        if (expires_at - now).num_milliseconds() > max_ttl_ms {
            return Err(ShareError::Validation(format!(
                "expiry must be within {}s from now",
                self.settings.max_ttl.as_secs()
            )));
        }

        let sealed = crypto::encrypt(content.as_bytes()).map_err(ShareError::Encryption)?;
        let record = SecretRecord {
            id: ids::generate_secret_id(SECRET_ID_LEN),
            ciphertext_blob: sealed.blob.clone(),
            key_material: sealed.key_material.clone(),
            created_at: now,
            expires_at,
            consumed: false,
            consumed_at: None,
        };

        self.store.insert(&record)?;
        info!(id = %record.id, expires_at = %expires_at, "share created");

        self.record_ledger(&record.id, now);

        Ok(CreatedShare {
            url: self.share_url(&record.id),
            id: record.id.clone(),
            expires_at,
            created_at: now,
        })
    }

    /// Convenience over [`Self::create`] with a relative lifetime.
    pub fn create_with_ttl(&self, content: &str, ttl: Duration) -> Result<CreatedShare, ShareError> {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| self.clock.now().checked_add_signed(ttl))
            .ok_or_else(|| ShareError::Validation("ttl out of range".into()))?;
        self.create(content, expires_at)
    }

    /// Read a share once.
    ///
    /// Missing and already-read shares both yield `NotFoundOrConsumed`.
    /// Expired shares yield `Expired` and are deleted on the way out.
    pub fn retrieve(&self, id: &str) -> Result<OpenedShare, ShareError> {
        let now = self.clock.now();

        let Some(record) = self.store.fetch_by_id(id)? else {
            return Err(ShareError::NotFoundOrConsumed);
        };

        match record.state(now) {
            SecretState::Expired => {
                match self.store.delete_by_id(id) {
                    Ok(_) => debug!(id = %id, "lazy-evicted expired share"),
                    Err(e) => warn!(id = %id, error = %e, "failed to delete expired share"),
                }
                return Err(ShareError::Expired);
            }
            SecretState::Consumed => return Err(ShareError::NotFoundOrConsumed),
            SecretState::Active => {}
        }

        match self.store.mark_consumed(id, now)? {
            ConsumeOutcome::Consumed => {}
            ConsumeOutcome::AlreadyConsumed | ConsumeOutcome::NotFound => {
                debug!(id = %id, "lost consume race");
                return Err(ShareError::NotFoundOrConsumed);
            }
        }

        let plaintext = crypto::decrypt(&record.ciphertext_blob, &record.key_material)
            .map_err(ShareError::Decryption)?;
        let content = String::from_utf8(plaintext).map_err(|_| {
            ShareError::Decryption(CryptoError::Decryption("plaintext is not valid UTF-8"))
        })?;

        info!(id = %id, "share opened and consumed");
        Ok(OpenedShare {
            id: record.id.clone(),
            content,
            expires_at: record.expires_at,
            created_at: record.created_at,
        })
    }

    /// Most recent shares, newest first.
    pub fn recent(&self) -> Result<Vec<LedgerEntry>, ShareError> {
        Ok(self.store.recent_ledger(LEDGER_CAPACITY)?)
    }

    /// Physically remove expired and consumed records. Returns the removed ids.
    pub fn purge_expired(&self) -> Result<Vec<String>, ShareError> {
        Ok(self.store.purge(self.clock.now())?)
    }

    /// Spawn a background Tokio task that calls `purge_expired()` every `interval`.
    ///
    /// A zero interval disables the sweep; expired shares are then only
    /// removed when someone tries to read them.
    pub fn spawn_sweep(self, interval: Duration) -> Option<JoinHandle<()>> {
        if interval.is_zero() {
            info!("background sweep disabled");
            return None;
        }
        Some(tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.tick().await; // skip first immediate tick
            loop {
                ticker.tick().await;
                if let Err(e) = self.purge_expired() {
                    warn!(error = %e, "background sweep error");
                }
            }
        }))
    }

    /// Ledger failures never fail the create that triggered them.
    fn record_ledger(&self, secret_id: &str, created_at: DateTime<Utc>) {
        let entry = LedgerEntry::new(secret_id, created_at);
        if let Err(e) = self.store.append_ledger(&entry, LEDGER_CAPACITY) {
            warn!(id = %secret_id, error = %e, "failed to update recent-share ledger");
        }
    }
}
