use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

/// Stored in redb as bincode-encoded bytes.
/// `ciphertext_blob` and `key_material` are the base64 halves produced by
/// [`super::crypto::encrypt`]; the store never sees plaintext.
#[derive(Clone, Serialize, Deserialize, ZeroizeOnDrop)]
pub struct SecretRecord {
    pub id: String,
    /// salt(16) || iv(12) || AES-256-GCM ciphertext, base64.
    pub ciphertext_blob: String,
    /// Random 32-byte PBKDF2 password, base64.
    pub key_material: String,
    #[zeroize(skip)]
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// Unreadable at or after this instant.
    #[zeroize(skip)]
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
    #[zeroize(skip)]
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub consumed_at: Option<DateTime<Utc>>,
}

/// Where a stored record sits in its lifecycle. A purged record has no state;
/// it is simply absent from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretState {
    Active,
    Consumed,
    Expired,
}

impl SecretRecord {
    /// Returns true once `now` has reached the deadline.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Expiry wins over consumption, matching the order reads are checked in.
    pub fn state(&self, now: DateTime<Utc>) -> SecretState {
        if self.is_expired(now) {
            SecretState::Expired
        } else if self.consumed {
            SecretState::Consumed
        } else {
            SecretState::Active
        }
    }
}

impl std::fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretRecord")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("consumed", &self.consumed)
            .field("consumed_at", &self.consumed_at)
            .finish_non_exhaustive()
    }
}
