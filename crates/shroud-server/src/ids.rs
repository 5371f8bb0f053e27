//! Identifier generation for secrets and ledger records.

use rand::{rngs::OsRng, RngCore};

/// Length of the public, unguessable secret identifier embedded in share links.
pub const SECRET_ID_LEN: usize = 48;

const ALPHABET: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Draw `len` bytes from the OS CSPRNG and map each onto the 62-char alphanumeric alphabet.
pub fn generate_secret_id(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
        .iter()
        .map(|b| ALPHABET[*b as usize % ALPHABET.len()] as char)
        .collect()
}

/// Cheap shape check so obviously bogus ids never reach the store.
pub fn is_valid_secret_id(id: &str) -> bool {
    id.len() == SECRET_ID_LEN && id.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Random UUIDv4 in hyphenated lowercase form, e.g. `3f0c…-4…-a…`.
pub fn generate_record_id() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    uuid::Builder::from_random_bytes(bytes)
        .into_uuid()
        .hyphenated()
        .to_string()
}
