use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;
use zeroize::{ZeroizeOnDrop, Zeroizing};

pub const SALT_LEN: usize = 16;
pub const IV_LEN: usize = 12;
pub const KEY_MATERIAL_LEN: usize = 32;
pub const PBKDF2_ROUNDS: u32 = 100_000;
const TAG_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed")]
    Encryption,
    /// Reason is for logs only; callers must not distinguish between causes.
    #[error("decryption failed: {0}")]
    Decryption(&'static str),
}

/// 32-byte AES key derived from a record's key material via PBKDF2-HMAC-SHA256.
#[derive(ZeroizeOnDrop)]
struct DerivedKey([u8; 32]);

impl DerivedKey {
    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }
}

/// Output of [`encrypt`], both halves base64-encoded for storage and transport.
///
/// `blob` is `salt(16) || iv(12) || ciphertext+tag`. `key_material` is the
/// random 32-byte password the AES key is derived from.
#[derive(Clone, ZeroizeOnDrop)]
pub struct Sealed {
    pub blob: String,
    pub key_material: String,
}

fn derive_key(key_material: &[u8], salt: &[u8]) -> DerivedKey {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(key_material, salt, PBKDF2_ROUNDS, &mut key);
    DerivedKey(key)
}

/// Encrypt `plaintext` under fresh random key material.
///
/// Salt, key material and IV are all drawn from the OS CSPRNG; nothing about
/// the key depends on caller input.
pub fn encrypt(plaintext: &[u8]) -> Result<Sealed, CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let mut key_material = Zeroizing::new([0u8; KEY_MATERIAL_LEN]);
    OsRng.fill_bytes(&mut key_material[..]);

    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);

    let key = derive_key(&key_material[..], &salt);
    let ciphertext = key
        .cipher()
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| CryptoError::Encryption)?;

    let mut packed = Vec::with_capacity(SALT_LEN + IV_LEN + ciphertext.len());
    packed.extend_from_slice(&salt);
    packed.extend_from_slice(&iv);
    packed.extend_from_slice(&ciphertext);

    Ok(Sealed {
        blob: BASE64.encode(&packed),
        key_material: BASE64.encode(&key_material[..]),
    })
}

/// Reverse [`encrypt`]: unpack salt and IV, re-derive the key, open the ciphertext.
pub fn decrypt(blob: &str, key_material: &str) -> Result<Vec<u8>, CryptoError> {
    let packed = BASE64
        .decode(blob)
        .map_err(|_| CryptoError::Decryption("blob is not valid base64"))?;
    let key_material = Zeroizing::new(
        BASE64
            .decode(key_material)
            .map_err(|_| CryptoError::Decryption("key material is not valid base64"))?,
    );

    if key_material.len() != KEY_MATERIAL_LEN {
        return Err(CryptoError::Decryption("key material has wrong length"));
    }
    if packed.len() < SALT_LEN + IV_LEN + TAG_LEN {
        return Err(CryptoError::Decryption("blob is truncated"));
    }

    let (salt, rest) = packed.split_at(SALT_LEN);
    let (iv, ciphertext) = rest.split_at(IV_LEN);

    let key = derive_key(&key_material, salt);
    key.cipher()
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| CryptoError::Decryption("authentication failed"))
}
