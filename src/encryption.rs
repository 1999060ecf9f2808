//! At-rest encryption for locally stored license data.
//!
//! AES-256-GCM with a key derived from the device fingerprint, so a copied
//! cache or key file is useless on another machine and any modification is
//! caught by the authentication tag.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};

use rand::rngs::OsRng;
use rand::TryRngCore;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;

use ring::digest::{digest, SHA256};

use crate::errors::{StorageError, StorageResult};

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// GCM nonce size in bytes (96-bit).
pub const NONCE_SIZE: usize = 12;

/// Derive a 256-bit storage key.
///
///   key = SHA256("{namespace}:{purpose}:v1:{device_id}")
///
/// `purpose` separates the cache key from the license-key key so the two
/// blobs cannot be swapped.
pub fn derive_storage_key(namespace: &str, purpose: &str, device_id: &str) -> [u8; KEY_SIZE] {
    let salted = format!("{namespace}:{purpose}:v1:{device_id}");
    let hash = digest(&SHA256, salted.as_bytes());

    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(hash.as_ref());
    key
}

/// Encrypt bytes.
///
/// Output format:
///   [nonce (12 bytes)] || [ciphertext+tag]
pub fn seal(plaintext: &[u8], key: &[u8; KEY_SIZE]) -> StorageResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce_bytes)
        .map_err(|e| StorageError::Encryption(format!("nonce generation failed: {e}")))?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let mut ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| StorageError::Encryption(format!("encryption failed: {e}")))?;

    let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.append(&mut ciphertext);
    Ok(output)
}

/// Decrypt bytes produced by [`seal`].
pub fn open(sealed: &[u8], key: &[u8; KEY_SIZE]) -> StorageResult<Vec<u8>> {
    if sealed.len() <= NONCE_SIZE {
        return Err(StorageError::Decryption("ciphertext too short".to_string()));
    }

    let (nonce_bytes, ct) = sealed.split_at(NONCE_SIZE);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ct)
        .map_err(|e| StorageError::Decryption(format!("decryption failed: {e}")))
}

/// [`seal`] and encode as Base64 text (keyring entries are strings).
pub fn seal_to_base64(plaintext: &[u8], key: &[u8; KEY_SIZE]) -> StorageResult<String> {
    Ok(B64.encode(seal(plaintext, key)?))
}

/// Inverse of [`seal_to_base64`].
pub fn open_from_base64(text: &str, key: &[u8; KEY_SIZE]) -> StorageResult<Vec<u8>> {
    let decoded = B64
        .decode(text.trim())
        .map_err(|e| StorageError::Decryption(format!("base64 decode failed: {e}")))?;
    open(&decoded, key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> [u8; KEY_SIZE] {
        derive_storage_key("warden-test", "cache", "device-1")
    }

    #[test]
    fn sealed_text_opens_with_same_key() {
        let data = br#"{"is_licensed":true}"#;
        let sealed = seal_to_base64(data, &key()).expect("seal");
        assert!(!sealed.contains("is_licensed"));

        let opened = open_from_base64(&sealed, &key()).expect("open");
        assert_eq!(opened, data);
    }

    #[test]
    fn key_depends_on_every_input() {
        let base = key();
        assert_ne!(base, derive_storage_key("other", "cache", "device-1"));
        assert_ne!(base, derive_storage_key("warden-test", "license_key", "device-1"));
        assert_ne!(base, derive_storage_key("warden-test", "cache", "device-2"));
        assert_eq!(base, derive_storage_key("warden-test", "cache", "device-1"));
    }

    #[test]
    fn other_device_cannot_open() {
        let sealed = seal(b"verdict", &key()).unwrap();
        let foreign = derive_storage_key("warden-test", "cache", "device-2");
        assert!(matches!(open(&sealed, &foreign), Err(StorageError::Decryption(_))));
    }

    #[test]
    fn tampering_is_detected() {
        let mut sealed = seal(b"verdict", &key()).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(open(&sealed, &key()).is_err());
    }

    #[test]
    fn truncated_input_is_rejected() {
        assert!(open(&[0u8; NONCE_SIZE], &key()).is_err());
        assert!(open_from_base64("not base64 !!", &key()).is_err());
    }
}
