//! AES-256-GCM-SIV encryption under one named confidential key.
//!
//! **Algorithm choice:** AES-256-GCM-SIV (RFC 8452) is nonce-misuse-resistant
//! and authenticated, so any corruption, truncation, or wrong-key decryption
//! is detected rather than yielding garbage plaintext.
//!
//! # Blob layout
//!
//! ```text
//! nonce (12 bytes) || ciphertext+tag
//! ```
//!
//! A fresh random nonce is generated per encryption, so encrypting the same
//! plaintext twice yields two different blobs.

use aes_gcm_siv::{
    aead::{Aead, KeyInit, OsRng},
    Aes256GcmSiv, Nonce,
};
use thiserror::Error;

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of an AES-GCM-SIV nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Errors produced by the crypto layer.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key material is the wrong length (must be [`KEY_LEN`] bytes).
    #[error("invalid key length: expected {KEY_LEN} bytes")]
    InvalidKeyLength,

    /// AEAD encryption or decryption failed — corrupt or truncated input,
    /// or a different key than the one that produced the ciphertext.
    #[error("aead operation failed")]
    AeadFailure,

    /// A persisted envelope string does not match any known layout.
    #[error("invalid envelope format")]
    InvalidFormat,

    /// Decrypted payload was expected to be text but is not valid UTF-8.
    #[error("decrypted payload is not valid UTF-8")]
    NotText,
}

/// Fixed-size key buffer holding exactly [`KEY_LEN`] bytes.
///
/// When this type is dropped, the memory is overwritten with zeroes to
/// minimise the window during which key material lives in RAM.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyBytes(Box<[u8; KEY_LEN]>);

impl KeyBytes {
    /// Generate fresh random key material from the OS CSPRNG.
    pub fn generate() -> Self {
        use aes_gcm_siv::aead::rand_core::RngCore;
        let mut buf = Box::new([0u8; KEY_LEN]);
        OsRng.fill_bytes(buf.as_mut());
        Self(buf)
    }

    /// Build a key buffer from a byte slice.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] if `bytes` is not
    /// [`KEY_LEN`] bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != KEY_LEN {
            return Err(CryptoError::InvalidKeyLength);
        }
        let mut buf = Box::new([0u8; KEY_LEN]);
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }

    /// Borrow the raw key bytes, e.g. for persisting to the key store.
    pub fn expose(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl Drop for KeyBytes {
    fn drop(&mut self) {
        // Zero the key material on drop.
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for KeyBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material — not even in debug builds.
        f.write_str("KeyBytes([REDACTED])")
    }
}

/// A named symmetric key with encrypt/decrypt capability.
///
/// The identity is a stable string derived from the logical owner of the
/// protected data (e.g. `"credstore.file-credential"`). Key material for an
/// identity is created once by the [`crate::KeyProvider`] and never
/// regenerated.
#[derive(Debug, Clone)]
pub struct ConfidentialKey {
    identity: String,
    material: KeyBytes,
}

impl ConfidentialKey {
    /// Bind key material to an identity.
    pub fn new(identity: impl Into<String>, material: KeyBytes) -> Self {
        Self {
            identity: identity.into(),
            material,
        }
    }

    /// The stable identity this key belongs to.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Encrypt `plaintext`, returning `nonce || ciphertext+tag`.
    ///
    /// Empty plaintext is valid and produces a blob that decrypts back to an
    /// empty payload.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::AeadFailure`] on an internal AEAD error
    /// (should be unreachable with a valid key and nonce).
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        use aes_gcm_siv::aead::rand_core::RngCore;
        let cipher = self.cipher()?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::AeadFailure)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Decrypt a `nonce || ciphertext+tag` blob back to plaintext.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::AeadFailure`] if the blob is truncated,
    /// corrupt, or was produced under a different key.
    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if blob.len() < NONCE_LEN {
            return Err(CryptoError::AeadFailure);
        }
        let cipher = self.cipher()?;
        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::AeadFailure)
    }

    fn cipher(&self) -> Result<Aes256GcmSiv, CryptoError> {
        Aes256GcmSiv::new_from_slice(self.material.expose())
            .map_err(|_| CryptoError::InvalidKeyLength)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(identity: &str) -> ConfidentialKey {
        ConfidentialKey::new(identity, KeyBytes::generate())
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let key = test_key("test.round-trip");
        let plaintext = b"correct horse battery staple";
        let blob = key.encrypt(plaintext).unwrap();
        assert_eq!(key.decrypt(&blob).unwrap(), plaintext);
    }

    #[test]
    fn empty_plaintext_round_trips() {
        let key = test_key("test.empty");
        let blob = key.encrypt(b"").unwrap();
        assert!(blob.len() > NONCE_LEN);
        assert_eq!(key.decrypt(&blob).unwrap(), b"");
    }

    #[test]
    fn same_plaintext_encrypts_differently() {
        let key = test_key("test.nondeterministic");
        let a = key.encrypt(b"payload").unwrap();
        let b = key.encrypt(b"payload").unwrap();
        assert_ne!(a, b);
        assert_eq!(key.decrypt(&a).unwrap(), key.decrypt(&b).unwrap());
    }

    #[test]
    fn wrong_key_fails_decryption() {
        let blob = test_key("test.one").encrypt(b"secret").unwrap();
        assert!(matches!(
            test_key("test.two").decrypt(&blob),
            Err(CryptoError::AeadFailure)
        ));
    }

    #[test]
    fn truncated_blob_fails() {
        let key = test_key("test.truncated");
        let blob = key.encrypt(b"secret").unwrap();
        assert!(key.decrypt(&blob[..NONCE_LEN - 1]).is_err());
        assert!(key.decrypt(&blob[..NONCE_LEN + 3]).is_err());
    }

    #[test]
    fn tampered_blob_fails_auth() {
        let key = test_key("test.tamper");
        let mut blob = key.encrypt(b"tamper me").unwrap();
        for idx in [0, NONCE_LEN, blob.len() - 1] {
            blob[idx] ^= 0xFF;
            assert!(key.decrypt(&blob).is_err());
            blob[idx] ^= 0xFF;
        }
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        assert!(KeyBytes::from_slice(&[0u8; 16]).is_err());
        assert!(KeyBytes::from_slice(&[0u8; KEY_LEN]).is_ok());
    }

    #[test]
    fn key_bytes_redacted_in_debug() {
        let key = test_key("test.redacted");
        let out = format!("{key:?}");
        assert!(out.contains("REDACTED"));
        assert!(out.contains("test.redacted"));
    }
}
