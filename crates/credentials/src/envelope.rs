//! The versioned serialisation format for one encrypted secret value.
//!
//! # Current envelope text form
//!
//! ```text
//! v1.<base64url(wrapped per-value key)>.<base64url(iv)>.<base64url(ciphertext+tag)>
//! ```
//!
//! The payload is encrypted under a fresh random per-value key; the
//! per-value key is itself encrypted (wrapped) under the installation
//! master key with an independent nonce. Decrypting a current envelope
//! therefore needs only the master key.
//!
//! # Legacy text form
//!
//! Plain standard base64 of raw ciphertext produced under a fixed
//! per-record-type key. The standard base64 alphabet contains no `.`, so
//! shape detection is unambiguous: a dotted string is current-format,
//! anything else is legacy. Legacy envelopes are only ever read — new code
//! never produces them.

use aes_gcm_siv::{
    aead::{Aead, KeyInit, OsRng},
    Aes256GcmSiv, Nonce,
};
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine as _,
};
use confidential::{ConfidentialKey, CryptoError, KeyBytes, KEY_LEN, NONCE_LEN};

/// Prefix that starts every current-format envelope string.
pub const VERSION_PREFIX: &str = "v1";

/// One encrypted secret value, tagged by on-disk format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// Raw ciphertext under a fixed per-record-type key; no self-describing
    /// metadata. Read-only compatibility shape.
    Legacy {
        /// `nonce || ciphertext+tag` under the legacy key.
        ciphertext: Vec<u8>,
    },
    /// Self-contained shape: everything needed to decrypt given only the
    /// installation master key.
    Current {
        /// The per-value key, encrypted under the master key.
        wrapped_key: Vec<u8>,
        /// Initialisation vector for the payload layer.
        iv: [u8; NONCE_LEN],
        /// Payload ciphertext+tag under the per-value key.
        ciphertext: Vec<u8>,
    },
}

impl Envelope {
    /// Encrypt `plaintext` into a fresh current-format envelope.
    ///
    /// A new random per-value key and IV are generated on every call, so
    /// encoding the same plaintext twice yields two different envelopes
    /// that both decode to the same value. Empty plaintext is valid.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] if either encryption layer fails.
    pub fn encode(plaintext: &[u8], master: &ConfidentialKey) -> Result<Self, CryptoError> {
        use aes_gcm_siv::aead::rand_core::RngCore;

        let value_key = KeyBytes::generate();
        let cipher = Aes256GcmSiv::new_from_slice(value_key.expose())
            .map_err(|_| CryptoError::InvalidKeyLength)?;

        let mut iv = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut iv);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&iv), plaintext)
            .map_err(|_| CryptoError::AeadFailure)?;

        // Wrap the per-value key under the master key; `encrypt` draws its
        // own nonce, so the two layers never share an IV.
        let wrapped_key = master.encrypt(value_key.expose())?;

        Ok(Envelope::Current {
            wrapped_key,
            iv,
            ciphertext,
        })
    }

    /// Decrypt this envelope back to plaintext.
    ///
    /// A current envelope is decrypted by unwrapping its per-value key under
    /// `master`; a legacy envelope is decrypted wholly under `legacy`, the
    /// fixed key of the record type that owns it.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] on key mismatch or corrupt input. A failure
    /// is fatal to this read only and is always surfaced — it is never
    /// reported as an empty secret.
    pub fn decode(
        &self,
        master: &ConfidentialKey,
        legacy: &ConfidentialKey,
    ) -> Result<Vec<u8>, CryptoError> {
        match self {
            Envelope::Current {
                wrapped_key,
                iv,
                ciphertext,
            } => {
                let value_key = master.decrypt(wrapped_key)?;
                if value_key.len() != KEY_LEN {
                    return Err(CryptoError::InvalidKeyLength);
                }
                let cipher = Aes256GcmSiv::new_from_slice(&value_key)
                    .map_err(|_| CryptoError::InvalidKeyLength)?;
                cipher
                    .decrypt(Nonce::from_slice(iv), ciphertext.as_slice())
                    .map_err(|_| CryptoError::AeadFailure)
            }
            Envelope::Legacy { ciphertext } => legacy.decrypt(ciphertext),
        }
    }

    /// Returns `true` for the legacy compatibility shape.
    pub fn is_legacy(&self) -> bool {
        matches!(self, Envelope::Legacy { .. })
    }

    /// Encode this envelope to its canonical printable string.
    ///
    /// Both forms use only base64 alphabets plus `.`, so the result embeds
    /// safely in any text-based persistence format.
    pub fn to_string_repr(&self) -> String {
        match self {
            Envelope::Current {
                wrapped_key,
                iv,
                ciphertext,
            } => format!(
                "{}.{}.{}.{}",
                VERSION_PREFIX,
                URL_SAFE_NO_PAD.encode(wrapped_key),
                URL_SAFE_NO_PAD.encode(iv),
                URL_SAFE_NO_PAD.encode(ciphertext),
            ),
            Envelope::Legacy { ciphertext } => STANDARD.encode(ciphertext),
        }
    }

    /// Parse a persisted envelope string, detecting its shape.
    ///
    /// A string containing `.` is committed to the current-format grammar:
    /// if it fails to parse it is a malformed current envelope, never
    /// retried as legacy.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidFormat`] if the string matches neither
    /// shape.
    pub fn from_str_repr(s: &str) -> Result<Self, CryptoError> {
        if s.contains('.') {
            let parts: Vec<&str> = s.split('.').collect();
            if parts.len() != 4 || parts[0] != VERSION_PREFIX {
                return Err(CryptoError::InvalidFormat);
            }
            let wrapped_key = URL_SAFE_NO_PAD
                .decode(parts[1])
                .map_err(|_| CryptoError::InvalidFormat)?;
            let iv_bytes = URL_SAFE_NO_PAD
                .decode(parts[2])
                .map_err(|_| CryptoError::InvalidFormat)?;
            if iv_bytes.len() != NONCE_LEN {
                return Err(CryptoError::InvalidFormat);
            }
            let mut iv = [0u8; NONCE_LEN];
            iv.copy_from_slice(&iv_bytes);
            let ciphertext = URL_SAFE_NO_PAD
                .decode(parts[3])
                .map_err(|_| CryptoError::InvalidFormat)?;
            Ok(Envelope::Current {
                wrapped_key,
                iv,
                ciphertext,
            })
        } else {
            let ciphertext = STANDARD.decode(s).map_err(|_| CryptoError::InvalidFormat)?;
            Ok(Envelope::Legacy { ciphertext })
        }
    }
}
