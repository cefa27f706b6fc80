//! User-facing protected values: [`Secret`] for text, [`SecretBytes`] for
//! opaque byte blobs.
//!
//! Both normally hold a sealed [`Envelope`]. Deserialising a hand-authored
//! document may yield a *pending* value instead — plaintext that was written
//! into the document in the clear (literal text for [`Secret`], standard
//! base64 for [`SecretBytes`]). Pending values are readable, but they are
//! sealed by the load-time migration pass and can never be serialised:
//! attempting to persist pending plaintext is a hard error, not a fallback.

use std::fmt;

use confidential::{ConfidentialKey, CryptoError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};

use crate::envelope::Envelope;

#[derive(Clone, PartialEq, Eq)]
enum TextPayload {
    /// Plaintext from a hand-authored document, awaiting sealing.
    Pending(String),
    Sealed(Envelope),
}

#[derive(Clone, PartialEq, Eq)]
enum BytesPayload {
    /// Plaintext from a hand-authored document, awaiting sealing.
    Pending(Vec<u8>),
    Sealed(Envelope),
}

/// A protected UTF-8 string.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret {
    payload: TextPayload,
}

impl Secret {
    /// Seal `plaintext` into a fresh envelope. Empty plaintext is valid.
    pub fn encode(plaintext: &str, master: &ConfidentialKey) -> Result<Self, CryptoError> {
        Ok(Self {
            payload: TextPayload::Sealed(Envelope::encode(plaintext.as_bytes(), master)?),
        })
    }

    /// Interpret a persisted string field.
    ///
    /// Text that parses as a current-format envelope is taken as sealed;
    /// anything else is taken as literal plaintext pending sealing.
    pub fn from_import(text: &str) -> Self {
        let payload = match Envelope::from_str_repr(text) {
            Ok(envelope @ Envelope::Current { .. }) => TextPayload::Sealed(envelope),
            _ => TextPayload::Pending(text.to_owned()),
        };
        Self { payload }
    }

    /// Recover the plaintext.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] on key mismatch or corrupt envelope, and
    /// [`CryptoError::NotText`] if the decrypted payload is not UTF-8.
    /// A failure is always distinguishable from a legitimately empty
    /// secret.
    pub fn decode(
        &self,
        master: &ConfidentialKey,
        legacy: &ConfidentialKey,
    ) -> Result<String, CryptoError> {
        match &self.payload {
            TextPayload::Pending(text) => Ok(text.clone()),
            TextPayload::Sealed(envelope) => {
                let bytes = envelope.decode(master, legacy)?;
                String::from_utf8(bytes).map_err(|_| CryptoError::NotText)
            }
        }
    }

    /// Returns `true` once the value holds a sealed envelope.
    pub fn is_sealed(&self) -> bool {
        matches!(self.payload, TextPayload::Sealed(_))
    }

    /// Normalise to a sealed current-format envelope, reporting whether
    /// anything changed.
    ///
    /// A pending value may be one of two historical shapes: base64 of
    /// ciphertext under the record type's fixed legacy key, or literal
    /// plaintext. The legacy interpretation wins when it authenticates;
    /// a false positive on genuine plaintext would require forging the
    /// AEAD tag.
    pub(crate) fn reseal(
        self,
        master: &ConfidentialKey,
        legacy: &ConfidentialKey,
    ) -> Result<(Self, bool), CryptoError> {
        let text = match self.payload {
            TextPayload::Sealed(_) => return Ok((self, false)),
            TextPayload::Pending(text) => text,
        };
        let plaintext = match STANDARD
            .decode(&text)
            .ok()
            .and_then(|blob| legacy.decrypt(&blob).ok())
        {
            Some(decrypted) => String::from_utf8(decrypted).map_err(|_| CryptoError::NotText)?,
            None => text,
        };
        let sealed = Secret::encode(&plaintext, master)?;
        Ok((sealed, true))
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print secret payloads — pending values hold plaintext.
        f.write_str("Secret([REDACTED])")
    }
}

/// A protected opaque byte blob.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretBytes {
    payload: BytesPayload,
}

impl SecretBytes {
    /// Seal `plaintext` into a fresh envelope. Empty plaintext is valid.
    pub fn encode(plaintext: &[u8], master: &ConfidentialKey) -> Result<Self, CryptoError> {
        Ok(Self {
            payload: BytesPayload::Sealed(Envelope::encode(plaintext, master)?),
        })
    }

    /// Interpret a persisted string field.
    ///
    /// A dotted string must parse as a current-format envelope; anything
    /// else must be standard base64 of the raw payload, taken as pending
    /// plaintext.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidFormat`] if the text is neither a
    /// well-formed envelope nor valid base64.
    pub fn from_import(text: &str) -> Result<Self, CryptoError> {
        let payload = if text.contains('.') {
            BytesPayload::Sealed(Envelope::from_str_repr(text)?)
        } else {
            BytesPayload::Pending(
                STANDARD
                    .decode(text)
                    .map_err(|_| CryptoError::InvalidFormat)?,
            )
        };
        Ok(Self { payload })
    }

    /// Recover the plaintext bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError`] on key mismatch or corrupt envelope; never
    /// an empty payload in place of an error.
    pub fn decode(
        &self,
        master: &ConfidentialKey,
        legacy: &ConfidentialKey,
    ) -> Result<Vec<u8>, CryptoError> {
        match &self.payload {
            BytesPayload::Pending(bytes) => Ok(bytes.clone()),
            BytesPayload::Sealed(envelope) => envelope.decode(master, legacy),
        }
    }

    /// Returns `true` once the value holds a sealed envelope.
    pub fn is_sealed(&self) -> bool {
        matches!(self.payload, BytesPayload::Sealed(_))
    }

    /// Normalise a pending import to a sealed envelope, reporting whether
    /// anything changed.
    pub(crate) fn reseal(self, master: &ConfidentialKey) -> Result<(Self, bool), CryptoError> {
        match self.payload {
            BytesPayload::Sealed(_) => Ok((self, false)),
            BytesPayload::Pending(bytes) => Ok((SecretBytes::encode(&bytes, master)?, true)),
        }
    }
}

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBytes([REDACTED])")
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.payload {
            TextPayload::Sealed(envelope) => serializer.serialize_str(&envelope.to_string_repr()),
            TextPayload::Pending(_) => Err(ser::Error::custom(
                "refusing to persist unencrypted secret material",
            )),
        }
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Secret::from_import(&text))
    }
}

impl Serialize for SecretBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.payload {
            BytesPayload::Sealed(envelope) => serializer.serialize_str(&envelope.to_string_repr()),
            BytesPayload::Pending(_) => Err(ser::Error::custom(
                "refusing to persist unencrypted secret material",
            )),
        }
    }
}

impl<'de> Deserialize<'de> for SecretBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        SecretBytes::from_import(&text).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confidential::KeyBytes;

    fn key(identity: &str) -> ConfidentialKey {
        ConfidentialKey::new(identity, KeyBytes::generate())
    }

    #[test]
    fn secret_round_trips() {
        let master = key("test.master");
        let legacy = key("test.legacy");
        let secret = Secret::encode("password", &master).unwrap();
        assert!(secret.is_sealed());
        assert_eq!(secret.decode(&master, &legacy).unwrap(), "password");
    }

    #[test]
    fn empty_secret_is_distinguishable_from_failure() {
        let master = key("test.master");
        let legacy = key("test.legacy");
        let secret = Secret::encode("", &master).unwrap();
        assert_eq!(secret.decode(&master, &legacy).unwrap(), "");
        assert!(secret.decode(&key("test.other"), &legacy).is_err());
    }

    #[test]
    fn plaintext_import_reads_back_and_reseals() {
        let master = key("test.master");
        let legacy = key("test.legacy");
        let secret = Secret::from_import("hunter2");
        assert!(!secret.is_sealed());
        assert_eq!(secret.decode(&master, &legacy).unwrap(), "hunter2");

        let (resealed, changed) = secret.reseal(&master, &legacy).unwrap();
        assert!(changed);
        assert!(resealed.is_sealed());
        assert_eq!(resealed.decode(&master, &legacy).unwrap(), "hunter2");
    }

    #[test]
    fn legacy_ciphertext_import_reseals_to_original_plaintext() {
        let master = key("test.master");
        let legacy = key("test.legacy");
        let blob = legacy.encrypt("old string secret".as_bytes()).unwrap();
        let secret = Secret::from_import(&STANDARD.encode(blob));

        let (resealed, changed) = secret.reseal(&master, &legacy).unwrap();
        assert!(changed);
        assert_eq!(
            resealed.decode(&master, &legacy).unwrap(),
            "old string secret"
        );
    }

    #[test]
    fn resealing_twice_is_a_no_op() {
        let master = key("test.master");
        let legacy = key("test.legacy");
        let (sealed, _) = Secret::from_import("hunter2").reseal(&master, &legacy).unwrap();
        let (again, changed) = sealed.clone().reseal(&master, &legacy).unwrap();
        assert!(!changed);
        assert_eq!(again, sealed);
    }

    #[test]
    fn sealed_envelope_import_is_recognised() {
        let master = key("test.master");
        let legacy = key("test.legacy");
        let text = Envelope::encode(b"password", &master).unwrap().to_string_repr();
        let secret = Secret::from_import(&text);
        assert!(secret.is_sealed());
        assert_eq!(secret.decode(&master, &legacy).unwrap(), "password");
    }

    #[test]
    fn secret_bytes_import_accepts_base64_plaintext() {
        let master = key("test.master");
        let legacy = key("test.legacy");
        let imported = SecretBytes::from_import(&STANDARD.encode(b"Hello World!")).unwrap();
        assert!(!imported.is_sealed());
        assert_eq!(imported.decode(&master, &legacy).unwrap(), b"Hello World!");
    }

    #[test]
    fn secret_bytes_import_rejects_garbage() {
        assert!(SecretBytes::from_import("!!! not base64 !!!").is_err());
        assert!(SecretBytes::from_import("v1.bad").is_err());
    }

    #[test]
    fn pending_values_refuse_to_serialise() {
        let secret = Secret::from_import("plaintext");
        assert!(serde_json::to_string(&secret).is_err());
        let bytes = SecretBytes::from_import(&STANDARD.encode(b"plaintext")).unwrap();
        assert!(serde_json::to_string(&bytes).is_err());
    }

    #[test]
    fn sealed_values_serialise_to_envelope_text() {
        let master = key("test.master");
        let legacy = key("test.legacy");
        let secret = Secret::encode("password", &master).unwrap();
        let json = serde_json::to_string(&secret).unwrap();
        assert!(json.contains("v1."));
        assert!(!json.contains("password"));

        let back: Secret = serde_json::from_str(&json).unwrap();
        assert_eq!(back.decode(&master, &legacy).unwrap(), "password");
    }

    #[test]
    fn debug_output_is_redacted() {
        let secret = Secret::from_import("hunter2");
        assert!(!format!("{secret:?}").contains("hunter2"));
    }
}
