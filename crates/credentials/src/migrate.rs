//! One-way normalisation of freshly deserialised records to the current
//! envelope format.
//!
//! Called exactly once per record by the deserialisation boundary, before
//! the record is exposed to any reader. Normal decode calls on a live
//! in-memory value never migrate. The functions here return a *replacement*
//! record — the legacy-carrying input is consumed, never patched — and
//! report whether anything changed so the owning store can mark itself
//! dirty. Nothing here writes to the backing store: persisting the upgraded
//! form is the owning store's next explicit save.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use confidential::CryptoError;
use tracing::{info, warn};

use crate::error::{ConfigurationError, CredentialError};
use crate::record::{FileCredential, StringCredential};
use crate::secret::SecretBytes;
use crate::vault::Vault;

/// A migrated record plus whether the migration changed anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationOutcome<T> {
    pub record: T,
    /// `true` when the in-memory representation now diverges from the
    /// persisted bytes and should be flushed on the next save.
    pub changed: bool,
}

/// Normalise a deserialised [`FileCredential`].
///
/// - legacy payload only: decrypt under the type's fixed legacy key and
///   re-encode as a current envelope; the legacy field is discarded.
/// - both payloads: the current envelope wins and the stale legacy field is
///   discarded.
/// - pending unencrypted import: sealed in place.
/// - already current: returned unchanged.
///
/// # Errors
///
/// Returns [`CredentialError::Crypto`] if the legacy payload is corrupt or
/// was not written under this installation's legacy key, and
/// [`ConfigurationError::MissingSecret`] if the record carries no payload
/// at all.
pub fn migrate_file_credential(
    record: FileCredential,
    vault: &Vault,
) -> Result<MigrationOutcome<FileCredential>, CredentialError> {
    let FileCredential {
        id,
        description,
        file_name,
        secret_bytes,
        data,
    } = record;

    let (secret_bytes, changed) = match (secret_bytes, data) {
        (None, None) => return Err(ConfigurationError::MissingSecret.into()),
        (Some(current), data) => {
            let had_legacy = data.is_some();
            if had_legacy {
                warn!(%id, "dropping legacy payload shadowed by a current envelope");
            }
            let (sealed, resealed) = current.reseal(vault.master())?;
            if resealed {
                info!(%id, "unencrypted import sealed");
            }
            (sealed, had_legacy || resealed)
        }
        (None, Some(legacy_b64)) => {
            let ciphertext = STANDARD
                .decode(legacy_b64)
                .map_err(|_| CryptoError::InvalidFormat)?;
            let legacy = vault.legacy_key(FileCredential::LEGACY_KEY_IDENTITY)?;
            let plaintext = legacy.decrypt(&ciphertext)?;
            let sealed = SecretBytes::encode(&plaintext, vault.master())?;
            info!(%id, "legacy payload re-encoded to the current envelope");
            (sealed, true)
        }
    };

    Ok(MigrationOutcome {
        record: FileCredential {
            id,
            description,
            file_name,
            secret_bytes: Some(secret_bytes),
            data: None,
        },
        changed,
    })
}

/// Normalise a deserialised [`StringCredential`].
///
/// String secrets carry their historical shapes inside the one secret
/// field: a sealed envelope passes through unchanged, base64 of legacy
/// ciphertext is decrypted and re-sealed, and anything else is literal
/// plaintext that gets sealed.
///
/// # Errors
///
/// Returns [`CredentialError::Crypto`] if sealing fails or a legacy
/// payload decrypts to non-UTF-8 text.
pub fn migrate_string_credential(
    record: StringCredential,
    vault: &Vault,
) -> Result<MigrationOutcome<StringCredential>, CredentialError> {
    let StringCredential {
        id,
        description,
        secret,
    } = record;

    let legacy = vault.legacy_key(StringCredential::LEGACY_KEY_IDENTITY)?;
    let (secret, changed) = secret.reseal(vault.master(), &legacy)?;
    if changed {
        info!(%id, "string secret re-encoded to the current envelope");
    }

    Ok(MigrationOutcome {
        record: StringCredential {
            id,
            description,
            secret,
        },
        changed,
    })
}
