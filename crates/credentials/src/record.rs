//! Credential records: one protected value plus its unencrypted metadata.
//!
//! Record identity and description are never encrypted. The legacy `data`
//! field exists only so that documents written under the old scheme still
//! deserialise; it is dropped by the load-time migration and is never
//! written back (`skip_serializing_if`).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ConfigurationError, CredentialError};
use crate::secret::{Secret, SecretBytes};
use crate::vault::Vault;

fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// A protected text value, e.g. an API token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringCredential {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) description: String,
    pub(crate) secret: Secret,
}

impl StringCredential {
    /// Fixed key identity for string secrets written under the old scheme.
    pub const LEGACY_KEY_IDENTITY: &'static str = "credstore.string-credential";

    /// Seal `secret_text` into a new record. A missing id gets a fresh
    /// UUID. Empty secret text is valid.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Crypto`] if sealing fails.
    pub fn new(
        id: Option<String>,
        description: impl Into<String>,
        secret_text: &str,
        vault: &Vault,
    ) -> Result<Self, CredentialError> {
        let secret = Secret::encode(secret_text, vault.master())?;
        Ok(Self {
            id: id.unwrap_or_else(generate_id),
            description: description.into(),
            secret,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Decrypt the protected text.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Crypto`] on key mismatch or corrupt
    /// envelope — never an empty string in place of an error.
    pub fn secret(&self, vault: &Vault) -> Result<String, CredentialError> {
        let legacy = vault.legacy_key(Self::LEGACY_KEY_IDENTITY)?;
        Ok(self.secret.decode(vault.master(), &legacy)?)
    }

    /// Human-readable name: the description when present, otherwise the id
    /// unless it is a bare generated UUID.
    pub fn display_name(&self) -> String {
        let description = self.description.trim();
        if !description.is_empty() {
            return description.to_owned();
        }
        if Uuid::parse_str(&self.id).is_ok() {
            "secret text".to_owned()
        } else {
            self.id.clone()
        }
    }
}

/// A protected file payload: intended file name plus encrypted content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCredential {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) description: String,
    pub(crate) file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) secret_bytes: Option<SecretBytes>,
    /// Legacy payload: base64 of ciphertext under the fixed legacy key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) data: Option<String>,
}

impl FileCredential {
    /// Fixed key identity for file payloads written under the old scheme.
    pub const LEGACY_KEY_IDENTITY: &'static str = "credstore.file-credential";

    /// Seal `content` into a new record.
    ///
    /// Any path components in `file_name` are stripped — uploaded names may
    /// arrive as full client-side paths. The name is validated *before* any
    /// encryption or key-store work.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::EmptyFileName`] if the resolved name is
    /// empty, or [`CredentialError::Crypto`] if sealing fails.
    pub fn new(
        id: Option<String>,
        description: impl Into<String>,
        file_name: &str,
        content: &[u8],
        vault: &Vault,
    ) -> Result<Self, CredentialError> {
        let file_name = strip_path_components(file_name);
        if file_name.is_empty() {
            return Err(ConfigurationError::EmptyFileName.into());
        }
        let secret_bytes = SecretBytes::encode(content, vault.master())?;
        Ok(Self {
            id: id.unwrap_or_else(generate_id),
            description: description.into(),
            file_name,
            secret_bytes: Some(secret_bytes),
            data: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// The intended simple file name of the content (no path separators).
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Decrypt the file content.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::NotMigrated`] if the record still carries
    /// only a legacy payload (the deserialisation boundary skipped
    /// migration), or [`CredentialError::Crypto`] on key mismatch or
    /// corrupt envelope.
    pub fn content(&self, vault: &Vault) -> Result<Vec<u8>, CredentialError> {
        let secret_bytes = self
            .secret_bytes
            .as_ref()
            .ok_or_else(|| CredentialError::NotMigrated(self.id.clone()))?;
        let legacy = vault.legacy_key(Self::LEGACY_KEY_IDENTITY)?;
        Ok(secret_bytes.decode(vault.master(), &legacy)?)
    }

    /// Human-readable name: `"<file_name> (<description>)"`, or just the
    /// file name when the description is empty.
    pub fn display_name(&self) -> String {
        let description = self.description.trim();
        if description.is_empty() {
            self.file_name.clone()
        } else {
            format!("{} ({description})", self.file_name)
        }
    }
}

/// Keep only the final path segment of an uploaded file name.
fn strip_path_components(name: &str) -> String {
    name.rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .trim()
        .to_owned()
}
