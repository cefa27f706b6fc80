//! Error types for credential records and the credentials file store.

use std::io;
use std::path::PathBuf;

use confidential::{CryptoError, KeyStoreError};
use thiserror::Error;

/// Construction-time validation failures. Raised before any encryption or
/// key-store work, so no partial state is ever persisted.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The resolved file name is empty after stripping path components.
    #[error("file name is empty after removing any path components")]
    EmptyFileName,

    /// A persisted record carries neither a current nor a legacy payload.
    #[error("record carries no secret payload")]
    MissingSecret,
}

/// Top-level error for callers of records, migration, and the file store.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Encryption, decryption, or envelope parsing failed.
    #[error("cryptography failure")]
    Crypto(#[from] CryptoError),

    /// Key material could not be read or persisted.
    #[error("key store failure")]
    KeyStore(#[from] KeyStoreError),

    /// A record was constructed from invalid inputs.
    #[error("invalid credential")]
    Configuration(#[from] ConfigurationError),

    /// The record still carries only a legacy payload; it must pass through
    /// the load-time migration before its secret can be read.
    #[error("record {0} has not been migrated from its legacy encoding")]
    NotMigrated(String),

    /// The credentials file could not be read.
    #[error("failed to read credentials file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The credentials file could not be written.
    #[error("failed to write credentials file {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The credentials file does not parse as a credentials document.
    #[error("credentials file {} is malformed", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The credentials document could not be serialised. This includes the
    /// refusal to persist a secret that is still in plaintext form.
    #[error("failed to serialise credentials document")]
    Serialise(#[source] serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_path() {
        let e = CredentialError::Read {
            path: PathBuf::from("/etc/credstore/credentials.yaml"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert!(e.to_string().contains("credentials.yaml"));
    }

    #[test]
    fn crypto_errors_convert() {
        let e: CredentialError = CryptoError::AeadFailure.into();
        assert!(matches!(e, CredentialError::Crypto(_)));
    }
}
