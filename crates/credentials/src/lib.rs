//! Secret-at-rest storage for credential records.
//!
//! Plaintext goes in, a self-contained versioned [`Envelope`] comes out:
//! the payload is encrypted under a fresh per-value key, which is itself
//! wrapped under the installation master key held by the [`Vault`].
//! Documents written under older schemes — raw ciphertext under a fixed
//! per-type key, or hand-authored unencrypted imports — still load, and the
//! migration pass upgrades them in memory so the next save persists only
//! the current format. Migration is one-way and idempotent; plaintext is
//! never written back.

pub mod envelope;
pub mod error;
pub mod migrate;
pub mod record;
pub mod secret;
pub mod store;
pub mod vault;

pub use envelope::Envelope;
pub use error::{ConfigurationError, CredentialError};
pub use migrate::{migrate_file_credential, migrate_string_credential, MigrationOutcome};
pub use record::{FileCredential, StringCredential};
pub use secret::{Secret, SecretBytes};
pub use store::{CredentialsFile, CredentialsStore};
pub use vault::Vault;
