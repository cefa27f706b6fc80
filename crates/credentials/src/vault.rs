//! [`Vault`]: the key service handed to every encode/decode/migrate entry
//! point.
//!
//! Owns an opened [`KeyProvider`] plus the installation master key. The
//! master key wraps per-value keys in current-format envelopes; legacy keys
//! are resolved per record type and are only ever used to decrypt data
//! written under the old scheme. The master identity is deliberately
//! distinct from every legacy identity.

use std::sync::Arc;

use confidential::{ConfidentialKey, ConfidentialStore, KeyProvider, KeyStoreError};

/// Installation-wide key service.
#[derive(Debug)]
pub struct Vault {
    provider: KeyProvider,
    master: Arc<ConfidentialKey>,
}

impl Vault {
    /// Identity of the installation master key.
    pub const MASTER_KEY_IDENTITY: &'static str = "credstore.master";

    /// Open a vault over a key store, creating the master key on first use.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError`] if master key material cannot be loaded or
    /// persisted.
    pub fn open(store: Arc<dyn ConfidentialStore>) -> Result<Self, KeyStoreError> {
        let provider = KeyProvider::open(store);
        let master = provider.get_or_create(Self::MASTER_KEY_IDENTITY)?;
        Ok(Self { provider, master })
    }

    /// The installation master key.
    pub fn master(&self) -> &ConfidentialKey {
        &self.master
    }

    /// Resolve the fixed legacy key for a record type.
    ///
    /// Created lazily like any other key: if no legacy data was ever
    /// written under this identity, the fresh key simply fails to decrypt
    /// anything.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError`] if key material cannot be loaded or
    /// persisted.
    pub fn legacy_key(&self, identity: &str) -> Result<Arc<ConfidentialKey>, KeyStoreError> {
        self.provider.get_or_create(identity)
    }

    /// Drop the vault and its cached key material.
    pub fn close(self) {
        self.provider.close();
    }
}
