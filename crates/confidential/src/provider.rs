//! Process-wide key provider: lazily creates and caches confidential keys.
//!
//! # Lifecycle
//!
//! 1. [`KeyProvider::open`] wraps a [`ConfidentialStore`].
//! 2. [`KeyProvider::get_or_create`] resolves an identity to a key handle,
//!    loading persisted material or generating and persisting fresh material
//!    on first use.
//! 3. [`KeyProvider::close`] drops the provider; cached key buffers are
//!    zeroed as they drop.
//!
//! Reads are lock-free (`arc-swap` map, swapped wholesale on insert); the
//! create path is serialised by a mutex so concurrent first use of the same
//! identity resolves to a single persisted key. If the backing store fails,
//! the error propagates — the provider never fabricates an in-memory-only
//! key, since data encrypted under it would be unrecoverable after restart.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use tracing::{debug, info};

use crate::key::{ConfidentialKey, KeyBytes};
use crate::store::{ConfidentialStore, KeyStoreError};

/// Resolves string identities to durable [`ConfidentialKey`] handles.
pub struct KeyProvider {
    store: Arc<dyn ConfidentialStore>,
    cache: ArcSwap<HashMap<String, Arc<ConfidentialKey>>>,
    create_guard: Mutex<()>,
}

impl KeyProvider {
    /// Open a provider over the given backing store.
    pub fn open(store: Arc<dyn ConfidentialStore>) -> Self {
        Self {
            store,
            cache: ArcSwap::new(Arc::new(HashMap::new())),
            create_guard: Mutex::new(()),
        }
    }

    /// Resolve `identity` to its key, creating and persisting fresh material
    /// on first use.
    ///
    /// Two successive calls for the same identity — in this process or after
    /// a restart over the same store — return handles over identical
    /// material.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError`] if persisted material cannot be read or
    /// fresh material cannot be written. No key handle is produced in that
    /// case.
    pub fn get_or_create(&self, identity: &str) -> Result<Arc<ConfidentialKey>, KeyStoreError> {
        if let Some(key) = self.cache.load().get(identity) {
            return Ok(Arc::clone(key));
        }

        let _guard = self
            .create_guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // Re-check under the guard: another thread may have won the race.
        if let Some(key) = self.cache.load().get(identity) {
            return Ok(Arc::clone(key));
        }

        let material = match self.store.load(identity)? {
            Some(bytes) => {
                debug!(identity, "confidential key loaded");
                KeyBytes::from_slice(&bytes)
                    .map_err(|_| KeyStoreError::CorruptRecord(identity.to_owned()))?
            }
            None => {
                let fresh = KeyBytes::generate();
                let stored = self.store.create_if_absent(identity, fresh.expose())?;
                info!(identity, "confidential key created");
                KeyBytes::from_slice(&stored)
                    .map_err(|_| KeyStoreError::CorruptRecord(identity.to_owned()))?
            }
        };

        let key = Arc::new(ConfidentialKey::new(identity, material));
        let mut next: HashMap<_, _> = (**self.cache.load()).clone();
        next.insert(identity.to_owned(), Arc::clone(&key));
        self.cache.store(Arc::new(next));
        Ok(key)
    }

    /// Drop the provider and its cached key material.
    pub fn close(self) {}
}

impl std::fmt::Debug for KeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyProvider")
            .field("cached_identities", &self.cache.load().len())
            .finish()
    }
}
