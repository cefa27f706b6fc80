//! Confidential key management for `credstore`.
//!
//! Supplies named symmetric keys backed by durable per-installation key
//! material. A [`KeyProvider`] resolves a string identity to a
//! [`ConfidentialKey`], generating and persisting fresh material the first
//! time an identity is seen and returning the same key ever after. Losing a
//! persisted key makes everything encrypted under it permanently
//! unrecoverable, so the create path guarantees at most one key is ever
//! durably stored per identity.

pub mod key;
pub mod provider;
pub mod store;

pub use key::{ConfidentialKey, CryptoError, KeyBytes, KEY_LEN, NONCE_LEN};
pub use provider::KeyProvider;
pub use store::{
    ConfidentialStore, FileConfidentialStore, KeyStoreError, MemoryConfidentialStore,
};
