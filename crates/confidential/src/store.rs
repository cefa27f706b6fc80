//! Durable key-material records: identity string → key bytes.
//!
//! The store format is deliberately opaque to callers: one record per
//! identity, living under the installation's confidential-storage directory.
//! Records are never overwritten — `create_if_absent` is the only write, and
//! an existing record always wins, so two racing creators can never leave
//! the installation with two different keys for one identity.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

/// Errors produced by the key store.
#[derive(Debug, Error)]
pub enum KeyStoreError {
    /// The store directory could not be created or opened.
    #[error("failed to open key store at {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading or writing the record for an identity failed.
    #[error("key store I/O failure for {identity}: {source}")]
    Io {
        identity: String,
        #[source]
        source: io::Error,
    },

    /// The persisted record for an identity cannot be parsed.
    #[error("key record for {0} is corrupt")]
    CorruptRecord(String),

    /// The persisted record belongs to a different identity than the file
    /// name implies — somebody moved or copied record files by hand.
    #[error("key record identity mismatch: expected {expected}, found {found}")]
    IdentityMismatch { expected: String, found: String },
}

/// Durable backing store for confidential key material.
///
/// Implementations must be safe to share across threads; the
/// [`crate::KeyProvider`] additionally serialises its create path, so
/// `create_if_absent` only has to be atomic with respect to *other
/// processes* sharing the same backing storage.
pub trait ConfidentialStore: Send + Sync {
    /// Load persisted key material for `identity`, if any.
    fn load(&self, identity: &str) -> Result<Option<Vec<u8>>, KeyStoreError>;

    /// Persist `material` for `identity` unless a record already exists.
    ///
    /// Returns the material that is durably stored after the call: the
    /// caller's `material` if this call created the record, or the existing
    /// record's material if another creator won.
    fn create_if_absent(&self, identity: &str, material: &[u8])
        -> Result<Vec<u8>, KeyStoreError>;
}

/// One persisted key record. The identity is echoed into the record so a
/// misplaced file is detected on load rather than silently decrypting
/// nothing.
#[derive(Debug, Serialize, Deserialize)]
struct KeyRecord {
    identity: String,
    material_b64: String,
}

/// File-backed [`ConfidentialStore`]: one JSON record per identity at
/// `<sha256(identity)>.key` under the store directory.
#[derive(Debug, Clone)]
pub struct FileConfidentialStore {
    dir: PathBuf,
}

impl FileConfidentialStore {
    /// Open (creating if necessary) the store directory.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::Open`] if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, KeyStoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| KeyStoreError::Open {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// Identities may contain characters that are unsafe in file names, so
    /// the file name is a hash of the identity rather than the identity.
    fn path_for(&self, identity: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(identity.as_bytes());
        self.dir.join(format!("{}.key", hex::encode(hasher.finalize())))
    }

    fn read_record(&self, path: &Path, identity: &str) -> Result<Vec<u8>, KeyStoreError> {
        let bytes = fs::read(path).map_err(|source| KeyStoreError::Io {
            identity: identity.to_owned(),
            source,
        })?;
        let record: KeyRecord = serde_json::from_slice(&bytes)
            .map_err(|_| KeyStoreError::CorruptRecord(identity.to_owned()))?;
        if record.identity != identity {
            return Err(KeyStoreError::IdentityMismatch {
                expected: identity.to_owned(),
                found: record.identity,
            });
        }
        STANDARD
            .decode(record.material_b64)
            .map_err(|_| KeyStoreError::CorruptRecord(identity.to_owned()))
    }
}

impl ConfidentialStore for FileConfidentialStore {
    fn load(&self, identity: &str) -> Result<Option<Vec<u8>>, KeyStoreError> {
        let path = self.path_for(identity);
        if !path.exists() {
            return Ok(None);
        }
        self.read_record(&path, identity).map(Some)
    }

    fn create_if_absent(
        &self,
        identity: &str,
        material: &[u8],
    ) -> Result<Vec<u8>, KeyStoreError> {
        let path = self.path_for(identity);
        let record = KeyRecord {
            identity: identity.to_owned(),
            material_b64: STANDARD.encode(material),
        };
        let bytes = serde_json::to_vec(&record)
            .map_err(|_| KeyStoreError::CorruptRecord(identity.to_owned()))?;

        let mut opts = fs::OpenOptions::new();
        opts.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }

        // `create_new` makes the create exclusive across processes: exactly
        // one creator opens the file, every loser observes AlreadyExists and
        // reads the winner's record.
        match opts.open(&path) {
            Ok(mut file) => {
                let write = file.write_all(&bytes).and_then(|()| file.sync_all());
                if let Err(source) = write {
                    // Drop the partial record so a later call can retry.
                    let _ = fs::remove_file(&path);
                    return Err(KeyStoreError::Io {
                        identity: identity.to_owned(),
                        source,
                    });
                }
                debug!(identity, "key record created");
                Ok(material.to_vec())
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                self.read_record(&path, identity)
            }
            Err(source) => Err(KeyStoreError::Io {
                identity: identity.to_owned(),
                source,
            }),
        }
    }
}

/// In-memory [`ConfidentialStore`] for deterministic tests. Keys live only
/// for the lifetime of the store.
#[derive(Debug, Default)]
pub struct MemoryConfidentialStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryConfidentialStore {
    /// Create a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of identities with persisted material.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if no material has been persisted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ConfidentialStore for MemoryConfidentialStore {
    fn load(&self, identity: &str) -> Result<Option<Vec<u8>>, KeyStoreError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .cloned())
    }

    fn create_if_absent(
        &self,
        identity: &str,
        material: &[u8],
    ) -> Result<Vec<u8>, KeyStoreError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(identity.to_owned())
            .or_insert_with(|| material.to_vec())
            .clone())
    }
}
