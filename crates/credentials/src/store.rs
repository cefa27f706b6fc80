//! YAML-backed credentials document with mark-dirty-on-load semantics.
//!
//! [`CredentialsStore::load`] is the deserialisation boundary: it runs the
//! migration pass exactly once per record and marks the store dirty when
//! any record's in-memory representation diverged from the persisted bytes.
//! [`CredentialsStore::save`] flushes only when dirty, writing atomically.
//! A fresh save never contains legacy fields or plaintext payloads.

use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::CredentialError;
use crate::migrate::{migrate_file_credential, migrate_string_credential};
use crate::record::{FileCredential, StringCredential};
use crate::vault::Vault;

/// The serialised document shape.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialsFile {
    #[serde(default)]
    pub string_credentials: Vec<StringCredential>,
    #[serde(default)]
    pub file_credentials: Vec<FileCredential>,
}

/// An open credentials document bound to its file path.
#[derive(Debug)]
pub struct CredentialsStore {
    path: PathBuf,
    document: CredentialsFile,
    dirty: bool,
}

impl CredentialsStore {
    /// Load the document at `path`, migrating every record to the current
    /// format. A missing file yields an empty, clean store.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError`] if the file cannot be read or parsed, or
    /// if any record fails migration. A single corrupt record fails the
    /// whole load.
    pub fn load(path: impl Into<PathBuf>, vault: &Vault) -> Result<Self, CredentialError> {
        let path = path.into();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no credentials file yet; starting empty");
                return Ok(Self {
                    path,
                    document: CredentialsFile::default(),
                    dirty: false,
                });
            }
            Err(source) => {
                return Err(CredentialError::Read {
                    path,
                    source,
                })
            }
        };

        let raw: CredentialsFile =
            serde_yaml::from_str(&text).map_err(|source| CredentialError::Malformed {
                path: path.clone(),
                source,
            })?;

        let mut dirty = false;
        let mut document = CredentialsFile::default();
        for record in raw.string_credentials {
            let outcome = migrate_string_credential(record, vault)?;
            dirty |= outcome.changed;
            document.string_credentials.push(outcome.record);
        }
        for record in raw.file_credentials {
            let outcome = migrate_file_credential(record, vault)?;
            dirty |= outcome.changed;
            document.file_credentials.push(outcome.record);
        }

        if dirty {
            info!(
                path = %path.display(),
                "credentials document migrated in memory; will rewrite on next save"
            );
        }
        Ok(Self {
            path,
            document,
            dirty,
        })
    }

    /// Write the document back if it has diverged from the persisted bytes.
    ///
    /// Returns `true` if a write happened. The write goes through a
    /// temporary file and a rename so a crash never leaves a half-written
    /// document.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError`] if serialisation or the write fails.
    pub fn save(&mut self) -> Result<bool, CredentialError> {
        if !self.dirty {
            return Ok(false);
        }
        let text =
            serde_yaml::to_string(&self.document).map_err(CredentialError::Serialise)?;
        write_atomic(&self.path, text.as_bytes()).map_err(|source| CredentialError::Write {
            path: self.path.clone(),
            source,
        })?;
        self.dirty = false;
        debug!(path = %self.path.display(), "credentials document written");
        Ok(true)
    }

    /// `true` when the in-memory document diverges from the persisted bytes.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn string_credentials(&self) -> &[StringCredential] {
        &self.document.string_credentials
    }

    pub fn file_credentials(&self) -> &[FileCredential] {
        &self.document.file_credentials
    }

    pub fn find_string_credential(&self, id: &str) -> Option<&StringCredential> {
        self.document
            .string_credentials
            .iter()
            .find(|c| c.id() == id)
    }

    pub fn find_file_credential(&self, id: &str) -> Option<&FileCredential> {
        self.document.file_credentials.iter().find(|c| c.id() == id)
    }

    pub fn add_string_credential(&mut self, credential: StringCredential) {
        self.document.string_credentials.push(credential);
        self.dirty = true;
    }

    pub fn add_file_credential(&mut self, credential: FileCredential) {
        self.document.file_credentials.push(credential);
        self.dirty = true;
    }

    /// Total number of records of both kinds.
    pub fn len(&self) -> usize {
        self.document.string_credentials.len() + self.document.file_credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut opts = fs::OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }
        let mut file = opts.open(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use confidential::{ConfidentialStore, FileConfidentialStore};
    use std::sync::Arc;

    fn open_vault(dir: &Path) -> Vault {
        let store = FileConfidentialStore::open(dir.join("secrets")).unwrap();
        Vault::open(Arc::new(store) as Arc<dyn ConfidentialStore>).unwrap()
    }

    #[test]
    fn create_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.yaml");
        let vault = open_vault(dir.path());

        let mut store = CredentialsStore::load(&path, &vault).unwrap();
        assert!(store.is_empty());
        assert!(!store.is_dirty());

        store.add_string_credential(
            StringCredential::new(Some("token".into()), "ci token", "password", &vault).unwrap(),
        );
        store.add_file_credential(
            FileCredential::new(
                Some("secret-file".into()),
                "a line",
                "secret-file.txt",
                b"Hello World!",
                &vault,
            )
            .unwrap(),
        );
        assert!(store.save().unwrap());
        assert!(!store.is_dirty());

        let reloaded = CredentialsStore::load(&path, &vault).unwrap();
        assert!(!reloaded.is_dirty());
        let token = reloaded.find_string_credential("token").unwrap();
        assert_eq!(token.secret(&vault).unwrap(), "password");
        let file = reloaded.find_file_credential("secret-file").unwrap();
        assert_eq!(file.file_name(), "secret-file.txt");
        assert_eq!(file.content(&vault).unwrap(), b"Hello World!");
    }

    #[test]
    fn saving_a_clean_store_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.yaml");
        let vault = open_vault(dir.path());
        let mut store = CredentialsStore::load(&path, &vault).unwrap();
        assert!(!store.save().unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn unencrypted_import_is_readable_and_gone_after_save() {
        // The document carries the payload as plain base64, the way a
        // hand-authored import does.
        let plain_b64 = "VGhpcyBpcyBCYXNlNjQgZW5jb2RlZCBwbGFpbiB0ZXh0Cg==";
        assert_eq!(
            STANDARD.decode(plain_b64).unwrap(),
            b"This is Base64 encoded plain text\n"
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.yaml");
        fs::write(
            &path,
            format!(
                "file_credentials:\n\
                 - id: secret-file\n\
                 \x20 description: a line\n\
                 \x20 file_name: secret.txt\n\
                 \x20 secret_bytes: {plain_b64}\n"
            ),
        )
        .unwrap();

        let vault = open_vault(dir.path());
        let mut store = CredentialsStore::load(&path, &vault).unwrap();
        assert!(store.is_dirty());

        let record = store.find_file_credential("secret-file").unwrap();
        assert_eq!(record.file_name(), "secret.txt");
        assert_eq!(record.description(), "a line");
        assert_eq!(
            record.content(&vault).unwrap(),
            b"This is Base64 encoded plain text\n"
        );

        assert!(store.save().unwrap());
        let text = fs::read_to_string(&path).unwrap();
        assert!(!text.contains(plain_b64));
        assert!(text.contains("v1."));

        let reloaded = CredentialsStore::load(&path, &vault).unwrap();
        assert!(!reloaded.is_dirty());
        assert_eq!(
            reloaded
                .find_file_credential("secret-file")
                .unwrap()
                .content(&vault)
                .unwrap(),
            b"This is Base64 encoded plain text\n"
        );
    }

    #[test]
    fn legacy_document_migrates_on_load_and_persists_current_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.yaml");
        let vault = open_vault(dir.path());

        // Fabricate a document written under the old scheme.
        let legacy = vault
            .legacy_key(FileCredential::LEGACY_KEY_IDENTITY)
            .unwrap();
        let ciphertext = legacy
            .encrypt(b"This is a secret file from legacy encryption\n")
            .unwrap();
        fs::write(
            &path,
            format!(
                "file_credentials:\n\
                 - id: legacyData\n\
                 \x20 description: credential using legacy data format\n\
                 \x20 file_name: secret.txt\n\
                 \x20 data: {}\n",
                STANDARD.encode(ciphertext)
            ),
        )
        .unwrap();

        let mut store = CredentialsStore::load(&path, &vault).unwrap();
        assert!(store.is_dirty());
        let record = store.find_file_credential("legacyData").unwrap();
        assert_eq!(record.file_name(), "secret.txt");
        assert_eq!(
            record.content(&vault).unwrap(),
            b"This is a secret file from legacy encryption\n"
        );

        assert!(store.save().unwrap());
        let text = fs::read_to_string(&path).unwrap();
        assert!(!text.contains("data:"));
        assert!(text.contains("secret_bytes:"));
        assert!(text.contains("v1."));

        let reloaded = CredentialsStore::load(&path, &vault).unwrap();
        assert!(!reloaded.is_dirty());
        assert_eq!(
            reloaded
                .find_file_credential("legacyData")
                .unwrap()
                .content(&vault)
                .unwrap(),
            b"This is a secret file from legacy encryption\n"
        );
    }

    #[test]
    fn plaintext_string_document_round_trips_through_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.yaml");
        fs::write(
            &path,
            "string_credentials:\n\
             - id: token\n\
             \x20 description: ci token\n\
             \x20 secret: hunter2\n",
        )
        .unwrap();

        let vault = open_vault(dir.path());
        let mut store = CredentialsStore::load(&path, &vault).unwrap();
        assert!(store.is_dirty());
        assert_eq!(
            store
                .find_string_credential("token")
                .unwrap()
                .secret(&vault)
                .unwrap(),
            "hunter2"
        );
        assert!(store.save().unwrap());
        assert!(!fs::read_to_string(&path).unwrap().contains("hunter2"));
    }

    #[test]
    fn secrets_survive_a_simulated_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.yaml");
        {
            let vault = open_vault(dir.path());
            let mut store = CredentialsStore::load(&path, &vault).unwrap();
            store.add_string_credential(
                StringCredential::new(Some("token".into()), "", "password", &vault).unwrap(),
            );
            store.save().unwrap();
            vault.close();
        }

        // New vault over the same key-store directory: same master key.
        let vault = open_vault(dir.path());
        let store = CredentialsStore::load(&path, &vault).unwrap();
        assert_eq!(
            store
                .find_string_credential("token")
                .unwrap()
                .secret(&vault)
                .unwrap(),
            "password"
        );
    }

    #[test]
    fn malformed_document_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.yaml");
        fs::write(&path, "file_credentials: [not, a, record]\n").unwrap();
        let vault = open_vault(dir.path());
        assert!(matches!(
            CredentialsStore::load(&path, &vault),
            Err(CredentialError::Malformed { .. })
        ));
    }

    #[test]
    fn document_round_trips_through_json_too() {
        // The envelope text must survive arbitrary text-based serialisers.
        let dir = tempfile::tempdir().unwrap();
        let vault = open_vault(dir.path());
        let record =
            FileCredential::new(Some("f".into()), "", "secret.txt", b"Hello World!", &vault)
                .unwrap();
        let json = serde_json::to_string(&record).unwrap();
        let back: FileCredential = serde_json::from_str(&json).unwrap();
        assert_eq!(back.content(&vault).unwrap(), b"Hello World!");
    }
}
