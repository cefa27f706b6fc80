//! `credstore-migrate` — maintenance binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise structured JSON logging.
//! 3. Open the key store and [`Vault`].
//! 4. Load the credentials document — the load boundary migrates every
//!    record to the current envelope format in memory.
//! 5. Save, which rewrites the document only if migration changed anything.

mod config;
mod telemetry;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use confidential::{ConfidentialStore, FileConfidentialStore};
use credentials::{CredentialsStore, Vault};

use config::Config;

fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        eprintln!("ERROR: credstore-migrate configuration invalid: {e}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init(&cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        credentials_path = %cfg.credentials_path,
        "credstore-migrate starting"
    );

    // -----------------------------------------------------------------------
    // 3. Key store + vault
    // -----------------------------------------------------------------------
    let key_store = FileConfidentialStore::open(&cfg.key_store_dir)
        .context("failed to open the key store")?;
    let vault = Vault::open(Arc::new(key_store) as Arc<dyn ConfidentialStore>)
        .context("failed to open the vault")?;

    // -----------------------------------------------------------------------
    // 4. Load (migrates in memory)
    // -----------------------------------------------------------------------
    let mut store = CredentialsStore::load(&cfg.credentials_path, &vault)
        .context("failed to load the credentials document")?;
    info!(
        string_credentials = store.string_credentials().len(),
        file_credentials = store.file_credentials().len(),
        dirty = store.is_dirty(),
        "credentials document loaded"
    );

    // -----------------------------------------------------------------------
    // 5. Save if anything changed
    // -----------------------------------------------------------------------
    let written = store
        .save()
        .context("failed to write the migrated credentials document")?;
    if written {
        info!("credentials document rewritten in the current format");
    } else {
        info!("credentials document already current; nothing to do");
    }

    vault.close();
    Ok(())
}
