//! Secure storage backend for license and cache blobs.
//!
//! This module stores opaque (already encrypted) text entries:
//! 1. Tries OS keyring first (most secure)
//! 2. Falls back to a file in the app data directory
//!
//! ## Storage Locations
//!
//! **Keyring (Primary):**
//! - Service: the configured namespace (default `warden`)
//! - Entries: `{entry}:{device_id}`
//!
//! **File Fallback (Secondary):**
//! - Windows: `%APPDATA%\{namespace}\`
//! - macOS: `~/Library/Application Support/{namespace}/`
//! - Linux: `~/.local/share/{namespace}/`
//!
//! File writes go to a temporary sibling first and are renamed into place,
//! so readers see either the old blob or the new one. A save removes the
//! copy in the other location.
//!
//! Keyring backends: macOS Keychain, Windows Credential Manager and the
//! Linux kernel keyutils session keyring. Where none is usable the file is
//! the only copy.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::config::StorageConfig;
use crate::errors::{StorageError, StorageResult};

/// Where blobs are kept.
#[derive(Debug, Clone)]
pub struct Storage {
    service: String,
    device_id: String,
    dir: PathBuf,
    use_keyring: bool,
}

impl Storage {
    /// Keyring plus `dirs::data_dir()/{namespace}`.
    pub fn new(config: &StorageConfig, device_id: &str) -> StorageResult<Self> {
        let dir = dirs::data_dir()
            .map(|p| p.join(&config.namespace))
            .ok_or_else(|| {
                StorageError::Io(std::io::Error::new(
                    ErrorKind::NotFound,
                    "Could not determine app data directory",
                ))
            })?;

        Ok(Self {
            service: config.namespace.clone(),
            device_id: device_id.to_string(),
            dir,
            use_keyring: config.use_keyring,
        })
    }

    /// File-only storage rooted at `dir`. Never touches the keyring.
    pub fn in_dir(dir: impl Into<PathBuf>, device_id: &str) -> Self {
        Self {
            service: "warden".to_string(),
            device_id: device_id.to_string(),
            dir: dir.into(),
            use_keyring: false,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `entry`.
    pub fn file_path(&self, entry: &str) -> PathBuf {
        self.dir.join(format!("{entry}.enc"))
    }

    fn keyring_name(&self, entry: &str) -> String {
        format!("{entry}:{}", self.device_id)
    }

    // === Keyring Operations ===

    fn keyring_entry(&self, entry: &str) -> Result<keyring::Entry, keyring::Error> {
        keyring::Entry::new(&self.service, &self.keyring_name(entry))
    }

    fn save_to_keyring(&self, entry: &str, data: &str) -> Result<(), keyring::Error> {
        self.keyring_entry(entry)?.set_password(data)
    }

    fn load_from_keyring(&self, entry: &str) -> Result<String, keyring::Error> {
        self.keyring_entry(entry)?.get_password()
    }

    fn clear_from_keyring(&self, entry: &str) -> Result<(), keyring::Error> {
        self.keyring_entry(entry)?.delete_credential()
    }

    // === File Operations ===

    async fn save_to_file(&self, entry: &str, data: &str) -> StorageResult<()> {
        fs::create_dir_all(&self.dir).await?;

        let path = self.file_path(entry);
        let tmp = self.dir.join(format!("{entry}.enc.tmp"));
        fs::write(&tmp, data).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn load_from_file(&self, entry: &str) -> StorageResult<Option<String>> {
        match fs::read_to_string(self.file_path(entry)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear_from_file(&self, entry: &str) -> StorageResult<()> {
        match fs::remove_file(self.file_path(entry)).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    // === Public API ===

    /// Save a blob. Tries keyring first, falls back to file storage.
    ///
    /// Only the location just written keeps a copy, so `load` can never find
    /// an older blob ahead of the new one.
    pub async fn save(&self, entry: &str, data: &str) -> StorageResult<()> {
        if self.use_keyring {
            match self.save_to_keyring(entry, data) {
                Ok(()) => {
                    // Some platforms accept the write and lose it.
                    if matches!(self.load_from_keyring(entry), Ok(ref stored) if stored == data) {
                        log::debug!("Saved {entry} to keyring");
                        self.clear_from_file(entry).await?;
                        return Ok(());
                    }
                    log::debug!("Keyring save verification failed for {entry}, falling back to file");
                }
                Err(e) => {
                    log::debug!("Keyring save failed for {entry}: {e}, falling back to file");
                }
            }
        }

        self.save_to_file(entry, data).await?;
        log::debug!("Saved {entry} to {}", self.dir.display());

        if self.use_keyring {
            self.drop_keyring_copy(entry)?;
        }
        Ok(())
    }

    /// Delete the keyring copy of `entry`. An unusable keyring is fine as
    /// long as it cannot hand back an old blob either.
    fn drop_keyring_copy(&self, entry: &str) -> StorageResult<()> {
        match self.clear_from_keyring(entry) {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) if self.load_from_keyring(entry).is_ok() => {
                log::debug!("Failed to clear {entry} from keyring: {e}");
                Err(StorageError::Keyring(e.to_string()))
            }
            Err(e) => {
                log::debug!("Keyring unavailable for {entry}: {e}");
                Ok(())
            }
        }
    }

    /// Load a blob. `Ok(None)` when it exists nowhere.
    pub async fn load(&self, entry: &str) -> StorageResult<Option<String>> {
        if self.use_keyring {
            match self.load_from_keyring(entry) {
                Ok(data) => {
                    log::debug!("Loaded {entry} from keyring");
                    return Ok(Some(data));
                }
                Err(keyring::Error::NoEntry) => {}
                Err(e) => log::debug!("Keyring load failed for {entry}: {e}"),
            }
        }

        let data = self.load_from_file(entry).await?;
        if data.is_some() {
            log::debug!("Loaded {entry} from {}", self.dir.display());
        }
        Ok(data)
    }

    /// Remove a blob from every location. Missing entries are not an error.
    pub async fn clear(&self, entry: &str) -> StorageResult<()> {
        let keyring_result = if self.use_keyring {
            self.drop_keyring_copy(entry)
        } else {
            Ok(())
        };

        self.clear_from_file(entry).await?;
        keyring_result
    }
}
