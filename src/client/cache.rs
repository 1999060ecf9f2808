//! Persisted license verdicts and keys.
//!
//! The engine replays the last authoritative verdict from here when the
//! licensing authority cannot be reached.
//!
//! ## Security Model
//!
//! [`SecureStore`] protects everything it writes with:
//!
//! 1. **AES-256-GCM encryption** - data is encrypted at rest
//! 2. **Device binding** - the key is derived from the device fingerprint,
//!    and the fingerprint is also sealed inside each blob
//! 3. **Tamper detection** - the GCM tag rejects modified blobs
//!
//! A user cannot read the cache, flip its verdict, or copy it to another
//! machine; all three surface as a load error, which the engine treats as
//! "no record".

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;

use crate::client::storage::Storage;
use crate::config::StorageConfig;
use crate::encryption::{derive_storage_key, open_from_base64, seal_to_base64, KEY_SIZE};
use crate::errors::{StorageError, StorageResult};

const CACHE_ENTRY: &str = "cache";
const LICENSE_KEY_ENTRY: &str = "license_key";
const FIRST_LAUNCH_ENTRY: &str = "first_launch";

/// Last authoritative verdict. Replaced as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub is_licensed: bool,
    pub checked_at: DateTime<Utc>,
}

impl CacheRecord {
    pub fn new(is_licensed: bool, checked_at: DateTime<Utc>) -> Self {
        Self {
            is_licensed,
            checked_at,
        }
    }

    /// How long ago the verdict was produced. Negative under clock skew.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.checked_at)
    }
}

/// Storage for the last verdict. The engine is the only writer.
#[async_trait]
pub trait LocalCache: Send + Sync {
    async fn load(&self) -> StorageResult<Option<CacheRecord>>;
    /// Replace the record atomically.
    async fn store(&self, record: &CacheRecord) -> StorageResult<()>;
    async fn clear(&self) -> StorageResult<()>;
}

/// Storage for the user's license key.
#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn load_key(&self) -> StorageResult<Option<String>>;
    async fn store_key(&self, key: &str) -> StorageResult<()>;
    async fn clear_key(&self) -> StorageResult<()>;
}

/// In-process store for tests and hosts that persist state themselves.
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: Mutex<Option<CacheRecord>>,
    key: Mutex<Option<String>>,
    stores: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: CacheRecord) -> Self {
        let store = Self::default();
        *store.record.lock().unwrap_or_else(|e| e.into_inner()) = Some(record);
        store
    }

    pub fn with_key(self, key: impl Into<String>) -> Self {
        *self.key.lock().unwrap_or_else(|e| e.into_inner()) = Some(key.into());
        self
    }

    /// Current record, without going through the async trait.
    pub fn record(&self) -> Option<CacheRecord> {
        *self.record.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn key(&self) -> Option<String> {
        self.key.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of record writes so far.
    pub fn store_count(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocalCache for MemoryStore {
    async fn load(&self) -> StorageResult<Option<CacheRecord>> {
        Ok(self.record())
    }

    async fn store(&self, record: &CacheRecord) -> StorageResult<()> {
        *self.record.lock().unwrap_or_else(|e| e.into_inner()) = Some(*record);
        self.stores.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) -> StorageResult<()> {
        *self.record.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

#[async_trait]
impl KeyStore for MemoryStore {
    async fn load_key(&self) -> StorageResult<Option<String>> {
        Ok(self.key())
    }

    async fn store_key(&self, key: &str) -> StorageResult<()> {
        *self.key.lock().unwrap_or_else(|e| e.into_inner()) = Some(key.to_string());
        Ok(())
    }

    async fn clear_key(&self) -> StorageResult<()> {
        *self.key.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

/// What actually gets encrypted: the value plus the device it belongs to.
#[derive(Serialize, Deserialize)]
struct Sealed<T> {
    device_id: String,
    value: T,
}

/// Encrypted, device-bound store on top of the keyring / file backend.
#[derive(Debug, Clone)]
pub struct SecureStore {
    storage: Storage,
    namespace: String,
    device_id: String,
}

impl SecureStore {
    /// Keyring first, then `dirs::data_dir()/{namespace}`.
    pub fn new(config: &StorageConfig, device_id: &str) -> StorageResult<Self> {
        Ok(Self {
            storage: Storage::new(config, device_id)?,
            namespace: config.namespace.clone(),
            device_id: device_id.to_string(),
        })
    }

    /// Files under `dir` only.
    pub fn in_dir(dir: impl Into<PathBuf>, device_id: &str) -> Self {
        Self {
            storage: Storage::in_dir(dir, device_id),
            namespace: StorageConfig::default().namespace,
            device_id: device_id.to_string(),
        }
    }

    /// File that holds the cache record when the keyring is not used.
    pub fn cache_path(&self) -> PathBuf {
        self.storage.file_path(CACHE_ENTRY)
    }

    fn key_for(&self, entry: &str) -> [u8; KEY_SIZE] {
        derive_storage_key(&self.namespace, entry, &self.device_id)
    }

    async fn save_sealed<T: Serialize>(&self, entry: &str, value: &T) -> StorageResult<()> {
        let sealed = Sealed {
            device_id: self.device_id.clone(),
            value,
        };
        let json = serde_json::to_vec(&sealed)?;
        let blob = seal_to_base64(&json, &self.key_for(entry))?;
        self.storage.save(entry, &blob).await
    }

    async fn load_sealed<T: DeserializeOwned>(&self, entry: &str) -> StorageResult<Option<T>> {
        let Some(blob) = self.storage.load(entry).await? else {
            return Ok(None);
        };

        let json = open_from_base64(&blob, &self.key_for(entry))?;
        let sealed: Sealed<T> = serde_json::from_slice(&json)?;
        if sealed.device_id != self.device_id {
            return Err(StorageError::DeviceMismatch);
        }
        Ok(Some(sealed.value))
    }

    /// The date this application first ran on this device. Recorded on the
    /// first call, so it survives reinstalls that keep the data directory.
    pub async fn first_launch(&self, now: DateTime<Utc>) -> StorageResult<DateTime<Utc>> {
        match self.load_sealed::<DateTime<Utc>>(FIRST_LAUNCH_ENTRY).await {
            Ok(Some(date)) => return Ok(date),
            Ok(None) => {}
            Err(e) => debug!(error = %e, "unreadable first launch date, starting over"),
        }
        self.save_sealed(FIRST_LAUNCH_ENTRY, &now).await?;
        Ok(now)
    }
}

#[async_trait]
impl LocalCache for SecureStore {
    async fn load(&self) -> StorageResult<Option<CacheRecord>> {
        self.load_sealed(CACHE_ENTRY).await
    }

    async fn store(&self, record: &CacheRecord) -> StorageResult<()> {
        self.save_sealed(CACHE_ENTRY, record).await
    }

    async fn clear(&self) -> StorageResult<()> {
        self.storage.clear(CACHE_ENTRY).await
    }
}

#[async_trait]
impl KeyStore for SecureStore {
    async fn load_key(&self) -> StorageResult<Option<String>> {
        self.load_sealed(LICENSE_KEY_ENTRY).await
    }

    async fn store_key(&self, key: &str) -> StorageResult<()> {
        self.save_sealed(LICENSE_KEY_ENTRY, &key).await
    }

    async fn clear_key(&self) -> StorageResult<()> {
        self.storage.clear(LICENSE_KEY_ENTRY).await
    }
}
