//! Error taxonomy for Warden.
//!
//! Three independent namespaces:
//!
//! - [`LicenseError`]: everything a license check can conclude besides "valid".
//!   Always delivered next to a usable [`LicenseState`](crate::client::state::LicenseState),
//!   never as a bare failure of `check_license`.
//! - [`ConfigError`]: structural problems with the license configuration blob.
//!   Fatal to the current check only.
//! - [`StorageError`]: persistence problems in the cache / key store adapters.
//!
//! [`WardenError`] wraps all three for operations that span layers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures of a license check.
///
/// Each variant carries a cause meant for diagnostics and support requests.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum LicenseError {
    /// The authority counts more activations than the license permits.
    #[error("license activated on {activations} devices, limit is {max_activations}")]
    InvalidActivationCount {
        activations: u32,
        max_activations: u32,
    },

    /// The authority answered, but told us something is wrong with the license
    /// (revoked, refunded, disputed, wrong key, malformed reply).
    #[error("license server rejected the license: {0}")]
    ServerResponseError(String),

    /// The submitted key does not exist in the authority's records.
    #[error("license key not found: {0}")]
    KeyNotFound(String),

    /// The authority could not be reached and nothing was cached.
    ///
    /// Validators also use this variant to signal transport failures; the
    /// engine decides whether a cached verdict makes it moot.
    #[error("no internet connection and no cached license: {0}")]
    NoInternetAndNoCache(String),
}

impl LicenseError {
    /// Error domain shared with non-Rust consumers.
    pub const DOMAIN: &'static str = "LicenseErrorDomain";

    /// Stable numeric code. Code 1 is retired and never produced.
    pub fn code(&self) -> i32 {
        match self {
            LicenseError::InvalidActivationCount { .. } => 2,
            LicenseError::ServerResponseError(_) => 3,
            LicenseError::KeyNotFound(_) => 4,
            LicenseError::NoInternetAndNoCache(_) => 5,
        }
    }

    /// True when the error came from the transport, not from the authority.
    pub fn is_transport(&self) -> bool {
        matches!(self, LicenseError::NoInternetAndNoCache(_))
    }

    /// True when the authority explicitly denied the license.
    pub fn is_authoritative(&self) -> bool {
        !self.is_transport()
    }
}

/// Structural problems with license configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ConfigError {
    /// The configuration document is missing fields, has wrong types or
    /// out-of-range values.
    #[error("invalid license configuration: {0}")]
    InvalidConfigDict(String),
}

impl ConfigError {
    /// Error domain shared with non-Rust consumers.
    pub const DOMAIN: &'static str = "LicenseConfigErrorDomain";

    /// Stable numeric code.
    pub fn code(&self) -> i32 {
        match self {
            ConfigError::InvalidConfigDict(_) => 1,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ConfigError::InvalidConfigDict(msg.into())
    }
}

/// Failures of the local persistence adapters.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("decryption error: {0}")]
    Decryption(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("keyring error: {0}")]
    Keyring(String),

    /// The stored data belongs to another device.
    #[error("stored data does not belong to this device")]
    DeviceMismatch,
}

/// Umbrella error for operations spanning several layers.
#[derive(Debug, Error)]
pub enum WardenError {
    #[error(transparent)]
    License(#[from] LicenseError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Convenience alias used throughout the crate.
pub type WardenResult<T> = Result<T, WardenError>;

/// Result alias for storage adapters.
pub type StorageResult<T> = Result<T, StorageError>;
