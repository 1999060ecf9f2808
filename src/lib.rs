//! Warden - license validation and freshness caching for desktop applications
//!
//! Warden answers one question at any point in time: is this application
//! licensed? Every answer comes with its provenance ([`Freshness`]): a fresh
//! reply from the licensing authority, a cached verdict replayed while
//! offline, or the conservative fallback. Trial usage is tracked alongside.
//!
//! # Features
//!
//! - `http` - [`HttpValidator`](client::validator::HttpValidator) talking to
//!   the licensing authority over HTTPS. Enabled by default.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use warden::{HttpValidator, LicenseEngine, SecureStore, WardenConfig};
//!
//! # async fn run() -> Result<(), warden::WardenError> {
//! let config = WardenConfig::load()?;
//! let device_id = warden::hardware::get_hardware_id();
//! let store = Arc::new(SecureStore::new(&config.storage, &device_id)?);
//! let first_launch = store.first_launch(chrono::Utc::now()).await?;
//!
//! let engine = LicenseEngine::from_config(
//!     &config,
//!     Arc::new(HttpValidator::new(&config.server)?),
//!     store.clone(),
//!     store,
//!     first_launch,
//! );
//!
//! let check = engine.check_license().await?;
//! if !check.state.may_run() {
//!     eprintln!("please purchase a license");
//! }
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod encryption;
pub mod errors;
pub mod hardware;
pub mod logging;

pub mod client {
    pub mod cache;
    pub mod engine;
    pub mod freshness;
    pub mod responses;
    pub mod state;
    pub mod storage;
    pub mod trial;
    pub mod validator;
}

pub use client::cache::{CacheRecord, KeyStore, LocalCache, MemoryStore, SecureStore};
pub use client::engine::LicenseEngine;
pub use client::freshness::{Freshness, FreshnessPolicy};
pub use client::state::{CheckStatus, LicenseCheck, LicenseState};
pub use client::trial::{TrialStatus, TrialTracker};
#[cfg(feature = "http")]
pub use client::validator::HttpValidator;
pub use client::validator::{RemoteValidator, ValidatedLicense, ValidationOutcome, ValidationRequest};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigFile, ConfigSource, LicenseConfig, WardenConfig};
pub use errors::{ConfigError, LicenseError, StorageError, WardenError, WardenResult};
