//! Configuration for Warden.
//!
//! Two layers:
//!
//! 1. [`WardenConfig`]: process settings (server URL, timeouts, storage,
//!    logging). Loaded with the following precedence:
//!    1. Environment variables (highest priority)
//!    2. `warden.toml` file
//!    3. Default values (lowest priority)
//! 2. [`LicenseConfig`]: the license policy document (trial length,
//!    activation limit, product). Supplied per query through a
//!    [`ConfigSource`] and validated structurally; malformed documents raise
//!    [`ConfigError::InvalidConfigDict`].
//!
//! Nothing here is global: the loaded values are handed to the engine,
//! validator and store explicitly.
//!
//! # Environment Variables
//!
//! - `WARDEN_SERVER_URL` - Licensing authority base URL
//! - `WARDEN_TIMEOUT_SECS` - Bound on a single validation round trip
//! - `WARDEN_STORAGE_NAMESPACE` - Keyring service / data directory name
//! - `WARDEN_USE_KEYRING` - Prefer the OS keyring over files
//! - `WARDEN_LOGGING_ENABLED` - Enable logging
//! - `WARDEN_LOG_LEVEL` - Log level (trace, debug, info, warn, error)
//! - `WARDEN_TRIAL_DAYS` - Trial length in days
//! - `WARDEN_MAX_ACTIVATIONS` - Activation limit per license
//! - `WARDEN_PRODUCT_ID` - Product identifier sent to the authority
//! - `WARDEN_LICENSE_CONFIG_FILE` - JSON license policy document to use instead

use async_trait::async_trait;
use config::Config;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::ConfigError;

/// Upper bound on the configured trial length.
pub const MAX_TRIAL_DAYS: u32 = 3650;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    /// Licensing authority configuration
    pub server: ServerConfig,
    /// Local persistence configuration
    pub storage: StorageConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Default license policy
    pub license: LicenseSection,
}

/// Licensing authority configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the licensing authority
    pub url: String,
    /// Bound on a single validation round trip, in seconds
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "https://licensing.example.com".to_string(),
            timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Local persistence configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Keyring service name and data directory name
    pub namespace: String,
    /// Try the OS keyring before falling back to files
    pub use_keyring: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            namespace: "warden".to_string(),
            use_keyring: true,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable logging
    pub enabled: bool,
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "info".to_string(),
        }
    }
}

/// Default license policy, used when no external document is configured.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LicenseSection {
    pub trial_days: u32,
    pub max_activations: u32,
    pub product_id: String,
    /// Path of a JSON license policy document that overrides the values above
    pub config_file: Option<String>,
}

impl Default for LicenseSection {
    fn default() -> Self {
        Self {
            trial_days: 30,
            max_activations: 3,
            product_id: "warden-app".to_string(),
            config_file: None,
        }
    }
}

fn cfg_err(e: config::ConfigError) -> ConfigError {
    ConfigError::invalid(e.to_string())
}

impl WardenConfig {
    /// Load configuration from `warden.toml` (optional) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(config::File::with_name("warden").required(false))
    }

    /// Load configuration from an explicit file and the environment.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with(config::File::from(path).required(true))
    }

    fn load_with<S>(file: S) -> Result<Self, ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let defaults = WardenConfig::default();

        let builder = Config::builder()
            // Start with defaults
            .set_default("server.url", defaults.server.url)
            .map_err(cfg_err)?
            .set_default("server.timeout_secs", defaults.server.timeout_secs as i64)
            .map_err(cfg_err)?
            .set_default("storage.namespace", defaults.storage.namespace)
            .map_err(cfg_err)?
            .set_default("storage.use_keyring", defaults.storage.use_keyring)
            .map_err(cfg_err)?
            .set_default("logging.enabled", defaults.logging.enabled)
            .map_err(cfg_err)?
            .set_default("logging.level", defaults.logging.level)
            .map_err(cfg_err)?
            .set_default("license.trial_days", defaults.license.trial_days as i64)
            .map_err(cfg_err)?
            .set_default("license.max_activations", defaults.license.max_activations as i64)
            .map_err(cfg_err)?
            .set_default("license.product_id", defaults.license.product_id)
            .map_err(cfg_err)?
            .add_source(file)
            // Override with environment variables
            .set_override_option("server.url", env::var("WARDEN_SERVER_URL").ok())
            .map_err(cfg_err)?
            .set_override_option(
                "server.timeout_secs",
                env::var("WARDEN_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(cfg_err)?
            .set_override_option(
                "storage.namespace",
                env::var("WARDEN_STORAGE_NAMESPACE").ok(),
            )
            .map_err(cfg_err)?
            .set_override_option(
                "storage.use_keyring",
                env::var("WARDEN_USE_KEYRING")
                    .ok()
                    .and_then(|v| v.parse::<bool>().ok()),
            )
            .map_err(cfg_err)?
            .set_override_option(
                "logging.enabled",
                env::var("WARDEN_LOGGING_ENABLED")
                    .ok()
                    .and_then(|v| v.parse::<bool>().ok()),
            )
            .map_err(cfg_err)?
            .set_override_option("logging.level", env::var("WARDEN_LOG_LEVEL").ok())
            .map_err(cfg_err)?
            .set_override_option(
                "license.trial_days",
                env::var("WARDEN_TRIAL_DAYS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(cfg_err)?
            .set_override_option(
                "license.max_activations",
                env::var("WARDEN_MAX_ACTIVATIONS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(cfg_err)?
            .set_override_option("license.product_id", env::var("WARDEN_PRODUCT_ID").ok())
            .map_err(cfg_err)?
            .set_override_option(
                "license.config_file",
                env::var("WARDEN_LICENSE_CONFIG_FILE").ok(),
            )
            .map_err(cfg_err)?;

        let settings = builder
            .build()
            .map_err(|e| ConfigError::invalid(format!("failed to build config: {e}")))?;

        let config: WardenConfig = settings
            .try_deserialize()
            .map_err(|e| ConfigError::invalid(format!("failed to deserialize config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.url.trim().is_empty() {
            return Err(ConfigError::invalid("server.url cannot be empty"));
        }
        if !(self.server.url.starts_with("http://") || self.server.url.starts_with("https://")) {
            return Err(ConfigError::invalid(format!(
                "server.url must start with http:// or https://, got '{}'",
                self.server.url
            )));
        }
        if self.server.timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "server.timeout_secs must be greater than 0",
            ));
        }

        if self.storage.namespace.trim().is_empty() {
            return Err(ConfigError::invalid("storage.namespace cannot be empty"));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::invalid(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        // Only the inline policy is checked here; an external document is
        // validated each time it is read.
        if self.license.config_file.is_none() {
            self.inline_license_config().validate()?;
        }

        Ok(())
    }

    fn inline_license_config(&self) -> LicenseConfig {
        LicenseConfig {
            trial_days: self.license.trial_days,
            max_activations: self.license.max_activations,
            product_id: self.license.product_id.clone(),
        }
    }

    /// The source the engine should consult for the license policy.
    pub fn license_source(&self) -> Arc<dyn ConfigSource> {
        match &self.license.config_file {
            Some(path) => Arc::new(ConfigFile::new(path)),
            None => Arc::new(self.inline_license_config()),
        }
    }
}

/// License policy document.
///
/// Wire shape:
///
/// ```json
/// { "trial_days": 30, "max_activations": 3, "product_id": "my-app" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LicenseConfig {
    /// Total length of the trial, in days
    pub trial_days: u32,
    /// Number of devices one license may be activated on
    pub max_activations: u32,
    /// Product identifier the authority knows the license under
    pub product_id: String,
}

impl LicenseConfig {
    /// Build a validated configuration.
    pub fn new(
        trial_days: u32,
        max_activations: u32,
        product_id: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            trial_days,
            max_activations,
            product_id: product_id.into(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a configuration document.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, ConfigError> {
        if !value.is_object() {
            return Err(ConfigError::invalid(
                "license configuration must be a JSON object",
            ));
        }

        let config: LicenseConfig = serde_json::from_value(value.clone())
            .map_err(|e| ConfigError::invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a configuration document from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| ConfigError::invalid(format!("not valid JSON: {e}")))?;
        Self::from_value(&value)
    }

    /// Range checks on an already well-typed document.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trial_days == 0 || self.trial_days > MAX_TRIAL_DAYS {
            return Err(ConfigError::invalid(format!(
                "trial_days must be between 1 and {MAX_TRIAL_DAYS}, got {}",
                self.trial_days
            )));
        }
        if self.max_activations == 0 {
            return Err(ConfigError::invalid(
                "max_activations must be greater than 0",
            ));
        }
        if self.product_id.trim().is_empty() {
            return Err(ConfigError::invalid("product_id cannot be empty"));
        }
        Ok(())
    }
}

/// Supplies the license policy for each query.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn license_config(&self) -> Result<LicenseConfig, ConfigError>;

    /// Trial length known without resolving the policy. Reported by the
    /// engine before its first query.
    fn initial_trial_days(&self) -> Option<u32> {
        None
    }
}

#[async_trait]
impl ConfigSource for LicenseConfig {
    async fn license_config(&self) -> Result<LicenseConfig, ConfigError> {
        self.validate()?;
        Ok(self.clone())
    }

    fn initial_trial_days(&self) -> Option<u32> {
        Some(self.trial_days)
    }
}

/// A JSON policy document on disk, re-read on every query.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigSource for ConfigFile {
    async fn license_config(&self) -> Result<LicenseConfig, ConfigError> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ConfigError::invalid(format!("cannot read {}: {e}", self.path.display()))
        })?;
        LicenseConfig::from_json(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_well_formed_document() {
        let config = LicenseConfig::from_value(&json!({
            "trial_days": 30,
            "max_activations": 3,
            "product_id": "mouse-app"
        }))
        .expect("valid document");

        assert_eq!(config.trial_days, 30);
        assert_eq!(config.max_activations, 3);
        assert_eq!(config.product_id, "mouse-app");
    }

    #[test]
    fn rejects_non_object_root() {
        let err = LicenseConfig::from_value(&json!([30, 3])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfigDict(_)));
    }

    #[test]
    fn rejects_wrong_types_and_missing_fields() {
        assert!(LicenseConfig::from_value(&json!({
            "trial_days": "thirty",
            "max_activations": 3,
            "product_id": "p"
        }))
        .is_err());

        assert!(LicenseConfig::from_value(&json!({
            "trial_days": 30,
            "product_id": "p"
        }))
        .is_err());

        assert!(LicenseConfig::from_value(&json!({
            "trial_days": -1,
            "max_activations": 3,
            "product_id": "p"
        }))
        .is_err());
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = LicenseConfig::from_value(&json!({
            "trial_days": 30,
            "max_activations": 3,
            "product_id": "p",
            "price": 5
        }))
        .unwrap_err();
        assert!(err.to_string().contains("price"));
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(LicenseConfig::new(0, 3, "p").is_err());
        assert!(LicenseConfig::new(MAX_TRIAL_DAYS + 1, 3, "p").is_err());
        assert!(LicenseConfig::new(30, 0, "p").is_err());
        assert!(LicenseConfig::new(30, 3, "  ").is_err());
        assert!(LicenseConfig::new(30, 3, "p").is_ok());
    }

    #[test]
    fn from_json_reports_syntax_errors_as_config_errors() {
        let err = LicenseConfig::from_json("{ trial_days: ").unwrap_err();
        assert_eq!(err.code(), 1);
    }

    #[test]
    fn default_warden_config_is_valid() {
        WardenConfig::default()
            .validate()
            .expect("defaults must validate");
    }

    #[test]
    fn validate_rejects_bad_settings() {
        let mut config = WardenConfig::default();
        config.server.url = "ftp://licensing".to_string();
        assert!(config.validate().is_err());

        let mut config = WardenConfig::default();
        config.server.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = WardenConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = WardenConfig::default();
        config.license.trial_days = 0;
        assert!(config.validate().is_err());

        // external document: inline policy is not consulted
        config.license.config_file = Some("policy.json".to_string());
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn inline_policy_is_its_own_source() {
        let config = LicenseConfig::new(14, 2, "p").unwrap();
        let resolved = config.license_config().await.unwrap();
        assert_eq!(resolved, config);

        let broken = LicenseConfig {
            trial_days: 0,
            max_activations: 2,
            product_id: "p".to_string(),
        };
        assert!(broken.license_config().await.is_err());
    }

    #[test]
    fn only_inline_policy_knows_its_trial_length_up_front() {
        let inline = LicenseConfig::new(7, 3, "app").unwrap();
        assert_eq!(inline.initial_trial_days(), Some(7));
        assert_eq!(ConfigFile::new("/nonexistent/policy.json").initial_trial_days(), None);
    }

    #[tokio::test]
    async fn missing_config_file_is_a_config_error() {
        let source = ConfigFile::new("/nonexistent/warden-policy.json");
        let err = source.license_config().await.unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfigDict(_)));
    }
}
