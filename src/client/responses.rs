//! Wire types for the licensing authority API.
//!
//! These types match the server's JSON format. They are parsed by
//! [`HttpValidator`](crate::client::validator::HttpValidator) and turned into
//! [`ValidatedLicense`](crate::client::validator::ValidatedLicense) or a
//! [`LicenseError`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::LicenseError;

/// Body of `POST /v1/licenses/verify`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct VerifyRequest<'a> {
    pub product_id: &'a str,
    pub license_key: &'a str,
    pub device_id: &'a str,
    pub increment_activations: bool,
}

/// Successful reply of the verify endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct VerifyResponse {
    pub success: bool,
    #[serde(default)]
    pub activations: u32,
    #[serde(default)]
    pub max_activations: Option<u32>,
    #[serde(default)]
    pub entitlements: Vec<String>,
}

/// Error codes returned by the licensing authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerErrorCode {
    /// Key unknown to the authority
    KeyNotFound,
    /// Key is syntactically wrong or belongs to another product
    InvalidKey,
    /// Too many devices activated
    ActivationLimit,
    Revoked,
    Refunded,
    Disputed,
    Chargeback,
    /// Unknown error code (forward compatibility)
    #[serde(other)]
    Unknown,
}

impl ServerErrorCode {
    pub fn default_message(&self) -> &'static str {
        match self {
            ServerErrorCode::KeyNotFound => "License key not found",
            ServerErrorCode::InvalidKey => "License key is invalid",
            ServerErrorCode::ActivationLimit => "Activation limit reached",
            ServerErrorCode::Revoked => "License has been revoked",
            ServerErrorCode::Refunded => "License purchase was refunded",
            ServerErrorCode::Disputed => "License purchase is disputed",
            ServerErrorCode::Chargeback => "License purchase was charged back",
            ServerErrorCode::Unknown => "Unknown error",
        }
    }

    /// A definite "no" about the license itself. Unknown codes may be server
    /// faults (`INTERNAL_ERROR`, `DATABASE_ERROR`, ...).
    pub fn is_authoritative(&self) -> bool {
        !matches!(self, ServerErrorCode::Unknown)
    }
}

impl fmt::Display for ServerErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.default_message())
    }
}

/// The inner error body from a server API error response.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ServerErrorBody {
    pub code: ServerErrorCode,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub activations: Option<u32>,
    #[serde(default)]
    pub max_activations: Option<u32>,
}

/// Server API error response wrapper.
///
/// ```json
/// { "error": { "code": "REFUNDED", "message": "Purchase was refunded" } }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ServerErrorResponse {
    pub error: ServerErrorBody,
}

impl ServerErrorBody {
    pub fn describe(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| self.code.default_message().to_string())
    }

    /// Map an authoritative error reply onto the license taxonomy.
    pub fn into_license_error(self, license_key: &str, fallback_limit: u32) -> LicenseError {
        match self.code {
            ServerErrorCode::KeyNotFound | ServerErrorCode::InvalidKey => {
                LicenseError::KeyNotFound(format!("{license_key}: {}", self.describe()))
            }
            ServerErrorCode::ActivationLimit => {
                let max_activations = self.max_activations.unwrap_or(fallback_limit);
                LicenseError::InvalidActivationCount {
                    activations: self
                        .activations
                        .unwrap_or_else(|| max_activations.saturating_add(1)),
                    max_activations,
                }
            }
            ServerErrorCode::Unknown => LicenseError::ServerResponseError(self.describe()),
            code => LicenseError::ServerResponseError(format!("{:?}: {}", code, self.describe())),
        }
    }
}
