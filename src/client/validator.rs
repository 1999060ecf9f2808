//! Remote license validation.
//!
//! [`RemoteValidator`] is the seam between the engine and the licensing
//! authority. One call is one request: no retries, no caching. Failures are
//! classified into the [`LicenseError`] taxonomy so the engine can tell an
//! authoritative "no" from an unreachable server.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::LicenseError;

/// What the engine asks the authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRequest {
    pub license_key: String,
    /// Stable device fingerprint, see [`crate::hardware::get_hardware_id`].
    pub device_id: String,
    pub product_id: String,
    /// Count this device as a new activation. Only set for user-initiated
    /// activation; routine checks never consume an activation.
    pub increment_activations: bool,
    /// Locally configured activation limit, used when a reply omits it.
    pub max_activations: u32,
}

/// A key the authority accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedLicense {
    pub key: String,
    pub activations: u32,
    /// Limit reported by the authority, if any.
    pub max_activations: Option<u32>,
    pub entitlements: Vec<String>,
}

impl ValidatedLicense {
    /// Limit that applies to this license given the local fallback.
    pub fn activation_limit(&self, configured: u32) -> u32 {
        self.max_activations.unwrap_or(configured)
    }

    /// `Err(InvalidActivationCount)` when more devices are active than allowed.
    pub fn check_activations(&self, configured: u32) -> Result<(), LicenseError> {
        let max_activations = self.activation_limit(configured);
        if self.activations > max_activations {
            return Err(LicenseError::InvalidActivationCount {
                activations: self.activations,
                max_activations,
            });
        }
        Ok(())
    }

    pub fn has_entitlement(&self, name: &str) -> bool {
        self.entitlements.iter().any(|e| e == name)
    }
}

/// Transient result of one validation round trip. Never persisted.
pub type ValidationOutcome = Result<ValidatedLicense, LicenseError>;

/// The licensing authority, as seen by the engine.
///
/// Implementations report transport problems (DNS, connect, timeout, 5xx,
/// unrecognized server faults) as [`LicenseError::NoInternetAndNoCache`] and
/// every definite verdict about the key as one of the authoritative variants.
#[async_trait]
pub trait RemoteValidator: Send + Sync {
    async fn validate(&self, request: &ValidationRequest) -> ValidationOutcome;
}

#[cfg(feature = "http")]
pub use http::HttpValidator;

#[cfg(feature = "http")]
mod http {
    use super::*;

    use reqwest::{Client, StatusCode};
    use tracing::{debug, info, warn};
    use uuid::Uuid;

    use crate::client::responses::{ServerErrorResponse, VerifyRequest, VerifyResponse};
    use crate::config::ServerConfig;
    use crate::errors::ConfigError;

    const VERIFY_PATH: &str = "/v1/licenses/verify";

    /// [`RemoteValidator`] over HTTPS.
    #[derive(Debug, Clone)]
    pub struct HttpValidator {
        client: Client,
        base_url: String,
    }

    impl HttpValidator {
        /// Build a validator for the configured authority. The client's own
        /// timeout matches the server section so a stuck connection is cut
        /// even when the engine's bound is longer.
        pub fn new(server: &ServerConfig) -> Result<Self, ConfigError> {
            let client = Client::builder()
                .timeout(server.timeout())
                .build()
                .map_err(|e| ConfigError::invalid(format!("cannot build HTTP client: {e}")))?;

            Ok(Self {
                client,
                base_url: server.url.trim_end_matches('/').to_string(),
            })
        }

        pub fn endpoint(&self) -> String {
            format!("{}{}", self.base_url, VERIFY_PATH)
        }

        fn transport(e: reqwest::Error) -> LicenseError {
            let what = if e.is_timeout() {
                "request timed out"
            } else if e.is_connect() {
                "could not connect to license server"
            } else {
                "request failed"
            };
            LicenseError::NoInternetAndNoCache(format!("{what}: {e}"))
        }

        fn interpret(
            status: StatusCode,
            body: &str,
            request: &ValidationRequest,
        ) -> ValidationOutcome {
            if let Ok(err) = serde_json::from_str::<ServerErrorResponse>(body) {
                if err.error.code.is_authoritative() || status.is_success() {
                    return Err(err
                        .error
                        .into_license_error(&request.license_key, request.max_activations));
                }
                return Err(LicenseError::NoInternetAndNoCache(format!(
                    "license server returned HTTP {status}: {}",
                    err.error.describe()
                )));
            }

            if status.is_success() {
                return match serde_json::from_str::<VerifyResponse>(body) {
                    Ok(resp) if resp.success => Ok(ValidatedLicense {
                        key: request.license_key.clone(),
                        activations: resp.activations,
                        max_activations: resp.max_activations,
                        entitlements: resp.entitlements,
                    }),
                    Ok(_) => Err(LicenseError::ServerResponseError(
                        "server reported success: false".to_string(),
                    )),
                    Err(e) => Err(LicenseError::ServerResponseError(format!(
                        "malformed verify response: {e}"
                    ))),
                };
            }

            if status == StatusCode::NOT_FOUND {
                return Err(LicenseError::KeyNotFound(request.license_key.clone()));
            }

            Err(LicenseError::NoInternetAndNoCache(format!(
                "license server returned HTTP {status}"
            )))
        }
    }

    #[async_trait]
    impl RemoteValidator for HttpValidator {
        async fn validate(&self, request: &ValidationRequest) -> ValidationOutcome {
            let request_id = Uuid::new_v4().to_string();
            let payload = VerifyRequest {
                product_id: &request.product_id,
                license_key: &request.license_key,
                device_id: &request.device_id,
                increment_activations: request.increment_activations,
            };

            debug!(
                request_id = %request_id,
                product_id = %request.product_id,
                increment = request.increment_activations,
                "verifying license"
            );

            let resp = self
                .client
                .post(self.endpoint())
                .header("x-request-id", &request_id)
                .json(&payload)
                .send()
                .await
                .map_err(|e| {
                    warn!(request_id = %request_id, error = %e, "license server unreachable");
                    Self::transport(e)
                })?;

            let status = resp.status();
            let body = resp.text().await.map_err(Self::transport)?;

            let outcome = Self::interpret(status, &body, request);
            match &outcome {
                Ok(license) => info!(
                    request_id = %request_id,
                    activations = license.activations,
                    "license verified"
                ),
                Err(e) => info!(
                    request_id = %request_id,
                    status = status.as_u16(),
                    code = e.code(),
                    "license not verified: {e}"
                ),
            }
            outcome
        }
    }

}
