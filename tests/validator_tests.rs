#![cfg(feature = "http")]

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{d0, day};
use warden::config::ServerConfig;
use warden::{
    CacheRecord, Freshness, HttpValidator, KeyStore, LicenseConfig, LicenseEngine, LicenseError,
    LocalCache, ManualClock, MemoryStore, RemoteValidator, SecureStore, ValidationRequest,
};

const VERIFY: &str = "/v1/licenses/verify";

fn validator_for(url: &str, timeout_secs: u64) -> HttpValidator {
    HttpValidator::new(&ServerConfig {
        url: url.to_string(),
        timeout_secs,
    })
    .expect("client builds")
}

fn request(increment: bool) -> ValidationRequest {
    ValidationRequest {
        license_key: "ABCD-1234".to_string(),
        device_id: "device-1".to_string(),
        product_id: "warden-test".to_string(),
        increment_activations: increment,
        max_activations: 3,
    }
}

async fn respond(template: ResponseTemplate) -> (MockServer, HttpValidator) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(VERIFY))
        .respond_with(template)
        .mount(&server)
        .await;
    let validator = validator_for(&server.uri(), 2);
    (server, validator)
}

#[tokio::test]
async fn sends_request_fields_and_request_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(VERIFY))
        .and(header_exists("x-request-id"))
        .and(body_partial_json(json!({
            "product_id": "warden-test",
            "license_key": "ABCD-1234",
            "device_id": "device-1",
            "increment_activations": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "activations": 2,
            "max_activations": 5,
            "entitlements": ["pro", "export"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let license = validator_for(&server.uri(), 2)
        .validate(&request(true))
        .await
        .expect("license verifies");

    assert_eq!(license.key, "ABCD-1234");
    assert_eq!(license.activations, 2);
    assert_eq!(license.max_activations, Some(5));
    assert!(license.has_entitlement("export"));
}

#[tokio::test]
async fn error_codes_map_to_license_errors() {
    let cases: [(&str, u16, &str); 8] = [
        ("KEY_NOT_FOUND", 404, "key_not_found"),
        ("INVALID_KEY", 400, "key_not_found"),
        ("ACTIVATION_LIMIT", 403, "invalid_activation_count"),
        ("REVOKED", 403, "server_response_error"),
        ("REFUNDED", 200, "server_response_error"),
        ("DISPUTED", 402, "server_response_error"),
        ("CHARGEBACK", 402, "server_response_error"),
        ("BRAND_NEW_CODE", 200, "server_response_error"),
    ];

    for (code, status, expected) in cases {
        let (_server, validator) = respond(
            ResponseTemplate::new(status)
                .set_body_json(json!({ "error": { "code": code, "message": "from server" } })),
        )
        .await;

        let err = validator.validate(&request(false)).await.unwrap_err();
        let kind = serde_json::to_value(&err).unwrap()["kind"].clone();
        assert_eq!(kind, expected, "code {code} with HTTP {status}");
        assert!(err.is_authoritative());
    }
}

#[tokio::test]
async fn malformed_success_is_a_server_response_error() {
    let (_server, validator) =
        respond(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>")).await;
    let err = validator.validate(&request(false)).await.unwrap_err();
    assert!(matches!(err, LicenseError::ServerResponseError(_)));

    let (_server, validator) =
        respond(ResponseTemplate::new(200).set_body_json(json!({ "success": false }))).await;
    let err = validator.validate(&request(false)).await.unwrap_err();
    assert!(matches!(err, LicenseError::ServerResponseError(_)));
}

#[tokio::test]
async fn bare_not_found_means_unknown_key() {
    let (_server, validator) = respond(ResponseTemplate::new(404)).await;
    let err = validator.validate(&request(false)).await.unwrap_err();
    assert!(matches!(err, LicenseError::KeyNotFound(ref k) if k == "ABCD-1234"));
}

#[tokio::test]
async fn server_errors_without_body_are_transport_failures() {
    for status in [500u16, 502, 503] {
        let (_server, validator) = respond(ResponseTemplate::new(status)).await;
        let err = validator.validate(&request(false)).await.unwrap_err();
        assert!(err.is_transport(), "HTTP {status} should be transport");
    }
}

#[tokio::test]
async fn server_fault_bodies_are_transport_failures() {
    for code in ["INTERNAL_ERROR", "DATABASE_ERROR", "BRAND_NEW_CODE"] {
        let (_server, validator) = respond(
            ResponseTemplate::new(500u16)
                .set_body_json(json!({ "error": { "code": code, "message": "An unexpected error occurred" } })),
        )
        .await;
        let err = validator.validate(&request(false)).await.unwrap_err();
        assert!(err.is_transport(), "code {code} with HTTP 500 should be transport");
    }
}

#[tokio::test]
async fn slow_server_is_a_transport_failure() {
    let (server, _) = respond(
        ResponseTemplate::new(200)
            .set_body_json(json!({ "success": true, "activations": 1 }))
            .set_delay(Duration::from_secs(3)),
    )
    .await;

    let err = validator_for(&server.uri(), 1)
        .validate(&request(false))
        .await
        .unwrap_err();
    assert!(matches!(err, LicenseError::NoInternetAndNoCache(_)));
}

#[tokio::test]
async fn unreachable_server_is_a_transport_failure() {
    // Bind and release a port so nothing listens on it.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let uri = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let err = validator_for(&uri, 2)
        .validate(&request(false))
        .await
        .unwrap_err();
    assert!(matches!(err, LicenseError::NoInternetAndNoCache(_)));
}

#[tokio::test]
async fn engine_over_http_and_disk() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(VERIFY))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": { "code": "REFUNDED", "message": "order refunded" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let store = Arc::new(SecureStore::in_dir(dir.path(), "device-1"));
    store.store_key("ABCD-1234").await.unwrap();
    store.store(&CacheRecord::new(true, day(1))).await.unwrap();

    let engine = LicenseEngine::new(
        Arc::new(validator_for(&server.uri(), 2)),
        store.clone(),
        store.clone(),
        Arc::new(LicenseConfig::new(14, 3, "warden-test").unwrap()),
        d0(),
    )
    .with_clock(Arc::new(ManualClock::new(day(3))))
    .with_device_id("device-1");

    let check = engine.check_license().await.unwrap();
    assert!(!check.state.is_licensed());
    assert_eq!(check.state.freshness(), Freshness::Fresh);
    assert!(matches!(check.error, Some(LicenseError::ServerResponseError(ref m)) if m.contains("order refunded")));
    assert_eq!(store.load().await.unwrap(), Some(CacheRecord::new(false, day(3))));
}

#[tokio::test]
async fn server_outage_keeps_cached_license() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(VERIFY))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": { "code": "INTERNAL_ERROR", "message": "An unexpected error occurred" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let record = CacheRecord::new(true, day(1));
    let store = Arc::new(MemoryStore::with_record(record).with_key("ABCD-1234"));
    let engine = LicenseEngine::new(
        Arc::new(validator_for(&server.uri(), 2)),
        store.clone(),
        store.clone(),
        Arc::new(LicenseConfig::new(14, 3, "warden-test").unwrap()),
        d0(),
    )
    .with_clock(Arc::new(ManualClock::new(day(3))))
    .with_device_id("device-1");

    let check = engine.check_license().await.unwrap();
    assert!(check.state.is_licensed());
    assert_eq!(check.state.freshness(), Freshness::Cached);
    assert_eq!(check.state.determined_at(), Some(day(1)));
    assert_eq!(store.record(), Some(record));
    assert_eq!(store.store_count(), 0);
}
