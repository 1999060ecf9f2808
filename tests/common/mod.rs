//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use warden::{
    LicenseError, RemoteValidator, ValidatedLicense, ValidationOutcome, ValidationRequest,
};

/// First launch used by every scenario.
pub fn d0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
}

pub fn day(n: i64) -> DateTime<Utc> {
    d0() + chrono::Duration::days(n)
}

pub fn valid(activations: u32, max_activations: Option<u32>) -> ValidationOutcome {
    Ok(ValidatedLicense {
        key: "KEY".to_string(),
        activations,
        max_activations,
        entitlements: vec!["pro".to_string()],
    })
}

pub fn offline() -> ValidationOutcome {
    Err(LicenseError::NoInternetAndNoCache(
        "dns error: no such host".to_string(),
    ))
}

/// Validator that replays queued outcomes and counts calls. An empty queue
/// behaves like an unreachable server.
pub struct ScriptedValidator {
    outcomes: Mutex<VecDeque<ValidationOutcome>>,
    requests: Mutex<Vec<ValidationRequest>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedValidator {
    pub fn new(outcomes: Vec<ValidationOutcome>) -> Arc<Self> {
        Self::delayed(outcomes, Duration::ZERO)
    }

    /// Every call sleeps `delay` before answering.
    pub fn delayed(outcomes: Vec<ValidationOutcome>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ValidationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteValidator for ScriptedValidator {
    async fn validate(&self, request: &ValidationRequest) -> ValidationOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(offline)
    }
}
