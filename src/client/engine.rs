//! The license state machine.
//!
//! ```text
//! Unchecked ──check_license()──▶ Checking ──▶ Licensed | Unlicensed | Degraded
//! ```
//!
//! Every query resolves the license policy, reads the cached verdict and the
//! stored key, asks the authority (bounded by a timeout and abandonable by
//! [`LicenseEngine::shutdown`]) and reconciles the answers:
//!
//! | outcome                        | cache write     | emitted state            |
//! |--------------------------------|-----------------|--------------------------|
//! | valid, within activation limit | `{true, now}`   | licensed, `Fresh`        |
//! | authoritative negative         | `{false, now}`  | unlicensed, `Fresh`      |
//! | transport failure / timeout    | none            | record replayed, `Cached`|
//! | ... and no record              | none            | unlicensed, `Fallback`   |
//!
//! Concurrent queries share one round trip: a query that finds another in
//! flight waits for it and returns its result.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::cache::{CacheRecord, KeyStore, LocalCache};
use crate::client::freshness::FreshnessPolicy;
use crate::client::state::{CheckStatus, LicenseCheck, LicenseState};
use crate::client::trial::{TrialStatus, TrialTracker};
use crate::client::validator::{RemoteValidator, ValidationOutcome, ValidationRequest};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigSource, LicenseConfig, WardenConfig};
use crate::errors::{ConfigError, LicenseError, WardenError, WardenResult};
use crate::hardware::get_hardware_id;

/// Result of the last completed query, shared with callers that waited on it.
#[derive(Default)]
struct Flight {
    last: Option<LicenseCheck>,
}

#[derive(Default)]
struct Published {
    state: Option<LicenseState>,
    status: Option<CheckStatus>,
}

pub struct LicenseEngine {
    validator: Arc<dyn RemoteValidator>,
    cache: Arc<dyn LocalCache>,
    keys: Arc<dyn KeyStore>,
    config: Arc<dyn ConfigSource>,
    clock: Arc<dyn Clock>,
    first_launch: DateTime<Utc>,
    /// Fingerprinted on first use unless overridden.
    device_id: OnceLock<String>,
    timeout: Duration,
    /// Trial length of the last resolved policy; used by `state()`/`trial()`.
    trial_days: AtomicU32,
    shutdown: CancellationToken,
    completed: AtomicU64,
    flight: tokio::sync::Mutex<Flight>,
    published: Mutex<Published>,
}

impl LicenseEngine {
    pub fn new(
        validator: Arc<dyn RemoteValidator>,
        cache: Arc<dyn LocalCache>,
        keys: Arc<dyn KeyStore>,
        config: Arc<dyn ConfigSource>,
        first_launch: DateTime<Utc>,
    ) -> Self {
        let defaults = WardenConfig::default();
        let trial_days = config
            .initial_trial_days()
            .unwrap_or(defaults.license.trial_days);
        Self {
            validator,
            cache,
            keys,
            config,
            clock: Arc::new(SystemClock),
            first_launch,
            device_id: OnceLock::new(),
            timeout: defaults.server.timeout(),
            trial_days: AtomicU32::new(trial_days),
            shutdown: CancellationToken::new(),
            completed: AtomicU64::new(0),
            flight: tokio::sync::Mutex::new(Flight::default()),
            published: Mutex::new(Published::default()),
        }
    }

    /// Engine wired to the loaded settings: policy source, timeout and the
    /// initial trial length come from `config`.
    pub fn from_config(
        config: &WardenConfig,
        validator: Arc<dyn RemoteValidator>,
        cache: Arc<dyn LocalCache>,
        keys: Arc<dyn KeyStore>,
        first_launch: DateTime<Utc>,
    ) -> Self {
        Self::new(validator, cache, keys, config.license_source(), first_launch)
            .with_timeout(config.server.timeout())
            .with_trial_days(config.license.trial_days)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = OnceLock::from(device_id.into());
        self
    }

    /// Bound on one validation round trip.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Trial length reported before the first policy is resolved. Defaults to
    /// the source's [`initial_trial_days`](ConfigSource::initial_trial_days).
    pub fn with_trial_days(self, trial_days: u32) -> Self {
        self.trial_days.store(trial_days, Ordering::SeqCst);
        self
    }

    pub fn device_id(&self) -> &str {
        self.device_id.get_or_init(get_hardware_id)
    }

    /// Run one license query.
    ///
    /// `Err` only for a broken license policy; the cache is not touched and
    /// the status is left as it was. Everything else comes back as a
    /// [`LicenseCheck`], with the reason in `error` when the answer is not a
    /// clean one.
    pub async fn check_license(&self) -> Result<LicenseCheck, ConfigError> {
        let ticket = self.completed.load(Ordering::SeqCst);
        let mut flight = self.flight.lock().await;

        // A query finished while we waited: its answer is ours.
        if self.completed.load(Ordering::SeqCst) != ticket {
            if let Some(last) = &flight.last {
                debug!("joining completed license check");
                return Ok(last.clone());
            }
        }

        let result = self.run_check().await;
        flight.last = result.as_ref().ok().cloned();
        self.completed.fetch_add(1, Ordering::SeqCst);
        result
    }

    /// Run [`check_license`](Self::check_license) on the runtime so the
    /// caller is not blocked.
    pub fn spawn_check(self: Arc<Self>) -> JoinHandle<Result<LicenseCheck, ConfigError>> {
        tokio::spawn(async move { self.check_license().await })
    }

    /// Activate `key` on this device.
    ///
    /// Only a successful activation changes anything: the key is stored, the
    /// verdict cached and published. A rejected key or an unreachable server
    /// leaves the stored key, the cache and the published state as they were.
    pub async fn activate(&self, key: &str) -> WardenResult<LicenseCheck> {
        let mut flight = self.flight.lock().await;
        flight.last = None;

        let config = self.resolve_config().await?;
        let now = self.clock.now();
        let trial = TrialTracker::evaluate(self.first_launch, now, config.trial_days);

        let key = key.trim();
        if key.is_empty() {
            let current = self.replay(self.read_cache().await, trial, now);
            return Ok(LicenseCheck::with_error(
                current,
                LicenseError::KeyNotFound("license key is empty".to_string()),
            ));
        }

        let previous = self.status();
        self.set_status(CheckStatus::Checking);

        let request = self.request(key, &config, true);
        let outcome = self.call_validator(&request).await;

        match outcome.and_then(|license| license.check_activations(config.max_activations)) {
            Ok(()) => {
                self.keys.store_key(key).await.map_err(|e| {
                    error!(error = %e, "activated license key could not be stored");
                    self.set_status(previous);
                    WardenError::from(e)
                })?;
                self.write_cache(CacheRecord::new(true, now)).await;

                info!("license activated");
                let check = LicenseCheck::ok(self.verdict(true, trial, now));
                self.publish(&check.state);
                Ok(check)
            }
            Err(e) if e.is_authoritative() => {
                self.set_status(previous);
                info!(code = e.code(), "activation rejected: {e}");
                Ok(LicenseCheck::with_error(self.verdict(false, trial, now), e))
            }
            Err(e) => {
                self.set_status(previous);
                warn!("activation failed, license server unreachable: {e}");
                let current = self.replay(self.read_cache().await, trial, now);
                Ok(LicenseCheck::with_error(current, e))
            }
        }
    }

    /// Forget the license key and the cached verdict. Back to `Unchecked`.
    pub async fn deactivate(&self) -> WardenResult<()> {
        let mut flight = self.flight.lock().await;
        flight.last = None;

        let key_result = self.keys.clear_key().await;
        let cache_result = self.cache.clear().await;

        {
            let mut published = self.published.lock().unwrap_or_else(|e| e.into_inner());
            *published = Published::default();
        }

        key_result?;
        cache_result?;
        info!("license deactivated");
        Ok(())
    }

    /// Last published state, or the `Unchecked` state before any query.
    pub fn state(&self) -> LicenseState {
        let published = self.published.lock().unwrap_or_else(|e| e.into_inner());
        match &published.state {
            Some(state) => state.clone(),
            None => LicenseState::unchecked(self.trial()),
        }
    }

    pub fn status(&self) -> CheckStatus {
        let published = self.published.lock().unwrap_or_else(|e| e.into_inner());
        match (published.status, &published.state) {
            (Some(status), _) => status,
            (None, Some(state)) => state.status(),
            (None, None) => CheckStatus::Unchecked,
        }
    }

    /// Trial figures as of now.
    pub fn trial(&self) -> TrialStatus {
        TrialTracker::evaluate(
            self.first_launch,
            self.clock.now(),
            self.trial_days.load(Ordering::SeqCst),
        )
    }

    /// Abandon any round trip in flight. Later queries answer from the cache
    /// without touching the network.
    pub fn shutdown(&self) {
        info!("license engine shutting down");
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    async fn run_check(&self) -> Result<LicenseCheck, ConfigError> {
        let previous = self.status();
        self.set_status(CheckStatus::Checking);

        let config = match self.resolve_config().await {
            Ok(config) => config,
            Err(e) => {
                self.set_status(previous);
                return Err(e);
            }
        };

        let now = self.clock.now();
        let trial = TrialTracker::evaluate(self.first_launch, now, config.trial_days);
        let record = self.read_cache().await;

        let check = match self.read_key().await {
            None => {
                debug!("no license key stored, skipping remote validation");
                LicenseCheck::ok(self.replay(record, trial, now))
            }
            Some(key) => {
                let request = self.request(&key, &config, false);
                let outcome = self.call_validator(&request).await;
                self.reconcile(outcome, &config, record, trial, now).await
            }
        };

        self.publish(&check.state);
        info!(
            licensed = check.state.is_licensed(),
            freshness = %check.state.freshness(),
            trial_active = check.state.trial_is_active(),
            days_of_use = check.state.days_of_use(),
            "license check complete"
        );
        Ok(check)
    }

    async fn reconcile(
        &self,
        outcome: ValidationOutcome,
        config: &LicenseConfig,
        record: Option<CacheRecord>,
        trial: TrialStatus,
        now: DateTime<Utc>,
    ) -> LicenseCheck {
        match outcome.and_then(|license| license.check_activations(config.max_activations)) {
            Ok(()) => {
                self.write_cache(CacheRecord::new(true, now)).await;
                LicenseCheck::ok(self.verdict(true, trial, now))
            }
            Err(e) if e.is_authoritative() => {
                info!(code = e.code(), "license rejected by server: {e}");
                self.write_cache(CacheRecord::new(false, now)).await;
                LicenseCheck::with_error(self.verdict(false, trial, now), e)
            }
            Err(e) => {
                warn!("license server unreachable: {e}");
                let state = self.replay(record, trial, now);
                if record.is_some() {
                    LicenseCheck::ok(state)
                } else {
                    LicenseCheck::with_error(state, e)
                }
            }
        }
    }

    /// State for an answer the authority just gave.
    fn verdict(&self, is_licensed: bool, trial: TrialStatus, now: DateTime<Utc>) -> LicenseState {
        LicenseState::new(
            is_licensed,
            FreshnessPolicy::classify(true, None),
            trial,
            Some(now),
        )
    }

    /// State from local data only: the cached verdict, or the fallback.
    fn replay(
        &self,
        record: Option<CacheRecord>,
        trial: TrialStatus,
        now: DateTime<Utc>,
    ) -> LicenseState {
        let freshness = FreshnessPolicy::classify(false, record.map(|r| r.age(now)));
        LicenseState::new(
            record.is_some_and(|r| r.is_licensed),
            freshness,
            trial,
            record.map(|r| r.checked_at),
        )
    }

    fn request(&self, key: &str, config: &LicenseConfig, increment: bool) -> ValidationRequest {
        ValidationRequest {
            license_key: key.to_string(),
            device_id: self.device_id().to_string(),
            product_id: config.product_id.clone(),
            increment_activations: increment,
            max_activations: config.max_activations,
        }
    }

    async fn call_validator(&self, request: &ValidationRequest) -> ValidationOutcome {
        if self.shutdown.is_cancelled() {
            return Err(LicenseError::NoInternetAndNoCache(
                "license engine is shut down".to_string(),
            ));
        }

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(LicenseError::NoInternetAndNoCache(
                "validation abandoned: license engine shut down".to_string(),
            )),
            result = tokio::time::timeout(self.timeout, self.validator.validate(request)) => {
                match result {
                    Ok(outcome) => outcome,
                    Err(_) => Err(LicenseError::NoInternetAndNoCache(format!(
                        "license server did not answer within {:?}",
                        self.timeout
                    ))),
                }
            }
        }
    }

    async fn resolve_config(&self) -> Result<LicenseConfig, ConfigError> {
        let config = self.config.license_config().await.map_err(|e| {
            error!(error = %e, "license configuration rejected");
            e
        })?;
        self.trial_days.store(config.trial_days, Ordering::SeqCst);
        Ok(config)
    }

    async fn read_cache(&self) -> Option<CacheRecord> {
        match self.cache.load().await {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "ignoring unreadable license cache");
                None
            }
        }
    }

    async fn write_cache(&self, record: CacheRecord) {
        if let Err(e) = self.cache.store(&record).await {
            error!(error = %e, is_licensed = record.is_licensed, "failed to write license cache");
        }
    }

    async fn read_key(&self) -> Option<String> {
        match self.keys.load_key().await {
            Ok(key) => key.filter(|k| !k.trim().is_empty()),
            Err(e) => {
                warn!(error = %e, "ignoring unreadable license key");
                None
            }
        }
    }

    fn publish(&self, state: &LicenseState) {
        let mut published = self.published.lock().unwrap_or_else(|e| e.into_inner());
        published.status = Some(state.status());
        published.state = Some(state.clone());
    }

    fn set_status(&self, status: CheckStatus) {
        let mut published = self.published.lock().unwrap_or_else(|e| e.into_inner());
        published.status = Some(status);
    }
}
