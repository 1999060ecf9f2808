//! Caller-facing license snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::client::freshness::Freshness;
use crate::client::trial::TrialStatus;
use crate::errors::LicenseError;

/// Authoritative, immutable answer to "is this application licensed?".
///
/// Safe to hand to UI layers as-is. Invariants held by [`LicenseState::new`]:
/// - `trial_is_active` and `is_licensed` are never both true;
/// - `freshness == None` implies `!is_licensed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseState {
    is_licensed: bool,
    freshness: Freshness,
    days_of_use: i64,
    days_of_use_ui: i64,
    trial_days: u32,
    trial_is_active: bool,
    determined_at: Option<DateTime<Utc>>,
}

impl LicenseState {
    pub fn new(
        is_licensed: bool,
        freshness: Freshness,
        trial: TrialStatus,
        determined_at: Option<DateTime<Utc>>,
    ) -> Self {
        let is_licensed = is_licensed && freshness != Freshness::None;
        Self {
            is_licensed,
            freshness,
            days_of_use: trial.days_of_use,
            days_of_use_ui: trial.days_of_use_ui,
            trial_days: trial.trial_days,
            trial_is_active: trial.trial_is_active && !is_licensed,
            determined_at,
        }
    }

    /// State before any check has run.
    pub fn unchecked(trial: TrialStatus) -> Self {
        Self::new(false, Freshness::None, trial, None)
    }

    pub fn is_licensed(&self) -> bool {
        self.is_licensed
    }

    pub fn freshness(&self) -> Freshness {
        self.freshness
    }

    pub fn days_of_use(&self) -> i64 {
        self.days_of_use
    }

    pub fn days_of_use_ui(&self) -> i64 {
        self.days_of_use_ui
    }

    pub fn trial_days(&self) -> u32 {
        self.trial_days
    }

    pub fn trial_is_active(&self) -> bool {
        self.trial_is_active
    }

    /// When the authority produced the verdict this state is based on.
    /// For `Cached` states this shows how old the replayed answer is.
    pub fn determined_at(&self) -> Option<DateTime<Utc>> {
        self.determined_at
    }

    /// The app may be used: licensed, or still inside the trial.
    pub fn may_run(&self) -> bool {
        self.is_licensed || self.trial_is_active
    }

    /// Where this state puts the engine's state machine.
    pub fn status(&self) -> CheckStatus {
        match self.freshness {
            Freshness::None => CheckStatus::Unchecked,
            f if f.is_degraded() => CheckStatus::Degraded,
            _ if self.is_licensed => CheckStatus::Licensed,
            _ => CheckStatus::Unlicensed,
        }
    }
}

/// Position in the validation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Unchecked,
    Checking,
    Licensed,
    Unlicensed,
    /// Terminal with `Cached` or `Fallback` freshness.
    Degraded,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CheckStatus::Unchecked => "unchecked",
            CheckStatus::Checking => "checking",
            CheckStatus::Licensed => "licensed",
            CheckStatus::Unlicensed => "unlicensed",
            CheckStatus::Degraded => "degraded",
        };
        f.write_str(s)
    }
}

/// Result of one license query: always a usable state, plus the reason when
/// something went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseCheck {
    pub state: LicenseState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<LicenseError>,
}

impl LicenseCheck {
    pub fn ok(state: LicenseState) -> Self {
        Self { state, error: None }
    }

    pub fn with_error(state: LicenseState, error: LicenseError) -> Self {
        Self {
            state,
            error: Some(error),
        }
    }
}
