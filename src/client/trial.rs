//! Trial usage tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const SECONDS_PER_DAY: i64 = 86_400;

/// Trial figures for one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialStatus {
    /// Whole days since first launch (floor). Negative under clock skew.
    pub days_of_use: i64,
    /// `days_of_use` clamped to `[0, trial_days]` for display.
    pub days_of_use_ui: i64,
    /// Configured trial length.
    pub trial_days: u32,
    /// `days_of_use < trial_days`. Does not know about licenses; the engine
    /// clears it when a license is valid.
    pub trial_is_active: bool,
}

impl TrialStatus {
    /// Days left as shown to the user.
    pub fn days_remaining(&self) -> i64 {
        i64::from(self.trial_days) - self.days_of_use_ui
    }
}

pub struct TrialTracker;

impl TrialTracker {
    pub fn evaluate(first_launch: DateTime<Utc>, now: DateTime<Utc>, trial_days: u32) -> TrialStatus {
        let elapsed = now.signed_duration_since(first_launch);
        // Euclidean division floors towards -inf, so 1s before first launch is day -1.
        let days_of_use = elapsed.num_seconds().div_euclid(SECONDS_PER_DAY);
        let trial_days_i = i64::from(trial_days);

        TrialStatus {
            days_of_use,
            days_of_use_ui: days_of_use.clamp(0, trial_days_i),
            trial_days,
            trial_is_active: days_of_use < trial_days_i,
        }
    }
}
