//! Freshness tiers and the policy that picks one.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Provenance of an `is_licensed` determination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    /// No determination has been made yet.
    #[default]
    None,
    /// Answered by the licensing authority during this session.
    Fresh,
    /// Replayed from the local cache because the authority was unreachable.
    Cached,
    /// Neither authority nor cache available; conservative default applied.
    Fallback,
}

impl Freshness {
    /// `Cached` and `Fallback` are the degraded tiers.
    pub fn is_degraded(self) -> bool {
        matches!(self, Freshness::Cached | Freshness::Fallback)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Freshness::None => "none",
            Freshness::Fresh => "fresh",
            Freshness::Cached => "cached",
            Freshness::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decides which tier applies after a validation attempt.
pub struct FreshnessPolicy;

impl FreshnessPolicy {
    /// `cache_age` is `Some` iff a cached record exists. Its value is not
    /// used to reject the record: stale verdicts are still `Cached`, and the
    /// caller sees the age through the state's timestamp.
    pub fn classify(network_answered: bool, cache_age: Option<Duration>) -> Freshness {
        if network_answered {
            Freshness::Fresh
        } else if cache_age.is_some() {
            Freshness::Cached
        } else {
            Freshness::Fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_answer_wins() {
        assert_eq!(FreshnessPolicy::classify(true, None), Freshness::Fresh);
        assert_eq!(
            FreshnessPolicy::classify(true, Some(Duration::days(3))),
            Freshness::Fresh
        );
    }

    #[test]
    fn any_record_is_cached_regardless_of_age() {
        for age in [
            Duration::zero(),
            Duration::days(400),
            Duration::hours(-2), // clock skew
        ] {
            assert_eq!(FreshnessPolicy::classify(false, Some(age)), Freshness::Cached);
        }
    }

    #[test]
    fn nothing_to_fall_back_on() {
        assert_eq!(FreshnessPolicy::classify(false, None), Freshness::Fallback);
    }

    #[test]
    fn degraded_tiers() {
        assert!(!Freshness::None.is_degraded());
        assert!(!Freshness::Fresh.is_degraded());
        assert!(Freshness::Cached.is_degraded());
        assert!(Freshness::Fallback.is_degraded());
    }

    #[test]
    fn serializes_as_snake_case() {
        assert_eq!(serde_json::to_string(&Freshness::Fallback).unwrap(), "\"fallback\"");
        assert_eq!(Freshness::default(), Freshness::None);
        assert_eq!(Freshness::Cached.to_string(), "cached");
    }
}
