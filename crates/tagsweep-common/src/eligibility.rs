//! Staleness predicate
//!
//! A resource is stale when its origin marker starts with the configured
//! prefix and its age marker is strictly older than `min_age`. Ownership gates
//! staleness: the age marker is not even parsed for resources we don't own.

use crate::tags::{self, DEFAULT_AGE_KEY, DEFAULT_OWNER_KEY, DEFAULT_OWNER_PREFIX, TagSet};
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EligibilityError {
    #[error("minimum age of {0} hours is out of range")]
    MinAgeOutOfRange(u64),
}

/// Convert an hour count into a minimum age without wrapping or panicking.
pub fn min_age_from_hours(hours: u64) -> Result<Duration, EligibilityError> {
    i64::try_from(hours)
        .ok()
        .and_then(Duration::try_hours)
        .ok_or(EligibilityError::MinAgeOutOfRange(hours))
}

/// Which tags mark a resource as ours and how old it must be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibilityConfig {
    /// Tag key holding the origin marker
    pub owner_key: String,
    /// Required prefix of the origin marker value
    pub owner_prefix: String,
    /// Tag key holding the Unix-seconds creation timestamp
    pub age_key: String,
    /// Minimum age before a resource may be reclaimed
    pub min_age: Duration,
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        Self {
            owner_key: DEFAULT_OWNER_KEY.to_string(),
            owner_prefix: DEFAULT_OWNER_PREFIX.to_string(),
            age_key: DEFAULT_AGE_KEY.to_string(),
            min_age: Duration::hours(crate::defaults::DEFAULT_MIN_AGE_HOURS as i64),
        }
    }
}

/// Outcome of evaluating a tag set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Owned and older than `min_age`
    Stale { age: Duration },
    /// Owned but not old enough yet (includes markers in the future)
    TooYoung { age: Duration },
    /// Origin marker absent or not matching the prefix
    NotOwned,
    /// Owned, but the age marker is absent
    MissingAgeMarker,
    /// Owned, but the age marker is not a Unix timestamp
    UnparsableAgeMarker { raw: String },
}

impl Verdict {
    pub fn is_stale(&self) -> bool {
        matches!(self, Verdict::Stale { .. })
    }
}

/// Evaluate a tag set against `config` at the instant `now`.
///
/// Pure: the same inputs always yield the same verdict.
pub fn evaluate(tags: &TagSet, config: &EligibilityConfig, now: DateTime<Utc>) -> Verdict {
    let owned = tags
        .get(&config.owner_key)
        .is_some_and(|origin| origin.starts_with(&config.owner_prefix));
    if !owned {
        return Verdict::NotOwned;
    }

    let Some(raw) = tags.get(&config.age_key) else {
        return Verdict::MissingAgeMarker;
    };

    match tags::parse_age_marker(raw) {
        Some(created) => {
            let age = now - created;
            // A negative minimum age would make everything we own stale.
            if config.min_age >= Duration::zero() && age > config.min_age {
                Verdict::Stale { age }
            } else {
                Verdict::TooYoung { age }
            }
        }
        None => Verdict::UnparsableAgeMarker {
            raw: raw.to_string(),
        },
    }
}

/// Boolean form of [`evaluate`] that reports unparsable age markers.
///
/// An unparsable marker is never treated as stale; it is logged at `warn` so
/// an operator can fix the tagging.
pub fn is_stale(tags: &TagSet, config: &EligibilityConfig, now: DateTime<Utc>) -> bool {
    match evaluate(tags, config, now) {
        Verdict::Stale { .. } => true,
        Verdict::UnparsableAgeMarker { raw } => {
            warn!(
                age_key = %config.age_key,
                value = %raw,
                "Ignoring resource with unparsable age marker"
            );
            false
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EligibilityConfig {
        EligibilityConfig {
            owner_key: "origin".to_string(),
            owner_prefix: "ci-".to_string(),
            age_key: "created".to_string(),
            min_age: Duration::hours(2),
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn tags(origin: Option<&str>, created: Option<&str>) -> TagSet {
        let mut t = TagSet::new();
        if let Some(o) = origin {
            t.insert("origin", o);
        }
        if let Some(c) = created {
            t.insert("created", c);
        }
        t
    }

    fn created_secs_ago(secs: i64) -> String {
        (now().timestamp() - secs).to_string()
    }

    #[test]
    fn exactly_min_age_is_not_stale() {
        let t = tags(Some("ci-123"), Some(&created_secs_ago(2 * 3600)));
        assert!(matches!(evaluate(&t, &config(), now()), Verdict::TooYoung { .. }));
        assert!(!is_stale(&t, &config(), now()));
    }

    #[test]
    fn one_second_past_min_age_is_stale() {
        let t = tags(Some("ci-123"), Some(&created_secs_ago(2 * 3600 + 1)));
        assert_eq!(
            evaluate(&t, &config(), now()),
            Verdict::Stale {
                age: Duration::seconds(2 * 3600 + 1)
            }
        );
        assert!(is_stale(&t, &config(), now()));
    }

    #[test]
    fn unparsable_marker_is_not_stale() {
        let t = tags(Some("matching-prefix-x"), Some("not-a-number"));
        let cfg = EligibilityConfig {
            owner_prefix: "matching-prefix".to_string(),
            ..config()
        };
        assert_eq!(
            evaluate(&t, &cfg, now()),
            Verdict::UnparsableAgeMarker {
                raw: "not-a-number".to_string()
            }
        );
        assert!(!is_stale(&t, &cfg, now()));
    }

    #[test]
    fn ownership_short_circuits_before_age() {
        // Garbage age marker never matters when the origin doesn't match
        let t = tags(Some("prod-1"), Some("garbage"));
        assert_eq!(evaluate(&t, &config(), now()), Verdict::NotOwned);

        let t = tags(None, Some(&created_secs_ago(100 * 3600)));
        assert_eq!(evaluate(&t, &config(), now()), Verdict::NotOwned);
    }

    #[test]
    fn missing_age_marker() {
        let t = tags(Some("ci-1"), None);
        assert_eq!(evaluate(&t, &config(), now()), Verdict::MissingAgeMarker);
        assert!(!is_stale(&t, &config(), now()));
    }

    #[test]
    fn future_marker_is_too_young() {
        let t = tags(Some("ci-1"), Some(&created_secs_ago(-600)));
        assert!(matches!(
            evaluate(&t, &config(), now()),
            Verdict::TooYoung { .. }
        ));
    }

    #[test]
    fn evaluation_is_deterministic() {
        let t = tags(Some("ci-1"), Some(&created_secs_ago(3 * 3600)));
        let first = evaluate(&t, &config(), now());
        for _ in 0..10 {
            assert_eq!(evaluate(&t, &config(), now()), first);
        }
    }

    #[test]
    fn negative_min_age_never_makes_anything_stale() {
        let cfg = EligibilityConfig {
            min_age: Duration::hours(-1),
            ..config()
        };
        let brand_new = tags(Some("ci-1"), Some(&created_secs_ago(0)));
        assert!(!is_stale(&brand_new, &cfg, now()));
        let ancient = tags(Some("ci-1"), Some(&created_secs_ago(1000 * 3600)));
        assert!(!is_stale(&ancient, &cfg, now()));
    }

    #[test]
    fn min_age_hours_are_range_checked() {
        assert_eq!(min_age_from_hours(24), Ok(Duration::hours(24)));
        assert_eq!(min_age_from_hours(0), Ok(Duration::zero()));
        assert_eq!(
            min_age_from_hours(u64::MAX),
            Err(EligibilityError::MinAgeOutOfRange(u64::MAX))
        );
        // Fits in i64 but overflows the duration range
        assert!(min_age_from_hours(i64::MAX as u64).is_err());
    }

    #[test]
    fn prefix_match_is_case_sensitive() {
        let t = tags(Some("CI-1"), Some(&created_secs_ago(3 * 3600)));
        assert_eq!(evaluate(&t, &config(), now()), Verdict::NotOwned);
    }
}
