//! Tag and configuration fixtures

use chrono::{Duration, Utc};
use std::time::Duration as StdDuration;
use tagsweep::SweepConfig;
use tagsweep::wait::{WaitConfig, WaitPolicy};
use tagsweep_common::TagSet;
use tagsweep_common::tags::{DEFAULT_AGE_KEY, DEFAULT_OWNER_KEY, NAME_TAG, format_age_marker};

fn tags_aged(owner: &str, age: Duration) -> TagSet {
    [
        (DEFAULT_OWNER_KEY.to_string(), owner.to_string()),
        (DEFAULT_AGE_KEY.to_string(), format_age_marker(Utc::now() - age)),
    ]
    .into_iter()
    .collect()
}

/// Owned by `owner` and two days old
pub fn stale_tags(owner: &str) -> TagSet {
    tags_aged(owner, Duration::hours(48))
}

/// Owned by `owner` but only an hour old
pub fn fresh_tags(owner: &str) -> TagSet {
    tags_aged(owner, Duration::hours(1))
}

/// Old enough but created by something else
pub fn foreign_tags() -> TagSet {
    tags_aged("prod-deploy", Duration::hours(48))
}

/// Add a `Name` tag
pub fn named(mut tags: TagSet, name: &str) -> TagSet {
    tags.insert(NAME_TAG, name);
    tags
}

/// Millisecond waits so stuck targets time out quickly
pub fn fast_waits() -> WaitPolicy {
    WaitPolicy::uniform(WaitConfig::new(
        StdDuration::from_millis(1),
        StdDuration::from_millis(5),
        StdDuration::from_millis(100),
    ))
}

/// Default kinds plus IAM, deleting for real, fast waits
pub fn test_config() -> SweepConfig {
    SweepConfig {
        waits: fast_waits(),
        dry_run: false,
        ..SweepConfig::default()
    }
    .include_iam()
}

/// Get the AWS region for tests.
///
/// Checks `AWS_REGION`, then `AWS_DEFAULT_REGION`, then falls back to
/// us-east-2.
pub fn get_test_region() -> String {
    std::env::var("AWS_REGION")
        .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
        .unwrap_or_else(|_| "us-east-2".to_string())
}

/// Unique id for resources created by live tests: `test-{timestamp_ms}-{n}`
pub fn test_run_id() -> String {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let ts = Utc::now().timestamp_millis();
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("test-{ts}-{counter}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagsweep_common::{EligibilityConfig, is_stale};

    #[test]
    fn fixtures_classify_as_named() {
        let config = EligibilityConfig::default();
        let now = Utc::now();
        assert!(is_stale(&stale_tags("ci-1"), &config, now));
        assert!(!is_stale(&fresh_tags("ci-1"), &config, now));
        assert!(!is_stale(&foreign_tags(), &config, now));
    }

    #[test]
    fn named_sets_name_tag() {
        assert_eq!(named(TagSet::new(), "vpc-a").name(), Some("vpc-a"));
    }

    #[test]
    fn run_ids_are_unique() {
        let a = test_run_id();
        let b = test_run_id();
        assert!(a.starts_with("test-"));
        assert_ne!(a, b);
    }
}
