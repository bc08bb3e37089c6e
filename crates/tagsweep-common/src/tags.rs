//! Normalized tag map and tag-key defaults
//!
//! Every provider exposes tags in its own shape (EC2 `Tag`, IAM `Tag`, ECS
//! `Tag`, CloudWatch Logs `HashMap`). Listers convert to [`TagSet`] once, right
//! after fetching, so nothing downstream branches on provider shapes.
//!
//! ## Default Tag Schema
//!
//! | Tag Key | Description |
//! |---------|-------------|
//! | `tagsweep:origin` | Pipeline/run that created the resource (owner marker) |
//! | `tagsweep:created-at` | Unix timestamp in seconds (age marker) |
//! | `Name` | Human-readable name used by EC2 name filters |

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Default tag key carrying the origin (ownership) marker
pub const DEFAULT_OWNER_KEY: &str = "tagsweep:origin";

/// Default required prefix of the origin marker value
pub const DEFAULT_OWNER_PREFIX: &str = "ci-";

/// Default tag key carrying the creation timestamp
pub const DEFAULT_AGE_KEY: &str = "tagsweep:created-at";

/// Tag key EC2 uses for display names
pub const NAME_TAG: &str = "Name";

/// Mapping from tag key to value; keys are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet(BTreeMap<String, String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tag set from any provider tag type.
    ///
    /// Entries with a missing key or value are dropped.
    pub fn collect_from<T>(
        tags: &[T],
        key: impl Fn(&T) -> Option<&str>,
        value: impl Fn(&T) -> Option<&str>,
    ) -> Self {
        tags.iter()
            .filter_map(|t| match (key(t), value(t)) {
                (Some(k), Some(v)) => Some((k.to_string(), v.to_string())),
                _ => None,
            })
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The `Name` tag, if present
    pub fn name(&self) -> Option<&str> {
        self.get(NAME_TAG)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Format an age-marker value (Unix seconds)
pub fn format_age_marker(time: DateTime<Utc>) -> String {
    time.timestamp().to_string()
}

/// Parse an age-marker value as Unix seconds.
///
/// Surrounding whitespace is tolerated; anything else returns `None`.
pub fn parse_age_marker(s: &str) -> Option<DateTime<Utc>> {
    let secs: i64 = s.trim().parse().ok()?;
    DateTime::from_timestamp(secs, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse_roundtrip() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(parse_age_marker(&format_age_marker(now)), Some(now));
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_age_marker("not a timestamp").is_none());
        assert!(parse_age_marker("").is_none());
        assert!(parse_age_marker("2024-01-01T00:00:00Z").is_none());
        assert!(parse_age_marker("12.5").is_none());
    }

    #[test]
    fn test_parse_tolerates_whitespace() {
        assert_eq!(
            parse_age_marker(" 1700000000\n").map(|t| t.timestamp()),
            Some(1_700_000_000)
        );
    }

    #[test]
    fn collect_from_drops_incomplete_entries() {
        let raw = vec![
            (Some("a"), Some("1")),
            (None, Some("2")),
            (Some("c"), None),
            (Some("d"), Some("4")),
        ];
        let tags = TagSet::collect_from(&raw, |t| t.0, |t| t.1);
        assert_eq!(tags.len(), 2);
        assert_eq!(tags.get("a"), Some("1"));
        assert_eq!(tags.get("d"), Some("4"));
        assert!(!tags.contains_key("c"));
    }

    #[test]
    fn later_duplicate_keys_win() {
        let tags: TagSet = [("k", "old"), ("k", "new")].into_iter().collect();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags.get("k"), Some("new"));
    }
}
