//! Resource-name narrowing
//!
//! Applied by listers before any per-resource tag lookup. It only saves API
//! calls; a name match never makes a resource eligible on its own.

use std::fmt;
use std::str::FromStr;

/// Name pattern for a resource type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NameFilter {
    /// Every name matches, including resources without a name
    #[default]
    Any,
    /// Name must start with the given string
    Prefix(String),
    /// Name must contain the given string
    Contains(String),
}

impl NameFilter {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            NameFilter::Any => true,
            NameFilter::Prefix(p) => name.starts_with(p.as_str()),
            NameFilter::Contains(s) => name.contains(s.as_str()),
        }
    }

    /// Match an optional name. Unnamed resources only pass [`NameFilter::Any`].
    pub fn matches_opt(&self, name: Option<&str>) -> bool {
        match name {
            Some(n) => self.matches(n),
            None => matches!(self, NameFilter::Any),
        }
    }

    /// The literal prefix, if this filter can be pushed to a prefix-only API
    pub fn as_prefix(&self) -> Option<&str> {
        match self {
            NameFilter::Prefix(p) => Some(p),
            _ => None,
        }
    }
}

impl FromStr for NameFilter {
    type Err = std::convert::Infallible;

    /// `*` matches anything, `*foo*` is a substring match, `foo*` or plain
    /// `foo` is a prefix match.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s == "*" {
            return Ok(NameFilter::Any);
        }
        if let Some(inner) = s.strip_prefix('*').and_then(|r| r.strip_suffix('*')) {
            return Ok(NameFilter::Contains(inner.to_string()));
        }
        Ok(NameFilter::Prefix(s.trim_end_matches('*').to_string()))
    }
}

impl fmt::Display for NameFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameFilter::Any => f.write_str("*"),
            NameFilter::Prefix(p) => write!(f, "{p}*"),
            NameFilter::Contains(s) => write!(f, "*{s}*"),
        }
    }
}
