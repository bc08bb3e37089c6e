//! Sweep configuration
//!
//! [`SweepConfig`] composes the eligibility rules, per-kind name filters,
//! the lister selection and the executor knobs. The binary builds it from
//! CLI flags; tests build it directly.

use crate::wait::WaitPolicy;
use std::collections::BTreeMap;
use std::str::FromStr;
use tagsweep_common::defaults::{DEFAULT_CONCURRENCY, DEFAULT_QUEUE_CAPACITY};
use tagsweep_common::resource_kind::UnknownKind;
use tagsweep_common::{EligibilityConfig, NameFilter, ResourceKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid name filter '{0}' (expected KIND=PATTERN)")]
    MalformedNameFilter(String),

    #[error(transparent)]
    UnknownKind(#[from] UnknownKind),
}

/// A `KIND=PATTERN` pair from the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindNameFilter {
    pub kind: ResourceKind,
    pub filter: NameFilter,
}

impl FromStr for KindNameFilter {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, pattern) = s
            .split_once('=')
            .ok_or_else(|| ConfigError::MalformedNameFilter(s.to_string()))?;
        let kind: ResourceKind = kind.trim().parse()?;
        let filter = match pattern.trim().parse::<NameFilter>() {
            Ok(filter) => filter,
            Err(never) => match never {},
        };
        Ok(Self { kind, filter })
    }
}

/// Parse a comma-separated kind list, e.g. `vpc,nat-gateway`
pub fn parse_kinds(list: &str) -> Result<Vec<ResourceKind>, ConfigError> {
    let mut kinds = Vec::new();
    for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let kind: ResourceKind = name.parse()?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    Ok(kinds)
}

#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub eligibility: EligibilityConfig,
    /// Kinds without an entry match any name
    pub name_filters: BTreeMap<ResourceKind, NameFilter>,
    /// Listers to run, in this order
    pub kinds: Vec<ResourceKind>,
    /// Executor worker bound per stage
    pub concurrency: usize,
    /// Discovery merge queue capacity
    pub queue_capacity: usize,
    pub waits: WaitPolicy,
    /// Walk the plan without calling the provider
    pub dry_run: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            eligibility: EligibilityConfig::default(),
            name_filters: BTreeMap::new(),
            kinds: ResourceKind::defaults(),
            concurrency: DEFAULT_CONCURRENCY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            waits: WaitPolicy::default(),
            dry_run: true,
        }
    }
}

impl SweepConfig {
    pub fn with_name_filters(mut self, filters: impl IntoIterator<Item = KindNameFilter>) -> Self {
        for f in filters {
            self.name_filters.insert(f.kind, f.filter);
        }
        self
    }

    /// Add the IAM role lister if it is not already selected
    pub fn include_iam(mut self) -> Self {
        if !self.kinds.contains(&ResourceKind::IamRole) {
            self.kinds.push(ResourceKind::IamRole);
        }
        self
    }
}
