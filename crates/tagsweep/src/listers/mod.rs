//! Per-type resource listers
//!
//! Each lister queries the provider for one [`ResourceKind`], narrows by
//! name before any extra tag lookups, applies the staleness predicate, and
//! resolves the child identifiers composite resources need for ordered
//! deletion. A lister returns whatever it found plus an optional
//! [`ListerError`]; partial results are never thrown away.

mod clusters;
mod eips;
mod instances;
mod log_groups;
mod nat;
mod roles;
mod vpc;

use crate::provider::CloudApi;
use crate::resource::Resource;
use chrono::{DateTime, Utc};
use std::fmt;
use tagsweep_common::{EligibilityConfig, NameFilter, ResourceKind, TagSet};
use thiserror::Error;
use tracing::debug;

pub use clusters::list_clusters;
pub use eips::list_elastic_ips;
pub use instances::list_instances;
pub use log_groups::list_log_groups;
pub use nat::list_nat_gateways;
pub use roles::list_roles;
pub use vpc::list_vpcs;

/// Narrowing every lister applies before emitting a resource
#[derive(Debug, Clone)]
pub struct CandidateFilter {
    pub eligibility: EligibilityConfig,
    /// Name narrowing for this lister's kind
    pub name: NameFilter,
    /// Reference time for age checks, fixed for the whole run
    pub now: DateTime<Utc>,
}

impl CandidateFilter {
    pub fn new(eligibility: EligibilityConfig, name: NameFilter, now: DateTime<Utc>) -> Self {
        Self {
            eligibility,
            name,
            now,
        }
    }

    /// Name filter plus staleness, for providers that return tags inline
    pub(crate) fn accepts(&self, kind: ResourceKind, id: &str, tags: &TagSet) -> bool {
        if !self.name.matches_opt(tags.name()) {
            debug!(resource_type = %kind, resource_id = %id, "Skipping: name filter");
            return false;
        }
        self.is_stale(kind, id, tags)
    }

    pub(crate) fn is_stale(&self, kind: ResourceKind, id: &str, tags: &TagSet) -> bool {
        let stale = tagsweep_common::is_stale(tags, &self.eligibility, self.now);
        if !stale {
            debug!(resource_type = %kind, resource_id = %id, "Skipping: not stale");
        }
        stale
    }
}

/// A child lookup or per-resource tag fetch that failed inside a lister
#[derive(Debug)]
pub struct ChildFailure {
    pub resource_id: String,
    pub error: anyhow::Error,
}

impl fmt::Display for ChildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:#}", self.resource_id, self.error)
    }
}

/// Why a lister's output is incomplete
#[derive(Debug, Error)]
pub enum ListerError {
    /// The enumeration call itself failed
    #[error("listing failed: {0:#}")]
    Provider(anyhow::Error),

    /// Enumeration succeeded but some per-resource lookups did not
    #[error("{} lookup(s) failed: {}", .failures.len(), join_failures(.failures))]
    Partial { failures: Vec<ChildFailure> },
}

fn join_failures(failures: &[ChildFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ListerError {
    /// Combine recorded child failures into an error, if there were any
    pub(crate) fn from_failures(failures: Vec<ChildFailure>) -> Option<Self> {
        (!failures.is_empty()).then_some(ListerError::Partial { failures })
    }
}

/// Output of one lister: partial results plus an optional error.
#[derive(Debug, Default)]
pub struct Listing {
    pub resources: Vec<Resource>,
    pub error: Option<ListerError>,
}

impl Listing {
    pub(crate) fn new(resources: Vec<Resource>, failures: Vec<ChildFailure>) -> Self {
        Self {
            resources,
            error: ListerError::from_failures(failures),
        }
    }

    pub(crate) fn failed(resources: Vec<Resource>, error: anyhow::Error) -> Self {
        Self {
            resources,
            error: Some(ListerError::Provider(error)),
        }
    }
}

/// Run the lister for `kind`.
pub async fn run_lister<A: CloudApi>(
    kind: ResourceKind,
    api: &A,
    filter: &CandidateFilter,
) -> Listing {
    match kind {
        ResourceKind::Instances => list_instances(api, filter).await,
        ResourceKind::ContainerCluster => list_clusters(api, filter).await,
        ResourceKind::NatGateway => list_nat_gateways(api, filter).await,
        ResourceKind::Vpc => list_vpcs(api, filter).await,
        ResourceKind::ElasticIp => list_elastic_ips(api, filter).await,
        ResourceKind::LogGroup => list_log_groups(api, filter).await,
        ResourceKind::IamRole => list_roles(api, filter).await,
    }
}
