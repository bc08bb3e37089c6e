//! Discovery coordinator
//!
//! Runs one task per enabled lister on a [`JoinSet`] and fans their results
//! into a bounded queue. The queue is drained while the listers run, so a
//! full queue blocks producers instead of dropping resources. Once every
//! sender is gone the join barrier collects each lister's error; a failing
//! lister never hides what its siblings found.

use crate::listers::{CandidateFilter, ListerError, run_lister};
use crate::provider::CloudApi;
use crate::resource::Resource;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tagsweep_common::defaults::DEFAULT_QUEUE_CAPACITY;
use tagsweep_common::{EligibilityConfig, NameFilter, ResourceKind};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Aggregate of every lister that failed or returned partial results
#[derive(Debug, Error)]
#[error("{} lister(s) reported errors{}", .failures.len(), format_failures(.failures))]
pub struct DiscoveryError {
    pub failures: Vec<(ResourceKind, ListerError)>,
}

fn format_failures(failures: &[(ResourceKind, ListerError)]) -> String {
    failures
        .iter()
        .map(|(kind, error)| format!("\n  {kind}: {error}"))
        .collect()
}

impl DiscoveryError {
    pub fn failed_kinds(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.failures.iter().map(|(kind, _)| *kind)
    }
}

/// Result of one discovery pass: partial results plus the combined error.
#[derive(Debug, Default)]
pub struct Discovered {
    /// Ordered by lister position, then by the order each lister emitted
    pub resources: Vec<Resource>,
    pub error: Option<DiscoveryError>,
    /// Listers never started because the run was cancelled
    pub skipped: Vec<ResourceKind>,
}

/// One queued resource with the keys that make the merge order stable
struct Queued {
    position: usize,
    seq: usize,
    resource: Resource,
}

pub struct DiscoveryCoordinator<A> {
    api: Arc<A>,
    eligibility: EligibilityConfig,
    name_filters: BTreeMap<ResourceKind, NameFilter>,
    queue_capacity: usize,
    cancel: CancellationToken,
}

impl<A: CloudApi> DiscoveryCoordinator<A> {
    pub fn new(api: Arc<A>, eligibility: EligibilityConfig) -> Self {
        Self {
            api,
            eligibility,
            name_filters: BTreeMap::new(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_name_filters(mut self, filters: BTreeMap<ResourceKind, NameFilter>) -> Self {
        self.name_filters = filters;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn filter_for(&self, kind: ResourceKind, now: DateTime<Utc>) -> CandidateFilter {
        CandidateFilter::new(
            self.eligibility.clone(),
            self.name_filters.get(&kind).cloned().unwrap_or_default(),
            now,
        )
    }

    /// Run the listers for `kinds` concurrently and merge their output.
    pub async fn discover(&self, kinds: &[ResourceKind], now: DateTime<Utc>) -> Discovered {
        let (tx, mut rx) = mpsc::channel::<Queued>(self.queue_capacity);
        let mut tasks = JoinSet::new();
        let mut task_kinds = HashMap::new();
        let mut skipped = Vec::new();

        for (position, &kind) in kinds.iter().enumerate() {
            if self.cancel.is_cancelled() {
                skipped.push(kind);
                continue;
            }

            let api = Arc::clone(&self.api);
            let tx = tx.clone();
            let filter = self.filter_for(kind, now);

            let handle = tasks.spawn(async move {
                debug!(resource_type = %kind, "Lister started");
                let listing = run_lister(kind, api.as_ref(), &filter).await;
                let found = listing.resources.len();
                for (seq, resource) in listing.resources.into_iter().enumerate() {
                    let queued = Queued {
                        position,
                        seq,
                        resource,
                    };
                    if tx.send(queued).await.is_err() {
                        break;
                    }
                }
                debug!(resource_type = %kind, found, "Lister finished");
                (kind, listing.error)
            });
            task_kinds.insert(handle.id(), kind);
        }
        drop(tx);

        if !skipped.is_empty() {
            info!(skipped = ?skipped, "Cancelled; listers not dispatched");
        }

        let mut queued = Vec::new();
        while let Some(item) = rx.recv().await {
            queued.push(item);
        }

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((kind, Some(error))) => {
                    warn!(resource_type = %kind, error = %error, "Lister reported errors");
                    failures.push((kind, error));
                }
                Ok((_, None)) => {}
                Err(join_error) => {
                    let Some(&kind) = task_kinds.get(&join_error.id()) else {
                        warn!(error = %join_error, "Unknown lister task failed");
                        continue;
                    };
                    warn!(resource_type = %kind, error = %join_error, "Lister task failed");
                    failures.push((
                        kind,
                        ListerError::Provider(anyhow::anyhow!("lister task failed: {join_error}")),
                    ));
                }
            }
        }
        failures.sort_by_key(|(kind, _)| kinds.iter().position(|k| k == kind));

        queued.sort_by_key(|q| (q.position, q.seq));
        let resources: Vec<Resource> = queued.into_iter().map(|q| q.resource).collect();
        info!(
            found = resources.len(),
            failed_listers = failures.len(),
            "Discovery finished"
        );

        Discovered {
            resources,
            error: (!failures.is_empty()).then_some(DiscoveryError { failures }),
            skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_lists_every_failed_kind() {
        let error = DiscoveryError {
            failures: vec![
                (
                    ResourceKind::Vpc,
                    ListerError::Provider(anyhow::anyhow!("throttled")),
                ),
                (
                    ResourceKind::LogGroup,
                    ListerError::Provider(anyhow::anyhow!("denied")),
                ),
            ],
        };
        let rendered = error.to_string();
        assert_eq!(rendered.lines().count(), 3);
        assert!(std::error::Error::source(&error).is_none());
        assert!(rendered.starts_with("2 lister(s) reported errors"));
        assert!(rendered.contains("vpc: listing failed: throttled"));
        assert!(rendered.contains("log-group: listing failed: denied"));
        assert_eq!(
            error.failed_kinds().collect::<Vec<_>>(),
            vec![ResourceKind::Vpc, ResourceKind::LogGroup]
        );
    }
}
