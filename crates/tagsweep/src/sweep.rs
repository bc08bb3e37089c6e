//! The discover, plan, execute pipeline

use crate::config::SweepConfig;
use crate::discovery::{Discovered, DiscoveryCoordinator, DiscoveryError};
use crate::executor::{Executor, Outcome};
use crate::planner::{Plan, PlanError, plan};
use crate::provider::CloudApi;
use crate::report::RunSummary;
use crate::resource::Resource;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Everything a sweep produced
#[derive(Debug)]
pub struct SweepReport {
    pub resources: Vec<Resource>,
    /// Listers that failed or returned partial results
    pub discovery_error: Option<DiscoveryError>,
    pub plan: Plan,
    pub outcomes: Vec<Outcome>,
}

impl SweepReport {
    pub fn summary(&self) -> RunSummary {
        RunSummary::from_outcomes(&self.outcomes)
    }
}

pub struct Sweeper<A> {
    api: Arc<A>,
    config: SweepConfig,
    cancel: CancellationToken,
}

impl<A: CloudApi> Sweeper<A> {
    pub fn new(api: Arc<A>, config: SweepConfig) -> Self {
        Self {
            api,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Discover stale resources; nothing is deleted.
    pub async fn scan(&self, now: DateTime<Utc>) -> Discovered {
        DiscoveryCoordinator::new(Arc::clone(&self.api), self.config.eligibility.clone())
            .with_name_filters(self.config.name_filters.clone())
            .with_queue_capacity(self.config.queue_capacity)
            .with_cancellation(self.cancel.clone())
            .discover(&self.config.kinds, now)
            .await
    }

    /// Discover and build the deletion plan.
    pub async fn plan(&self, now: DateTime<Utc>) -> Result<(Discovered, Plan), PlanError> {
        let discovered = self.scan(now).await;
        let plan = plan(&discovered.resources)?;
        Ok((discovered, plan))
    }

    /// Discover, plan and execute.
    ///
    /// Partial discovery still proceeds with what was found. A planner
    /// cycle aborts before any deletion.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<SweepReport, PlanError> {
        let (discovered, plan) = self.plan(now).await?;
        if let Some(error) = &discovered.error {
            warn!(error = %error, "Discovery incomplete; sweeping what was found");
        }

        let outcomes = Executor::new(Arc::clone(&self.api))
            .with_concurrency(self.config.concurrency)
            .with_wait_policy(self.config.waits.clone())
            .with_cancellation(self.cancel.clone())
            .dry_run(self.config.dry_run)
            .execute(&plan)
            .await;

        let report = SweepReport {
            resources: discovered.resources,
            discovery_error: discovered.error,
            plan,
            outcomes,
        };
        let summary = report.summary();
        info!(
            deleted = summary.deleted,
            failed = summary.failed,
            skipped = summary.skipped,
            cancelled = summary.cancelled,
            dry_run = summary.dry_run,
            "Sweep finished"
        );
        Ok(report)
    }
}
