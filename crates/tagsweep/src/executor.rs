//! Deletion executor
//!
//! Walks the plan stage by stage. Targets in a stage run concurrently on a
//! bounded pool, each as delete-then-wait; the next stage starts only when
//! every target of the current one is terminal. A target whose prerequisite
//! did not end up deleted is skipped, never attempted.

use crate::aws::error::classify_anyhow_error;
use crate::planner::{NodeId, Plan};
use crate::provider::CloudApi;
use crate::resource::Target;
use crate::wait::{WaitPolicy, wait_for_resource};
use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use tagsweep_common::defaults::DEFAULT_CONCURRENCY;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Terminal status of one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Confirmed gone (including "already deleted")
    Deleted,
    /// Delete rejected, status check failed or wait timed out
    Failed(String),
    /// A prerequisite was not deleted, so this target was not attempted
    SkippedDependencyFailed,
    /// Not attempted because the run was cancelled
    Cancelled,
    /// Would have been deleted
    DryRun,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Deleted => "deleted",
            Status::Failed(_) => "failed",
            Status::SkippedDependencyFailed => "skipped-dependency-failed",
            Status::Cancelled => "cancelled",
            Status::DryRun => "dry-run",
        }
    }

    pub fn cause(&self) -> Option<&str> {
        match self {
            Status::Failed(cause) => Some(cause),
            _ => None,
        }
    }

    /// Dependents may proceed only after these
    fn clears_dependents(&self) -> bool {
        matches!(self, Status::Deleted | Status::DryRun)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Failed(cause) => write!(f, "failed: {cause}"),
            other => f.write_str(other.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub target: Target,
    pub status: Status,
}

pub struct Executor<A> {
    api: Arc<A>,
    concurrency: usize,
    waits: WaitPolicy,
    cancel: CancellationToken,
    dry_run: bool,
}

impl<A: CloudApi> Executor<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            concurrency: DEFAULT_CONCURRENCY,
            waits: WaitPolicy::default(),
            cancel: CancellationToken::new(),
            dry_run: false,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_wait_policy(mut self, waits: WaitPolicy) -> Self {
        self.waits = waits;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Execute every stage and return one outcome per planned target, in
    /// stage order.
    pub async fn execute(&self, plan: &Plan) -> Vec<Outcome> {
        let mut statuses: Vec<Option<Status>> = vec![None; plan.len()];

        for (stage_idx, stage) in plan.stages.iter().enumerate() {
            let mut runnable: Vec<NodeId> = Vec::with_capacity(stage.len());

            for &id in stage {
                let node = plan.node(id);
                let blocked = node
                    .depends_on
                    .iter()
                    .any(|&dep| !statuses[dep].as_ref().is_some_and(Status::clears_dependents));
                if blocked {
                    debug!(resource = %node.target, "Skipping: prerequisite not deleted");
                    statuses[id] = Some(Status::SkippedDependencyFailed);
                } else if self.cancel.is_cancelled() {
                    statuses[id] = Some(Status::Cancelled);
                } else {
                    runnable.push(id);
                }
            }

            if runnable.is_empty() {
                continue;
            }
            info!(
                stage = stage_idx + 1,
                of = plan.stages.len(),
                targets = runnable.len(),
                dry_run = self.dry_run,
                "Executing stage"
            );

            if self.dry_run {
                for id in runnable {
                    info!(resource = %plan.node(id).target, "Would delete");
                    statuses[id] = Some(Status::DryRun);
                }
                continue;
            }

            let finished: Vec<(NodeId, Status)> = futures::stream::iter(runnable)
                .map(|id| {
                    let target = &plan.node(id).target;
                    async move { (id, self.run_target(target).await) }
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

            for (id, status) in finished {
                statuses[id] = Some(status);
            }
        }

        plan.stages
            .iter()
            .flatten()
            .map(|&id| Outcome {
                target: plan.node(id).target.clone(),
                status: statuses[id].take().unwrap_or(Status::Cancelled),
            })
            .collect()
    }

    /// Delete one target and wait until it is gone.
    async fn run_target(&self, target: &Target) -> Status {
        if self.cancel.is_cancelled() {
            return Status::Cancelled;
        }

        let api = self.api.as_ref();
        if let Err(e) = api.delete(target).await {
            if classify_anyhow_error(&e).is_not_found() {
                info!(resource_type = target.kind(), resource_id = %target.identifier(), "Already deleted");
                return Status::Deleted;
            }
            warn!(resource_type = target.kind(), resource_id = %target.identifier(), error = ?e, "Delete failed");
            return Status::Failed(format!("{e:#}"));
        }

        let name = target.to_string();
        let result = wait_for_resource(
            self.waits.for_target(target),
            None,
            move || async move {
                match api.is_gone(target).await {
                    Err(e) if classify_anyhow_error(&e).is_not_found() => Ok(true),
                    other => other,
                }
            },
            &name,
        )
        .await;

        match result {
            Ok(()) => {
                info!(resource_type = target.kind(), resource_id = %target.identifier(), "Deleted");
                Status::Deleted
            }
            Err(e) => {
                warn!(resource_type = target.kind(), resource_id = %target.identifier(), error = %e, "Deletion did not complete");
                Status::Failed(e.to_string())
            }
        }
    }
}
