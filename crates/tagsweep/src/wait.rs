//! Polling a target until it reaches a terminal "gone" state
//!
//! Delays grow exponentially with jitter between `initial_delay` and
//! `max_delay`; the whole wait is bounded by `timeout`.

use crate::resource::Target;
use backon::{BackoffBuilder, ExponentialBuilder};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("timed out waiting for {resource} after {timeout:?} ({attempts} checks)")]
    Timeout {
        resource: String,
        timeout: Duration,
        attempts: u32,
    },

    #[error("wait for {resource} cancelled")]
    Cancelled { resource: String },

    #[error("status check for {resource} failed: {source:#}")]
    Check {
        resource: String,
        source: anyhow::Error,
    },
}

/// Backoff bounds for one wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    pub initial_delay: Duration,
    /// Cap for exponential growth
    pub max_delay: Duration,
    /// Total time before giving up
    pub timeout: Duration,
}

impl WaitConfig {
    pub const fn new(initial_delay: Duration, max_delay: Duration, timeout: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            timeout,
        }
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(500),
            Duration::from_secs(5),
            Duration::from_secs(60),
        )
    }
}

/// Wait bounds per target type.
///
/// Instance termination, NAT gateway deletion and ECS service draining are
/// asynchronous on the provider side and get long timeouts. Everything else
/// is gone almost as soon as the delete call returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitPolicy {
    pub instances: WaitConfig,
    pub nat_gateway: WaitConfig,
    pub ecs_service: WaitConfig,
    pub ecs_cluster: WaitConfig,
    pub other: WaitConfig,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        let secs = Duration::from_secs;
        Self {
            instances: WaitConfig::new(secs(2), secs(15), secs(600)),
            nat_gateway: WaitConfig::new(secs(5), secs(30), secs(600)),
            ecs_service: WaitConfig::new(secs(2), secs(15), secs(600)),
            ecs_cluster: WaitConfig::new(secs(1), secs(5), secs(120)),
            other: WaitConfig::default(),
        }
    }
}

impl WaitPolicy {
    /// Same bounds for every target type
    pub fn uniform(config: WaitConfig) -> Self {
        Self {
            instances: config,
            nat_gateway: config,
            ecs_service: config,
            ecs_cluster: config,
            other: config,
        }
    }

    pub fn for_target(&self, target: &Target) -> WaitConfig {
        match target {
            Target::Instances { .. } => self.instances,
            Target::NatGateway(_) => self.nat_gateway,
            Target::EcsService { .. } => self.ecs_service,
            Target::EcsCluster(_) => self.ecs_cluster,
            _ => self.other,
        }
    }
}

/// Poll `check` until it returns `Ok(true)`.
///
/// A check error ends the wait immediately; callers that treat some errors
/// as "gone" map them to `Ok(true)` inside `check`.
pub async fn wait_for_resource<F, Fut>(
    config: WaitConfig,
    cancel: Option<&CancellationToken>,
    check: F,
    resource: &str,
) -> Result<(), WaitError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = anyhow::Result<bool>>,
{
    let start = tokio::time::Instant::now();
    let mut attempts = 0u32;

    let mut delays = ExponentialBuilder::default()
        .with_min_delay(config.initial_delay)
        .with_max_delay(config.max_delay)
        .with_factor(2.0)
        .with_jitter()
        .without_max_times()
        .build();

    loop {
        attempts += 1;

        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(WaitError::Cancelled {
                resource: resource.to_string(),
            });
        }

        match check().await {
            Ok(true) => {
                debug!(resource = %resource, attempts, "Resource gone");
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => {
                warn!(resource = %resource, error = ?e, "Status check failed");
                return Err(WaitError::Check {
                    resource: resource.to_string(),
                    source: e,
                });
            }
        }

        let elapsed = start.elapsed();
        if elapsed >= config.timeout {
            return Err(WaitError::Timeout {
                resource: resource.to_string(),
                timeout: config.timeout,
                attempts,
            });
        }

        let delay = delays
            .next()
            .unwrap_or(config.max_delay)
            .min(config.timeout - elapsed);
        debug!(
            resource = %resource,
            attempt = attempts,
            delay_ms = delay.as_millis(),
            "Resource still present, polling again"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = async {
                match cancel {
                    Some(token) => token.cancelled().await,
                    None => std::future::pending::<()>().await,
                }
            } => {
                return Err(WaitError::Cancelled { resource: resource.to_string() });
            }
        }
    }
}
