//! tagsweep - Tag-scoped, dependency-aware garbage collector for stale AWS
//! resources
//!
//! A sweep discovers resources left behind by ephemeral CI runs, keeps the
//! ones whose origin tag matches and whose age tag is old enough, orders
//! their deletion so children go before parents, and deletes stage by
//! stage while reporting an outcome per target.
//!
//! ## Modules
//!
//! - [`provider`]: The `CloudApi` seam the pipeline talks through
//! - [`aws`]: `CloudApi` backed by the AWS SDK
//! - [`resource`]: Discovered resources and their deletion targets
//! - [`listers`]: One lister per resource kind
//! - [`discovery`]: Concurrent fan-out over listers with a bounded merge queue
//! - [`planner`]: Dependency edges and stage layering
//! - [`executor`]: Stage-by-stage delete-then-wait
//! - [`wait`]: Backoff polling until a target is gone
//! - [`report`]: Report sinks and summaries
//! - [`config`]: Sweep configuration
//! - [`sweep`]: The end-to-end pipeline

pub mod aws;
pub mod config;
pub mod discovery;
pub mod executor;
pub mod listers;
pub mod planner;
pub mod provider;
pub mod report;
pub mod resource;
pub mod sweep;
pub mod wait;

pub use config::SweepConfig;
pub use discovery::{Discovered, DiscoveryCoordinator, DiscoveryError};
pub use executor::{Executor, Outcome, Status};
pub use planner::{Plan, PlanError, plan};
pub use provider::CloudApi;
pub use resource::{Resource, Target};
pub use sweep::{SweepReport, Sweeper};
