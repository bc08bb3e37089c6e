//! Default configuration values shared by the library and the CLI

/// Default AWS region
pub const DEFAULT_REGION: &str = "us-east-2";

/// Default minimum age in hours before a resource is considered stale
pub const DEFAULT_MIN_AGE_HOURS: u64 = 24;

/// Largest minimum age the CLI accepts (ten years)
pub const MAX_MIN_AGE_HOURS: u64 = 24 * 365 * 10;

/// Default number of concurrent deletions within one stage
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Capacity of the discovery merge queue.
///
/// Sized well beyond the number of resources a single account realistically
/// holds for one owner; a full queue blocks listers rather than dropping data.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

/// Maximum number of clusters accepted by a single ECS `DescribeClusters` call
pub const ECS_DESCRIBE_BATCH: usize = 100;
