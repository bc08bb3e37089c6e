//! AWS implementation of the provider seam
//!
//! - [`context`]: Loaded SDK config shared by all clients
//! - [`ec2`], [`ecs`], [`iam`], [`logs`]: Per-service wrappers
//! - [`cloud`]: [`AwsCloud`], the `CloudApi` implementation
//! - [`error`]: Error classification by service error code

pub mod cloud;
pub mod context;
pub mod ec2;
pub mod ecs;
pub mod error;
pub mod iam;
pub mod logs;
pub mod tags;

pub use cloud::AwsCloud;
pub use context::AwsContext;
pub use error::{AwsError, classify_anyhow_error, classify_aws_error, ignore_not_found};
