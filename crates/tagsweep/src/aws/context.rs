//! Shared AWS configuration context
//!
//! Loads the SDK configuration once and hands out service clients built
//! from it.

use aws_config::{BehaviorVersion, Region, SdkConfig};
use std::sync::Arc;

/// Loaded AWS SDK config plus the region it targets.
#[derive(Clone)]
pub struct AwsContext {
    config: Arc<SdkConfig>,
    region: String,
}

impl AwsContext {
    /// Load AWS configuration for the specified region.
    ///
    /// Credentials come from the environment, config files or an instance
    /// role, as the SDK's default chain resolves them.
    pub async fn new(region: &str) -> Self {
        Self::load(region, None).await
    }

    /// Load configuration using a named profile from the shared config files.
    pub async fn with_profile(region: &str, profile: &str) -> Self {
        Self::load(region, Some(profile)).await
    }

    async fn load(region: &str, profile: Option<&str>) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        let config = loader.load().await;

        Self {
            config: Arc::new(config),
            region: region.to_string(),
        }
    }

    pub fn sdk_config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn ec2_client(&self) -> aws_sdk_ec2::Client {
        aws_sdk_ec2::Client::new(self.sdk_config())
    }

    pub fn ecs_client(&self) -> aws_sdk_ecs::Client {
        aws_sdk_ecs::Client::new(self.sdk_config())
    }

    pub fn iam_client(&self) -> aws_sdk_iam::Client {
        aws_sdk_iam::Client::new(self.sdk_config())
    }

    pub fn logs_client(&self) -> aws_sdk_cloudwatchlogs::Client {
        aws_sdk_cloudwatchlogs::Client::new(self.sdk_config())
    }
}

impl std::fmt::Debug for AwsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsContext")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}
