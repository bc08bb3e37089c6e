//! ECS calls: clusters and the services inside them

use super::context::AwsContext;
use super::error::{ClassifySdk, ignore_not_found};
use super::tags;
use crate::provider::{ClusterInfo, cluster_name_from_arn};
use anyhow::{Context, Result};
use aws_sdk_ecs::Client;
use aws_sdk_ecs::types::ClusterField;
use tracing::{debug, info};

/// Cluster and service status once teardown has finished
const INACTIVE: &str = "INACTIVE";

/// Failure reason ECS reports for ARNs it does not know
const MISSING: &str = "MISSING";

/// ECS client wrapper
pub struct EcsClient {
    client: Client,
}

impl EcsClient {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.ecs_client(),
        }
    }

    pub async fn list_cluster_arns(&self) -> Result<Vec<String>> {
        let mut arns = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let response = self
                .client
                .list_clusters()
                .set_next_token(next_token.take())
                .send()
                .await
                .classify()
                .context("Failed to list ECS clusters")?;

            arns.extend(response.cluster_arns().iter().cloned());

            match response.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(arns)
    }

    pub async fn describe_clusters(&self, arns: &[String]) -> Result<Vec<ClusterInfo>> {
        let response = self
            .client
            .describe_clusters()
            .set_clusters(Some(arns.to_vec()))
            .include(ClusterField::Tags)
            .send()
            .await
            .classify()
            .context("Failed to describe ECS clusters")?;

        Ok(response
            .clusters()
            .iter()
            .filter_map(|c| {
                let arn = c.cluster_arn()?.to_string();
                let name = c
                    .cluster_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| cluster_name_from_arn(&arn).to_string());
                Some(ClusterInfo {
                    arn,
                    name,
                    status: c.status().unwrap_or_default().to_string(),
                    tags: tags::from_ecs(c.tags()),
                })
            })
            .collect())
    }

    pub async fn list_services(&self, cluster_arn: &str) -> Result<Vec<String>> {
        let mut arns = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let response = self
                .client
                .list_services()
                .cluster(cluster_arn)
                .set_next_token(next_token.take())
                .send()
                .await
                .classify()
                .context("Failed to list ECS services")?;

            arns.extend(response.service_arns().iter().cloned());

            match response.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(arns)
    }

    /// Scale a service to zero, then force-delete it.
    pub async fn delete_service(&self, cluster_arn: &str, service_arn: &str) -> Result<()> {
        debug!(service = %service_arn, "Scaling service to zero");
        let result = self
            .client
            .update_service()
            .cluster(cluster_arn)
            .service(service_arn)
            .desired_count(0)
            .send()
            .await
            .classify();
        ignore_not_found(result).context("Failed to scale ECS service down")?;

        info!(service = %service_arn, "Deleting ECS service");
        self.client
            .delete_service()
            .cluster(cluster_arn)
            .service(service_arn)
            .force(true)
            .send()
            .await
            .classify()
            .context("Failed to delete ECS service")?;
        Ok(())
    }

    pub async fn service_inactive(&self, cluster_arn: &str, service_arn: &str) -> Result<bool> {
        let result = self
            .client
            .describe_services()
            .cluster(cluster_arn)
            .services(service_arn)
            .send()
            .await
            .classify();

        let Some(response) = ignore_not_found(result).context("Failed to describe ECS service")?
        else {
            return Ok(true);
        };

        if response
            .failures()
            .iter()
            .any(|f| f.reason() == Some(MISSING))
        {
            return Ok(true);
        }
        Ok(response
            .services()
            .iter()
            .all(|s| s.status() == Some(INACTIVE)))
    }

    pub async fn delete_cluster(&self, cluster_arn: &str) -> Result<()> {
        info!(cluster = %cluster_arn, "Deleting ECS cluster");
        self.client
            .delete_cluster()
            .cluster(cluster_arn)
            .send()
            .await
            .classify()
            .context("Failed to delete ECS cluster")?;
        Ok(())
    }

    pub async fn cluster_inactive(&self, cluster_arn: &str) -> Result<bool> {
        let result = self
            .client
            .describe_clusters()
            .clusters(cluster_arn)
            .send()
            .await
            .classify();

        let Some(response) = ignore_not_found(result).context("Failed to describe ECS cluster")?
        else {
            return Ok(true);
        };

        if response
            .failures()
            .iter()
            .any(|f| f.reason() == Some(MISSING))
        {
            return Ok(true);
        }
        Ok(response
            .clusters()
            .iter()
            .all(|c| c.status() == Some(INACTIVE)))
    }
}
