//! CloudWatch Logs calls: log groups and their tags

use super::context::AwsContext;
use super::error::{ClassifySdk, ignore_not_found};
use super::tags;
use crate::provider::LogGroupInfo;
use anyhow::{Context, Result};
use aws_sdk_cloudwatchlogs::Client;
use tagsweep_common::TagSet;
use tracing::info;

/// CloudWatch Logs client wrapper
pub struct LogsClient {
    client: Client,
}

impl LogsClient {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.logs_client(),
        }
    }

    pub async fn list_log_groups(&self, name_prefix: Option<&str>) -> Result<Vec<LogGroupInfo>> {
        let mut groups = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let response = self
                .client
                .describe_log_groups()
                .set_log_group_name_prefix(name_prefix.map(str::to_string))
                .set_next_token(next_token.take())
                .send()
                .await
                .classify()
                .context("Failed to describe log groups")?;

            groups.extend(response.log_groups().iter().filter_map(|g| {
                Some(LogGroupInfo {
                    name: g.log_group_name()?.to_string(),
                    arn: g.arn().map(str::to_string),
                })
            }));

            match response.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(groups)
    }

    pub async fn log_group_tags(&self, group: &LogGroupInfo) -> Result<TagSet> {
        let arn = group
            .arn
            .as_deref()
            .with_context(|| format!("Log group {} has no ARN", group.name))?;

        let response = self
            .client
            .list_tags_for_resource()
            .resource_arn(tag_resource_arn(arn))
            .send()
            .await
            .classify()
            .context("Failed to list log group tags")?;
        Ok(tags::from_logs(response.tags()))
    }

    pub async fn delete_log_group(&self, name: &str) -> Result<()> {
        info!(log_group = %name, "Deleting log group");
        self.client
            .delete_log_group()
            .log_group_name(name)
            .send()
            .await
            .classify()
            .context("Failed to delete log group")?;
        Ok(())
    }

    pub async fn log_group_gone(&self, name: &str) -> Result<bool> {
        let result = self
            .client
            .describe_log_groups()
            .log_group_name_prefix(name)
            .send()
            .await
            .classify();
        Ok(match ignore_not_found(result).context("Failed to describe log groups")? {
            Some(response) => !response
                .log_groups()
                .iter()
                .any(|g| g.log_group_name() == Some(name)),
            None => true,
        })
    }
}

/// `DescribeLogGroups` reports ARNs with a trailing `:*` that the tagging
/// API rejects.
fn tag_resource_arn(arn: &str) -> &str {
    arn.strip_suffix(":*").unwrap_or(arn)
}
