//! IAM calls: roles and the instance profiles that reference them

use super::context::AwsContext;
use super::error::{ClassifySdk, ignore_not_found};
use super::tags;
use crate::provider::{RoleInfo, RolePage};
use anyhow::{Context, Result};
use aws_sdk_iam::Client;
use tagsweep_common::TagSet;
use tracing::{debug, info};

/// IAM client wrapper
pub struct IamClient {
    client: Client,
}

impl IamClient {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.iam_client(),
        }
    }

    pub async fn list_roles_page(&self, marker: Option<String>) -> Result<RolePage> {
        let response = self
            .client
            .list_roles()
            .set_marker(marker)
            .send()
            .await
            .classify()
            .context("Failed to list IAM roles")?;

        let roles = response
            .roles()
            .iter()
            .map(|r| RoleInfo {
                name: r.role_name().to_string(),
                id: r.role_id().to_string(),
            })
            .collect();

        let next_marker = if response.is_truncated() {
            response.marker().map(str::to_string)
        } else {
            None
        };

        Ok(RolePage { roles, next_marker })
    }

    pub async fn role_tags(&self, role_name: &str) -> Result<TagSet> {
        let response = self
            .client
            .list_role_tags()
            .role_name(role_name)
            .send()
            .await
            .classify()
            .context("Failed to list role tags")?;
        Ok(tags::from_iam(response.tags()))
    }

    pub async fn instance_profiles_for_role(&self, role_name: &str) -> Result<Vec<String>> {
        let mut profiles = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let response = self
                .client
                .list_instance_profiles_for_role()
                .role_name(role_name)
                .set_marker(marker.take())
                .send()
                .await
                .classify()
                .context("Failed to list instance profiles for role")?;

            profiles.extend(
                response
                    .instance_profiles()
                    .iter()
                    .map(|p| p.instance_profile_name().to_string()),
            );

            match response.marker() {
                Some(m) if response.is_truncated() => marker = Some(m.to_string()),
                _ => break,
            }
        }

        Ok(profiles)
    }

    /// Detach the role from a profile, then delete the profile.
    pub async fn delete_instance_profile(&self, profile_name: &str, role_name: &str) -> Result<()> {
        debug!(profile = %profile_name, role = %role_name, "Removing role from instance profile");
        let result = self
            .client
            .remove_role_from_instance_profile()
            .instance_profile_name(profile_name)
            .role_name(role_name)
            .send()
            .await
            .classify();
        ignore_not_found(result).context("Failed to remove role from instance profile")?;

        info!(profile = %profile_name, "Deleting instance profile");
        self.client
            .delete_instance_profile()
            .instance_profile_name(profile_name)
            .send()
            .await
            .classify()
            .context("Failed to delete instance profile")?;
        Ok(())
    }

    pub async fn instance_profile_gone(&self, profile_name: &str) -> Result<bool> {
        let result = self
            .client
            .get_instance_profile()
            .instance_profile_name(profile_name)
            .send()
            .await
            .classify();
        Ok(ignore_not_found(result)
            .context("Failed to get instance profile")?
            .is_none())
    }

    /// Delete a role after stripping its managed and inline policies.
    pub async fn delete_role(&self, role_name: &str) -> Result<()> {
        let attached = self
            .client
            .list_attached_role_policies()
            .role_name(role_name)
            .send()
            .await
            .classify()
            .context("Failed to list attached role policies")?;

        for policy_arn in attached
            .attached_policies()
            .iter()
            .filter_map(|p| p.policy_arn())
        {
            debug!(role = %role_name, policy_arn, "Detaching managed policy");
            let result = self
                .client
                .detach_role_policy()
                .role_name(role_name)
                .policy_arn(policy_arn)
                .send()
                .await
                .classify();
            ignore_not_found(result).context("Failed to detach role policy")?;
        }

        let inline = self
            .client
            .list_role_policies()
            .role_name(role_name)
            .send()
            .await
            .classify()
            .context("Failed to list inline role policies")?;

        for policy_name in inline.policy_names() {
            debug!(role = %role_name, policy = %policy_name, "Deleting inline policy");
            let result = self
                .client
                .delete_role_policy()
                .role_name(role_name)
                .policy_name(policy_name)
                .send()
                .await
                .classify();
            ignore_not_found(result).context("Failed to delete inline role policy")?;
        }

        info!(role = %role_name, "Deleting IAM role");
        self.client
            .delete_role()
            .role_name(role_name)
            .send()
            .await
            .classify()
            .context("Failed to delete IAM role")?;
        Ok(())
    }

    pub async fn role_gone(&self, role_name: &str) -> Result<bool> {
        let result = self
            .client
            .get_role()
            .role_name(role_name)
            .send()
            .await
            .classify();
        Ok(ignore_not_found(result)
            .context("Failed to get IAM role")?
            .is_none())
    }
}
