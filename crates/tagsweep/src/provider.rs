//! Provider seam
//!
//! [`CloudApi`] is everything the pipeline needs from a cloud account: list
//! calls per resource type (with whatever server-side filtering the API
//! offers), tag fetches where tags are not returned inline, and a
//! delete/poll pair per [`Target`]. `AwsCloud` implements it against the AWS
//! SDK; tests use an in-memory fake.
//!
//! Implementations normalize provider tag shapes into [`TagSet`] before
//! returning.

use crate::resource::Target;
use anyhow::Result;
use std::future::Future;
use tagsweep_common::TagSet;

/// EC2 instance descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    pub id: String,
    pub vpc_id: Option<String>,
    pub tags: TagSet,
}

/// ECS cluster descriptor from `DescribeClusters`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterInfo {
    pub arn: String,
    pub name: String,
    /// `ACTIVE`, `PROVISIONING`, `DEPROVISIONING`, `FAILED` or `INACTIVE`
    pub status: String,
    pub tags: TagSet,
}

/// Cluster name is the final path segment of its ARN
pub fn cluster_name_from_arn(arn: &str) -> &str {
    arn.rsplit('/').next().unwrap_or(arn)
}

impl ClusterInfo {
    /// Inactive clusters are already torn down
    pub fn is_inactive(&self) -> bool {
        self.status.eq_ignore_ascii_case("INACTIVE")
    }
}

/// NAT gateway descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NatGatewayInfo {
    pub id: String,
    pub vpc_id: Option<String>,
    pub allocation_ids: Vec<String>,
    pub tags: TagSet,
}

/// Elastic IP descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElasticIpInfo {
    pub allocation_id: String,
    pub association_id: Option<String>,
    pub public_ip: Option<String>,
    pub tags: TagSet,
}

/// Log group descriptor; tags are fetched separately
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogGroupInfo {
    pub name: String,
    pub arn: Option<String>,
}

/// VPC descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpcInfo {
    pub id: String,
    pub is_default: bool,
    pub tags: TagSet,
}

/// Security group descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroupInfo {
    pub id: String,
    pub name: String,
}

impl SecurityGroupInfo {
    /// Every VPC owns an undeletable group named `default`
    pub fn is_default(&self) -> bool {
        self.name == "default"
    }
}

/// Route table descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTableInfo {
    pub id: String,
    /// Carries the VPC's main association
    pub main: bool,
}

/// IAM role descriptor; tags are fetched separately
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInfo {
    pub name: String,
    pub id: String,
}

/// One page of `ListRoles`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolePage {
    pub roles: Vec<RoleInfo>,
    /// Marker for the next page, `None` on the last page
    pub next_marker: Option<String>,
}

/// Calls the pipeline makes against a cloud account.
///
/// List calls take the owner tag key so providers that support tag-key
/// filters can apply them server-side. Delete calls are a single request; the
/// executor confirms removal separately with [`CloudApi::is_gone`].
pub trait CloudApi: Send + Sync + 'static {
    /// Non-terminated instances, filtered by tag key where supported
    fn list_instances(
        &self,
        owner_key: &str,
    ) -> impl Future<Output = Result<Vec<InstanceInfo>>> + Send;

    /// ARNs of every ECS cluster in the region
    fn list_cluster_arns(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Describe clusters (with tags); at most one describe batch per call
    fn describe_clusters(
        &self,
        arns: &[String],
    ) -> impl Future<Output = Result<Vec<ClusterInfo>>> + Send;

    /// Service ARNs registered in a cluster
    fn list_services(&self, cluster_arn: &str) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// NAT gateways not already deleted or deleting
    fn list_nat_gateways(
        &self,
        owner_key: &str,
    ) -> impl Future<Output = Result<Vec<NatGatewayInfo>>> + Send;

    fn list_elastic_ips(
        &self,
        owner_key: &str,
    ) -> impl Future<Output = Result<Vec<ElasticIpInfo>>> + Send;

    /// Log groups, narrowed server-side by name prefix when given
    fn list_log_groups(
        &self,
        name_prefix: Option<&str>,
    ) -> impl Future<Output = Result<Vec<LogGroupInfo>>> + Send;

    fn log_group_tags(&self, group: &LogGroupInfo) -> impl Future<Output = Result<TagSet>> + Send;

    fn list_vpcs(&self, owner_key: &str) -> impl Future<Output = Result<Vec<VpcInfo>>> + Send;

    /// Internet gateway attached to a VPC
    fn internet_gateway_for_vpc(
        &self,
        vpc_id: &str,
    ) -> impl Future<Output = Result<Option<String>>> + Send;

    fn subnets_for_vpc(&self, vpc_id: &str) -> impl Future<Output = Result<Vec<String>>> + Send;

    fn security_groups_for_vpc(
        &self,
        vpc_id: &str,
    ) -> impl Future<Output = Result<Vec<SecurityGroupInfo>>> + Send;

    fn route_tables_for_vpc(
        &self,
        vpc_id: &str,
    ) -> impl Future<Output = Result<Vec<RouteTableInfo>>> + Send;

    /// One page of roles; no server-side name or tag filter exists
    fn list_roles_page(
        &self,
        marker: Option<String>,
    ) -> impl Future<Output = Result<RolePage>> + Send;

    fn role_tags(&self, role_name: &str) -> impl Future<Output = Result<TagSet>> + Send;

    fn instance_profiles_for_role(
        &self,
        role_name: &str,
    ) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Issue the delete call(s) for one target.
    ///
    /// Returns an error classified as not-found when the target no longer
    /// exists.
    fn delete(&self, target: &Target) -> impl Future<Output = Result<()>> + Send;

    /// Poll once: `true` when the target has reached a terminal gone state.
    fn is_gone(&self, target: &Target) -> impl Future<Output = Result<bool>> + Send;
}
