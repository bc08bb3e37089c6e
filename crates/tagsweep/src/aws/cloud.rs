//! [`CloudApi`] backed by the AWS SDK

use super::context::AwsContext;
use super::ec2::Ec2Client;
use super::ecs::EcsClient;
use super::iam::IamClient;
use super::logs::LogsClient;
use crate::provider::{
    CloudApi, ClusterInfo, ElasticIpInfo, InstanceInfo, LogGroupInfo, NatGatewayInfo, RolePage,
    RouteTableInfo, SecurityGroupInfo, VpcInfo,
};
use crate::resource::Target;
use anyhow::Result;
use tagsweep_common::TagSet;

/// All four service clients, built from one loaded config.
pub struct AwsCloud {
    ec2: Ec2Client,
    ecs: EcsClient,
    iam: IamClient,
    logs: LogsClient,
}

impl AwsCloud {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            ec2: Ec2Client::from_context(ctx),
            ecs: EcsClient::from_context(ctx),
            iam: IamClient::from_context(ctx),
            logs: LogsClient::from_context(ctx),
        }
    }
}

impl CloudApi for AwsCloud {
    async fn list_instances(&self, owner_key: &str) -> Result<Vec<InstanceInfo>> {
        self.ec2.list_instances(owner_key).await
    }

    async fn list_cluster_arns(&self) -> Result<Vec<String>> {
        self.ecs.list_cluster_arns().await
    }

    async fn describe_clusters(&self, arns: &[String]) -> Result<Vec<ClusterInfo>> {
        self.ecs.describe_clusters(arns).await
    }

    async fn list_services(&self, cluster_arn: &str) -> Result<Vec<String>> {
        self.ecs.list_services(cluster_arn).await
    }

    async fn list_nat_gateways(&self, owner_key: &str) -> Result<Vec<NatGatewayInfo>> {
        self.ec2.list_nat_gateways(owner_key).await
    }

    async fn list_elastic_ips(&self, owner_key: &str) -> Result<Vec<ElasticIpInfo>> {
        self.ec2.list_elastic_ips(owner_key).await
    }

    async fn list_log_groups(&self, name_prefix: Option<&str>) -> Result<Vec<LogGroupInfo>> {
        self.logs.list_log_groups(name_prefix).await
    }

    async fn log_group_tags(&self, group: &LogGroupInfo) -> Result<TagSet> {
        self.logs.log_group_tags(group).await
    }

    async fn list_vpcs(&self, owner_key: &str) -> Result<Vec<VpcInfo>> {
        self.ec2.list_vpcs(owner_key).await
    }

    async fn internet_gateway_for_vpc(&self, vpc_id: &str) -> Result<Option<String>> {
        self.ec2.internet_gateway_for_vpc(vpc_id).await
    }

    async fn subnets_for_vpc(&self, vpc_id: &str) -> Result<Vec<String>> {
        self.ec2.subnets_for_vpc(vpc_id).await
    }

    async fn security_groups_for_vpc(&self, vpc_id: &str) -> Result<Vec<SecurityGroupInfo>> {
        self.ec2.security_groups_for_vpc(vpc_id).await
    }

    async fn route_tables_for_vpc(&self, vpc_id: &str) -> Result<Vec<RouteTableInfo>> {
        self.ec2.route_tables_for_vpc(vpc_id).await
    }

    async fn list_roles_page(&self, marker: Option<String>) -> Result<RolePage> {
        self.iam.list_roles_page(marker).await
    }

    async fn role_tags(&self, role_name: &str) -> Result<TagSet> {
        self.iam.role_tags(role_name).await
    }

    async fn instance_profiles_for_role(&self, role_name: &str) -> Result<Vec<String>> {
        self.iam.instance_profiles_for_role(role_name).await
    }

    async fn delete(&self, target: &Target) -> Result<()> {
        match target {
            Target::Instances { ids } => self.ec2.terminate_instances(ids).await,
            Target::EcsService { cluster, service } => {
                self.ecs.delete_service(cluster, service).await
            }
            Target::EcsCluster(arn) => self.ecs.delete_cluster(arn).await,
            Target::NatGateway(id) => self.ec2.delete_nat_gateway(id).await,
            Target::ElasticIp(id) => self.ec2.release_elastic_ip(id).await,
            Target::LogGroup(name) => self.logs.delete_log_group(name).await,
            Target::InternetGateway { id, vpc } => self.ec2.delete_internet_gateway(id, vpc).await,
            Target::Subnet(id) => self.ec2.delete_subnet(id).await,
            Target::RouteTable(id) => self.ec2.delete_route_table(id).await,
            Target::SecurityGroup(id) => self.ec2.delete_security_group(id).await,
            Target::Vpc(id) => self.ec2.delete_vpc(id).await,
            Target::InstanceProfile { name, role } => {
                self.iam.delete_instance_profile(name, role).await
            }
            Target::Role(name) => self.iam.delete_role(name).await,
        }
    }

    async fn is_gone(&self, target: &Target) -> Result<bool> {
        match target {
            Target::Instances { ids } => self.ec2.instances_terminated(ids).await,
            Target::EcsService { cluster, service } => {
                self.ecs.service_inactive(cluster, service).await
            }
            Target::EcsCluster(arn) => self.ecs.cluster_inactive(arn).await,
            Target::NatGateway(id) => self.ec2.nat_gateway_deleted(id).await,
            Target::ElasticIp(id) => self.ec2.elastic_ip_released(id).await,
            Target::LogGroup(name) => self.logs.log_group_gone(name).await,
            Target::InternetGateway { id, .. } => self.ec2.internet_gateway_gone(id).await,
            Target::Subnet(id) => self.ec2.subnet_gone(id).await,
            Target::RouteTable(id) => self.ec2.route_table_gone(id).await,
            Target::SecurityGroup(id) => self.ec2.security_group_gone(id).await,
            Target::Vpc(id) => self.ec2.vpc_gone(id).await,
            Target::InstanceProfile { name, .. } => self.iam.instance_profile_gone(name).await,
            Target::Role(name) => self.iam.role_gone(name).await,
        }
    }
}
