//! EC2 calls: instances, NAT gateways, Elastic IPs and VPC plumbing

use super::context::AwsContext;
use super::error::{AwsError, ClassifySdk, classify_anyhow_error, ignore_not_found};
use super::tags;
use crate::provider::{
    ElasticIpInfo, InstanceInfo, NatGatewayInfo, RouteTableInfo, SecurityGroupInfo, VpcInfo,
};
use anyhow::{Context, Result};
use aws_sdk_ec2::Client;
use aws_sdk_ec2::types::{Filter, Instance, InstanceStateName, NatGatewayState};
use backon::{ExponentialBuilder, Retryable};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Instance states that still hold resources
const LIVE_INSTANCE_STATES: &[&str] = &["pending", "running", "stopping", "stopped", "shutting-down"];

fn tag_key_filter(key: &str) -> Filter {
    Filter::builder().name("tag-key").values(key).build()
}

/// Ids of instances not yet in the `terminated` state
fn unterminated_ids<'a>(instances: impl IntoIterator<Item = &'a Instance>) -> Vec<String> {
    instances
        .into_iter()
        .filter(|i| {
            !matches!(
                i.state().and_then(|s| s.name()),
                Some(InstanceStateName::Terminated)
            )
        })
        .filter_map(|i| i.instance_id().map(str::to_string))
        .collect()
}

fn vpc_filter(vpc_id: &str) -> Filter {
    Filter::builder().name("vpc-id").values(vpc_id).build()
}

/// EC2 client wrapper
pub struct Ec2Client {
    client: Client,
}

impl Ec2Client {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.ec2_client(),
        }
    }

    pub async fn list_instances(&self, owner_key: &str) -> Result<Vec<InstanceInfo>> {
        let mut instances = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let response = self
                .client
                .describe_instances()
                .filters(tag_key_filter(owner_key))
                .filters(
                    Filter::builder()
                        .name("instance-state-name")
                        .set_values(Some(
                            LIVE_INSTANCE_STATES.iter().map(|s| s.to_string()).collect(),
                        ))
                        .build(),
                )
                .set_next_token(next_token.take())
                .send()
                .await
                .classify()
                .context("Failed to describe instances")?;

            for instance in response.reservations().iter().flat_map(|r| r.instances()) {
                let Some(id) = instance.instance_id() else {
                    continue;
                };
                instances.push(InstanceInfo {
                    id: id.to_string(),
                    vpc_id: instance.vpc_id().map(str::to_string),
                    tags: tags::from_ec2(instance.tags()),
                });
            }

            match response.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(instances)
    }

    /// Ids in `ids` that exist and are not yet terminated.
    ///
    /// An `instance-id` filter ignores unknown ids, whereas passing them as
    /// `InstanceIds` fails the whole call with `InvalidInstanceID.NotFound`.
    async fn unterminated_instances(&self, ids: &[String]) -> Result<Vec<String>> {
        let mut remaining = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let response = self
                .client
                .describe_instances()
                .filters(
                    Filter::builder()
                        .name("instance-id")
                        .set_values(Some(ids.to_vec()))
                        .build(),
                )
                .set_next_token(next_token.take())
                .send()
                .await
                .classify()
                .context("Failed to describe instances")?;

            let instances = response.reservations().iter().flat_map(|r| r.instances());
            remaining.extend(unterminated_ids(instances));

            match response.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(remaining)
    }

    /// Terminate the instances in `ids` that still exist.
    ///
    /// Fails with [`AwsError::NotFound`] when none of them does.
    pub async fn terminate_instances(&self, ids: &[String]) -> Result<()> {
        let live = self.unterminated_instances(ids).await?;
        if live.is_empty() {
            return Err(AwsError::NotFound {
                message: format!("instances {} already terminated", ids.join(",")),
            }
            .into());
        }
        if live.len() < ids.len() {
            debug!(requested = ids.len(), live = live.len(), "Some instances already gone");
        }

        info!(count = live.len(), "Terminating instances");
        self.client
            .terminate_instances()
            .set_instance_ids(Some(live))
            .send()
            .await
            .classify()
            .context("Failed to terminate instances")?;
        Ok(())
    }

    /// `true` once every instance reports `terminated` or is unknown
    pub async fn instances_terminated(&self, ids: &[String]) -> Result<bool> {
        Ok(self.unterminated_instances(ids).await?.is_empty())
    }

    pub async fn list_nat_gateways(&self, owner_key: &str) -> Result<Vec<NatGatewayInfo>> {
        let mut gateways = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let response = self
                .client
                .describe_nat_gateways()
                .filter(tag_key_filter(owner_key))
                .set_next_token(next_token.take())
                .send()
                .await
                .classify()
                .context("Failed to describe NAT gateways")?;

            for nat in response.nat_gateways() {
                if matches!(
                    nat.state(),
                    Some(NatGatewayState::Deleted | NatGatewayState::Deleting)
                ) {
                    continue;
                }
                let Some(id) = nat.nat_gateway_id() else {
                    continue;
                };
                gateways.push(NatGatewayInfo {
                    id: id.to_string(),
                    vpc_id: nat.vpc_id().map(str::to_string),
                    allocation_ids: nat
                        .nat_gateway_addresses()
                        .iter()
                        .filter_map(|a| a.allocation_id().map(str::to_string))
                        .collect(),
                    tags: tags::from_ec2(nat.tags()),
                });
            }

            match response.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(gateways)
    }

    pub async fn delete_nat_gateway(&self, id: &str) -> Result<()> {
        info!(nat_gateway_id = %id, "Deleting NAT gateway");
        self.client
            .delete_nat_gateway()
            .nat_gateway_id(id)
            .send()
            .await
            .classify()
            .context("Failed to delete NAT gateway")?;
        Ok(())
    }

    /// `true` once the gateway reports `deleted` (or `failed`) or is unknown
    pub async fn nat_gateway_deleted(&self, id: &str) -> Result<bool> {
        let result = self
            .client
            .describe_nat_gateways()
            .nat_gateway_ids(id)
            .send()
            .await
            .classify();

        let Some(response) =
            ignore_not_found(result).context("Failed to describe NAT gateway")?
        else {
            return Ok(true);
        };

        Ok(response.nat_gateways().iter().all(|n| {
            matches!(
                n.state(),
                Some(NatGatewayState::Deleted | NatGatewayState::Failed)
            )
        }))
    }

    pub async fn list_elastic_ips(&self, owner_key: &str) -> Result<Vec<ElasticIpInfo>> {
        let response = self
            .client
            .describe_addresses()
            .filters(tag_key_filter(owner_key))
            .send()
            .await
            .classify()
            .context("Failed to describe addresses")?;

        Ok(response
            .addresses()
            .iter()
            .filter_map(|a| {
                Some(ElasticIpInfo {
                    allocation_id: a.allocation_id()?.to_string(),
                    association_id: a.association_id().map(str::to_string),
                    public_ip: a.public_ip().map(str::to_string),
                    tags: tags::from_ec2(a.tags()),
                })
            })
            .collect())
    }

    /// Release an Elastic IP, disassociating it first if still attached.
    pub async fn release_elastic_ip(&self, allocation_id: &str) -> Result<()> {
        let response = self
            .client
            .describe_addresses()
            .allocation_ids(allocation_id)
            .send()
            .await
            .classify()
            .context("Failed to describe address")?;

        if let Some(association_id) = response
            .addresses()
            .first()
            .and_then(|a| a.association_id())
        {
            debug!(allocation_id, association_id, "Disassociating Elastic IP");
            let result = self
                .client
                .disassociate_address()
                .association_id(association_id)
                .send()
                .await
                .classify();
            ignore_not_found(result).context("Failed to disassociate address")?;
        }

        info!(allocation_id, "Releasing Elastic IP");
        self.client
            .release_address()
            .allocation_id(allocation_id)
            .send()
            .await
            .classify()
            .context("Failed to release address")?;
        Ok(())
    }

    pub async fn elastic_ip_released(&self, allocation_id: &str) -> Result<bool> {
        let result = self
            .client
            .describe_addresses()
            .allocation_ids(allocation_id)
            .send()
            .await
            .classify();
        Ok(match ignore_not_found(result).context("Failed to describe address")? {
            Some(response) => response.addresses().is_empty(),
            None => true,
        })
    }

    pub async fn list_vpcs(&self, owner_key: &str) -> Result<Vec<VpcInfo>> {
        let mut vpcs = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let response = self
                .client
                .describe_vpcs()
                .filters(tag_key_filter(owner_key))
                .set_next_token(next_token.take())
                .send()
                .await
                .classify()
                .context("Failed to describe VPCs")?;

            vpcs.extend(response.vpcs().iter().filter_map(|v| {
                Some(VpcInfo {
                    id: v.vpc_id()?.to_string(),
                    is_default: v.is_default().unwrap_or(false),
                    tags: tags::from_ec2(v.tags()),
                })
            }));

            match response.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(vpcs)
    }

    pub async fn internet_gateway_for_vpc(&self, vpc_id: &str) -> Result<Option<String>> {
        let response = self
            .client
            .describe_internet_gateways()
            .filters(
                Filter::builder()
                    .name("attachment.vpc-id")
                    .values(vpc_id)
                    .build(),
            )
            .send()
            .await
            .classify()
            .context("Failed to describe internet gateways")?;

        Ok(response
            .internet_gateways()
            .iter()
            .find_map(|g| g.internet_gateway_id().map(str::to_string)))
    }

    pub async fn subnets_for_vpc(&self, vpc_id: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .describe_subnets()
            .filters(vpc_filter(vpc_id))
            .send()
            .await
            .classify()
            .context("Failed to describe subnets")?;

        Ok(response
            .subnets()
            .iter()
            .filter_map(|s| s.subnet_id().map(str::to_string))
            .collect())
    }

    pub async fn security_groups_for_vpc(&self, vpc_id: &str) -> Result<Vec<SecurityGroupInfo>> {
        let response = self
            .client
            .describe_security_groups()
            .filters(vpc_filter(vpc_id))
            .send()
            .await
            .classify()
            .context("Failed to describe security groups")?;

        Ok(response
            .security_groups()
            .iter()
            .filter_map(|g| {
                Some(SecurityGroupInfo {
                    id: g.group_id()?.to_string(),
                    name: g.group_name().unwrap_or_default().to_string(),
                })
            })
            .collect())
    }

    pub async fn route_tables_for_vpc(&self, vpc_id: &str) -> Result<Vec<RouteTableInfo>> {
        let response = self
            .client
            .describe_route_tables()
            .filters(vpc_filter(vpc_id))
            .send()
            .await
            .classify()
            .context("Failed to describe route tables")?;

        Ok(response
            .route_tables()
            .iter()
            .filter_map(|rt| {
                Some(RouteTableInfo {
                    id: rt.route_table_id()?.to_string(),
                    main: rt.associations().iter().any(|a| a.main().unwrap_or(false)),
                })
            })
            .collect())
    }

    pub async fn delete_internet_gateway(&self, id: &str, vpc_id: &str) -> Result<()> {
        info!(igw_id = %id, vpc_id = %vpc_id, "Detaching internet gateway");
        let result = self
            .client
            .detach_internet_gateway()
            .internet_gateway_id(id)
            .vpc_id(vpc_id)
            .send()
            .await
            .classify();
        // Gateway.NotAttached surfaces as a generic error; deletion still proceeds
        if let Err(e) = ignore_not_found(result) {
            warn!(igw_id = %id, error = %e, "Failed to detach internet gateway");
        }

        self.client
            .delete_internet_gateway()
            .internet_gateway_id(id)
            .send()
            .await
            .classify()
            .context("Failed to delete internet gateway")?;
        Ok(())
    }

    pub async fn internet_gateway_gone(&self, id: &str) -> Result<bool> {
        let result = self
            .client
            .describe_internet_gateways()
            .internet_gateway_ids(id)
            .send()
            .await
            .classify();
        Ok(match ignore_not_found(result).context("Failed to describe internet gateway")? {
            Some(response) => response.internet_gateways().is_empty(),
            None => true,
        })
    }

    pub async fn delete_subnet(&self, id: &str) -> Result<()> {
        info!(subnet_id = %id, "Deleting subnet");
        self.client
            .delete_subnet()
            .subnet_id(id)
            .send()
            .await
            .classify()
            .context("Failed to delete subnet")?;
        Ok(())
    }

    pub async fn subnet_gone(&self, id: &str) -> Result<bool> {
        let result = self
            .client
            .describe_subnets()
            .subnet_ids(id)
            .send()
            .await
            .classify();
        Ok(match ignore_not_found(result).context("Failed to describe subnet")? {
            Some(response) => response.subnets().is_empty(),
            None => true,
        })
    }

    /// Delete a route table after dropping its explicit subnet associations.
    pub async fn delete_route_table(&self, id: &str) -> Result<()> {
        let result = self
            .client
            .describe_route_tables()
            .route_table_ids(id)
            .send()
            .await
            .classify();
        if let Some(response) =
            ignore_not_found(result).context("Failed to describe route table")?
        {
            for association in response
                .route_tables()
                .iter()
                .flat_map(|rt| rt.associations())
                .filter(|a| !a.main().unwrap_or(false))
            {
                let Some(association_id) = association.route_table_association_id() else {
                    continue;
                };
                debug!(route_table_id = %id, association_id, "Disassociating route table");
                let result = self
                    .client
                    .disassociate_route_table()
                    .association_id(association_id)
                    .send()
                    .await
                    .classify();
                ignore_not_found(result).context("Failed to disassociate route table")?;
            }
        }

        info!(route_table_id = %id, "Deleting route table");
        self.client
            .delete_route_table()
            .route_table_id(id)
            .send()
            .await
            .classify()
            .context("Failed to delete route table")?;
        Ok(())
    }

    pub async fn route_table_gone(&self, id: &str) -> Result<bool> {
        let result = self
            .client
            .describe_route_tables()
            .route_table_ids(id)
            .send()
            .await
            .classify();
        Ok(match ignore_not_found(result).context("Failed to describe route table")? {
            Some(response) => response.route_tables().is_empty(),
            None => true,
        })
    }

    /// Delete a security group.
    ///
    /// Retries on DependencyViolation while ENIs from terminated instances
    /// are still being released.
    pub async fn delete_security_group(&self, id: &str) -> Result<()> {
        info!(sg_id = %id, "Deleting security group");

        (|| async {
            self.client
                .delete_security_group()
                .group_id(id)
                .send()
                .await
                .classify()
                .context("Failed to delete security group")?;
            Ok(())
        })
        .retry(
            ExponentialBuilder::default()
                .with_min_delay(Duration::from_secs(5))
                .with_max_delay(Duration::from_secs(30))
                .with_max_times(5),
        )
        .when(|e: &anyhow::Error| classify_anyhow_error(e).is_retryable())
        .notify(|e, dur| {
            warn!(
                sg_id = %id,
                delay = ?dur,
                error = %e,
                "Security group deletion failed, retrying..."
            );
        })
        .await
    }

    pub async fn security_group_gone(&self, id: &str) -> Result<bool> {
        let result = self
            .client
            .describe_security_groups()
            .group_ids(id)
            .send()
            .await
            .classify();
        Ok(match ignore_not_found(result).context("Failed to describe security group")? {
            Some(response) => response.security_groups().is_empty(),
            None => true,
        })
    }

    pub async fn delete_vpc(&self, id: &str) -> Result<()> {
        info!(vpc_id = %id, "Deleting VPC");
        self.client
            .delete_vpc()
            .vpc_id(id)
            .send()
            .await
            .classify()
            .context("Failed to delete VPC")?;
        Ok(())
    }

    pub async fn vpc_gone(&self, id: &str) -> Result<bool> {
        let result = self
            .client
            .describe_vpcs()
            .vpc_ids(id)
            .send()
            .await
            .classify();
        Ok(match ignore_not_found(result).context("Failed to describe VPC")? {
            Some(response) => response.vpcs().is_empty(),
            None => true,
        })
    }
}
