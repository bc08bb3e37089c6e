//! In-memory [`CloudApi`]
//!
//! Holds resources in a mutex-guarded state, hides anything already deleted
//! from listings and answers a second delete with a not-found error, the
//! way a real provider does. Failures are injected per [`Call`]; every call
//! is recorded for assertions.

use anyhow::{Result, bail};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tagsweep::aws::AwsError;
use tagsweep::provider::{
    CloudApi, ClusterInfo, ElasticIpInfo, InstanceInfo, LogGroupInfo, NatGatewayInfo, RoleInfo,
    RolePage, RouteTableInfo, SecurityGroupInfo, VpcInfo,
};
use tagsweep::resource::Target;
use tagsweep_common::TagSet;

/// A provider call, for failure injection and call recording
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Call {
    ListInstances,
    ListClusters,
    /// Keyed by the first ARN of the batch
    DescribeClusters(String),
    ListServices(String),
    ListNatGateways,
    ListElasticIps,
    ListLogGroups,
    LogGroupTags(String),
    ListVpcs,
    InternetGateway(String),
    Subnets(String),
    SecurityGroups(String),
    RouteTables(String),
    ListRoles,
    RoleTags(String),
    InstanceProfiles(String),
    Delete(Target),
    IsGone(Target),
}

/// A VPC and its children
#[derive(Debug, Clone)]
pub struct FakeVpc {
    pub id: String,
    pub is_default: bool,
    pub tags: TagSet,
    pub internet_gateway: Option<String>,
    pub subnets: Vec<String>,
    pub security_groups: Vec<SecurityGroupInfo>,
    pub route_tables: Vec<RouteTableInfo>,
}

impl FakeVpc {
    /// A VPC with the groups and tables every VPC is created with
    pub fn new(id: &str, tags: TagSet) -> Self {
        Self {
            id: id.to_string(),
            is_default: false,
            tags,
            internet_gateway: None,
            subnets: Vec::new(),
            security_groups: vec![SecurityGroupInfo {
                id: format!("sg-default-{id}"),
                name: "default".to_string(),
            }],
            route_tables: vec![RouteTableInfo {
                id: format!("rtb-main-{id}"),
                main: true,
            }],
        }
    }

    pub fn default_vpc(id: &str, tags: TagSet) -> Self {
        Self {
            is_default: true,
            ..Self::new(id, tags)
        }
    }

    pub fn with_internet_gateway(mut self, id: &str) -> Self {
        self.internet_gateway = Some(id.to_string());
        self
    }

    pub fn with_subnet(mut self, id: &str) -> Self {
        self.subnets.push(id.to_string());
        self
    }

    pub fn with_security_group(mut self, id: &str) -> Self {
        self.security_groups.push(SecurityGroupInfo {
            id: id.to_string(),
            name: format!("{id}-name"),
        });
        self
    }

    pub fn with_route_table(mut self, id: &str) -> Self {
        self.route_tables.push(RouteTableInfo {
            id: id.to_string(),
            main: false,
        });
        self
    }

    pub fn main_route_table(&self) -> &str {
        self.route_tables
            .iter()
            .find(|rt| rt.main)
            .map(|rt| rt.id.as_str())
            .unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct State {
    instances: Vec<InstanceInfo>,
    clusters: Vec<(ClusterInfo, Vec<String>)>,
    nat_gateways: Vec<NatGatewayInfo>,
    elastic_ips: Vec<ElasticIpInfo>,
    log_groups: Vec<(LogGroupInfo, TagSet)>,
    vpcs: Vec<FakeVpc>,
    roles: Vec<(RoleInfo, TagSet, Vec<String>)>,
    role_page_size: usize,

    failing: HashSet<Call>,
    delete_failures: HashMap<String, String>,
    stuck: HashSet<String>,
    /// Identifiers (single instance ids included) that no longer exist
    gone: HashSet<String>,
    delete_delay: Option<Duration>,
    calls: Vec<Call>,
}

impl State {
    fn exists(&self, id: &str) -> bool {
        !self.gone.contains(id)
    }

    fn record(&mut self, call: Call) -> Result<()> {
        let failing = self.failing.contains(&call);
        let described = format!("{call:?}");
        self.calls.push(call);
        if failing {
            bail!("injected failure: {described}");
        }
        Ok(())
    }
}

/// Identifiers a target removes when deleted
fn removed_ids(target: &Target) -> Vec<String> {
    match target {
        Target::Instances { ids } => ids.clone(),
        other => vec![other.identifier()],
    }
}

pub struct FakeCloud {
    state: Mutex<State>,
}

impl Default for FakeCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCloud {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                role_page_size: 2,
                ..State::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_instance(self, id: &str, vpc_id: Option<&str>, tags: TagSet) -> Self {
        self.lock().instances.push(InstanceInfo {
            id: id.to_string(),
            vpc_id: vpc_id.map(str::to_string),
            tags,
        });
        self
    }

    /// Cluster named `name` with ARN `arn:aws:ecs:...:cluster/{name}`
    pub fn with_cluster(self, name: &str, status: &str, tags: TagSet, services: &[&str]) -> Self {
        let arn = Self::cluster_arn(name);
        self.lock().clusters.push((
            ClusterInfo {
                arn,
                name: name.to_string(),
                status: status.to_string(),
                tags,
            },
            services.iter().map(|s| s.to_string()).collect(),
        ));
        self
    }

    pub fn cluster_arn(name: &str) -> String {
        format!("arn:aws:ecs:us-east-2:123456789012:cluster/{name}")
    }

    pub fn with_nat_gateway(
        self,
        id: &str,
        vpc_id: Option<&str>,
        allocation_ids: &[&str],
        tags: TagSet,
    ) -> Self {
        self.lock().nat_gateways.push(NatGatewayInfo {
            id: id.to_string(),
            vpc_id: vpc_id.map(str::to_string),
            allocation_ids: allocation_ids.iter().map(|s| s.to_string()).collect(),
            tags,
        });
        self
    }

    pub fn with_elastic_ip(self, allocation_id: &str, association_id: Option<&str>, tags: TagSet) -> Self {
        self.lock().elastic_ips.push(ElasticIpInfo {
            allocation_id: allocation_id.to_string(),
            association_id: association_id.map(str::to_string),
            public_ip: None,
            tags,
        });
        self
    }

    pub fn with_log_group(self, name: &str, tags: TagSet) -> Self {
        self.lock().log_groups.push((
            LogGroupInfo {
                name: name.to_string(),
                arn: Some(format!("arn:aws:logs:us-east-2:123456789012:log-group:{name}:*")),
            },
            tags,
        ));
        self
    }

    pub fn with_vpc(self, vpc: FakeVpc) -> Self {
        self.lock().vpcs.push(vpc);
        self
    }

    pub fn with_role(self, name: &str, tags: TagSet, profiles: &[&str]) -> Self {
        self.lock().roles.push((
            RoleInfo {
                name: name.to_string(),
                id: format!("AROA{}", name.to_uppercase()),
            },
            tags,
            profiles.iter().map(|s| s.to_string()).collect(),
        ));
        self
    }

    /// Roles returned per `ListRoles` page
    pub fn with_role_page_size(self, size: usize) -> Self {
        self.lock().role_page_size = size.max(1);
        self
    }

    /// Make `call` fail every time
    pub fn failing(self, call: Call) -> Self {
        self.lock().failing.insert(call);
        self
    }

    /// Reject deletes of `identifier` with a non-retryable error
    pub fn fail_delete(self, identifier: &str, message: &str) -> Self {
        self.lock()
            .delete_failures
            .insert(identifier.to_string(), message.to_string());
        self
    }

    /// Accept deletes of `identifier` but never report it gone
    pub fn stuck(self, identifier: &str) -> Self {
        self.lock().stuck.insert(identifier.to_string());
        self
    }

    /// Sleep this long inside every delete call
    pub fn with_delete_delay(self, delay: Duration) -> Self {
        self.lock().delete_delay = Some(delay);
        self
    }

    /// Remove `identifier` behind the sweeper's back
    pub fn delete_out_of_band(&self, identifier: &str) {
        self.lock().gone.insert(identifier.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Targets passed to `delete`, in call order
    pub fn delete_calls(&self) -> Vec<Target> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Delete(t) => Some(t.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count_calls(&self, call: &Call) -> usize {
        self.lock().calls.iter().filter(|c| *c == call).count()
    }

    pub fn is_deleted(&self, identifier: &str) -> bool {
        self.lock().gone.contains(identifier)
    }
}

impl CloudApi for FakeCloud {
    async fn list_instances(&self, owner_key: &str) -> Result<Vec<InstanceInfo>> {
        let mut state = self.lock();
        state.record(Call::ListInstances)?;
        Ok(state
            .instances
            .iter()
            .filter(|i| state.exists(&i.id) && i.tags.contains_key(owner_key))
            .cloned()
            .collect())
    }

    async fn list_cluster_arns(&self) -> Result<Vec<String>> {
        let mut state = self.lock();
        state.record(Call::ListClusters)?;
        Ok(state
            .clusters
            .iter()
            .filter(|(c, _)| state.exists(&c.arn))
            .map(|(c, _)| c.arn.clone())
            .collect())
    }

    async fn describe_clusters(&self, arns: &[String]) -> Result<Vec<ClusterInfo>> {
        let mut state = self.lock();
        state.record(Call::DescribeClusters(
            arns.first().cloned().unwrap_or_default(),
        ))?;
        Ok(state
            .clusters
            .iter()
            .filter(|(c, _)| arns.contains(&c.arn))
            .map(|(c, _)| c.clone())
            .collect())
    }

    async fn list_services(&self, cluster_arn: &str) -> Result<Vec<String>> {
        let mut state = self.lock();
        state.record(Call::ListServices(cluster_arn.to_string()))?;
        Ok(state
            .clusters
            .iter()
            .filter(|(c, _)| c.arn == cluster_arn)
            .flat_map(|(_, services)| services.iter())
            .filter(|s| state.exists(s))
            .cloned()
            .collect())
    }

    async fn list_nat_gateways(&self, owner_key: &str) -> Result<Vec<NatGatewayInfo>> {
        let mut state = self.lock();
        state.record(Call::ListNatGateways)?;
        Ok(state
            .nat_gateways
            .iter()
            .filter(|n| state.exists(&n.id) && n.tags.contains_key(owner_key))
            .cloned()
            .collect())
    }

    async fn list_elastic_ips(&self, owner_key: &str) -> Result<Vec<ElasticIpInfo>> {
        let mut state = self.lock();
        state.record(Call::ListElasticIps)?;
        Ok(state
            .elastic_ips
            .iter()
            .filter(|a| state.exists(&a.allocation_id) && a.tags.contains_key(owner_key))
            .cloned()
            .collect())
    }

    async fn list_log_groups(&self, name_prefix: Option<&str>) -> Result<Vec<LogGroupInfo>> {
        let mut state = self.lock();
        state.record(Call::ListLogGroups)?;
        Ok(state
            .log_groups
            .iter()
            .map(|(g, _)| g)
            .filter(|g| state.exists(&g.name))
            .filter(|g| name_prefix.is_none_or(|p| g.name.starts_with(p)))
            .cloned()
            .collect())
    }

    async fn log_group_tags(&self, group: &LogGroupInfo) -> Result<TagSet> {
        let mut state = self.lock();
        state.record(Call::LogGroupTags(group.name.clone()))?;
        state
            .log_groups
            .iter()
            .find(|(g, _)| g.name == group.name)
            .map(|(_, tags)| tags.clone())
            .ok_or_else(|| {
                AwsError::NotFound {
                    message: group.name.clone(),
                }
                .into()
            })
    }

    async fn list_vpcs(&self, owner_key: &str) -> Result<Vec<VpcInfo>> {
        let mut state = self.lock();
        state.record(Call::ListVpcs)?;
        Ok(state
            .vpcs
            .iter()
            .filter(|v| state.exists(&v.id) && v.tags.contains_key(owner_key))
            .map(|v| VpcInfo {
                id: v.id.clone(),
                is_default: v.is_default,
                tags: v.tags.clone(),
            })
            .collect())
    }

    async fn internet_gateway_for_vpc(&self, vpc_id: &str) -> Result<Option<String>> {
        let mut state = self.lock();
        state.record(Call::InternetGateway(vpc_id.to_string()))?;
        Ok(state
            .vpcs
            .iter()
            .find(|v| v.id == vpc_id)
            .and_then(|v| v.internet_gateway.clone())
            .filter(|igw| state.exists(igw)))
    }

    async fn subnets_for_vpc(&self, vpc_id: &str) -> Result<Vec<String>> {
        let mut state = self.lock();
        state.record(Call::Subnets(vpc_id.to_string()))?;
        Ok(state
            .vpcs
            .iter()
            .filter(|v| v.id == vpc_id)
            .flat_map(|v| v.subnets.iter())
            .filter(|s| state.exists(s))
            .cloned()
            .collect())
    }

    async fn security_groups_for_vpc(&self, vpc_id: &str) -> Result<Vec<SecurityGroupInfo>> {
        let mut state = self.lock();
        state.record(Call::SecurityGroups(vpc_id.to_string()))?;
        Ok(state
            .vpcs
            .iter()
            .filter(|v| v.id == vpc_id)
            .flat_map(|v| v.security_groups.iter())
            .filter(|sg| state.exists(&sg.id))
            .cloned()
            .collect())
    }

    async fn route_tables_for_vpc(&self, vpc_id: &str) -> Result<Vec<RouteTableInfo>> {
        let mut state = self.lock();
        state.record(Call::RouteTables(vpc_id.to_string()))?;
        Ok(state
            .vpcs
            .iter()
            .filter(|v| v.id == vpc_id)
            .flat_map(|v| v.route_tables.iter())
            .filter(|rt| state.exists(&rt.id))
            .cloned()
            .collect())
    }

    async fn list_roles_page(&self, marker: Option<String>) -> Result<RolePage> {
        let mut state = self.lock();
        state.record(Call::ListRoles)?;
        let start: usize = match marker {
            Some(m) => m.parse()?,
            None => 0,
        };
        let live: Vec<RoleInfo> = state
            .roles
            .iter()
            .filter(|(r, _, _)| state.exists(&r.name))
            .map(|(r, _, _)| r.clone())
            .collect();
        let end = (start + state.role_page_size).min(live.len());
        Ok(RolePage {
            roles: live.get(start..end).map(<[RoleInfo]>::to_vec).unwrap_or_default(),
            next_marker: (end < live.len()).then(|| end.to_string()),
        })
    }

    async fn role_tags(&self, role_name: &str) -> Result<TagSet> {
        let mut state = self.lock();
        state.record(Call::RoleTags(role_name.to_string()))?;
        Ok(state
            .roles
            .iter()
            .find(|(r, _, _)| r.name == role_name)
            .map(|(_, tags, _)| tags.clone())
            .unwrap_or_default())
    }

    async fn instance_profiles_for_role(&self, role_name: &str) -> Result<Vec<String>> {
        let mut state = self.lock();
        state.record(Call::InstanceProfiles(role_name.to_string()))?;
        Ok(state
            .roles
            .iter()
            .filter(|(r, _, _)| r.name == role_name)
            .flat_map(|(_, _, profiles)| profiles.iter())
            .filter(|p| state.exists(p))
            .cloned()
            .collect())
    }

    async fn delete(&self, target: &Target) -> Result<()> {
        let delay = self.lock().delete_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        state.record(Call::Delete(target.clone()))?;

        // Like the EC2 wrapper, a batch with some ids already gone still
        // deletes the rest; not-found only when nothing was left.
        let ids = removed_ids(target);
        if ids.iter().all(|id| !state.exists(id)) {
            return Err(AwsError::NotFound {
                message: format!("{target} does not exist"),
            }
            .into());
        }
        if let Some(message) = ids.iter().find_map(|id| state.delete_failures.get(id)) {
            return Err(AwsError::Sdk {
                code: Some("InjectedFailure".to_string()),
                message: message.clone(),
            }
            .into());
        }
        state.gone.extend(ids);
        Ok(())
    }

    async fn is_gone(&self, target: &Target) -> Result<bool> {
        let mut state = self.lock();
        state.record(Call::IsGone(target.clone()))?;
        let ids = removed_ids(target);
        if ids.iter().any(|id| state.stuck.contains(id)) {
            return Ok(false);
        }
        Ok(ids.iter().all(|id| !state.exists(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::stale_tags;

    #[tokio::test]
    async fn second_delete_is_not_found() {
        let cloud = FakeCloud::new().with_log_group("/ci/a", stale_tags("ci-1"));
        let target = Target::LogGroup("/ci/a".to_string());

        cloud.delete(&target).await.unwrap();
        let err = cloud.delete(&target).await.unwrap_err();
        assert!(tagsweep::aws::classify_anyhow_error(&err).is_not_found());
        assert!(cloud.list_log_groups(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn injected_failures_are_recorded() {
        let cloud = FakeCloud::new().failing(Call::ListVpcs);
        assert!(cloud.list_vpcs("k").await.is_err());
        assert_eq!(cloud.count_calls(&Call::ListVpcs), 1);
    }

    #[tokio::test]
    async fn roles_paginate() {
        let cloud = FakeCloud::new()
            .with_role("a", TagSet::new(), &[])
            .with_role("b", TagSet::new(), &[])
            .with_role("c", TagSet::new(), &[]);
        let first = cloud.list_roles_page(None).await.unwrap();
        assert_eq!(first.roles.len(), 2);
        let second = cloud.list_roles_page(first.next_marker).await.unwrap();
        assert_eq!(second.roles.len(), 1);
        assert!(second.next_marker.is_none());
    }
}
