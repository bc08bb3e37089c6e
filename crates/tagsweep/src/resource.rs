//! Discovered resources and the deletion targets they expand into
//!
//! A [`Resource`] is an immutable snapshot built by a lister. The planner
//! expands each resource into [`Target`]s, the unit that gets ordered,
//! deleted and reported. Composite resources (clusters, VPCs, roles) expand
//! into their children first and themselves last.

use std::collections::BTreeSet;
use std::fmt;
use tagsweep_common::{ResourceKind, TagSet};

/// EC2 instances sharing one origin marker value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceGroup {
    /// Origin marker value shared by every instance in the group
    pub owner: String,
    pub instance_ids: Vec<String>,
    /// VPCs the instances run in
    pub vpc_ids: BTreeSet<String>,
    /// Tags of the first instance seen
    pub tags: TagSet,
}

/// ECS cluster and the services registered in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerCluster {
    pub arn: String,
    pub name: String,
    pub service_arns: Vec<String>,
    pub tags: TagSet,
}

/// NAT gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NatGateway {
    pub id: String,
    pub vpc_id: Option<String>,
    /// Elastic IP allocations attached to the gateway
    pub allocation_ids: Vec<String>,
    pub tags: TagSet,
}

/// VPC plus the children that must go before it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualNetwork {
    pub id: String,
    pub internet_gateway: Option<String>,
    pub subnets: Vec<String>,
    /// Excludes the VPC's `default` group
    pub security_groups: Vec<String>,
    /// Excludes the table carrying the main association
    pub route_tables: Vec<String>,
    pub tags: TagSet,
}

/// Elastic IP allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElasticIp {
    pub allocation_id: String,
    pub association_id: Option<String>,
    pub public_ip: Option<String>,
    pub tags: TagSet,
}

/// CloudWatch Logs log group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogGroup {
    pub name: String,
    pub tags: TagSet,
}

/// IAM role plus the instance profiles that reference it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRole {
    pub name: String,
    pub id: String,
    pub instance_profiles: Vec<String>,
    pub tags: TagSet,
}

/// A stale resource found by a lister
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Instances(InstanceGroup),
    ContainerCluster(ContainerCluster),
    NatGateway(NatGateway),
    Vpc(VirtualNetwork),
    ElasticIp(ElasticIp),
    LogGroup(LogGroup),
    IamRole(IdentityRole),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Instances(_) => ResourceKind::Instances,
            Resource::ContainerCluster(_) => ResourceKind::ContainerCluster,
            Resource::NatGateway(_) => ResourceKind::NatGateway,
            Resource::Vpc(_) => ResourceKind::Vpc,
            Resource::ElasticIp(_) => ResourceKind::ElasticIp,
            Resource::LogGroup(_) => ResourceKind::LogGroup,
            Resource::IamRole(_) => ResourceKind::IamRole,
        }
    }

    /// Stable identifier of the root resource
    pub fn id(&self) -> &str {
        match self {
            Resource::Instances(g) => &g.owner,
            Resource::ContainerCluster(c) => &c.arn,
            Resource::NatGateway(n) => &n.id,
            Resource::Vpc(v) => &v.id,
            Resource::ElasticIp(e) => &e.allocation_id,
            Resource::LogGroup(l) => &l.name,
            Resource::IamRole(r) => &r.name,
        }
    }

    pub fn tags(&self) -> &TagSet {
        match self {
            Resource::Instances(g) => &g.tags,
            Resource::ContainerCluster(c) => &c.tags,
            Resource::NatGateway(n) => &n.tags,
            Resource::Vpc(v) => &v.tags,
            Resource::ElasticIp(e) => &e.tags,
            Resource::LogGroup(l) => &l.tags,
            Resource::IamRole(r) => &r.tags,
        }
    }

    /// One-line human description including child counts
    pub fn describe(&self) -> String {
        match self {
            Resource::Instances(g) => {
                format!("{} EC2 instance(s) from {}", g.instance_ids.len(), g.owner)
            }
            Resource::ContainerCluster(c) => {
                format!("ECS cluster {} ({} service(s))", c.name, c.service_arns.len())
            }
            Resource::NatGateway(n) => format!("NAT gateway {}", n.id),
            Resource::Vpc(v) => format!(
                "VPC {} ({} subnet(s), {} security group(s), {} route table(s), {})",
                v.id,
                v.subnets.len(),
                v.security_groups.len(),
                v.route_tables.len(),
                if v.internet_gateway.is_some() {
                    "1 internet gateway"
                } else {
                    "no internet gateway"
                }
            ),
            Resource::ElasticIp(e) => match &e.public_ip {
                Some(ip) => format!("Elastic IP {} ({ip})", e.allocation_id),
                None => format!("Elastic IP {}", e.allocation_id),
            },
            Resource::LogGroup(l) => format!("Log group {}", l.name),
            Resource::IamRole(r) => format!(
                "IAM role {} ({} instance profile(s))",
                r.name,
                r.instance_profiles.len()
            ),
        }
    }

    /// Deletion targets, children before the root.
    ///
    /// The root is always the last element.
    pub fn targets(&self) -> Vec<Target> {
        match self {
            Resource::Instances(g) => vec![Target::Instances {
                ids: g.instance_ids.clone(),
            }],
            Resource::ContainerCluster(c) => c
                .service_arns
                .iter()
                .map(|s| Target::EcsService {
                    cluster: c.arn.clone(),
                    service: s.clone(),
                })
                .chain(std::iter::once(Target::EcsCluster(c.arn.clone())))
                .collect(),
            Resource::NatGateway(n) => vec![Target::NatGateway(n.id.clone())],
            Resource::Vpc(v) => {
                let vpc = &v.id;
                let mut targets: Vec<Target> = Vec::new();
                targets.extend(v.internet_gateway.iter().map(|id| Target::InternetGateway {
                    id: id.clone(),
                    vpc: vpc.clone(),
                }));
                targets.extend(v.subnets.iter().cloned().map(Target::Subnet));
                targets.extend(v.route_tables.iter().cloned().map(Target::RouteTable));
                targets.extend(v.security_groups.iter().cloned().map(Target::SecurityGroup));
                targets.push(Target::Vpc(vpc.clone()));
                targets
            }
            Resource::ElasticIp(e) => vec![Target::ElasticIp(e.allocation_id.clone())],
            Resource::LogGroup(l) => vec![Target::LogGroup(l.name.clone())],
            Resource::IamRole(r) => r
                .instance_profiles
                .iter()
                .map(|p| Target::InstanceProfile {
                    name: p.clone(),
                    role: r.name.clone(),
                })
                .chain(std::iter::once(Target::Role(r.name.clone())))
                .collect(),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// A single provider object to delete and wait on
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Target {
    /// Terminated with one batch call
    Instances { ids: Vec<String> },
    EcsService { cluster: String, service: String },
    EcsCluster(String),
    NatGateway(String),
    ElasticIp(String),
    LogGroup(String),
    InternetGateway { id: String, vpc: String },
    Subnet(String),
    RouteTable(String),
    SecurityGroup(String),
    Vpc(String),
    InstanceProfile { name: String, role: String },
    Role(String),
}

impl Target {
    /// Stable type name used in reports
    pub fn kind(&self) -> &'static str {
        match self {
            Target::Instances { .. } => "ec2-instances",
            Target::EcsService { .. } => "ecs-service",
            Target::EcsCluster(_) => "ecs-cluster",
            Target::NatGateway(_) => "nat-gateway",
            Target::ElasticIp(_) => "elastic-ip",
            Target::LogGroup(_) => "log-group",
            Target::InternetGateway { .. } => "internet-gateway",
            Target::Subnet(_) => "subnet",
            Target::RouteTable(_) => "route-table",
            Target::SecurityGroup(_) => "security-group",
            Target::Vpc(_) => "vpc",
            Target::InstanceProfile { .. } => "instance-profile",
            Target::Role(_) => "iam-role",
        }
    }

    /// Provider identifier; instance batches join their ids with commas
    pub fn identifier(&self) -> String {
        match self {
            Target::Instances { ids } => ids.join(","),
            Target::EcsService { service, .. } => service.clone(),
            Target::InternetGateway { id, .. } => id.clone(),
            Target::InstanceProfile { name, .. } => name.clone(),
            Target::EcsCluster(id)
            | Target::NatGateway(id)
            | Target::ElasticIp(id)
            | Target::LogGroup(id)
            | Target::Subnet(id)
            | Target::RouteTable(id)
            | Target::SecurityGroup(id)
            | Target::Vpc(id)
            | Target::Role(id) => id.clone(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.identifier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vpc() -> Resource {
        Resource::Vpc(VirtualNetwork {
            id: "vpc-1".to_string(),
            internet_gateway: Some("igw-1".to_string()),
            subnets: vec!["subnet-a".to_string(), "subnet-b".to_string()],
            security_groups: vec!["sg-1".to_string()],
            route_tables: vec!["rtb-1".to_string()],
            tags: TagSet::new(),
        })
    }

    #[test]
    fn composite_root_is_last() {
        let targets = vpc().targets();
        assert_eq!(targets.len(), 6);
        assert_eq!(targets.last(), Some(&Target::Vpc("vpc-1".to_string())));

        let cluster = Resource::ContainerCluster(ContainerCluster {
            arn: "arn:cluster/a".to_string(),
            name: "a".to_string(),
            service_arns: vec!["svc-1".to_string(), "svc-2".to_string()],
            tags: TagSet::new(),
        });
        let targets = cluster.targets();
        assert_eq!(targets.len(), 3);
        assert_eq!(
            targets.last(),
            Some(&Target::EcsCluster("arn:cluster/a".to_string()))
        );
    }

    #[test]
    fn role_profiles_precede_role() {
        let role = Resource::IamRole(IdentityRole {
            name: "ci-role".to_string(),
            id: "AROA1".to_string(),
            instance_profiles: vec!["ci-profile".to_string()],
            tags: TagSet::new(),
        });
        assert_eq!(
            role.targets(),
            vec![
                Target::InstanceProfile {
                    name: "ci-profile".to_string(),
                    role: "ci-role".to_string()
                },
                Target::Role("ci-role".to_string()),
            ]
        );
    }

    #[test]
    fn instance_batch_identifier() {
        let t = Target::Instances {
            ids: vec!["i-1".to_string(), "i-2".to_string()],
        };
        assert_eq!(t.identifier(), "i-1,i-2");
        assert_eq!(t.to_string(), "ec2-instances i-1,i-2");
    }

    #[test]
    fn describe_mentions_children() {
        let text = vpc().describe();
        assert!(text.contains("2 subnet(s)"));
        assert!(text.contains("1 internet gateway"));
    }
}
