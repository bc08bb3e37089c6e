//! Resource types a sweep can discover
//!
//! Each kind has its own lister. Kinds are also the unit of CLI selection.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Types of AWS resources tagsweep can reclaim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// EC2 instances grouped by origin marker
    Instances,
    /// ECS cluster and its services
    ContainerCluster,
    /// NAT gateway
    NatGateway,
    /// VPC with its subnets, route tables, security groups and internet gateway
    Vpc,
    /// Elastic IP allocation
    ElasticIp,
    /// CloudWatch Logs log group
    LogGroup,
    /// IAM role with its instance profiles
    IamRole,
}

/// Error returned when parsing an unknown kind name
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown resource kind '{0}' (expected one of: {names})", names = ResourceKind::names().join(", "))]
pub struct UnknownKind(pub String);

impl ResourceKind {
    /// Every kind, in lister dispatch order
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::Instances,
        ResourceKind::ContainerCluster,
        ResourceKind::NatGateway,
        ResourceKind::Vpc,
        ResourceKind::ElasticIp,
        ResourceKind::LogGroup,
        ResourceKind::IamRole,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Instances => "instances",
            ResourceKind::ContainerCluster => "ecs-cluster",
            ResourceKind::NatGateway => "nat-gateway",
            ResourceKind::Vpc => "vpc",
            ResourceKind::ElasticIp => "elastic-ip",
            ResourceKind::LogGroup => "log-group",
            ResourceKind::IamRole => "iam-role",
        }
    }

    /// Whether the kind runs when no explicit selection is given.
    ///
    /// IAM roles have no server-side filter and require one tag call per
    /// candidate role, which collides with account-wide IAM rate limits.
    pub fn enabled_by_default(self) -> bool {
        !matches!(self, ResourceKind::IamRole)
    }

    /// Kinds that run by default
    pub fn defaults() -> Vec<ResourceKind> {
        Self::ALL
            .into_iter()
            .filter(|k| k.enabled_by_default())
            .collect()
    }

    fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|k| k.as_str()).collect()
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_back() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.as_str().parse::<ResourceKind>(), Ok(kind));
        }
        assert_eq!("VPC".parse::<ResourceKind>(), Ok(ResourceKind::Vpc));
    }

    #[test]
    fn unknown_kind_lists_valid_names() {
        let err = "s3-bucket".parse::<ResourceKind>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("s3-bucket"));
        assert!(msg.contains("nat-gateway"));
    }

    #[test]
    fn iam_roles_are_opt_in() {
        let defaults = ResourceKind::defaults();
        assert!(!defaults.contains(&ResourceKind::IamRole));
        assert_eq!(defaults.len(), ResourceKind::ALL.len() - 1);
    }
}
