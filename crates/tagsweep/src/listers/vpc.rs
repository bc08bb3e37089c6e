use super::{CandidateFilter, Listing};
use crate::provider::{CloudApi, VpcInfo};
use crate::resource::{Resource, VirtualNetwork};
use std::fmt::Display;
use tagsweep_common::ResourceKind;
use tracing::{debug, warn};

/// Stale non-default VPCs with their children resolved.
pub async fn list_vpcs<A: CloudApi>(api: &A, filter: &CandidateFilter) -> Listing {
    let kind = ResourceKind::Vpc;

    let vpcs = match api.list_vpcs(&filter.eligibility.owner_key).await {
        Ok(vpcs) => vpcs,
        Err(e) => return Listing::failed(Vec::new(), e),
    };

    let mut resources = Vec::new();
    for vpc in vpcs {
        if vpc.is_default {
            debug!(resource_type = %kind, resource_id = %vpc.id, "Skipping: default VPC");
            continue;
        }
        if filter.accepts(kind, &vpc.id, &vpc.tags) {
            resources.push(Resource::Vpc(resolve_children(api, vpc).await));
        }
    }

    Listing::new(resources, Vec::new())
}

/// Run the four child queries concurrently.
///
/// Each one is best effort: a failure is logged and yields an empty result,
/// since a VPC with an incomplete child list is still worth attempting.
async fn resolve_children<A: CloudApi>(api: &A, vpc: VpcInfo) -> VirtualNetwork {
    let (igw, subnets, security_groups, route_tables) = tokio::join!(
        api.internet_gateway_for_vpc(&vpc.id),
        api.subnets_for_vpc(&vpc.id),
        api.security_groups_for_vpc(&vpc.id),
        api.route_tables_for_vpc(&vpc.id),
    );

    let internet_gateway = best_effort(&vpc.id, "internet gateway", igw).flatten();
    let subnets = best_effort(&vpc.id, "subnets", subnets).unwrap_or_default();
    let security_groups = best_effort(&vpc.id, "security groups", security_groups)
        .unwrap_or_default()
        .into_iter()
        .filter(|sg| !sg.is_default())
        .map(|sg| sg.id)
        .collect();
    let route_tables = best_effort(&vpc.id, "route tables", route_tables)
        .unwrap_or_default()
        .into_iter()
        .filter(|rt| !rt.main)
        .map(|rt| rt.id)
        .collect();

    VirtualNetwork {
        id: vpc.id,
        internet_gateway,
        subnets,
        security_groups,
        route_tables,
        tags: vpc.tags,
    }
}

fn best_effort<T, E: Display>(vpc_id: &str, what: &str, result: Result<T, E>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(resource_type = %ResourceKind::Vpc, resource_id = %vpc_id, error = %e, "Failed to list {what}; continuing without them");
            None
        }
    }
}
