use super::{CandidateFilter, Listing};
use crate::provider::CloudApi;
use crate::resource::{NatGateway, Resource};
use tagsweep_common::ResourceKind;

/// Stale NAT gateways that are not already deleting.
pub async fn list_nat_gateways<A: CloudApi>(api: &A, filter: &CandidateFilter) -> Listing {
    let gateways = match api.list_nat_gateways(&filter.eligibility.owner_key).await {
        Ok(gateways) => gateways,
        Err(e) => return Listing::failed(Vec::new(), e),
    };

    let resources = gateways
        .into_iter()
        .filter(|n| filter.accepts(ResourceKind::NatGateway, &n.id, &n.tags))
        .map(|n| {
            Resource::NatGateway(NatGateway {
                id: n.id,
                vpc_id: n.vpc_id,
                allocation_ids: n.allocation_ids,
                tags: n.tags,
            })
        })
        .collect();
    Listing::new(resources, Vec::new())
}
