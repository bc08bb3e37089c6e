use super::{CandidateFilter, Listing};
use crate::provider::CloudApi;
use crate::resource::{ElasticIp, Resource};
use tagsweep_common::ResourceKind;

pub async fn list_elastic_ips<A: CloudApi>(api: &A, filter: &CandidateFilter) -> Listing {
    let addresses = match api.list_elastic_ips(&filter.eligibility.owner_key).await {
        Ok(addresses) => addresses,
        Err(e) => return Listing::failed(Vec::new(), e),
    };

    let resources = addresses
        .into_iter()
        .filter(|a| filter.accepts(ResourceKind::ElasticIp, &a.allocation_id, &a.tags))
        .map(|a| {
            Resource::ElasticIp(ElasticIp {
                allocation_id: a.allocation_id,
                association_id: a.association_id,
                public_ip: a.public_ip,
                tags: a.tags,
            })
        })
        .collect();
    Listing::new(resources, Vec::new())
}
