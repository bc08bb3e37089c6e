use super::{CandidateFilter, Listing};
use crate::provider::CloudApi;
use crate::resource::{InstanceGroup, Resource};
use std::collections::BTreeMap;
use tagsweep_common::ResourceKind;
use tracing::debug;

/// Stale instances, grouped by origin marker value.
///
/// One group becomes one resource and is terminated with a single batch
/// call. Groups keep the order their first instance was listed in.
pub async fn list_instances<A: CloudApi>(api: &A, filter: &CandidateFilter) -> Listing {
    let kind = ResourceKind::Instances;
    let owner_key = &filter.eligibility.owner_key;

    let instances = match api.list_instances(owner_key).await {
        Ok(instances) => instances,
        Err(e) => return Listing::failed(Vec::new(), e),
    };
    debug!(count = instances.len(), "Listed instances");

    let mut order: Vec<String> = Vec::new();
    let mut groups: BTreeMap<String, InstanceGroup> = BTreeMap::new();

    for instance in instances {
        if !filter.accepts(kind, &instance.id, &instance.tags) {
            continue;
        }
        // Stale implies the owner marker is present
        let Some(owner) = instance.tags.get(owner_key).map(str::to_string) else {
            continue;
        };

        let group = groups.entry(owner.clone()).or_insert_with(|| {
            order.push(owner.clone());
            InstanceGroup {
                owner,
                instance_ids: Vec::new(),
                vpc_ids: Default::default(),
                tags: instance.tags.clone(),
            }
        });
        group.instance_ids.push(instance.id);
        group.vpc_ids.extend(instance.vpc_id);
    }

    let resources = order
        .into_iter()
        .filter_map(|owner| groups.remove(&owner))
        .map(Resource::Instances)
        .collect();
    Listing::new(resources, Vec::new())
}
