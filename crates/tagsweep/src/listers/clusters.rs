use super::{CandidateFilter, ChildFailure, Listing};
use crate::provider::{CloudApi, cluster_name_from_arn};
use crate::resource::{ContainerCluster, Resource};
use tagsweep_common::ResourceKind;
use tagsweep_common::defaults::ECS_DESCRIBE_BATCH;
use tracing::{debug, warn};

/// Stale ECS clusters and their services.
///
/// The list call has no tag filter, so the name filter runs on the name
/// embedded in each ARN before describing. Clusters already `INACTIVE` are
/// skipped. A failed service listing is recorded and the cluster is still
/// emitted with whatever services are known (none). A failed describe batch
/// is recorded and the remaining batches are still examined; every failure
/// ends up in one combined error.
pub async fn list_clusters<A: CloudApi>(api: &A, filter: &CandidateFilter) -> Listing {
    let kind = ResourceKind::ContainerCluster;

    let arns: Vec<String> = match api.list_cluster_arns().await {
        Ok(arns) => arns
            .into_iter()
            .filter(|arn| filter.name.matches(cluster_name_from_arn(arn)))
            .collect(),
        Err(e) => return Listing::failed(Vec::new(), e),
    };
    debug!(count = arns.len(), "Listed ECS clusters matching name filter");

    let mut eligible = Vec::new();
    let mut failures = Vec::new();
    for batch in arns.chunks(ECS_DESCRIBE_BATCH) {
        let clusters = match api.describe_clusters(batch).await {
            Ok(clusters) => clusters,
            Err(e) => {
                warn!(resource_type = %kind, batch = batch.len(), error = ?e, "Failed to describe clusters");
                failures.push(ChildFailure {
                    resource_id: batch.join(","),
                    error: e,
                });
                continue;
            }
        };
        for cluster in clusters {
            if cluster.is_inactive() {
                debug!(resource_type = %kind, resource_id = %cluster.arn, "Skipping: already inactive");
                continue;
            }
            if filter.is_stale(kind, &cluster.arn, &cluster.tags) {
                eligible.push(cluster);
            }
        }
    }

    let mut resources = Vec::with_capacity(eligible.len());

    for cluster in eligible {
        let service_arns = match api.list_services(&cluster.arn).await {
            Ok(services) => services,
            Err(e) => {
                warn!(resource_type = %kind, resource_id = %cluster.arn, error = ?e, "Failed to list services");
                failures.push(ChildFailure {
                    resource_id: cluster.arn.clone(),
                    error: e,
                });
                Vec::new()
            }
        };
        resources.push(Resource::ContainerCluster(ContainerCluster {
            arn: cluster.arn,
            name: cluster.name,
            service_arns,
            tags: cluster.tags,
        }));
    }

    Listing::new(resources, failures)
}
