use super::{CandidateFilter, ChildFailure, Listing};
use crate::provider::CloudApi;
use crate::resource::{LogGroup, Resource};
use tagsweep_common::ResourceKind;
use tracing::warn;

/// Stale log groups.
///
/// A prefix name filter is pushed down to the list call. Tags are not
/// returned inline, so each surviving group costs one extra call; a failed
/// tag fetch skips that group and is reported.
pub async fn list_log_groups<A: CloudApi>(api: &A, filter: &CandidateFilter) -> Listing {
    let kind = ResourceKind::LogGroup;

    let groups = match api.list_log_groups(filter.name.as_prefix()).await {
        Ok(groups) => groups,
        Err(e) => return Listing::failed(Vec::new(), e),
    };

    let mut resources = Vec::new();
    let mut failures = Vec::new();

    for group in groups {
        if !filter.name.matches(&group.name) {
            continue;
        }
        let tags = match api.log_group_tags(&group).await {
            Ok(tags) => tags,
            Err(e) => {
                warn!(resource_type = %kind, resource_id = %group.name, error = ?e, "Failed to fetch log group tags");
                failures.push(ChildFailure {
                    resource_id: group.name,
                    error: e,
                });
                continue;
            }
        };
        if filter.is_stale(kind, &group.name, &tags) {
            resources.push(Resource::LogGroup(LogGroup {
                name: group.name,
                tags,
            }));
        }
    }

    Listing::new(resources, failures)
}
