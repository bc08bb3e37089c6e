use super::{CandidateFilter, ChildFailure, Listing};
use crate::provider::CloudApi;
use crate::resource::{IdentityRole, Resource};
use tagsweep_common::ResourceKind;
use tracing::{debug, warn};

/// Stale IAM roles with their instance profiles.
///
/// `ListRoles` offers no name or tag filter, so every page is walked and
/// the name filter runs before the per-role tag fetch, which dominates the
/// cost. A failed tag fetch is recorded and the walk moves on to the next
/// role.
pub async fn list_roles<A: CloudApi>(api: &A, filter: &CandidateFilter) -> Listing {
    let kind = ResourceKind::IamRole;

    let mut resources = Vec::new();
    let mut failures = Vec::new();
    let mut marker: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = match api.list_roles_page(marker.take()).await {
            Ok(page) => page,
            Err(e) => return Listing::failed(resources, e),
        };
        pages += 1;

        for role in page.roles {
            if !filter.name.matches(&role.name) {
                continue;
            }

            let tags = match api.role_tags(&role.name).await {
                Ok(tags) => tags,
                Err(e) => {
                    warn!(resource_type = %kind, resource_id = %role.name, error = ?e, "Failed to fetch role tags");
                    failures.push(ChildFailure {
                        resource_id: role.name,
                        error: e,
                    });
                    continue;
                }
            };
            if !filter.is_stale(kind, &role.name, &tags) {
                continue;
            }

            let instance_profiles = match api.instance_profiles_for_role(&role.name).await {
                Ok(profiles) => profiles,
                Err(e) => {
                    warn!(resource_type = %kind, resource_id = %role.name, error = ?e, "Failed to list instance profiles");
                    failures.push(ChildFailure {
                        resource_id: role.name.clone(),
                        error: e,
                    });
                    Vec::new()
                }
            };

            resources.push(Resource::IamRole(IdentityRole {
                name: role.name,
                id: role.id,
                instance_profiles,
                tags,
            }));
        }

        match page.next_marker {
            Some(next) => marker = Some(next),
            None => break,
        }
    }

    debug!(pages, found = resources.len(), "Finished walking IAM roles");
    Listing::new(resources, failures)
}
