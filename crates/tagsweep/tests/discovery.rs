//! Discovery against the in-memory cloud

use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use tagsweep::listers::ListerError;
use tagsweep::{Resource, SweepConfig, Sweeper};
use tagsweep_common::{NameFilter, ResourceKind, TagSet};
use tagsweep_test_utils::{
    Call, FakeCloud, FakeVpc, foreign_tags, fresh_tags, named, stale_tags, test_config,
};
use tokio_util::sync::CancellationToken;

fn sweeper(cloud: FakeCloud, config: SweepConfig) -> (Arc<FakeCloud>, Sweeper<FakeCloud>) {
    let cloud = Arc::new(cloud);
    (cloud.clone(), Sweeper::new(cloud, config))
}

fn ids(resources: &[Resource]) -> BTreeSet<String> {
    resources.iter().map(|r| r.id().to_string()).collect()
}

/// One stale resource of every kind
fn populated() -> FakeCloud {
    FakeCloud::new()
        .with_instance("i-1", None, stale_tags("ci-1"))
        .with_cluster("ci-cluster", "ACTIVE", stale_tags("ci-1"), &["svc-1"])
        .with_nat_gateway("nat-1", None, &["eipalloc-1"], stale_tags("ci-1"))
        .with_elastic_ip("eipalloc-1", Some("eipassoc-1"), stale_tags("ci-1"))
        .with_log_group("/ci/run-1", stale_tags("ci-1"))
        .with_vpc(FakeVpc::new("vpc-1", stale_tags("ci-1")).with_subnet("subnet-1"))
        .with_role("ci-role", stale_tags("ci-1"), &["ci-profile"])
}

#[tokio::test]
async fn finds_one_resource_per_kind() {
    let (_, sweeper) = sweeper(populated(), test_config());
    let discovered = sweeper.scan(Utc::now()).await;

    assert!(discovered.error.is_none());
    let kinds: BTreeSet<ResourceKind> = discovered.resources.iter().map(Resource::kind).collect();
    assert_eq!(kinds, ResourceKind::ALL.iter().copied().collect());
}

#[tokio::test]
async fn failing_lister_does_not_hide_siblings() {
    let (_, sweeper) = sweeper(populated().failing(Call::ListVpcs), test_config());
    let discovered = sweeper.scan(Utc::now()).await;

    let error = discovered.error.expect("vpc lister should fail");
    assert_eq!(error.failed_kinds().collect::<Vec<_>>(), vec![ResourceKind::Vpc]);
    assert!(matches!(error.failures[0].1, ListerError::Provider(_)));

    let found = ids(&discovered.resources);
    let expected: BTreeSet<String> = [
        "ci-1",
        FakeCloud::cluster_arn("ci-cluster").as_str(),
        "nat-1",
        "eipalloc-1",
        "/ci/run-1",
        "ci-role",
    ]
    .into_iter()
    .map(str::to_string)
    .collect();
    assert_eq!(found, expected);
}

#[tokio::test]
async fn rerun_returns_same_identifiers() {
    let (_, sweeper) = sweeper(populated(), test_config());
    let first = sweeper.scan(Utc::now()).await;
    let second = sweeper.scan(Utc::now()).await;
    assert_eq!(ids(&first.resources), ids(&second.resources));
    assert_eq!(first.resources, second.resources);
}

#[tokio::test]
async fn skips_fresh_foreign_and_default_resources() {
    let cloud = FakeCloud::new()
        .with_log_group("/ci/fresh", fresh_tags("ci-1"))
        .with_log_group("/prod/app", foreign_tags())
        .with_log_group("/ci/untagged", TagSet::new())
        .with_vpc(FakeVpc::default_vpc("vpc-default", stale_tags("ci-1")))
        .with_instance("i-fresh", None, fresh_tags("ci-2"));
    let (_, sweeper) = sweeper(cloud, test_config());
    let discovered = sweeper.scan(Utc::now()).await;

    assert!(discovered.resources.is_empty());
    assert!(discovered.error.is_none());
}

#[tokio::test]
async fn main_route_table_and_default_group_are_excluded() {
    let vpc = FakeVpc::new("vpc-1", stale_tags("ci-1"))
        .with_route_table("rtb-a")
        .with_route_table("rtb-b")
        .with_security_group("sg-app")
        .with_internet_gateway("igw-1");
    assert_eq!(vpc.route_tables.len(), 3);
    let main = vpc.main_route_table().to_string();

    let (_, sweeper) = sweeper(FakeCloud::new().with_vpc(vpc), test_config());
    let discovered = sweeper.scan(Utc::now()).await;

    let [Resource::Vpc(network)] = discovered.resources.as_slice() else {
        panic!("expected one VPC, got {:?}", discovered.resources);
    };
    assert_eq!(network.route_tables, vec!["rtb-a", "rtb-b"]);
    assert!(!network.route_tables.contains(&main));
    assert_eq!(network.security_groups, vec!["sg-app"]);
    assert_eq!(network.internet_gateway.as_deref(), Some("igw-1"));
}

#[tokio::test]
async fn vpc_child_failure_is_best_effort() {
    let cloud = FakeCloud::new()
        .with_vpc(
            FakeVpc::new("vpc-1", stale_tags("ci-1"))
                .with_subnet("subnet-1")
                .with_route_table("rtb-a"),
        )
        .failing(Call::Subnets("vpc-1".to_string()));
    let (_, sweeper) = sweeper(cloud, test_config());
    let discovered = sweeper.scan(Utc::now()).await;

    assert!(discovered.error.is_none());
    let [Resource::Vpc(network)] = discovered.resources.as_slice() else {
        panic!("expected one VPC");
    };
    assert!(network.subnets.is_empty());
    assert_eq!(network.route_tables, vec!["rtb-a"]);
}

#[tokio::test]
async fn inactive_cluster_is_skipped() {
    let cloud = FakeCloud::new()
        .with_cluster("ci-old", "INACTIVE", stale_tags("ci-1"), &[])
        .with_cluster("ci-live", "ACTIVE", stale_tags("ci-1"), &[]);
    let (cloud, sweeper) = sweeper(cloud, test_config());
    let discovered = sweeper.scan(Utc::now()).await;

    assert_eq!(
        ids(&discovered.resources),
        BTreeSet::from([FakeCloud::cluster_arn("ci-live")])
    );
    assert_eq!(
        cloud.count_calls(&Call::ListServices(FakeCloud::cluster_arn("ci-old"))),
        0
    );
}

#[tokio::test]
async fn service_listing_failure_keeps_cluster_and_siblings() {
    let broken = FakeCloud::cluster_arn("ci-broken");
    let cloud = FakeCloud::new()
        .with_cluster("ci-broken", "ACTIVE", stale_tags("ci-1"), &["svc-x"])
        .with_cluster("ci-ok", "ACTIVE", stale_tags("ci-1"), &["svc-y"])
        .failing(Call::ListServices(broken.clone()));
    let (_, sweeper) = sweeper(cloud, test_config());
    let discovered = sweeper.scan(Utc::now()).await;

    let clusters: Vec<_> = discovered
        .resources
        .iter()
        .filter_map(|r| match r {
            Resource::ContainerCluster(c) => Some(c),
            _ => None,
        })
        .collect();
    assert_eq!(clusters.len(), 2);
    assert!(clusters[0].service_arns.is_empty());
    assert_eq!(clusters[1].service_arns, vec!["svc-y"]);

    let error = discovered.error.expect("partial error");
    let (kind, ListerError::Partial { failures }) = &error.failures[0] else {
        panic!("expected partial error");
    };
    assert_eq!(*kind, ResourceKind::ContainerCluster);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].resource_id, broken);
}

fn partial_failures(error: &tagsweep::DiscoveryError, kind: ResourceKind) -> Vec<String> {
    error
        .failures
        .iter()
        .filter(|(k, _)| *k == kind)
        .flat_map(|(_, e)| match e {
            ListerError::Partial { failures } => failures.iter().map(|f| f.resource_id.clone()).collect(),
            ListerError::Provider(e) => panic!("expected partial results, got {e:#}"),
        })
        .collect()
}

#[tokio::test]
async fn every_service_listing_failure_is_reported() {
    let a = FakeCloud::cluster_arn("ci-a");
    let b = FakeCloud::cluster_arn("ci-b");
    let cloud = FakeCloud::new()
        .with_cluster("ci-a", "ACTIVE", stale_tags("ci-1"), &["svc-a"])
        .with_cluster("ci-b", "ACTIVE", stale_tags("ci-1"), &["svc-b"])
        .with_cluster("ci-c", "ACTIVE", stale_tags("ci-1"), &["svc-c"])
        .failing(Call::ListServices(a.clone()))
        .failing(Call::ListServices(b.clone()));
    let (_, sweeper) = sweeper(cloud, test_config());
    let discovered = sweeper.scan(Utc::now()).await;

    assert_eq!(discovered.resources.len(), 3);
    let error = discovered.error.expect("service failures are reported");
    assert_eq!(error.failures.len(), 1);
    assert_eq!(
        partial_failures(&error, ResourceKind::ContainerCluster),
        vec![a, b]
    );
}

#[tokio::test]
async fn failed_describe_batch_does_not_stop_later_batches() {
    let names: Vec<String> = (0..=100).map(|i| format!("ci-{i:03}")).collect();
    let mut cloud = FakeCloud::new();
    for name in &names {
        cloud = cloud.with_cluster(name, "ACTIVE", stale_tags("ci-1"), &[]);
    }
    let last = FakeCloud::cluster_arn("ci-100");
    let cloud = cloud
        .failing(Call::DescribeClusters(FakeCloud::cluster_arn("ci-000")))
        .failing(Call::ListServices(last.clone()));
    let (cloud, sweeper) = sweeper(cloud, test_config());
    let discovered = sweeper.scan(Utc::now()).await;

    // The first batch of 100 failed; the second batch still ran.
    assert_eq!(ids(&discovered.resources), BTreeSet::from([last.clone()]));
    assert_eq!(cloud.count_calls(&Call::DescribeClusters(last.clone())), 1);

    let error = discovered.error.expect("both failures are reported");
    let failed = partial_failures(&error, ResourceKind::ContainerCluster);
    assert_eq!(failed.len(), 2);
    assert!(failed[0].starts_with(&FakeCloud::cluster_arn("ci-000")));
    assert_eq!(failed[1], last);
}

#[tokio::test]
async fn cluster_name_filter_applies_before_describe() {
    let config = SweepConfig {
        name_filters: [(ResourceKind::ContainerCluster, NameFilter::Prefix("ci-".into()))]
            .into_iter()
            .collect(),
        ..test_config()
    };
    let cloud = FakeCloud::new()
        .with_cluster("ci-a", "ACTIVE", stale_tags("ci-1"), &[])
        .with_cluster("shared", "ACTIVE", stale_tags("ci-1"), &[]);
    let (_, sweeper) = sweeper(cloud, config);
    let discovered = sweeper.scan(Utc::now()).await;
    assert_eq!(
        ids(&discovered.resources),
        BTreeSet::from([FakeCloud::cluster_arn("ci-a")])
    );
}

#[tokio::test]
async fn role_name_filter_avoids_tag_fetches() {
    let config = SweepConfig {
        name_filters: [(ResourceKind::IamRole, NameFilter::Prefix("ci-".into()))]
            .into_iter()
            .collect(),
        ..test_config()
    };
    let cloud = FakeCloud::new()
        .with_role("admin", stale_tags("ci-1"), &[])
        .with_role("ci-a", stale_tags("ci-1"), &["ci-a-profile"])
        .with_role("deploy", stale_tags("ci-1"), &[])
        .with_role("ci-b", fresh_tags("ci-1"), &[])
        .with_role("ci-c", stale_tags("ci-1"), &[])
        .with_role_page_size(2);
    let (cloud, sweeper) = sweeper(cloud, config);
    let discovered = sweeper.scan(Utc::now()).await;

    assert_eq!(
        ids(&discovered.resources),
        BTreeSet::from(["ci-a".to_string(), "ci-c".to_string()])
    );
    assert_eq!(cloud.count_calls(&Call::ListRoles), 3);
    assert_eq!(cloud.count_calls(&Call::RoleTags("admin".into())), 0);
    assert_eq!(cloud.count_calls(&Call::RoleTags("deploy".into())), 0);
    assert_eq!(cloud.count_calls(&Call::RoleTags("ci-b".into())), 1);

    let Some(Resource::IamRole(role)) = discovered.resources.first() else {
        panic!("expected a role first");
    };
    assert_eq!(role.instance_profiles, vec!["ci-a-profile"]);
}

#[tokio::test]
async fn role_tag_failure_moves_on() {
    let cloud = FakeCloud::new()
        .with_role("ci-a", stale_tags("ci-1"), &[])
        .with_role("ci-b", stale_tags("ci-1"), &[])
        .failing(Call::RoleTags("ci-a".into()));
    let (_, sweeper) = sweeper(cloud, test_config());
    let discovered = sweeper.scan(Utc::now()).await;

    assert_eq!(ids(&discovered.resources), BTreeSet::from(["ci-b".to_string()]));
    let error = discovered.error.expect("tag failure is reported");
    assert_eq!(error.failed_kinds().collect::<Vec<_>>(), vec![ResourceKind::IamRole]);
}

#[tokio::test]
async fn iam_is_not_listed_by_default() {
    let config = SweepConfig {
        dry_run: false,
        ..SweepConfig::default()
    };
    let (cloud, sweeper) = sweeper(populated(), config);
    let discovered = sweeper.scan(Utc::now()).await;

    assert!(discovered.resources.iter().all(|r| r.kind() != ResourceKind::IamRole));
    assert_eq!(cloud.count_calls(&Call::ListRoles), 0);
}

#[tokio::test]
async fn instances_group_by_owner() {
    let cloud = FakeCloud::new()
        .with_instance("i-1", Some("vpc-1"), stale_tags("ci-7"))
        .with_instance("i-2", Some("vpc-2"), stale_tags("ci-7"))
        .with_instance("i-3", None, stale_tags("ci-8"));
    let (_, sweeper) = sweeper(cloud, test_config());
    let discovered = sweeper.scan(Utc::now()).await;

    let groups: Vec<_> = discovered
        .resources
        .iter()
        .filter_map(|r| match r {
            Resource::Instances(g) => Some(g),
            _ => None,
        })
        .collect();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].owner, "ci-7");
    assert_eq!(groups[0].instance_ids, vec!["i-1", "i-2"]);
    assert_eq!(groups[0].vpc_ids.len(), 2);
    assert_eq!(groups[1].instance_ids, vec!["i-3"]);
}

#[tokio::test]
async fn log_group_prefix_and_tag_failures() {
    let config = SweepConfig {
        name_filters: [(ResourceKind::LogGroup, NameFilter::Prefix("/ci/".into()))]
            .into_iter()
            .collect(),
        ..test_config()
    };
    let cloud = FakeCloud::new()
        .with_log_group("/ci/a", stale_tags("ci-1"))
        .with_log_group("/ci/b", stale_tags("ci-1"))
        .with_log_group("/aws/lambda/x", stale_tags("ci-1"))
        .failing(Call::LogGroupTags("/ci/b".into()));
    let (cloud, sweeper) = sweeper(cloud, config);
    let discovered = sweeper.scan(Utc::now()).await;

    assert_eq!(ids(&discovered.resources), BTreeSet::from(["/ci/a".to_string()]));
    assert_eq!(cloud.count_calls(&Call::LogGroupTags("/aws/lambda/x".into())), 0);
    assert!(discovered.error.is_some());
}

#[tokio::test]
async fn name_tag_filter_for_inline_tags() {
    let config = SweepConfig {
        name_filters: [(ResourceKind::NatGateway, NameFilter::Contains("build".into()))]
            .into_iter()
            .collect(),
        ..test_config()
    };
    let cloud = FakeCloud::new()
        .with_nat_gateway("nat-1", None, &[], named(stale_tags("ci-1"), "ci-build-nat"))
        .with_nat_gateway("nat-2", None, &[], named(stale_tags("ci-1"), "ci-test-nat"))
        .with_nat_gateway("nat-3", None, &[], stale_tags("ci-1"));
    let (_, sweeper) = sweeper(cloud, config);
    let discovered = sweeper.scan(Utc::now()).await;
    assert_eq!(ids(&discovered.resources), BTreeSet::from(["nat-1".to_string()]));
}

#[tokio::test]
async fn tiny_queue_blocks_instead_of_dropping() {
    let mut cloud = FakeCloud::new();
    for i in 0..50 {
        cloud = cloud.with_log_group(&format!("/ci/{i}"), stale_tags("ci-1"));
    }
    let config = SweepConfig {
        queue_capacity: 1,
        ..test_config()
    };
    let (_, sweeper) = sweeper(cloud, config);
    let discovered = sweeper.scan(Utc::now()).await;
    assert_eq!(discovered.resources.len(), 50);
}

#[tokio::test]
async fn cancelled_run_dispatches_no_listers() {
    let token = CancellationToken::new();
    token.cancel();
    let cloud = Arc::new(populated());
    let sweeper = Sweeper::new(cloud.clone(), test_config()).with_cancellation(token);
    let discovered = sweeper.scan(Utc::now()).await;

    assert!(discovered.resources.is_empty());
    assert_eq!(discovered.skipped.len(), ResourceKind::ALL.len());
    assert!(cloud.calls().is_empty());
}
