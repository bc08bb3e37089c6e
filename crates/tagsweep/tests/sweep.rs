//! End-to-end sweeps against the in-memory cloud

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tagsweep::report::{MemorySink, emit};
use tagsweep::{Executor, Outcome, Status, SweepConfig, Sweeper, Target};
use tagsweep_test_utils::{FakeCloud, FakeVpc, fast_waits, fresh_tags, stale_tags, test_config};
use tokio_util::sync::CancellationToken;

fn sweeper(cloud: FakeCloud, config: SweepConfig) -> (Arc<FakeCloud>, Sweeper<FakeCloud>) {
    let cloud = Arc::new(cloud);
    (cloud.clone(), Sweeper::new(cloud, config))
}

fn status_of<'a>(outcomes: &'a [Outcome], target: &Target) -> &'a Status {
    &outcomes
        .iter()
        .find(|o| &o.target == target)
        .unwrap_or_else(|| panic!("no outcome for {target}"))
        .status
}

fn position(calls: &[Target], target: &Target) -> usize {
    calls
        .iter()
        .position(|t| t == target)
        .unwrap_or_else(|| panic!("{target} was never deleted"))
}

/// A CI environment: a VPC with a workload, a NAT with its address, an ECS
/// cluster and an instance role.
fn environment() -> FakeCloud {
    FakeCloud::new()
        .with_vpc(
            FakeVpc::new("vpc-1", stale_tags("ci-1"))
                .with_internet_gateway("igw-1")
                .with_subnet("subnet-1")
                .with_security_group("sg-app")
                .with_route_table("rtb-a"),
        )
        .with_instance("i-1", Some("vpc-1"), stale_tags("ci-1"))
        .with_nat_gateway("nat-1", Some("vpc-1"), &["eipalloc-1"], stale_tags("ci-1"))
        .with_elastic_ip("eipalloc-1", Some("eipassoc-1"), stale_tags("ci-1"))
        .with_cluster("ci-cluster", "ACTIVE", stale_tags("ci-1"), &["svc-1", "svc-2"])
        .with_role("ci-role", stale_tags("ci-1"), &["ci-profile"])
        .with_log_group("/ci/run-1", stale_tags("ci-1"))
}

fn instances() -> Target {
    Target::Instances {
        ids: vec!["i-1".to_string()],
    }
}

fn service(name: &str) -> Target {
    Target::EcsService {
        cluster: FakeCloud::cluster_arn("ci-cluster"),
        service: name.to_string(),
    }
}

#[tokio::test]
async fn deletes_children_before_parents() {
    let (cloud, sweeper) = sweeper(environment(), test_config());
    let report = sweeper.run(Utc::now()).await.unwrap();

    let summary = report.summary();
    assert_eq!(summary.failed, 0, "{:?}", report.outcomes);
    assert_eq!(summary.deleted, report.plan.len());

    let calls = cloud.delete_calls();
    let at = |t: Target| position(&calls, &t);
    let cluster = Target::EcsCluster(FakeCloud::cluster_arn("ci-cluster"));
    let vpc = Target::Vpc("vpc-1".into());
    let subnet = Target::Subnet("subnet-1".into());
    let sg = Target::SecurityGroup("sg-app".into());
    let igw = Target::InternetGateway {
        id: "igw-1".into(),
        vpc: "vpc-1".into(),
    };
    let nat = Target::NatGateway("nat-1".into());

    assert!(at(service("svc-1")) < at(cluster.clone()));
    assert!(at(service("svc-2")) < at(cluster));
    assert!(at(instances()) < at(subnet.clone()));
    assert!(at(instances()) < at(sg.clone()));
    assert!(at(nat.clone()) < at(subnet.clone()));
    assert!(at(nat.clone()) < at(igw.clone()));
    assert!(at(nat) < at(Target::ElasticIp("eipalloc-1".into())));
    for child in [subnet, sg, igw, Target::RouteTable("rtb-a".into())] {
        assert!(at(child) < at(vpc.clone()));
    }
    assert!(
        at(Target::InstanceProfile {
            name: "ci-profile".into(),
            role: "ci-role".into(),
        }) < at(Target::Role("ci-role".into()))
    );

    // The default group and main route table go with the VPC.
    assert!(!cloud.is_deleted("sg-default-vpc-1"));
    assert!(!cloud.is_deleted("rtb-main-vpc-1"));
}

#[tokio::test]
async fn failed_prerequisite_skips_dependents() {
    let cloud = environment().fail_delete("svc-1", "service is draining");
    let (cloud, sweeper) = sweeper(cloud, test_config());
    let report = sweeper.run(Utc::now()).await.unwrap();
    let cluster = Target::EcsCluster(FakeCloud::cluster_arn("ci-cluster"));

    let Status::Failed(cause) = status_of(&report.outcomes, &service("svc-1")) else {
        panic!("service delete should fail");
    };
    assert!(cause.contains("service is draining"));
    assert_eq!(status_of(&report.outcomes, &service("svc-2")), &Status::Deleted);
    assert_eq!(
        status_of(&report.outcomes, &cluster),
        &Status::SkippedDependencyFailed
    );
    assert!(!cloud.delete_calls().contains(&cluster));

    // Unrelated resources are unaffected.
    assert_eq!(
        status_of(&report.outcomes, &Target::LogGroup("/ci/run-1".into())),
        &Status::Deleted
    );
    assert_eq!(
        status_of(&report.outcomes, &Target::Vpc("vpc-1".into())),
        &Status::Deleted
    );
    assert!(report.summary().needs_attention());
}

#[tokio::test]
async fn already_gone_counts_as_deleted() {
    let (cloud, sweeper) = sweeper(environment(), test_config());
    let (_, plan) = sweeper.plan(Utc::now()).await.unwrap();

    cloud.delete_out_of_band("subnet-1");
    cloud.delete_out_of_band("/ci/run-1");

    let outcomes = Executor::new(cloud.clone())
        .with_wait_policy(fast_waits())
        .execute(&plan)
        .await;

    assert_eq!(
        status_of(&outcomes, &Target::Subnet("subnet-1".into())),
        &Status::Deleted
    );
    assert_eq!(
        status_of(&outcomes, &Target::LogGroup("/ci/run-1".into())),
        &Status::Deleted
    );
    assert_eq!(
        status_of(&outcomes, &Target::Vpc("vpc-1".into())),
        &Status::Deleted
    );
    assert!(outcomes.iter().all(|o| o.status == Status::Deleted));
}

#[tokio::test]
async fn instance_batch_with_one_gone_terminates_the_rest() {
    let cloud = FakeCloud::new()
        .with_instance("i-1", None, stale_tags("ci-9"))
        .with_instance("i-2", None, stale_tags("ci-9"));
    let (cloud, sweeper) = sweeper(cloud, test_config());
    let (_, plan) = sweeper.plan(Utc::now()).await.unwrap();

    cloud.delete_out_of_band("i-1");
    let outcomes = Executor::new(cloud.clone())
        .with_wait_policy(fast_waits())
        .execute(&plan)
        .await;

    let batch = Target::Instances {
        ids: vec!["i-1".to_string(), "i-2".to_string()],
    };
    assert_eq!(status_of(&outcomes, &batch), &Status::Deleted);
    assert!(cloud.is_deleted("i-2"));
}

#[tokio::test]
async fn stuck_target_times_out() {
    let (cloud, sweeper) = sweeper(environment().stuck("nat-1"), test_config());
    let report = sweeper.run(Utc::now()).await.unwrap();
    let eip = Target::ElasticIp("eipalloc-1".into());

    let Status::Failed(cause) = status_of(&report.outcomes, &Target::NatGateway("nat-1".into()))
    else {
        panic!("stuck NAT gateway should fail");
    };
    assert!(cause.contains("timed out"), "{cause}");
    assert_eq!(
        status_of(&report.outcomes, &eip),
        &Status::SkippedDependencyFailed
    );
    assert_eq!(
        status_of(&report.outcomes, &Target::Subnet("subnet-1".into())),
        &Status::SkippedDependencyFailed
    );
    assert_eq!(
        status_of(&report.outcomes, &Target::Vpc("vpc-1".into())),
        &Status::SkippedDependencyFailed
    );
    assert!(!cloud.delete_calls().contains(&eip));
}

#[tokio::test]
async fn dry_run_touches_nothing() {
    let config = SweepConfig {
        dry_run: true,
        ..test_config()
    };
    let (cloud, sweeper) = sweeper(environment(), config);
    let report = sweeper.run(Utc::now()).await.unwrap();

    assert!(cloud.delete_calls().is_empty());
    assert!(!report.outcomes.is_empty());
    assert!(report.outcomes.iter().all(|o| o.status == Status::DryRun));
    assert_eq!(report.summary().dry_run, report.plan.len());
}

#[tokio::test]
async fn second_sweep_finds_nothing() {
    let (cloud, sweeper) = sweeper(environment(), test_config());
    sweeper.run(Utc::now()).await.unwrap();
    let deletes = cloud.delete_calls().len();

    let report = sweeper.run(Utc::now()).await.unwrap();
    assert!(report.resources.is_empty());
    assert!(report.outcomes.is_empty());
    assert_eq!(cloud.delete_calls().len(), deletes);
}

#[tokio::test]
async fn fresh_resources_survive_a_sweep() {
    let cloud = environment().with_log_group("/ci/run-2", fresh_tags("ci-2"));
    let (cloud, sweeper) = sweeper(cloud, test_config());
    sweeper.run(Utc::now()).await.unwrap();

    assert!(cloud.is_deleted("/ci/run-1"));
    assert!(!cloud.is_deleted("/ci/run-2"));
}

#[tokio::test]
async fn cancelled_before_execution_attempts_nothing() {
    let (cloud, sweeper) = sweeper(environment(), test_config());
    let (_, plan) = sweeper.plan(Utc::now()).await.unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let outcomes = Executor::new(cloud.clone())
        .with_wait_policy(fast_waits())
        .with_cancellation(token)
        .execute(&plan)
        .await;

    assert!(cloud.delete_calls().is_empty());
    assert_eq!(outcomes.len(), plan.len());
    assert!(outcomes.iter().all(|o| o.status == Status::Cancelled));
}

#[tokio::test]
async fn cancellation_lets_in_flight_deletes_finish() {
    let cloud = FakeCloud::new()
        .with_cluster("ci-cluster", "ACTIVE", stale_tags("ci-1"), &["svc-1"])
        .with_delete_delay(Duration::from_millis(200));
    let (cloud, sweeper) = sweeper(cloud, test_config());
    let (_, plan) = sweeper.plan(Utc::now()).await.unwrap();
    assert_eq!(plan.stages.len(), 2);

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let outcomes = Executor::new(cloud.clone())
        .with_wait_policy(fast_waits())
        .with_cancellation(token)
        .execute(&plan)
        .await;

    let cluster = Target::EcsCluster(FakeCloud::cluster_arn("ci-cluster"));
    assert_eq!(status_of(&outcomes, &service("svc-1")), &Status::Deleted);
    assert_eq!(status_of(&outcomes, &cluster), &Status::Cancelled);
    assert_eq!(cloud.delete_calls(), vec![service("svc-1")]);
}

#[tokio::test]
async fn report_lists_every_outcome_in_order() {
    let cloud = environment().fail_delete("/ci/run-1", "access denied");
    let (_, sweeper) = sweeper(cloud, test_config());
    let report = sweeper.run(Utc::now()).await.unwrap();

    let mut sink = MemorySink::default();
    emit(&mut sink, &report.outcomes).unwrap();

    assert_eq!(sink.records.len(), report.outcomes.len());
    for (record, outcome) in sink.records.iter().zip(&report.outcomes) {
        assert_eq!(record.resource_type, outcome.target.kind());
        assert_eq!(record.identifier, outcome.target.identifier());
        assert_eq!(record.status, outcome.status.as_str());
    }

    let failed = sink
        .records
        .iter()
        .find(|r| r.identifier == "/ci/run-1")
        .unwrap();
    assert_eq!(failed.status, "failed");
    assert!(failed.cause.as_deref().unwrap().contains("access denied"));
}
