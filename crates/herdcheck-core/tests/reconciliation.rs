//! Touch-and-sweep reconciliation: correctness, idempotence, audit pairing.

use std::sync::Arc;

use herdcheck_core::{
    domain::repository::{IssueHistoryRepository, IssueRepository},
    store::memory::{InMemoryIssueHistoryRepository, InMemoryIssueRepository},
    Actor, Cph, CtsLid, IssueAction, IssueCode, IssueCommandService, IssueDetection, OperationId,
    RecordIdentity, RuleCode,
};

fn service() -> (
    Arc<InMemoryIssueRepository>,
    Arc<InMemoryIssueHistoryRepository>,
    IssueCommandService,
) {
    let issues = Arc::new(InMemoryIssueRepository::new());
    let history = Arc::new(InMemoryIssueHistoryRepository::new());
    let service = IssueCommandService::new(issues.clone(), history.clone());
    (issues, history, service)
}

fn identity(lid: &str) -> RecordIdentity {
    RecordIdentity {
        cts_lid: CtsLid::parse(lid).expect("valid lid"),
        cph: Cph::parse("12/345/6789").expect("valid cph"),
        rule_code: RuleCode::parse("MissingBreed").expect("valid rule"),
    }
}

fn detection() -> IssueDetection {
    IssueDetection::new(IssueCode::parse("DQ-101").expect("valid code"))
}

fn op(id: &str) -> OperationId {
    OperationId::parse(id).expect("valid op")
}

#[tokio::test]
async fn sweep_closes_exactly_the_untouched_issues() {
    let (issues, _, service) = service();
    let op_a = op("op-a");
    let op_b = op("op-b");

    // Three active issues from pass A.
    let lids = ["UK000000000001", "UK000000000002", "UK000000000003"];
    for lid in lids {
        service
            .record(&op_a, &identity(lid), &detection())
            .await
            .expect("record works");
    }

    // Pass B revisits only the first two.
    for lid in &lids[..2] {
        service
            .record(&op_b, &identity(lid), &detection())
            .await
            .expect("record works");
    }

    let closed = service.deactivate_stale(&op_b).await.expect("sweep works");
    assert_eq!(closed, 1, "exactly the untouched issue closes");

    let active = issues.list_active().await.expect("list works");
    assert_eq!(active.len(), 2);
    assert!(active.iter().all(|issue| issue.touched_by(&op_b)));

    let untouched_id =
        IssueCommandService::issue_id_for(&identity(lids[2])).expect("valid identity");
    let untouched = issues
        .get(&untouched_id)
        .await
        .expect("get works")
        .expect("issue exists");
    assert!(!untouched.is_active);
    // Old stamp preserved: deactivation does not rewrite the logical clock.
    assert!(untouched.touched_by(&op_a));
}

#[tokio::test]
async fn sweep_is_idempotent_for_the_same_operation() {
    let (_, _, service) = service();
    let op_a = op("op-a");
    let op_b = op("op-b");

    service
        .record(&op_a, &identity("UK000000000001"), &detection())
        .await
        .expect("record works");
    service
        .record(&op_b, &identity("UK000000000002"), &detection())
        .await
        .expect("record works");

    let first = service.deactivate_stale(&op_b).await.expect("sweep works");
    assert_eq!(first, 1);

    let second = service.deactivate_stale(&op_b).await.expect("sweep works");
    assert_eq!(second, 0, "repeat sweep with the same operation is a no-op");
}

#[tokio::test]
async fn swept_issue_stays_closed_until_reactivated() {
    let (issues, _, service) = service();
    let lid = "UK000000000001";

    service
        .record(&op("op-a"), &identity(lid), &detection())
        .await
        .expect("record works");
    service.deactivate_stale(&op("op-b")).await.expect("sweep works");

    // A later pass that still does not detect it leaves it closed.
    let closed = service.deactivate_stale(&op("op-c")).await.expect("sweep works");
    assert_eq!(closed, 0);

    // Re-detection reactivates and re-arms the sweep.
    service
        .record(&op("op-d"), &identity(lid), &detection())
        .await
        .expect("record works");
    let id = IssueCommandService::issue_id_for(&identity(lid)).expect("valid identity");
    let issue = issues.get(&id).await.expect("get works").expect("issue exists");
    assert!(issue.is_active);

    let closed = service.deactivate_stale(&op("op-e")).await.expect("sweep works");
    assert_eq!(closed, 1);
}

#[tokio::test]
async fn sweep_writes_one_deactivated_entry_per_closed_issue() {
    let (_, history, service) = service();
    let op_b = op("op-b");

    for lid in ["UK000000000001", "UK000000000002"] {
        service
            .record(&op("op-a"), &identity(lid), &detection())
            .await
            .expect("record works");
    }

    service.deactivate_stale(&op_b).await.expect("sweep works");

    for lid in ["UK000000000001", "UK000000000002"] {
        let id = IssueCommandService::issue_id_for(&identity(lid)).expect("valid identity");
        let trail = history.list_for_issue(&id).await.expect("history works");
        let deactivations: Vec<_> = trail
            .iter()
            .filter(|entry| entry.action == IssueAction::Deactivated)
            .collect();
        assert_eq!(deactivations.len(), 1);
        let entry = deactivations[0];
        assert!(entry.performed_by.is_system());
        assert_eq!(
            entry.detail.as_deref(),
            Some("not detected by operation op-b")
        );
    }
}

#[tokio::test]
async fn sweep_ignores_manually_ignored_but_active_issues_like_any_other() {
    let (issues, _, service) = service();
    let lid = "UK000000000001";

    service
        .record(&op("op-a"), &identity(lid), &detection())
        .await
        .expect("record works");
    let id = IssueCommandService::issue_id_for(&identity(lid)).expect("valid identity");
    service
        .ignore(&id, Actor::parse("inspector").expect("valid actor"))
        .await
        .expect("ignore works");

    // Ignored issues still participate in reconciliation.
    let closed = service.deactivate_stale(&op("op-b")).await.expect("sweep works");
    assert_eq!(closed, 1);

    let issue = issues.get(&id).await.expect("get works").expect("issue exists");
    assert!(!issue.is_active);
    assert!(issue.is_ignored, "sweep leaves the manual flag alone");
}
