//! End-to-end analysis pass: lock, touch phase, sweep, terminal status,
//! cancellation, and failure handling.

use std::sync::Arc;

use async_trait::async_trait;
use herdcheck_core::{
    domain::repository::{IssueRepository, RepositoryError, RepositoryResult},
    store::memory::{
        InMemoryAnalysisRunRepository, InMemoryIssueHistoryRepository, InMemoryIssueRepository,
    },
    AnalysisContext, AnalysisInput, AnalysisPass, CancellationFlag, Cph, CtsLid, InProcessLock,
    Issue, IssueCode, IssueCommandService, IssueDetection, IssueId, OperationId, PassError,
    PassLock, Rule, RuleCode, RuleError, RulePipeline, RuleResult, RunStatus, RunTracker,
};

#[derive(Clone)]
struct HoldingRecord {
    cts_lid: CtsLid,
    cph: Cph,
    breed_missing: bool,
}

impl HoldingRecord {
    fn new(lid: &str, cph: &str, breed_missing: bool) -> Self {
        Self {
            cts_lid: CtsLid::parse(lid).expect("valid lid"),
            cph: Cph::parse(cph).expect("valid cph"),
            breed_missing,
        }
    }
}

impl AnalysisInput for HoldingRecord {
    fn cts_lid(&self) -> &CtsLid {
        &self.cts_lid
    }

    fn cph(&self) -> &Cph {
        &self.cph
    }
}

struct MissingBreedRule;

impl Rule<HoldingRecord> for MissingBreedRule {
    fn code(&self) -> RuleCode {
        RuleCode::parse("MissingBreed").expect("valid rule")
    }

    fn evaluate(
        &self,
        record: &HoldingRecord,
        _ctx: &AnalysisContext,
    ) -> Result<RuleResult, RuleError> {
        if record.breed_missing {
            Ok(RuleResult::Issue(IssueDetection::new(
                IssueCode::parse("DQ-101").expect("valid code"),
            )))
        } else {
            Ok(RuleResult::Clean)
        }
    }
}

struct FailingRule;

impl Rule<HoldingRecord> for FailingRule {
    fn code(&self) -> RuleCode {
        RuleCode::parse("Failing").expect("valid rule")
    }

    fn evaluate(
        &self,
        _record: &HoldingRecord,
        _ctx: &AnalysisContext,
    ) -> Result<RuleResult, RuleError> {
        Err(RuleError::new(self.code(), "registry unreachable"))
    }
}

/// Healthy for the touch phase, broken exactly at the sweep.
#[derive(Default)]
struct SweepFailingIssueRepository {
    inner: InMemoryIssueRepository,
}

#[async_trait]
impl IssueRepository for SweepFailingIssueRepository {
    async fn get(&self, id: &IssueId) -> RepositoryResult<Option<Issue>> {
        self.inner.get(id).await
    }

    async fn upsert(&self, issue: &Issue) -> RepositoryResult<()> {
        self.inner.upsert(issue).await
    }

    async fn list_active(&self) -> RepositoryResult<Vec<Issue>> {
        self.inner.list_active().await
    }

    async fn find_by_code(
        &self,
        code: &IssueCode,
        active_only: bool,
    ) -> RepositoryResult<Vec<Issue>> {
        self.inner.find_by_code(code, active_only).await
    }

    async fn deactivate_stale(&self, _current: &OperationId) -> RepositoryResult<Vec<IssueId>> {
        Err(RepositoryError::storage("disk full"))
    }

    async fn delete_all(&self) -> RepositoryResult<u64> {
        self.inner.delete_all().await
    }
}

struct Harness {
    issues: Arc<InMemoryIssueRepository>,
    runs_repo: Arc<InMemoryAnalysisRunRepository>,
    runs: RunTracker,
    service: IssueCommandService,
    lock: Arc<InProcessLock>,
}

fn harness() -> Harness {
    let issues = Arc::new(InMemoryIssueRepository::new());
    let history = Arc::new(InMemoryIssueHistoryRepository::new());
    let runs_repo = Arc::new(InMemoryAnalysisRunRepository::new());
    Harness {
        service: IssueCommandService::new(issues.clone(), history),
        runs: RunTracker::new(runs_repo.clone()),
        issues,
        runs_repo,
        lock: Arc::new(InProcessLock::new()),
    }
}

fn pass_with(h: &Harness, pipeline: RulePipeline<HoldingRecord>) -> AnalysisPass<HoldingRecord> {
    AnalysisPass::new(pipeline, h.service.clone(), h.runs.clone(), h.lock.clone())
}

fn breed_pipeline() -> RulePipeline<HoldingRecord> {
    RulePipeline::builder()
        .continue_always(Arc::new(MissingBreedRule))
        .build()
}

#[tokio::test]
async fn pass_creates_issues_and_completes_run() {
    let h = harness();
    let pass = pass_with(&h, breed_pipeline());
    let records = vec![
        HoldingRecord::new("UK000000000001", "10/100/1000", true),
        HoldingRecord::new("UK000000000002", "20/200/2000", false),
        HoldingRecord::new("UK000000000003", "30/300/3000", true),
    ];

    let summary = pass
        .execute(&records, &CancellationFlag::new())
        .await
        .expect("pass works");

    assert_eq!(summary.records_analyzed, 3);
    assert_eq!(summary.issues_created, 2);
    assert_eq!(summary.issues_swept, 0);
    assert_eq!(h.issues.list_active().await.expect("list works").len(), 2);

    let run = h.runs.get(&summary.run_id).await.expect("run exists");
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.records_analyzed, 3);
    assert_eq!(run.issues_found, 2);
}

#[tokio::test]
async fn second_pass_sweeps_repaired_records() {
    let h = harness();
    let pass = pass_with(&h, breed_pipeline());
    let cancel = CancellationFlag::new();

    let before = vec![
        HoldingRecord::new("UK000000000001", "10/100/1000", true),
        HoldingRecord::new("UK000000000002", "20/200/2000", true),
    ];
    pass.execute(&before, &cancel).await.expect("first pass works");

    // The second record has been repaired upstream.
    let after = vec![
        HoldingRecord::new("UK000000000001", "10/100/1000", true),
        HoldingRecord::new("UK000000000002", "20/200/2000", false),
    ];
    let summary = pass.execute(&after, &cancel).await.expect("second pass works");

    assert_eq!(summary.issues_touched, 1);
    assert_eq!(summary.issues_created, 0);
    assert_eq!(summary.issues_swept, 1);

    let active = h.issues.list_active().await.expect("list works");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].cts_lid.as_str(), "UK000000000001");
}

#[tokio::test]
async fn rule_failure_fails_run_and_skips_sweep() {
    let h = harness();

    // Seed an active issue from a successful pass.
    let seed = pass_with(&h, breed_pipeline());
    seed.execute(
        &[HoldingRecord::new("UK000000000001", "10/100/1000", true)],
        &CancellationFlag::new(),
    )
    .await
    .expect("seed pass works");

    let failing = pass_with(
        &h,
        RulePipeline::builder()
            .continue_always(Arc::new(FailingRule))
            .build(),
    );
    let error = failing
        .execute(
            &[HoldingRecord::new("UK000000000002", "20/200/2000", false)],
            &CancellationFlag::new(),
        )
        .await
        .expect_err("pass fails");
    assert!(matches!(error, PassError::Rule(_)));

    // The seeded issue survived: no sweep ran for the failed pass.
    assert_eq!(h.issues.list_active().await.expect("list works").len(), 1);
}

#[tokio::test]
async fn sweep_failure_still_marks_run_failed() {
    let issues = Arc::new(SweepFailingIssueRepository::default());
    let history = Arc::new(InMemoryIssueHistoryRepository::new());
    let runs_repo = Arc::new(InMemoryAnalysisRunRepository::new());
    let pass = AnalysisPass::new(
        breed_pipeline(),
        IssueCommandService::new(issues.clone(), history),
        RunTracker::new(runs_repo.clone()),
        Arc::new(InProcessLock::new()),
    );

    let error = pass
        .execute(
            &[HoldingRecord::new("UK000000000001", "10/100/1000", true)],
            &CancellationFlag::new(),
        )
        .await
        .expect_err("sweep failure aborts the pass");
    assert!(matches!(error, PassError::Service(_)));

    // The run still lands in a terminal status carrying the storage error.
    let runs = runs_repo.all().expect("runs readable");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(runs[0]
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("disk full"));

    // The touched issue stays active: the failed sweep changed nothing.
    assert_eq!(issues.list_active().await.expect("list works").len(), 1);
}

#[tokio::test]
async fn cancellation_fails_run_without_sweeping() {
    let h = harness();
    let pass = pass_with(&h, breed_pipeline());

    pass.execute(
        &[HoldingRecord::new("UK000000000001", "10/100/1000", true)],
        &CancellationFlag::new(),
    )
    .await
    .expect("seed pass works");

    let cancel = CancellationFlag::new();
    cancel.cancel();
    let error = pass
        .execute(
            &[HoldingRecord::new("UK000000000002", "20/200/2000", true)],
            &cancel,
        )
        .await
        .expect_err("pass cancelled");
    assert!(matches!(error, PassError::Cancelled));

    // Untouched issue still active; the cancelled pass never swept.
    assert_eq!(h.issues.list_active().await.expect("list works").len(), 1);
}

#[tokio::test]
async fn cancelled_run_is_marked_failed() {
    let h = harness();
    let pass = pass_with(&h, breed_pipeline());

    let cancel = CancellationFlag::new();
    cancel.cancel();
    let _ = pass
        .execute(
            &[HoldingRecord::new("UK000000000001", "10/100/1000", true)],
            &cancel,
        )
        .await
        .expect_err("pass cancelled");

    // The one run in the store is Failed with the cancellation message.
    let runs = h.runs_repo.all().expect("runs readable");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert_eq!(runs[0].error.as_deref(), Some("analysis cancelled"));
    assert!(runs[0].completed_at.is_some());
}

#[tokio::test]
async fn concurrent_pass_is_rejected_by_the_lock() {
    let h = harness();
    let pass = pass_with(&h, breed_pipeline());

    let guard = h
        .lock
        .try_acquire("herdcheck-analysis", std::time::Duration::from_secs(60))
        .await
        .expect("valid request")
        .expect("lock free");

    let error = pass
        .execute(
            &[HoldingRecord::new("UK000000000001", "10/100/1000", true)],
            &CancellationFlag::new(),
        )
        .await
        .expect_err("lock held");
    assert!(matches!(error, PassError::PassInProgress));

    drop(guard);
    pass.execute(
        &[HoldingRecord::new("UK000000000001", "10/100/1000", true)],
        &CancellationFlag::new(),
    )
    .await
    .expect("lock released");
}

#[tokio::test]
async fn empty_record_set_completes_and_sweeps_everything() {
    let h = harness();
    let pass = pass_with(&h, breed_pipeline());
    let cancel = CancellationFlag::new();

    pass.execute(
        &[HoldingRecord::new("UK000000000001", "10/100/1000", true)],
        &cancel,
    )
    .await
    .expect("seed pass works");

    // A pass over zero records visits "all" of them vacuously; everything
    // previously active is stale.
    let summary = pass.execute(&[], &cancel).await.expect("empty pass works");
    assert_eq!(summary.records_analyzed, 0);
    assert_eq!(summary.issues_swept, 1);
    assert!(h.issues.list_active().await.expect("list works").is_empty());
}
