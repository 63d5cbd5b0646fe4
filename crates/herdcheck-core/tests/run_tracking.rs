//! Run tracker: lifecycle, terminal invariant, not-found propagation,
//! post-terminal report attachment.

use std::sync::Arc;

use herdcheck_core::{
    store::memory::InMemoryAnalysisRunRepository, ProgressUpdate, RunId, RunStatus, RunTracker,
    RunTrackerError,
};

fn tracker() -> RunTracker {
    RunTracker::new(Arc::new(InMemoryAnalysisRunRepository::new()))
}

fn progress(pct: u8, records: u64) -> ProgressUpdate {
    ProgressUpdate {
        percentage: pct,
        description: format!("analyzed {records} records"),
        records_analyzed: records,
        issues_found: 2,
        issues_resolved: 0,
    }
}

#[tokio::test]
async fn create_then_progress_then_complete() {
    let tracker = tracker();

    let run = tracker.create_run(200).await.expect("create works");
    assert_eq!(run.status, RunStatus::Running);
    assert_eq!(run.total_records, 200);
    assert_eq!(run.records_analyzed, 0);

    tracker
        .update_progress(&run.id, progress(50, 100))
        .await
        .expect("progress works");
    let loaded = tracker.get(&run.id).await.expect("get works");
    assert_eq!(loaded.progress_percentage, 50);
    assert_eq!(loaded.records_analyzed, 100);

    tracker
        .complete(&run.id, 200, 7, 3, 4_200)
        .await
        .expect("complete works");
    let loaded = tracker.get(&run.id).await.expect("get works");
    assert_eq!(loaded.status, RunStatus::Completed);
    assert_eq!(loaded.issues_found, 7);
    assert_eq!(loaded.issues_resolved, 3);
    assert_eq!(loaded.duration_ms, Some(4_200));
}

#[tokio::test]
async fn progress_on_terminal_run_is_rejected() {
    let tracker = tracker();
    let run = tracker.create_run(10).await.expect("create works");
    tracker
        .complete(&run.id, 10, 0, 0, 100)
        .await
        .expect("complete works");

    let result = tracker.update_progress(&run.id, progress(10, 1)).await;
    assert!(matches!(result, Err(RunTrackerError::Run(_))));

    // A second terminal transition is also rejected.
    let result = tracker.fail(&run.id, "late failure", 10).await;
    assert!(matches!(result, Err(RunTrackerError::Run(_))));
}

#[tokio::test]
async fn fail_records_error_message() {
    let tracker = tracker();
    let run = tracker.create_run(10).await.expect("create works");

    tracker
        .fail(&run.id, "registry unreachable", 900)
        .await
        .expect("fail works");

    let loaded = tracker.get(&run.id).await.expect("get works");
    assert_eq!(loaded.status, RunStatus::Failed);
    assert_eq!(loaded.error.as_deref(), Some("registry unreachable"));
}

#[tokio::test]
async fn report_details_attach_after_terminal_status() {
    let tracker = tracker();
    let run = tracker.create_run(10).await.expect("create works");
    tracker
        .complete(&run.id, 10, 1, 0, 100)
        .await
        .expect("complete works");

    tracker
        .set_report_details(&run.id, Some("reports/run.zip".to_string()), None)
        .await
        .expect("report details work");
    tracker
        .update_report_url(&run.id, "https://reports.example/run.zip")
        .await
        .expect("report url works");

    let loaded = tracker.get(&run.id).await.expect("get works");
    assert_eq!(loaded.report_path.as_deref(), Some("reports/run.zip"));
    assert_eq!(
        loaded.report_url.as_deref(),
        Some("https://reports.example/run.zip")
    );
    assert_eq!(loaded.status, RunStatus::Completed);
}

#[tokio::test]
async fn operations_on_missing_run_fail_with_not_found() {
    let tracker = tracker();
    let ghost = RunId::generate();

    assert!(matches!(
        tracker.update_progress(&ghost, progress(1, 1)).await,
        Err(RunTrackerError::RunNotFound(_))
    ));
    assert!(matches!(
        tracker.complete(&ghost, 1, 1, 1, 1).await,
        Err(RunTrackerError::RunNotFound(_))
    ));
    assert!(matches!(
        tracker.fail(&ghost, "boom", 1).await,
        Err(RunTrackerError::RunNotFound(_))
    ));
    assert!(matches!(
        tracker.get(&ghost).await,
        Err(RunTrackerError::RunNotFound(_))
    ));
}
