//! In-memory repository implementations.
//!
//! Back unit/integration tests and embedders that do not need durability.
//! The mutex serializes same-identity read-modify-write sequences, which is
//! the concurrency contract the repository traits require of a store.

#![forbid(unsafe_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::{
    history::IssueHistoryEntry,
    identifiers::{IssueCode, IssueId, OperationId, RunId},
    issue::Issue,
    repository::{
        AnalysisRunRepository, IssueHistoryRepository, IssueRepository, RepositoryError,
        RepositoryResult,
    },
    run::AnalysisRun,
};

fn locked<T>(mutex: &Mutex<T>) -> RepositoryResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|e| RepositoryError::storage(e.to_string()))
}

// ============================================================================
// ISSUES
// ============================================================================

/// Issues keyed by thumbprint, behind one mutex.
#[derive(Debug, Default, Clone)]
pub struct InMemoryIssueRepository {
    issues: Arc<Mutex<HashMap<IssueId, Issue>>>,
}

impl InMemoryIssueRepository {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IssueRepository for InMemoryIssueRepository {
    async fn get(&self, id: &IssueId) -> RepositoryResult<Option<Issue>> {
        Ok(locked(&self.issues)?.get(id).cloned())
    }

    async fn upsert(&self, issue: &Issue) -> RepositoryResult<()> {
        locked(&self.issues)?.insert(issue.id.clone(), issue.clone());
        Ok(())
    }

    async fn list_active(&self) -> RepositoryResult<Vec<Issue>> {
        let mut active: Vec<Issue> = locked(&self.issues)?
            .values()
            .filter(|issue| issue.is_active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.cph.cmp(&b.cph));
        Ok(active)
    }

    async fn find_by_code(
        &self,
        code: &IssueCode,
        active_only: bool,
    ) -> RepositoryResult<Vec<Issue>> {
        let mut matching: Vec<Issue> = locked(&self.issues)?
            .values()
            .filter(|issue| &issue.issue_code == code && (!active_only || issue.is_active))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.cph.cmp(&b.cph));
        Ok(matching)
    }

    async fn deactivate_stale(&self, current: &OperationId) -> RepositoryResult<Vec<IssueId>> {
        let mut issues = locked(&self.issues)?;
        let now = Utc::now();
        let mut swept = Vec::new();
        for issue in issues.values_mut() {
            if issue.is_active && !issue.touched_by(current) {
                issue.is_active = false;
                issue.last_updated_at = now;
                swept.push(issue.id.clone());
            }
        }
        Ok(swept)
    }

    async fn delete_all(&self) -> RepositoryResult<u64> {
        let mut issues = locked(&self.issues)?;
        let count = issues.len() as u64;
        issues.clear();
        Ok(count)
    }
}

// ============================================================================
// ISSUE HISTORY
// ============================================================================

/// Append-only history ledger.
#[derive(Debug, Default, Clone)]
pub struct InMemoryIssueHistoryRepository {
    entries: Arc<Mutex<Vec<IssueHistoryEntry>>>,
}

impl InMemoryIssueHistoryRepository {
    /// Empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total entries across all issues (test observability).
    pub fn len(&self) -> RepositoryResult<usize> {
        Ok(locked(&self.entries)?.len())
    }

    /// Whether the ledger is empty.
    pub fn is_empty(&self) -> RepositoryResult<bool> {
        Ok(locked(&self.entries)?.is_empty())
    }
}

#[async_trait]
impl IssueHistoryRepository for InMemoryIssueHistoryRepository {
    async fn append(&self, entry: &IssueHistoryEntry) -> RepositoryResult<()> {
        locked(&self.entries)?.push(entry.clone());
        Ok(())
    }

    async fn append_batch(&self, entries: &[IssueHistoryEntry]) -> RepositoryResult<()> {
        locked(&self.entries)?.extend_from_slice(entries);
        Ok(())
    }

    async fn list_for_issue(&self, issue_id: &IssueId) -> RepositoryResult<Vec<IssueHistoryEntry>> {
        let mut entries: Vec<IssueHistoryEntry> = locked(&self.entries)?
            .iter()
            .filter(|entry| &entry.issue_id == issue_id)
            .cloned()
            .collect();
        entries.sort_by_key(|entry| entry.occurred_at);
        Ok(entries)
    }

    async fn delete_all(&self) -> RepositoryResult<u64> {
        let mut entries = locked(&self.entries)?;
        let count = entries.len() as u64;
        entries.clear();
        Ok(count)
    }
}

// ============================================================================
// ANALYSIS RUNS
// ============================================================================

/// Runs keyed by run id.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAnalysisRunRepository {
    runs: Arc<Mutex<HashMap<RunId, AnalysisRun>>>,
}

impl InMemoryAnalysisRunRepository {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored runs, newest first (test observability).
    pub fn all(&self) -> RepositoryResult<Vec<AnalysisRun>> {
        let mut runs: Vec<AnalysisRun> = locked(&self.runs)?.values().cloned().collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }
}

#[async_trait]
impl AnalysisRunRepository for InMemoryAnalysisRunRepository {
    async fn create(&self, run: &AnalysisRun) -> RepositoryResult<()> {
        let mut runs = locked(&self.runs)?;
        if runs.contains_key(&run.id) {
            return Err(RepositoryError::conflict(format!(
                "run '{}' already exists",
                run.id
            )));
        }
        runs.insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn get(&self, id: &RunId) -> RepositoryResult<Option<AnalysisRun>> {
        Ok(locked(&self.runs)?.get(id).cloned())
    }

    async fn update(&self, run: &AnalysisRun) -> RepositoryResult<()> {
        let mut runs = locked(&self.runs)?;
        if !runs.contains_key(&run.id) {
            return Err(RepositoryError::not_found("analysis run", &run.id));
        }
        runs.insert(run.id.clone(), run.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        identifiers::{Cph, CtsLid, RuleCode},
        issue::IssueDescriptor,
    };

    fn issue(id: &str, cph: &str, op: &str, active: bool) -> Issue {
        let descriptor = IssueDescriptor {
            cts_lid: CtsLid::parse(format!("UK{id}")).expect("valid lid"),
            cph: Cph::parse(cph).expect("valid cph"),
            issue_code: IssueCode::parse("DQ-101").expect("valid code"),
            rule_code: RuleCode::parse("MissingBreed").expect("valid rule"),
            error_code: None,
            error_description: None,
            contact: None,
        };
        let (mut issue, _) = Issue::open(
            IssueId::parse(id).expect("valid id"),
            OperationId::parse(op).expect("valid op"),
            descriptor,
        );
        if !active {
            let _ = issue.deactivate(crate::domain::identifiers::Actor::system(), None);
        }
        issue
    }

    #[tokio::test]
    async fn upsert_get_round_trip() {
        let repo = InMemoryIssueRepository::new();
        let stored = issue("a1", "10/100/1000", "op-1", true);

        repo.upsert(&stored).await.expect("upsert works");
        let loaded = repo.get(&stored.id).await.expect("get works");
        assert_eq!(loaded, Some(stored));
    }

    #[tokio::test]
    async fn list_active_sorted_by_cph() {
        let repo = InMemoryIssueRepository::new();
        repo.upsert(&issue("b", "20/200/2000", "op-1", true))
            .await
            .expect("upsert works");
        repo.upsert(&issue("a", "10/100/1000", "op-1", true))
            .await
            .expect("upsert works");
        repo.upsert(&issue("c", "30/300/3000", "op-1", false))
            .await
            .expect("upsert works");

        let active = repo.list_active().await.expect("list works");
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].cph.as_str(), "10/100/1000");
        assert_eq!(active[1].cph.as_str(), "20/200/2000");
    }

    #[tokio::test]
    async fn deactivate_stale_filters_on_stamp_and_activity() {
        let repo = InMemoryIssueRepository::new();
        repo.upsert(&issue("current", "10/100/1000", "op-2", true))
            .await
            .expect("upsert works");
        repo.upsert(&issue("stale", "20/200/2000", "op-1", true))
            .await
            .expect("upsert works");
        repo.upsert(&issue("inactive", "30/300/3000", "op-1", false))
            .await
            .expect("upsert works");

        let current = OperationId::parse("op-2").expect("valid op");
        let swept = repo.deactivate_stale(&current).await.expect("sweep works");

        assert_eq!(swept, vec![IssueId::parse("stale").expect("valid id")]);
        let reloaded = repo
            .get(&IssueId::parse("stale").expect("valid id"))
            .await
            .expect("get works")
            .expect("exists");
        assert!(!reloaded.is_active);
    }

    #[tokio::test]
    async fn run_create_conflicts_and_update_requires_existing() {
        let repo = InMemoryAnalysisRunRepository::new();
        let run = AnalysisRun::start(RunId::generate(), 10);

        repo.create(&run).await.expect("create works");
        assert!(matches!(
            repo.create(&run).await,
            Err(RepositoryError::Conflict(_))
        ));

        let ghost = AnalysisRun::start(RunId::generate(), 10);
        assert!(matches!(
            repo.update(&ghost).await,
            Err(RepositoryError::NotFound(_))
        ));
    }
}
