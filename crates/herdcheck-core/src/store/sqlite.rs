//! SQLite repository implementations over sqlx.
//!
//! One `SqliteStore` owns the pool and implements all three repository
//! traits. Storage conventions: timestamps as RFC 3339 text, enums as their
//! stable string names, contact context as a JSON column, counters as
//! integers. The `(is_active, issue_code, cph)` index serves the sweep and
//! the report-export scan.

#![forbid(unsafe_code)]

use std::{
    str::FromStr,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::warn;

use crate::{
    coordination::locks::{LockError, LockGuard, PassLock},
    domain::{
        history::{IssueAction, IssueHistoryEntry},
        identifiers::{
            Actor, Cph, CtsLid, HistoryEntryId, IssueCode, IssueId, OperationId, RuleCode, RunId,
        },
        issue::{ContactDetails, Issue, ResolutionStatus},
        repository::{
            AnalysisRunRepository, IssueHistoryRepository, IssueRepository, RepositoryError,
            RepositoryResult,
        },
        run::{AnalysisRun, RunStatus},
    },
};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS issues (
        id TEXT PRIMARY KEY,
        operation_id TEXT NOT NULL,
        cts_lid TEXT NOT NULL,
        cph TEXT NOT NULL,
        issue_code TEXT NOT NULL,
        rule_code TEXT NOT NULL,
        error_code TEXT,
        error_description TEXT,
        contact_json TEXT,
        created_at TEXT NOT NULL,
        last_updated_at TEXT NOT NULL,
        is_active INTEGER NOT NULL,
        is_ignored INTEGER NOT NULL,
        resolution_status TEXT NOT NULL,
        assigned_to TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_issues_active_code_cph
        ON issues (is_active, issue_code, cph)",
    "CREATE TABLE IF NOT EXISTS issue_history (
        id TEXT PRIMARY KEY,
        issue_id TEXT NOT NULL,
        action TEXT NOT NULL,
        performed_by TEXT NOT NULL,
        detail TEXT,
        occurred_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_issue_history_issue
        ON issue_history (issue_id, occurred_at)",
    "CREATE TABLE IF NOT EXISTS pass_locks (
        name TEXT PRIMARY KEY,
        token TEXT NOT NULL,
        expires_at_ms INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS analysis_runs (
        id TEXT PRIMARY KEY,
        status TEXT NOT NULL,
        started_at TEXT NOT NULL,
        completed_at TEXT,
        progress_percentage INTEGER NOT NULL,
        status_description TEXT,
        records_analyzed INTEGER NOT NULL,
        total_records INTEGER NOT NULL,
        issues_found INTEGER NOT NULL,
        issues_resolved INTEGER NOT NULL,
        error TEXT,
        duration_ms INTEGER,
        report_path TEXT,
        report_url TEXT
    )",
];

fn storage_err(e: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::storage(e.to_string())
}

fn parse_timestamp(raw: &str) -> RepositoryResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| storage_err(format!("bad timestamp '{raw}': {e}")))
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

/// SQLite-backed store implementing every repository trait.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect and ensure the schema exists.
    ///
    /// # Errors
    ///
    /// Returns `Storage` on connection or DDL failure.
    pub async fn connect(url: &str) -> RepositoryResult<Self> {
        let pool = SqlitePool::connect(url).await.map_err(storage_err)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Wrap an existing pool and ensure the schema exists.
    pub async fn from_pool(pool: SqlitePool) -> RepositoryResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> RepositoryResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(storage_err)?;
        }
        Ok(())
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn issue_from_row(row: &SqliteRow) -> RepositoryResult<Issue> {
    let contact_json: Option<String> = row.try_get("contact_json").map_err(storage_err)?;
    let contact: Option<ContactDetails> = match contact_json {
        Some(json) => Some(serde_json::from_str(&json).map_err(storage_err)?),
        None => None,
    };
    let created_at: String = row.try_get("created_at").map_err(storage_err)?;
    let last_updated_at: String = row.try_get("last_updated_at").map_err(storage_err)?;
    let resolution_status: String = row.try_get("resolution_status").map_err(storage_err)?;
    let assigned_to: Option<String> = row.try_get("assigned_to").map_err(storage_err)?;

    Ok(Issue {
        id: parse_id::<IssueId>(row, "id")?,
        operation_id: parse_id::<OperationId>(row, "operation_id")?,
        cts_lid: parse_id::<CtsLid>(row, "cts_lid")?,
        cph: parse_id::<Cph>(row, "cph")?,
        issue_code: parse_id::<IssueCode>(row, "issue_code")?,
        rule_code: parse_id::<RuleCode>(row, "rule_code")?,
        error_code: row.try_get("error_code").map_err(storage_err)?,
        error_description: row.try_get("error_description").map_err(storage_err)?,
        contact,
        created_at: parse_timestamp(&created_at)?,
        last_updated_at: parse_timestamp(&last_updated_at)?,
        is_active: row.try_get::<i64, _>("is_active").map_err(storage_err)? != 0,
        is_ignored: row.try_get::<i64, _>("is_ignored").map_err(storage_err)? != 0,
        resolution_status: ResolutionStatus::from_str(&resolution_status)
            .map_err(|e| storage_err(format!("bad resolution status: {e}")))?,
        assigned_to: assigned_to
            .map(Actor::parse)
            .transpose()
            .map_err(storage_err)?,
    })
}

trait ParsedId: Sized {
    fn parse_raw(raw: String) -> RepositoryResult<Self>;
}

macro_rules! parsed_id {
    ($($name:ident),*) => {
        $(impl ParsedId for $name {
            fn parse_raw(raw: String) -> RepositoryResult<Self> {
                Self::parse(raw).map_err(storage_err)
            }
        })*
    };
}

parsed_id!(IssueId, OperationId, CtsLid, Cph, IssueCode, RuleCode, RunId);

fn parse_id<T: ParsedId>(row: &SqliteRow, column: &str) -> RepositoryResult<T> {
    let raw: String = row.try_get(column).map_err(storage_err)?;
    T::parse_raw(raw)
}

fn run_from_row(row: &SqliteRow) -> RepositoryResult<AnalysisRun> {
    let status: String = row.try_get("status").map_err(storage_err)?;
    let started_at: String = row.try_get("started_at").map_err(storage_err)?;
    let completed_at: Option<String> = row.try_get("completed_at").map_err(storage_err)?;
    let duration_ms: Option<i64> = row.try_get("duration_ms").map_err(storage_err)?;
    let progress: i64 = row.try_get("progress_percentage").map_err(storage_err)?;

    Ok(AnalysisRun {
        id: parse_id::<RunId>(row, "id")?,
        status: RunStatus::from_str(&status)
            .map_err(|e| storage_err(format!("bad run status: {e}")))?,
        started_at: parse_timestamp(&started_at)?,
        completed_at: completed_at.as_deref().map(parse_timestamp).transpose()?,
        progress_percentage: u8::try_from(progress).unwrap_or(100),
        status_description: row.try_get("status_description").map_err(storage_err)?,
        records_analyzed: to_u64(row.try_get("records_analyzed").map_err(storage_err)?),
        total_records: to_u64(row.try_get("total_records").map_err(storage_err)?),
        issues_found: to_u64(row.try_get("issues_found").map_err(storage_err)?),
        issues_resolved: to_u64(row.try_get("issues_resolved").map_err(storage_err)?),
        error: row.try_get("error").map_err(storage_err)?,
        duration_ms: duration_ms.map(to_u64),
        report_path: row.try_get("report_path").map_err(storage_err)?,
        report_url: row.try_get("report_url").map_err(storage_err)?,
    })
}

fn history_from_row(row: &SqliteRow) -> RepositoryResult<IssueHistoryEntry> {
    let id: String = row.try_get("id").map_err(storage_err)?;
    let action: String = row.try_get("action").map_err(storage_err)?;
    let occurred_at: String = row.try_get("occurred_at").map_err(storage_err)?;
    let performed_by: String = row.try_get("performed_by").map_err(storage_err)?;

    // History ids are opaque; round-trip through serde keeps them intact.
    let id: HistoryEntryId =
        serde_json::from_value(serde_json::Value::String(id)).map_err(storage_err)?;

    Ok(IssueHistoryEntry {
        id,
        issue_id: parse_id::<IssueId>(row, "issue_id")?,
        action: IssueAction::from_str(&action)
            .map_err(|e| storage_err(format!("bad history action: {e}")))?,
        performed_by: Actor::parse(performed_by).map_err(storage_err)?,
        detail: row.try_get("detail").map_err(storage_err)?,
        occurred_at: parse_timestamp(&occurred_at)?,
    })
}

// ============================================================================
// ISSUE REPOSITORY
// ============================================================================

#[async_trait]
impl IssueRepository for SqliteStore {
    async fn get(&self, id: &IssueId) -> RepositoryResult<Option<Issue>> {
        let row = sqlx::query("SELECT * FROM issues WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        row.as_ref().map(issue_from_row).transpose()
    }

    async fn upsert(&self, issue: &Issue) -> RepositoryResult<()> {
        let contact_json = issue
            .contact
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(storage_err)?;

        sqlx::query(
            "INSERT INTO issues (
                id, operation_id, cts_lid, cph, issue_code, rule_code,
                error_code, error_description, contact_json,
                created_at, last_updated_at,
                is_active, is_ignored, resolution_status, assigned_to
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT(id) DO UPDATE SET
                operation_id = excluded.operation_id,
                cts_lid = excluded.cts_lid,
                cph = excluded.cph,
                issue_code = excluded.issue_code,
                rule_code = excluded.rule_code,
                error_code = excluded.error_code,
                error_description = excluded.error_description,
                contact_json = excluded.contact_json,
                last_updated_at = excluded.last_updated_at,
                is_active = excluded.is_active,
                is_ignored = excluded.is_ignored,
                resolution_status = excluded.resolution_status,
                assigned_to = excluded.assigned_to",
        )
        .bind(issue.id.as_str())
        .bind(issue.operation_id.as_str())
        .bind(issue.cts_lid.as_str())
        .bind(issue.cph.as_str())
        .bind(issue.issue_code.as_str())
        .bind(issue.rule_code.as_str())
        .bind(issue.error_code.as_deref())
        .bind(issue.error_description.as_deref())
        .bind(contact_json)
        .bind(issue.created_at.to_rfc3339())
        .bind(issue.last_updated_at.to_rfc3339())
        .bind(i64::from(issue.is_active))
        .bind(i64::from(issue.is_ignored))
        .bind(issue.resolution_status.to_string())
        .bind(issue.assigned_to.as_ref().map(Actor::as_str))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn list_active(&self) -> RepositoryResult<Vec<Issue>> {
        let rows = sqlx::query("SELECT * FROM issues WHERE is_active = 1 ORDER BY cph")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        rows.iter().map(issue_from_row).collect()
    }

    async fn find_by_code(
        &self,
        code: &IssueCode,
        active_only: bool,
    ) -> RepositoryResult<Vec<Issue>> {
        let sql = if active_only {
            "SELECT * FROM issues WHERE issue_code = ?1 AND is_active = 1 ORDER BY cph"
        } else {
            "SELECT * FROM issues WHERE issue_code = ?1 ORDER BY cph"
        };
        let rows = sqlx::query(sql)
            .bind(code.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        rows.iter().map(issue_from_row).collect()
    }

    async fn deactivate_stale(&self, current: &OperationId) -> RepositoryResult<Vec<IssueId>> {
        // One transaction: the select and the update see the same stale set.
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let rows =
            sqlx::query("SELECT id FROM issues WHERE is_active = 1 AND operation_id <> ?1")
                .bind(current.as_str())
                .fetch_all(&mut *tx)
                .await
                .map_err(storage_err)?;
        let swept: Vec<IssueId> = rows
            .iter()
            .map(|row| parse_id::<IssueId>(row, "id"))
            .collect::<RepositoryResult<_>>()?;

        sqlx::query(
            "UPDATE issues SET is_active = 0, last_updated_at = ?1
             WHERE is_active = 1 AND operation_id <> ?2",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(current.as_str())
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)?;
        Ok(swept)
    }

    async fn delete_all(&self) -> RepositoryResult<u64> {
        let result = sqlx::query("DELETE FROM issues")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(result.rows_affected())
    }
}

// ============================================================================
// ISSUE HISTORY REPOSITORY
// ============================================================================

async fn insert_history_entry<'e, E>(executor: E, entry: &IssueHistoryEntry) -> RepositoryResult<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO issue_history (id, issue_id, action, performed_by, detail, occurred_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind(entry.id.as_str())
    .bind(entry.issue_id.as_str())
    .bind(entry.action.to_string())
    .bind(entry.performed_by.as_str())
    .bind(entry.detail.as_deref())
    .bind(entry.occurred_at.to_rfc3339())
    .execute(executor)
    .await
    .map_err(storage_err)?;
    Ok(())
}

#[async_trait]
impl IssueHistoryRepository for SqliteStore {
    async fn append(&self, entry: &IssueHistoryEntry) -> RepositoryResult<()> {
        insert_history_entry(&self.pool, entry).await
    }

    async fn append_batch(&self, entries: &[IssueHistoryEntry]) -> RepositoryResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        for entry in entries {
            insert_history_entry(&mut *tx, entry).await?;
        }
        tx.commit().await.map_err(storage_err)
    }

    async fn list_for_issue(&self, issue_id: &IssueId) -> RepositoryResult<Vec<IssueHistoryEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM issue_history WHERE issue_id = ?1 ORDER BY occurred_at, id",
        )
        .bind(issue_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        rows.iter().map(history_from_row).collect()
    }

    async fn delete_all(&self) -> RepositoryResult<u64> {
        let result = sqlx::query("DELETE FROM issue_history")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(result.rows_affected())
    }
}

// ============================================================================
// PASS LOCK
// ============================================================================

static LOCK_TOKEN_COUNTER: AtomicU64 = AtomicU64::new(0);

fn lock_token() -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let seq = LOCK_TOKEN_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("lock-{nanos:016x}-{seq:04x}")
}

/// Pass locks live in the same database as the issues they guard, so every
/// process sharing one database file is mutually excluded. The release on
/// guard drop is best-effort (spawned onto the runtime); the TTL bounds how
/// long a lock leaked by a crash stays held.
#[async_trait]
impl PassLock for SqliteStore {
    async fn try_acquire(
        &self,
        name: &str,
        ttl: Duration,
    ) -> Result<Option<LockGuard>, LockError> {
        if name.trim().is_empty() {
            return Err(LockError::EmptyName);
        }
        if ttl.is_zero() {
            return Err(LockError::InvalidTtl);
        }
        let ttl_ms = i64::try_from(ttl.as_millis()).map_err(|_| LockError::InvalidTtl)?;
        let now_ms = Utc::now().timestamp_millis();
        let token = lock_token();

        // The upsert wins only when the row is absent or expired, making
        // check-and-acquire a single atomic statement.
        let result = sqlx::query(
            "INSERT INTO pass_locks (name, token, expires_at_ms) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET
                token = excluded.token,
                expires_at_ms = excluded.expires_at_ms
             WHERE pass_locks.expires_at_ms <= ?4",
        )
        .bind(name)
        .bind(&token)
        .bind(now_ms.saturating_add(ttl_ms))
        .bind(now_ms)
        .execute(&self.pool)
        .await
        .map_err(|e| LockError::Backend(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let pool = self.pool.clone();
        let key = name.to_string();
        Ok(Some(LockGuard::new(Box::new(move || {
            tokio::spawn(async move {
                // The token check means an expired-and-taken-over lock is
                // never released by its previous holder.
                let released =
                    sqlx::query("DELETE FROM pass_locks WHERE name = ?1 AND token = ?2")
                        .bind(&key)
                        .bind(&token)
                        .execute(&pool)
                        .await;
                if let Err(error) = released {
                    warn!(lock = %key, %error, "could not release pass lock");
                }
            });
        }))))
    }
}

// ============================================================================
// ANALYSIS RUN REPOSITORY
// ============================================================================

#[async_trait]
impl AnalysisRunRepository for SqliteStore {
    async fn create(&self, run: &AnalysisRun) -> RepositoryResult<()> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO analysis_runs (
                id, status, started_at, completed_at, progress_percentage,
                status_description, records_analyzed, total_records,
                issues_found, issues_resolved, error, duration_ms,
                report_path, report_url
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        )
        .bind(run.id.as_str())
        .bind(run.status.to_string())
        .bind(run.started_at.to_rfc3339())
        .bind(run.completed_at.map(|dt| dt.to_rfc3339()))
        .bind(i64::from(run.progress_percentage))
        .bind(run.status_description.as_deref())
        .bind(to_i64(run.records_analyzed))
        .bind(to_i64(run.total_records))
        .bind(to_i64(run.issues_found))
        .bind(to_i64(run.issues_resolved))
        .bind(run.error.as_deref())
        .bind(run.duration_ms.map(to_i64))
        .bind(run.report_path.as_deref())
        .bind(run.report_url.as_deref())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::conflict(format!(
                "run '{}' already exists",
                run.id
            )));
        }
        Ok(())
    }

    async fn get(&self, id: &RunId) -> RepositoryResult<Option<AnalysisRun>> {
        let row = sqlx::query("SELECT * FROM analysis_runs WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        row.as_ref().map(run_from_row).transpose()
    }

    async fn update(&self, run: &AnalysisRun) -> RepositoryResult<()> {
        let result = sqlx::query(
            "UPDATE analysis_runs SET
                status = ?2, started_at = ?3, completed_at = ?4,
                progress_percentage = ?5, status_description = ?6,
                records_analyzed = ?7, total_records = ?8,
                issues_found = ?9, issues_resolved = ?10,
                error = ?11, duration_ms = ?12, report_path = ?13, report_url = ?14
             WHERE id = ?1",
        )
        .bind(run.id.as_str())
        .bind(run.status.to_string())
        .bind(run.started_at.to_rfc3339())
        .bind(run.completed_at.map(|dt| dt.to_rfc3339()))
        .bind(i64::from(run.progress_percentage))
        .bind(run.status_description.as_deref())
        .bind(to_i64(run.records_analyzed))
        .bind(to_i64(run.total_records))
        .bind(to_i64(run.issues_found))
        .bind(to_i64(run.issues_resolved))
        .bind(run.error.as_deref())
        .bind(run.duration_ms.map(to_i64))
        .bind(run.report_path.as_deref())
        .bind(run.report_url.as_deref())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("analysis run", &run.id));
        }
        Ok(())
    }
}
