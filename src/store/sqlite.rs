use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::debug;

use super::{JobFilter, JobMutation, JobRepository};
use crate::error::{Result, StoreError};
use crate::state_machine::{Job, JobId, JobKind, JobStatus, Money};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    seq              INTEGER PRIMARY KEY AUTOINCREMENT,
    id               TEXT NOT NULL UNIQUE,
    creator_id       TEXT NOT NULL,
    editor_id        TEXT,
    title            TEXT NOT NULL,
    description      TEXT NOT NULL,
    long_description TEXT,
    bounty_cents     INTEGER NOT NULL CHECK (bounty_cents > 0),
    status           TEXT NOT NULL CHECK (status IN ('OPEN', 'CLAIMED', 'SUBMITTED', 'APPROVED')),
    type             TEXT,
    deadline         TEXT,
    requirements     TEXT NOT NULL DEFAULT '[]',
    raw_footage_url  TEXT NOT NULL,
    submission_url   TEXT,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    claimed_at       TEXT,
    submitted_at     TEXT,
    approved_at      TEXT
);
CREATE INDEX IF NOT EXISTS jobs_status_created_idx ON jobs (status, created_at);
CREATE INDEX IF NOT EXISTS jobs_creator_idx ON jobs (creator_id);
CREATE INDEX IF NOT EXISTS jobs_editor_idx ON jobs (editor_id);
"#;

const SELECT_COLUMNS: &str = "id, creator_id, editor_id, title, description, long_description, \
     bounty_cents, status, type, deadline, requirements, raw_footage_url, submission_url, \
     created_at, updated_at, claimed_at, submitted_at, approved_at";

/// Job store backed by a SQLite `jobs` table.
///
/// All statements bind their values as parameters. Updates run in an
/// IMMEDIATE transaction and write back with a compare-and-swap on the
/// status read at the start of the transaction.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(StoreError::from)?;
        debug!(path = %path.display(), "opened sqlite job store");
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory().map_err(StoreError::from)?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(StoreError::from)?;
        conn.execute_batch(SCHEMA).map_err(StoreError::from)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl JobRepository for SqliteJobStore {
    fn get(&self, id: &JobId) -> Result<Job> {
        let conn = self.lock();
        let row = select_one(&conn, id)?;
        row.ok_or_else(|| StoreError::NotFound(id.clone()))?
            .into_job()
            .map_err(Into::into)
    }

    fn list(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM jobs \
             WHERE (?1 IS NULL OR status = ?1) \
               AND (?2 IS NULL OR creator_id = ?2) \
               AND (?3 IS NULL OR editor_id = ?3) \
             ORDER BY created_at DESC, seq DESC"
        );
        let mut stmt = conn.prepare(&sql).map_err(StoreError::from)?;
        let rows = stmt
            .query_map(
                params![
                    filter.status.map(JobStatus::as_str),
                    filter.creator_id.as_deref(),
                    filter.editor_id.as_deref(),
                ],
                JobRow::read,
            )
            .map_err(StoreError::from)?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row.map_err(StoreError::from)?.into_job()?);
        }
        Ok(jobs)
    }

    fn insert(&self, job: Job) -> Result<Job> {
        let conn = self.lock();
        let requirements = serde_json::to_string(&job.requirements).map_err(StoreError::from)?;
        let result = conn.execute(
            r#"
            INSERT INTO jobs (
                id, creator_id, editor_id, title, description, long_description,
                bounty_cents, status, type, deadline, requirements, raw_footage_url,
                submission_url, created_at, updated_at, claimed_at, submitted_at, approved_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            "#,
            params![
                job.id.as_str(),
                job.creator_id,
                job.editor_id,
                job.title,
                job.description,
                job.long_description,
                job.bounty.cents(),
                job.status.as_str(),
                job.kind.map(JobKind::as_str),
                job.deadline.map(|d| d.format("%Y-%m-%d").to_string()),
                requirements,
                job.video_url,
                job.submission_url,
                ts_to_sql(job.created_at),
                ts_to_sql(job.updated_at),
                job.claimed_at.map(ts_to_sql),
                job.submitted_at.map(ts_to_sql),
                job.approved_at.map(ts_to_sql),
            ],
        );

        match result {
            Ok(_) => Ok(job),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
                    && select_one(&conn, &job.id)?.is_some() =>
            {
                Err(StoreError::Duplicate(job.id).into())
            }
            Err(e) => Err(StoreError::from(e).into()),
        }
    }

    fn update(&self, id: &JobId, mutate: &mut JobMutation<'_>) -> Result<Job> {
        let mut conn = self.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;

        let mut job = select_one(&tx, id)?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?
            .into_job()?;
        let prior = job.status;

        // An error here drops `tx`, which rolls back.
        mutate(&mut job)?;

        let changed = tx
            .execute(
                r#"
                UPDATE jobs
                SET editor_id = ?2, status = ?3, submission_url = ?4, updated_at = ?5,
                    claimed_at = ?6, submitted_at = ?7, approved_at = ?8
                WHERE id = ?1 AND status = ?9
                "#,
                params![
                    id.as_str(),
                    job.editor_id,
                    job.status.as_str(),
                    job.submission_url,
                    ts_to_sql(job.updated_at),
                    job.claimed_at.map(ts_to_sql),
                    job.submitted_at.map(ts_to_sql),
                    job.approved_at.map(ts_to_sql),
                    prior.as_str(),
                ],
            )
            .map_err(StoreError::from)?;
        if changed != 1 {
            return Err(StoreError::Conflict(id.clone()).into());
        }

        tx.commit().map_err(StoreError::from)?;
        Ok(job)
    }
}

fn select_one(conn: &Connection, id: &JobId) -> std::result::Result<Option<JobRow>, StoreError> {
    let sql = format!("SELECT {SELECT_COLUMNS} FROM jobs WHERE id = ?1");
    Ok(conn
        .query_row(&sql, params![id.as_str()], JobRow::read)
        .optional()?)
}

/// Fixed-width RFC 3339 so text ordering matches time ordering.
fn ts_to_sql(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn ts_from_sql(column: &str, raw: &str) -> std::result::Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("{column}: {e}")))
}

/// Raw column values, converted into a [`Job`] outside the row callback so
/// bad data surfaces as `StoreError::Corrupt`.
struct JobRow {
    id: String,
    creator_id: String,
    editor_id: Option<String>,
    title: String,
    description: String,
    long_description: Option<String>,
    bounty_cents: i64,
    status: String,
    kind: Option<String>,
    deadline: Option<String>,
    requirements: String,
    video_url: String,
    submission_url: Option<String>,
    created_at: String,
    updated_at: String,
    claimed_at: Option<String>,
    submitted_at: Option<String>,
    approved_at: Option<String>,
}

impl JobRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            creator_id: row.get(1)?,
            editor_id: row.get(2)?,
            title: row.get(3)?,
            description: row.get(4)?,
            long_description: row.get(5)?,
            bounty_cents: row.get(6)?,
            status: row.get(7)?,
            kind: row.get(8)?,
            deadline: row.get(9)?,
            requirements: row.get(10)?,
            video_url: row.get(11)?,
            submission_url: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
            claimed_at: row.get(15)?,
            submitted_at: row.get(16)?,
            approved_at: row.get(17)?,
        })
    }

    fn into_job(self) -> std::result::Result<Job, StoreError> {
        let status = self
            .status
            .parse::<JobStatus>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let kind = match self.kind.as_deref() {
            None => None,
            Some(raw) => Some(
                JobKind::parse(raw)
                    .ok_or_else(|| StoreError::Corrupt(format!("type: unknown kind {raw:?}")))?,
            ),
        };
        let deadline = match self.deadline.as_deref() {
            None => None,
            Some(raw) => Some(
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map_err(|e| StoreError::Corrupt(format!("deadline: {e}")))?,
            ),
        };
        let optional_ts = |column: &str, raw: Option<String>| {
            raw.map(|r| ts_from_sql(column, &r)).transpose()
        };

        let job = Job {
            id: JobId::from(self.id),
            creator_id: self.creator_id,
            editor_id: self.editor_id,
            title: self.title,
            description: self.description,
            long_description: self.long_description,
            bounty: Money::from_cents(self.bounty_cents),
            status,
            kind,
            deadline,
            requirements: serde_json::from_str(&self.requirements)?,
            video_url: self.video_url,
            submission_url: self.submission_url,
            created_at: ts_from_sql("created_at", &self.created_at)?,
            updated_at: ts_from_sql("updated_at", &self.updated_at)?,
            claimed_at: optional_ts("claimed_at", self.claimed_at)?,
            submitted_at: optional_ts("submitted_at", self.submitted_at)?,
            approved_at: optional_ts("approved_at", self.approved_at)?,
        };
        job.check_invariants().map_err(StoreError::Corrupt)?;
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoardError;
    use crate::state_machine::{StateMachine, Transition};
    use crate::store::testing::{self, sample_job};

    #[test]
    fn sqlite_store_honours_repository_contract() {
        let dir = tempfile::tempdir().unwrap();
        let counter = std::sync::atomic::AtomicUsize::new(0);
        testing::run_contract(|| {
            let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Box::new(SqliteJobStore::open(&dir.path().join(format!("jobs-{n}.db"))).unwrap())
        });
    }

    #[test]
    fn in_memory_database_round_trips_every_field() {
        let store = SqliteJobStore::open_in_memory().unwrap();
        let mut job = sample_job("creator-1", "full");
        job.long_description = Some("long form notes".into());
        job.kind = Some(JobKind::LongForm);
        job.deadline = NaiveDate::from_ymd_opt(2026, 11, 2);
        store.insert(job.clone()).unwrap();

        let updated = store
            .update(&job.id, &mut |j| {
                StateMachine::apply(
                    j,
                    &Transition::Claim {
                        editor_id: "editor-1".into(),
                    },
                    Utc::now(),
                )
            })
            .unwrap();
        assert_eq!(store.get(&job.id).unwrap(), updated);
        assert_eq!(updated.title, job.title);
        assert_eq!(updated.deadline, job.deadline);
        assert_eq!(updated.requirements, job.requirements);
    }

    #[test]
    fn hostile_ids_are_bound_not_interpolated() {
        let store = SqliteJobStore::open_in_memory().unwrap();
        let job = store.insert(sample_job("creator-1", "safe")).unwrap();

        let hostile = JobId::from("x' OR '1'='1");
        let err = store
            .update(&hostile, &mut |j| {
                StateMachine::apply(j, &Transition::Approve, Utc::now())
            })
            .unwrap_err();
        assert!(matches!(err, BoardError::NotFound(_)));
        assert_eq!(store.get(&job.id).unwrap().status, JobStatus::Open);
    }

    #[test]
    fn immediate_transaction_excludes_competing_writers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.db");
        let store = SqliteJobStore::open(&path).unwrap();
        let job = store.insert(sample_job("creator-1", "race")).unwrap();

        let other = Connection::open(&path).unwrap();
        other.busy_timeout(Duration::from_millis(50)).unwrap();

        let claimed = store
            .update(&job.id, &mut |j| {
                let competing = other.execute(
                    "UPDATE jobs SET status = 'CLAIMED', editor_id = ?2 WHERE id = ?1",
                    params![j.id.as_str(), "editor-2"],
                );
                assert!(competing.is_err());
                StateMachine::apply(
                    j,
                    &Transition::Claim {
                        editor_id: "editor-1".into(),
                    },
                    Utc::now(),
                )
            })
            .unwrap();
        assert_eq!(claimed.editor_id.as_deref(), Some("editor-1"));
        assert_eq!(
            store.get(&job.id).unwrap().editor_id.as_deref(),
            Some("editor-1")
        );
    }
}
