//! Durable queue of ledger credits still owed after an approval.
//!
//! An approval commits before the ledger is touched. When the ledger fails,
//! the remaining work is written here so a later `reconcile`, possibly in
//! another process, can finish it. Entries are keyed by job id: a job is
//! approved at most once, so it owes at most one credit.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::state_machine::{JobId, Money};
use crate::store::{lock_file, read_json_file, write_json_file};

/// Ledger work owed for one approved job. Each step is tracked on its own so
/// a retry never repeats a step that already landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingCredit {
    pub job_id: JobId,
    pub editor_id: String,
    pub amount: Money,
    pub earnings_applied: bool,
    pub completed_applied: bool,
}

impl PendingCredit {
    pub fn new(job_id: JobId, editor_id: String, amount: Money) -> Self {
        Self {
            job_id,
            editor_id,
            amount,
            earnings_applied: false,
            completed_applied: false,
        }
    }
}

pub trait CreditQueue: Send + Sync {
    /// Queue `credit`, replacing any entry for the same job.
    fn push(&self, credit: PendingCredit) -> Result<(), StoreError>;

    /// Every queued credit, oldest first.
    fn list(&self) -> Result<Vec<PendingCredit>, StoreError>;

    /// Remove and return the entry for `job_id`. Of several concurrent
    /// callers only one receives it.
    fn take(&self, job_id: &JobId) -> Result<Option<PendingCredit>, StoreError>;
}

/// Queue held in process memory.
#[derive(Debug, Default)]
pub struct MemoryCreditQueue {
    credits: Mutex<Vec<PendingCredit>>,
}

impl MemoryCreditQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PendingCredit>> {
        self.credits.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn replace_or_append(credits: &mut Vec<PendingCredit>, credit: PendingCredit) {
    match credits.iter_mut().find(|c| c.job_id == credit.job_id) {
        Some(slot) => *slot = credit,
        None => credits.push(credit),
    }
}

fn remove(credits: &mut Vec<PendingCredit>, job_id: &JobId) -> Option<PendingCredit> {
    let index = credits.iter().position(|c| &c.job_id == job_id)?;
    Some(credits.remove(index))
}

impl CreditQueue for MemoryCreditQueue {
    fn push(&self, credit: PendingCredit) -> Result<(), StoreError> {
        replace_or_append(&mut self.lock(), credit);
        Ok(())
    }

    fn list(&self) -> Result<Vec<PendingCredit>, StoreError> {
        Ok(self.lock().clone())
    }

    fn take(&self, job_id: &JobId) -> Result<Option<PendingCredit>, StoreError> {
        Ok(remove(&mut self.lock(), job_id))
    }
}

/// Queue kept as a JSON array, normally at `<data_path>.pending`.
#[derive(Debug)]
pub struct FileCreditQueue {
    path: PathBuf,
}

impl FileCreditQueue {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let queue = Self { path: path.into() };
        queue.load()?;
        Ok(queue)
    }

    fn load(&self) -> Result<Vec<PendingCredit>, StoreError> {
        Ok(read_json_file(&self.path)?.unwrap_or_default())
    }

    fn modify<T>(&self, f: impl FnOnce(&mut Vec<PendingCredit>) -> T) -> Result<T, StoreError> {
        let _locked = lock_file(&self.path)?;
        let mut credits = self.load()?;
        let out = f(&mut credits);
        write_json_file(&self.path, &credits)?;
        Ok(out)
    }
}

impl CreditQueue for FileCreditQueue {
    fn push(&self, credit: PendingCredit) -> Result<(), StoreError> {
        self.modify(|credits| replace_or_append(credits, credit))
    }

    fn list(&self) -> Result<Vec<PendingCredit>, StoreError> {
        self.load()
    }

    fn take(&self, job_id: &JobId) -> Result<Option<PendingCredit>, StoreError> {
        self.modify(|credits| remove(credits, job_id))
    }
}

const QUEUE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS pending_credits (
    job_id             TEXT PRIMARY KEY,
    editor_id          TEXT NOT NULL,
    amount_cents       INTEGER NOT NULL,
    earnings_applied   INTEGER NOT NULL DEFAULT 0,
    completed_applied  INTEGER NOT NULL DEFAULT 0,
    queued_at          TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

/// Queue kept in a `pending_credits` table next to the jobs and users.
pub struct SqliteCreditQueue {
    conn: Mutex<Connection>,
}

impl SqliteCreditQueue {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(QUEUE_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn read_credit(row: &rusqlite::Row<'_>) -> rusqlite::Result<PendingCredit> {
    Ok(PendingCredit {
        job_id: JobId::from(row.get::<_, String>(0)?),
        editor_id: row.get(1)?,
        amount: Money::from_cents(row.get(2)?),
        earnings_applied: row.get(3)?,
        completed_applied: row.get(4)?,
    })
}

impl CreditQueue for SqliteCreditQueue {
    fn push(&self, credit: PendingCredit) -> Result<(), StoreError> {
        self.lock().execute(
            r#"
            INSERT INTO pending_credits
                (job_id, editor_id, amount_cents, earnings_applied, completed_applied)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (job_id) DO UPDATE SET
                earnings_applied = excluded.earnings_applied,
                completed_applied = excluded.completed_applied
            "#,
            params![
                credit.job_id.as_str(),
                credit.editor_id,
                credit.amount.cents(),
                credit.earnings_applied,
                credit.completed_applied,
            ],
        )?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<PendingCredit>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT job_id, editor_id, amount_cents, earnings_applied, completed_applied \
             FROM pending_credits ORDER BY queued_at, rowid",
        )?;
        let rows = stmt.query_map([], read_credit)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn take(&self, job_id: &JobId) -> Result<Option<PendingCredit>, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let credit = tx
            .query_row(
                "SELECT job_id, editor_id, amount_cents, earnings_applied, completed_applied \
                 FROM pending_credits WHERE job_id = ?1",
                params![job_id.as_str()],
                read_credit,
            )
            .optional()?;
        if credit.is_some() {
            tx.execute(
                "DELETE FROM pending_credits WHERE job_id = ?1",
                params![job_id.as_str()],
            )?;
        }
        tx.commit()?;
        Ok(credit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credit(job: &str, cents: i64) -> PendingCredit {
        PendingCredit::new(JobId::from(job), "editor-7".into(), Money::from_cents(cents))
    }

    fn exercise(queue: &dyn CreditQueue) {
        assert!(queue.list().unwrap().is_empty());
        assert!(queue.take(&JobId::from("job_1")).unwrap().is_none());

        queue.push(credit("job_1", 8_500)).unwrap();
        queue.push(credit("job_2", 1_700)).unwrap();

        let mut progressed = credit("job_1", 8_500);
        progressed.earnings_applied = true;
        queue.push(progressed.clone()).unwrap();

        let listed = queue.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0], progressed);
        assert_eq!(listed[1].job_id.as_str(), "job_2");

        assert_eq!(queue.take(&JobId::from("job_1")).unwrap(), Some(progressed));
        assert!(queue.take(&JobId::from("job_1")).unwrap().is_none());
        assert_eq!(queue.list().unwrap().len(), 1);
    }

    #[test]
    fn memory_queue_keeps_one_entry_per_job() {
        exercise(&MemoryCreditQueue::new());
    }

    #[test]
    fn file_queue_keeps_one_entry_per_job() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&FileCreditQueue::open(dir.path().join("board.json.pending")).unwrap());
    }

    #[test]
    fn sqlite_queue_keeps_one_entry_per_job() {
        exercise(&SqliteCreditQueue::open_in_memory().unwrap());
    }

    #[test]
    fn queued_credits_outlive_the_handle() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("board.json.pending");
        let db_path = dir.path().join("board.db");

        FileCreditQueue::open(&file_path)
            .unwrap()
            .push(credit("job_1", 8_500))
            .unwrap();
        SqliteCreditQueue::open(&db_path)
            .unwrap()
            .push(credit("job_1", 8_500))
            .unwrap();

        assert_eq!(FileCreditQueue::open(&file_path).unwrap().list().unwrap().len(), 1);
        assert_eq!(SqliteCreditQueue::open(&db_path).unwrap().list().unwrap().len(), 1);
    }

    #[test]
    fn concurrent_takes_hand_out_an_entry_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.json.pending");
        FileCreditQueue::open(&path).unwrap().push(credit("job_1", 8_500)).unwrap();

        let handles: Vec<_> = (0..4).map(|_| FileCreditQueue::open(&path).unwrap()).collect();
        let taken: usize = std::thread::scope(|s| {
            let workers: Vec<_> = handles
                .iter()
                .map(|queue| s.spawn(move || queue.take(&JobId::from("job_1")).unwrap()))
                .collect();
            workers
                .into_iter()
                .map(|w| w.join().unwrap())
                .filter(Option::is_some)
                .count()
        });
        assert_eq!(taken, 1);
    }
}
