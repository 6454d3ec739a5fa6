//! Per-user earnings and job counters.
//!
//! The engine credits editors on approval and counts postings on creation
//! through the [`UserLedger`] trait. Users are created on first touch, and
//! unknown users read as all zeroes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, StoreError};
use crate::state_machine::Money;
use crate::store::{lock_file, read_json_file, write_json_file};

/// Running totals for one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_earnings: Money,
    pub jobs_completed: u64,
    pub jobs_posted: u64,
}

pub trait UserLedger: Send + Sync {
    fn credit_earnings(&self, user_id: &str, amount: Money) -> Result<(), LedgerError>;
    fn increment_completed(&self, user_id: &str) -> Result<(), LedgerError>;
    fn increment_posted(&self, user_id: &str) -> Result<(), LedgerError>;
    fn stats(&self, user_id: &str) -> Result<UserStats, LedgerError>;
}

fn add_earnings(stats: &mut UserStats, amount: Money) -> Result<(), LedgerError> {
    stats.total_earnings = stats
        .total_earnings
        .checked_add(amount)
        .ok_or_else(|| LedgerError::Unavailable("earnings overflow".into()))?;
    Ok(())
}

/// Ledger held in process memory.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    users: Mutex<HashMap<String, UserStats>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, UserStats>> {
        self.users.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl UserLedger for MemoryLedger {
    fn credit_earnings(&self, user_id: &str, amount: Money) -> Result<(), LedgerError> {
        add_earnings(self.lock().entry(user_id.to_string()).or_default(), amount)
    }

    fn increment_completed(&self, user_id: &str) -> Result<(), LedgerError> {
        self.lock().entry(user_id.to_string()).or_default().jobs_completed += 1;
        Ok(())
    }

    fn increment_posted(&self, user_id: &str) -> Result<(), LedgerError> {
        self.lock().entry(user_id.to_string()).or_default().jobs_posted += 1;
        Ok(())
    }

    fn stats(&self, user_id: &str) -> Result<UserStats, LedgerError> {
        Ok(self.lock().get(user_id).copied().unwrap_or_default())
    }
}

/// Ledger persisted as a JSON object keyed by user id, next to a
/// [`FileJobStore`](crate::store::FileJobStore). Writes hold the same
/// `<path>.lock` advisory lock the job file uses.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileLedger {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let ledger = Self {
            path: path.into(),
            guard: Mutex::new(()),
        };
        ledger.load()?;
        Ok(ledger)
    }

    fn load(&self) -> Result<HashMap<String, UserStats>, LedgerError> {
        Ok(read_json_file(&self.path)
            .map_err(store_to_ledger)?
            .unwrap_or_default())
    }

    fn modify(
        &self,
        user_id: &str,
        f: impl FnOnce(&mut UserStats) -> Result<(), LedgerError>,
    ) -> Result<(), LedgerError> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let _locked = lock_file(&self.path).map_err(store_to_ledger)?;
        let mut users = self.load()?;
        f(users.entry(user_id.to_string()).or_default())?;
        write_json_file(&self.path, &users).map_err(store_to_ledger)
    }
}

fn store_to_ledger(err: StoreError) -> LedgerError {
    match err {
        StoreError::Io(e) => LedgerError::Io(e),
        StoreError::Json(e) => LedgerError::Json(e),
        StoreError::Sqlite(e) => LedgerError::Sqlite(e),
        other => LedgerError::Unavailable(other.to_string()),
    }
}

impl UserLedger for FileLedger {
    fn credit_earnings(&self, user_id: &str, amount: Money) -> Result<(), LedgerError> {
        self.modify(user_id, |s| add_earnings(s, amount))
    }

    fn increment_completed(&self, user_id: &str) -> Result<(), LedgerError> {
        self.modify(user_id, |s| {
            s.jobs_completed += 1;
            Ok(())
        })
    }

    fn increment_posted(&self, user_id: &str) -> Result<(), LedgerError> {
        self.modify(user_id, |s| {
            s.jobs_posted += 1;
            Ok(())
        })
    }

    fn stats(&self, user_id: &str) -> Result<UserStats, LedgerError> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.load()?.get(user_id).copied().unwrap_or_default())
    }
}

const LEDGER_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id                    TEXT PRIMARY KEY,
    total_earnings_cents  INTEGER NOT NULL DEFAULT 0,
    total_jobs_completed  INTEGER NOT NULL DEFAULT 0,
    total_jobs_created    INTEGER NOT NULL DEFAULT 0,
    updated_at            TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

/// Ledger kept in a SQLite `users` table, usually in the same database file
/// as the jobs.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, LedgerError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, LedgerError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(LEDGER_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn upsert(
        &self,
        user_id: &str,
        earnings_cents: i64,
        completed: i64,
        created: i64,
    ) -> Result<(), LedgerError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            r#"
            INSERT INTO users (id, total_earnings_cents, total_jobs_completed, total_jobs_created)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (id) DO UPDATE SET
                total_earnings_cents = total_earnings_cents + excluded.total_earnings_cents,
                total_jobs_completed = total_jobs_completed + excluded.total_jobs_completed,
                total_jobs_created = total_jobs_created + excluded.total_jobs_created,
                updated_at = CURRENT_TIMESTAMP
            "#,
            params![user_id, earnings_cents, completed, created],
        )?;
        Ok(())
    }
}

impl UserLedger for SqliteLedger {
    fn credit_earnings(&self, user_id: &str, amount: Money) -> Result<(), LedgerError> {
        self.upsert(user_id, amount.cents(), 0, 0)
    }

    fn increment_completed(&self, user_id: &str) -> Result<(), LedgerError> {
        self.upsert(user_id, 0, 1, 0)
    }

    fn increment_posted(&self, user_id: &str) -> Result<(), LedgerError> {
        self.upsert(user_id, 0, 0, 1)
    }

    fn stats(&self, user_id: &str) -> Result<UserStats, LedgerError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let row = conn
            .query_row(
                "SELECT total_earnings_cents, total_jobs_completed, total_jobs_created FROM users WHERE id = ?1",
                params![user_id],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?)),
            )
            .optional()?;
        Ok(row
            .map(|(earnings, completed, created)| UserStats {
                total_earnings: Money::from_cents(earnings),
                jobs_completed: completed.max(0) as u64,
                jobs_posted: created.max(0) as u64,
            })
            .unwrap_or_default())
    }
}
