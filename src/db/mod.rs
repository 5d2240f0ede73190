//! SQLite-backed storage for the rotation engine.
//!
//! The database lives at `~/.oncall-rotation/rotation.db` unless the config
//! names another path. It holds every piece of rotation state: the participant
//! queue, the per-week assignment records, the exception ledger, pending swaps,
//! back-to-back approvals and the reminder settings. Nothing is cached in
//! memory; every operation re-reads before deciding.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::week::WeekKey;

pub mod types;
pub use types::*;

pub mod approvals;
pub mod assignments;
pub mod exceptions;
pub mod participants;
pub mod settings;
pub mod swaps;

pub use approvals::NewApproval;
pub use swaps::SWAP_EXPIRY_HOURS;

pub struct RotationDb {
    conn: Connection,
}

impl RotationDb {
    /// Execute a closure within a SQLite transaction.
    /// Commits on Ok, rolls back on Err.
    ///
    /// Re-entrant: when a transaction is already open the closure simply runs
    /// inside it, so composed operations commit or roll back as one unit.
    pub fn with_transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<DbError>,
    {
        if !self.conn.is_autocommit() {
            return f(self);
        }

        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| E::from(DbError::Sqlite(e)))?;
        match f(self) {
            Ok(val) => {
                if let Err(e) = self.conn.execute_batch("COMMIT") {
                    let _ = self.conn.execute_batch("ROLLBACK");
                    return Err(E::from(DbError::Sqlite(e)));
                }
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Open (or create) the database at the default location.
    pub fn open() -> Result<Self, DbError> {
        let path = Self::default_path()?;
        Self::open_at(path)
    }

    /// Open a database at an explicit path and apply the schema.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::prepare(conn)
    }

    /// Open a private in-memory database. Nothing survives the handle.
    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(mut conn: Connection) -> Result<Self, DbError> {
        crate::migrations::run_migrations(&mut conn)
            .map_err(|e| DbError::Migration(e.to_string()))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    /// Resolve the default database path: `~/.oncall-rotation/rotation.db`.
    pub fn default_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".oncall-rotation").join("rotation.db"))
    }

    /// Path of the open database file, empty for in-memory databases.
    pub fn file_path(&self) -> Option<&Path> {
        self.conn.path().map(Path::new).filter(|p| !p.as_os_str().is_empty())
    }
}

/// Current UTC time in the storage timestamp format.
pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Fresh row identifier.
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Read a TEXT column holding one of our enum labels.
pub(crate) fn label_column<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = UnknownLabel>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

impl RotationDb {
    /// Number of rows in `table` for a given week. Used by diagnostics and tests.
    pub fn count_for_week(&self, table: WeekTable, week: WeekKey) -> Result<i64, DbError> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE week_start = ?1", table.as_str());
        let count = self.conn.query_row(&sql, params![week], |row| row.get(0))?;
        Ok(count)
    }
}

/// Week-keyed tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeekTable {
    AssignmentRecords,
    ExceptionEntries,
    PendingSwaps,
    BackToBackApprovals,
}

impl WeekTable {
    fn as_str(&self) -> &'static str {
        match self {
            WeekTable::AssignmentRecords => "assignment_records",
            WeekTable::ExceptionEntries => "exception_entries",
            WeekTable::PendingSwaps => "pending_swaps",
            WeekTable::BackToBackApprovals => "back_to_back_approvals",
        }
    }
}

// =============================================================================
// Shared test utilities
// =============================================================================


// =============================================================================
// Tests
// =============================================================================
