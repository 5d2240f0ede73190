//! Versioned schema for the rotation store.
//!
//! SQL files under `migrations/` are compiled in and applied in order. The
//! highest applied version lives in `schema_version`; each step commits
//! together with its version row, so a failed step leaves the store at the
//! previous version.

use rusqlite::{Connection, OptionalExtension};
use thiserror::Error;

const MIGRATIONS: &[(u32, &str)] = &[(1, include_str!("migrations/001_baseline.sql"))];

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("store is at schema v{found}, this build only knows up to v{known}; upgrade oncall-rotation")]
    TooNew { found: u32, known: u32 },

    #[error("schema v{version} did not apply: {source}")]
    Step {
        version: u32,
        #[source]
        source: rusqlite::Error,
    },

    #[error("could not snapshot {path} before upgrading: {source}")]
    Snapshot {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

fn latest_known() -> u32 {
    MIGRATIONS.iter().map(|(v, _)| *v).max().unwrap_or(0)
}

fn applied_version(conn: &Connection) -> Result<u32, MigrationError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;
    let version: Option<u32> = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
        .optional()?
        .flatten();
    Ok(version.unwrap_or(0))
}

/// Copy a file-backed store to `<path>.v<version>.bak` before it is upgraded.
fn snapshot(conn: &Connection, version: u32) -> Result<(), MigrationError> {
    let path = conn.path().unwrap_or_default().to_string();
    if path.is_empty() {
        return Ok(());
    }

    let target = format!("{}.v{}.bak", path, version);
    let copy = |target: &str| -> Result<(), rusqlite::Error> {
        let mut dest = Connection::open(target)?;
        rusqlite::backup::Backup::new(conn, &mut dest)?.step(-1)?;
        Ok(())
    };
    copy(&target).map_err(|source| MigrationError::Snapshot {
        path: path.clone(),
        source,
    })?;

    log::info!("Snapshot of schema v{} written to {}", version, target);
    Ok(())
}

/// Bring the schema up to date. Returns how many steps were applied.
pub fn run_migrations(conn: &mut Connection) -> Result<usize, MigrationError> {
    let current = applied_version(conn)?;
    let known = latest_known();
    if current > known {
        return Err(MigrationError::TooNew {
            found: current,
            known,
        });
    }

    let mut applied = 0;
    for (version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > current) {
        if applied == 0 && current > 0 {
            snapshot(conn, current)?;
        }

        let step = |tx: &rusqlite::Transaction| -> Result<(), rusqlite::Error> {
            tx.execute_batch(sql)?;
            tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
            Ok(())
        };
        let tx = conn.transaction()?;
        step(&tx)
            .and_then(|_| tx.commit())
            .map_err(|source| MigrationError::Step {
                version: *version,
                source,
            })?;

        log::info!("Rotation schema now at v{}", version);
        applied += 1;
    }

    Ok(applied)
}
