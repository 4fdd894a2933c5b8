//! SQLite store and repositories.
//!
//! Connections are configured with:
//! - `journal_mode = WAL` so readers don't block the single writer
//! - `busy_timeout` (5s by default) so writers queue instead of failing
//! - `foreign_keys = ON`
//!
//! Every repository mutation that reads before it writes runs inside one
//! `BEGIN IMMEDIATE` transaction (see [`transactional`]).

pub mod identity;
pub mod iteration;
pub mod migrations;
pub mod schema;
pub mod work_item;
pub mod work_item_type;

pub use identity::IdentityRepository;
pub use iteration::IterationRepository;
pub use work_item::WorkItemRepository;
pub use work_item_type::WorkItemTypeRepository;

use anyhow::{Context, Result};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::{path::Path, time::Duration};

/// Busy timeout used when the project config doesn't set one.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (or create) the store at `path` with the default busy timeout.
///
/// # Errors
///
/// Returns an error if opening, configuring or migrating the database fails.
pub fn open_store(path: &Path) -> Result<Connection> {
    open_store_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
}

/// Open (or create) the store at `path`, apply pragmas, and migrate the
/// schema to the latest version.
///
/// # Errors
///
/// Returns an error if opening, configuring or migrating the database fails.
pub fn open_store_with_timeout(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create store directory {}", parent.display()))?;
    }

    let mut conn =
        Connection::open(path).with_context(|| format!("open store {}", path.display()))?;

    configure_connection(&conn, busy_timeout).context("configure sqlite pragmas")?;
    migrations::migrate(&mut conn).context("apply store migrations")?;

    tracing::debug!(path = %path.display(), "opened store");
    Ok(conn)
}

/// Migrated in-memory store, mostly for tests.
///
/// # Errors
///
/// Returns an error if configuring or migrating the database fails.
pub fn open_in_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory().context("open in-memory store")?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .context("enable foreign keys")?;
    migrations::migrate(&mut conn).context("apply store migrations")?;
    Ok(conn)
}

fn configure_connection(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}

/// Run `f` inside a `BEGIN IMMEDIATE` transaction, committing on `Ok` and
/// rolling back on `Err`.
///
/// When `conn` is already inside a transaction, `f` joins it instead.
///
/// # Errors
///
/// Returns whatever `f` returns, or [`crate::Error::Internal`] when the
/// transaction cannot be started or committed.
pub fn transactional<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> crate::Result<T>,
) -> crate::Result<T> {
    if !conn.is_autocommit() {
        return f(conn);
    }
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}

pub(crate) fn now_us() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_BUSY_TIMEOUT, open_in_memory, open_store, transactional};
    use crate::db::migrations;
    use crate::error::Error;

    #[test]
    fn open_store_sets_wal_busy_timeout_and_fk() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let conn = open_store(&dir.path().join("nested/witrack.sqlite3")).expect("open store");

        let journal_mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .expect("query journal_mode");
        assert_eq!(journal_mode.to_ascii_lowercase(), "wal");

        let busy_timeout_ms: u64 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .expect("query busy_timeout");
        assert_eq!(
            u128::from(busy_timeout_ms),
            DEFAULT_BUSY_TIMEOUT.as_millis()
        );

        let foreign_keys: i64 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .expect("query foreign_keys");
        assert_eq!(foreign_keys, 1);

        assert_eq!(
            migrations::current_schema_version(&conn).expect("version"),
            migrations::LATEST_SCHEMA_VERSION
        );
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let conn = open_in_memory().expect("open");
        let result: crate::Result<()> = transactional(&conn, |tx| {
            tx.execute(
                "INSERT INTO identities (identity_id, full_name, created_at_us) VALUES ('a', 'A', 0)",
                [],
            )?;
            Err(Error::Internal("boom".to_string()))
        });
        assert!(result.is_err());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM identities", [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, 0);
        assert!(conn.is_autocommit());
    }

    #[test]
    fn nested_transactional_joins_outer() {
        let conn = open_in_memory().expect("open");
        transactional(&conn, |outer| {
            transactional(outer, |inner| {
                inner.execute(
                    "INSERT INTO identities (identity_id, full_name, created_at_us) VALUES ('b', 'B', 0)",
                    [],
                )?;
                Ok(())
            })
        })
        .expect("nested transaction");

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM identities", [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, 1);
    }
}
