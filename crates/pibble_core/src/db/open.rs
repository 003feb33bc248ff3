//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure connection pragmas required by core behavior.
//! - Trigger schema migrations before returning a usable connection.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`.
//! - Returned connections wait at most the configured lock timeout for the
//!   SQLite write lock.
//! - Returned connections have migrations fully applied.

use super::migrations::apply_migrations;
use super::DbResult;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// Lock wait used by [`open_db`] and [`open_db_in_memory`].
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a SQLite database file and applies all pending migrations.
///
/// # Side effects
/// - Performs connection bootstrap and migration checks.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_db_with_lock_timeout(path, DEFAULT_LOCK_TIMEOUT)
}

/// Opens a SQLite database file with an explicit bound on lock waits.
///
/// Writers block on SQLite's write lock for at most `lock_timeout`; after
/// that, statements fail with `SQLITE_BUSY`, which callers treat as a
/// transient failure.
pub fn open_db_with_lock_timeout(
    path: impl AsRef<Path>,
    lock_timeout: Duration,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode=file");

    let mut conn = match Connection::open(path) {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode=file duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&mut conn, lock_timeout) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode=file duration_ms={} lock_timeout_ms={}",
                started_at.elapsed().as_millis(),
                lock_timeout.as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode=file duration_ms={} error_code=db_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

/// Opens an in-memory SQLite database and applies all pending migrations.
///
/// # Side effects
/// - Performs connection bootstrap and migration checks.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db_in_memory() -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode=memory");

    let mut conn = match Connection::open_in_memory() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode=memory duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&mut conn, DEFAULT_LOCK_TIMEOUT) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode=memory duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode=memory duration_ms={} error_code=db_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &mut Connection, lock_timeout: Duration) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(lock_timeout)?;
    apply_migrations(conn)?;
    Ok(())
}
