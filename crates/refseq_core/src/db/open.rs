//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure connection pragmas required by allocation semantics.
//! - Trigger schema migrations before returning a usable connection.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON` and a busy timeout.
//! - Returned connections have migrations fully applied.

use super::migrations::apply_migrations;
use super::{DbError, DbResult};
use crate::config::StoreConfig;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::Instant;

/// Opens a SQLite database file with default store settings.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_db_with(path, &StoreConfig::default())
}

/// Opens a SQLite database file and applies all pending migrations.
///
/// # Side effects
/// - Enables WAL journaling so readers do not block the single writer.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db_with(path: impl AsRef<Path>, config: &StoreConfig) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode=file");

    let result = Connection::open(path)
        .map_err(DbError::from)
        .and_then(|mut conn| {
            // WAL has to be set before the first write transaction.
            conn.busy_timeout(config.busy_timeout())?;
            conn.query_row("PRAGMA journal_mode = WAL;", [], |row| {
                row.get::<_, String>(0)
            })?;
            bootstrap_connection(&mut conn, config)?;
            Ok(conn)
        });

    log_open_result("file", started_at, result)
}

/// Opens an in-memory SQLite database and applies all pending migrations.
///
/// Each call yields an isolated database.
pub fn open_db_in_memory() -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode=memory");

    let result = Connection::open_in_memory()
        .map_err(DbError::from)
        .and_then(|mut conn| {
            bootstrap_connection(&mut conn, &StoreConfig::default())?;
            Ok(conn)
        });

    log_open_result("memory", started_at, result)
}

fn log_open_result(
    mode: &str,
    started_at: Instant,
    result: DbResult<Connection>,
) -> DbResult<Connection> {
    match &result {
        Ok(_) => info!(
            "event=db_open module=db status=ok mode={} duration_ms={}",
            mode,
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=db_open module=db status=error mode={} duration_ms={} error_code=db_open_failed error={}",
            mode,
            started_at.elapsed().as_millis(),
            err
        ),
    }
    result
}

fn bootstrap_connection(conn: &mut Connection, config: &StoreConfig) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(config.busy_timeout())?;
    apply_migrations(conn)?;
    Ok(())
}
