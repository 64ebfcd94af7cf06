//! Sequence store contract and SQLite implementation.
//!
//! # Responsibility
//! - Own named, durable, monotonically increasing counters.
//! - Expose existence check, creation, atomic increment-and-fetch, deletion.
//!
//! # Invariants
//! - The first `next_value` after `create` returns 1.
//! - `next_value` is a single atomic statement; concurrent callers never
//!   observe the same value for one name.
//! - A counter value never decreases while the counter exists.
//! - A counter at `i64::MAX` is exhausted: `next_value` fails with `Exhausted`
//!   and the stored value stays put.
//! - `create` on an existing name fails with `AlreadyExists` and leaves the
//!   existing counter untouched.
//! - `delete` on an absent name fails with `NotFound`.

use crate::db::{is_busy, is_unique_violation, DbError};
use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type SequenceResult<T> = Result<T, SequenceError>;

/// Sequence store failures.
#[derive(Debug)]
pub enum SequenceError {
    /// No counter exists for this name.
    NotFound(String),
    /// A counter already exists for this name.
    AlreadyExists(String),
    /// Sequence names must be non-empty.
    InvalidName(String),
    /// Store could not be reached or stayed locked.
    Unavailable(String),
    /// The counter already handed out `i64::MAX`.
    Exhausted(String),
    Db(DbError),
}

impl Display for SequenceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(name) => write!(f, "sequence not found: {name}"),
            Self::AlreadyExists(name) => write!(f, "sequence already exists: {name}"),
            Self::InvalidName(name) => write!(f, "invalid sequence name: `{name}`"),
            Self::Unavailable(details) => write!(f, "sequence store unavailable: {details}"),
            Self::Exhausted(name) => write!(f, "sequence exhausted: {name}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SequenceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for SequenceError {
    fn from(value: rusqlite::Error) -> Self {
        if is_busy(&value) {
            return Self::Unavailable(value.to_string());
        }
        Self::Db(DbError::Sqlite(value))
    }
}

/// Named counter storage.
///
/// Implementations must serialize increments per name and may let different
/// names proceed independently.
pub trait SequenceStore {
    fn exists(&self, name: &str) -> SequenceResult<bool>;
    fn create(&self, name: &str) -> SequenceResult<()>;
    fn next_value(&self, name: &str) -> SequenceResult<i64>;
    fn delete(&self, name: &str) -> SequenceResult<()>;
    /// Last value handed out, or 0 for a fresh counter. `None` when absent.
    fn current_value(&self, name: &str) -> SequenceResult<Option<i64>>;
    /// Raises the counter to at least `floor` and returns the resulting value.
    fn advance_to(&self, name: &str, floor: i64) -> SequenceResult<i64>;
}

impl<T: SequenceStore + ?Sized> SequenceStore for &T {
    fn exists(&self, name: &str) -> SequenceResult<bool> {
        (**self).exists(name)
    }

    fn create(&self, name: &str) -> SequenceResult<()> {
        (**self).create(name)
    }

    fn next_value(&self, name: &str) -> SequenceResult<i64> {
        (**self).next_value(name)
    }

    fn delete(&self, name: &str) -> SequenceResult<()> {
        (**self).delete(name)
    }

    fn current_value(&self, name: &str) -> SequenceResult<Option<i64>> {
        (**self).current_value(name)
    }

    fn advance_to(&self, name: &str, floor: i64) -> SequenceResult<i64> {
        (**self).advance_to(name, floor)
    }
}

pub(crate) fn validate_name(name: &str) -> SequenceResult<()> {
    if name.trim().is_empty() {
        return Err(SequenceError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Point-in-time view of one counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceSnapshot {
    pub name: String,
    pub value: i64,
    pub created_at: i64,
}

/// SQLite-backed sequence store over the `sequences` table.
pub struct SqliteSequenceStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSequenceStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Lists all counters ordered by name.
    pub fn list_sequences(&self) -> SequenceResult<Vec<SequenceSnapshot>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, value, created_at FROM sequences ORDER BY name ASC;")?;
        let mut rows = stmt.query([])?;
        let mut sequences = Vec::new();
        while let Some(row) = rows.next()? {
            sequences.push(SequenceSnapshot {
                name: row.get("name")?,
                value: row.get("value")?,
                created_at: row.get("created_at")?,
            });
        }
        Ok(sequences)
    }
}

impl SequenceStore for SqliteSequenceStore<'_> {
    fn exists(&self, name: &str) -> SequenceResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sequences WHERE name = ?1);",
            [name],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn create(&self, name: &str) -> SequenceResult<()> {
        validate_name(name)?;
        match self.conn.execute(
            "INSERT INTO sequences (name, value) VALUES (?1, 0);",
            [name],
        ) {
            Ok(_) => {
                info!("event=sequence_create module=sequence status=ok name={name}");
                Ok(())
            }
            Err(err) if is_unique_violation(&err) => {
                Err(SequenceError::AlreadyExists(name.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn next_value(&self, name: &str) -> SequenceResult<i64> {
        // SQLite turns an overflowing integer into a REAL, so the guard keeps
        // the increment away from `i64::MAX`.
        let value = self
            .conn
            .query_row(
                "UPDATE sequences SET value = value + 1
                 WHERE name = ?1 AND value < ?2
                 RETURNING value;",
                params![name, i64::MAX],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        match value {
            Some(value) => Ok(value),
            None if self.exists(name)? => {
                warn!("event=sequence_next module=sequence status=exhausted name={name}");
                Err(SequenceError::Exhausted(name.to_string()))
            }
            None => Err(SequenceError::NotFound(name.to_string())),
        }
    }

    fn delete(&self, name: &str) -> SequenceResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM sequences WHERE name = ?1;", [name])?;
        if changed == 0 {
            return Err(SequenceError::NotFound(name.to_string()));
        }
        info!("event=sequence_delete module=sequence status=ok name={name}");
        Ok(())
    }

    fn current_value(&self, name: &str) -> SequenceResult<Option<i64>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM sequences WHERE name = ?1;",
                [name],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn advance_to(&self, name: &str, floor: i64) -> SequenceResult<i64> {
        self.conn
            .query_row(
                "UPDATE sequences SET value = MAX(value, ?2) WHERE name = ?1 RETURNING value;",
                params![name, floor],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .ok_or_else(|| SequenceError::NotFound(name.to_string()))
    }
}
