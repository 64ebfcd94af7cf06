//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define storage contracts for sequences, reference records and the host
//!   entity tables the hooks write to.
//! - Isolate SQLite query details from allocation orchestration.
//!
//! # Invariants
//! - Sequence counters change only through `SequenceStore` primitives.
//! - Repository APIs return semantic errors (`NotFound`, duplicates) in
//!   addition to DB transport errors.

pub mod entity_repo;
pub mod memory_sequence;
pub mod reference_repo;
pub mod sequence_repo;

use crate::db::DbError;
use crate::model::entity::{EntityRef, ProjectId};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for reference records and host entities.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// `(project_id, ref)` already bound to another entity.
    DuplicateReference { project_id: ProjectId, reference: i64 },
    /// Target entity or project row does not exist.
    NotFound(EntityRef),
    InvalidData(String),
}

impl RepoError {
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Db(err) if err.is_busy())
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::DuplicateReference {
                project_id,
                reference,
            } => write!(
                f,
                "reference #{reference} already exists in project {project_id}"
            ),
            Self::NotFound(entity) => write!(f, "entity not found: {entity}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::DuplicateReference { .. } | Self::NotFound(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

pub(crate) fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
        })
}
