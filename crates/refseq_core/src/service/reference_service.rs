//! Reference allocation use-cases.
//!
//! # Responsibility
//! - Map projects to their sequence names.
//! - Allocate numbers, lazily creating sequences when allowed.
//! - Persist the reference record binding a number to its entity.
//!
//! # Invariants
//! - `allocate` is the only path that increments a project sequence.
//! - A losing creation race (`AlreadyExists`) is treated as success.
//! - Store unavailability is retried a bounded number of times.
//! - A number whose record failed to persist is consumed, never reused.

use crate::config::ReferenceConfig;
use crate::model::entity::{EntityRef, ProjectId};
use crate::model::reference::{NewReference, ReferenceRecord};
use crate::repo::reference_repo::ReferenceRepository;
use crate::repo::sequence_repo::{SequenceError, SequenceResult, SequenceStore};
use crate::repo::RepoError;
use log::{debug, error, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::thread;

const SEQUENCE_NAME_PREFIX: &str = "references_project";

static SEQUENCE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^references_project(0|-?[1-9][0-9]*)$").expect("valid sequence name regex")
});

/// Returns the sequence name owned by one project.
///
/// Pure and injective: distinct ids yield distinct names.
pub fn sequence_name_for(project_id: ProjectId) -> String {
    format!("{SEQUENCE_NAME_PREFIX}{project_id}")
}

/// Recovers the project id from a name built by `sequence_name_for`.
///
/// Only canonical decimal ids match: `references_project07` and
/// `references_project-0` are foreign names.
pub fn project_id_from_sequence_name(name: &str) -> Option<ProjectId> {
    SEQUENCE_NAME_RE
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|id| id.as_str().parse().ok())
}

pub type AllocResult<T> = Result<T, AllocError>;

/// Allocation failures surfaced to entity-creation paths.
#[derive(Debug)]
pub enum AllocError {
    /// The project's sequence does not exist and creation was not allowed.
    SequenceMissing(String),
    /// The store stayed unavailable through every retry attempt.
    StoreUnavailable {
        name: String,
        attempts: u32,
        details: String,
    },
    /// Storage rejected a `(project, ref)` pair that was already taken.
    DuplicateReference { project_id: ProjectId, reference: i64 },
    Sequence(SequenceError),
    Repo(RepoError),
}

impl Display for AllocError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SequenceMissing(name) => write!(f, "reference sequence missing: {name}"),
            Self::StoreUnavailable {
                name,
                attempts,
                details,
            } => write!(
                f,
                "sequence store unavailable for `{name}` after {attempts} attempt(s): {details}"
            ),
            Self::DuplicateReference {
                project_id,
                reference,
            } => write!(
                f,
                "duplicate reference #{reference} in project {project_id}"
            ),
            Self::Sequence(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AllocError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sequence(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SequenceError> for AllocError {
    fn from(value: SequenceError) -> Self {
        match value {
            SequenceError::NotFound(name) => Self::SequenceMissing(name),
            other => Self::Sequence(other),
        }
    }
}

impl From<RepoError> for AllocError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::DuplicateReference {
                project_id,
                reference,
            } => Self::DuplicateReference {
                project_id,
                reference,
            },
            other => Self::Repo(other),
        }
    }
}

/// Allocator over a sequence store and a reference repository.
pub struct ReferenceAllocator<S: SequenceStore, R: ReferenceRepository> {
    store: S,
    references: R,
    config: ReferenceConfig,
}

impl<S: SequenceStore, R: ReferenceRepository> ReferenceAllocator<S, R> {
    pub fn new(store: S, references: R, config: ReferenceConfig) -> Self {
        Self {
            store,
            references,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn references(&self) -> &R {
        &self.references
    }

    /// Creates the project's sequence unless it already exists.
    ///
    /// Returns `true` when this call created it.
    pub fn ensure_sequence(&self, project_id: ProjectId) -> AllocResult<bool> {
        let name = sequence_name_for(project_id);
        if self.with_retry(&name, || self.store.exists(&name))? {
            return Ok(false);
        }

        match self.with_retry(&name, || self.store.create(&name)) {
            Ok(()) => Ok(true),
            Err(AllocError::Sequence(SequenceError::AlreadyExists(_))) => {
                debug!("event=sequence_create module=reference status=raced name={name}");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Deletes the project's sequence if present.
    ///
    /// Returns `true` when a sequence was removed. A concurrent delete that
    /// wins the race is not an error.
    pub fn drop_sequence(&self, project_id: ProjectId) -> AllocResult<bool> {
        let name = sequence_name_for(project_id);
        if !self.with_retry(&name, || self.store.exists(&name))? {
            return Ok(false);
        }

        match self.with_retry(&name, || self.store.delete(&name)) {
            Ok(()) => Ok(true),
            Err(AllocError::SequenceMissing(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Allocates the next number of a project.
    ///
    /// # Errors
    /// - `SequenceMissing` when the sequence is absent and
    ///   `create_if_missing` is false.
    /// - `StoreUnavailable` once retries are exhausted.
    pub fn allocate(&self, project_id: ProjectId, create_if_missing: bool) -> AllocResult<i64> {
        let name = sequence_name_for(project_id);
        let value = match self.with_retry(&name, || self.store.next_value(&name)) {
            Err(AllocError::SequenceMissing(_)) if create_if_missing => {
                self.ensure_sequence(project_id)?;
                self.with_retry(&name, || self.store.next_value(&name))?
            }
            other => other?,
        };

        debug!(
            "event=reference_allocate module=reference status=ok project_id={} value={}",
            project_id, value
        );
        Ok(value)
    }

    /// Allocates a number for `entity` and persists its reference record.
    ///
    /// Uses the configured lazy-creation policy. When the record cannot be
    /// written the allocated number stays consumed.
    pub fn assign_reference(
        &self,
        entity: EntityRef,
        project_id: ProjectId,
    ) -> AllocResult<(i64, ReferenceRecord)> {
        let value = self.allocate(project_id, self.config.lazy_sequence_creation)?;
        let new = NewReference {
            project_id,
            entity,
            reference: value,
        };

        let record = self.references.insert_reference(&new).map_err(|err| {
            match &err {
                RepoError::DuplicateReference { .. } => error!(
                    "event=reference_assign module=reference status=error error_code=duplicate_reference project_id={} entity={} value={} error={}",
                    project_id, entity, value, err
                ),
                _ => warn!(
                    "event=reference_assign module=reference status=error error_code=record_failed project_id={} entity={} value={} gap=true error={}",
                    project_id, entity, value, err
                ),
            }
            AllocError::from(err)
        })?;

        info!(
            "event=reference_assign module=reference status=ok project_id={} entity={} value={}",
            project_id, entity, value
        );
        Ok((value, record))
    }

    /// Raises the project's sequence so the next number exceeds `floor`.
    ///
    /// Used after bulk imports that wrote their own numbers.
    pub fn advance_past(&self, project_id: ProjectId, floor: i64) -> AllocResult<i64> {
        let name = sequence_name_for(project_id);
        self.ensure_sequence(project_id)?;
        let value = self.with_retry(&name, || self.store.advance_to(&name, floor))?;
        info!(
            "event=sequence_advance module=reference status=ok project_id={} floor={} value={}",
            project_id, floor, value
        );
        Ok(value)
    }

    /// Last number handed out in the project; `None` without a sequence.
    pub fn current_value(&self, project_id: ProjectId) -> AllocResult<Option<i64>> {
        let name = sequence_name_for(project_id);
        self.with_retry(&name, || self.store.current_value(&name))
    }

    /// Resolves a project-scoped number back to its reference record.
    pub fn resolve(
        &self,
        project_id: ProjectId,
        reference: i64,
    ) -> AllocResult<Option<ReferenceRecord>> {
        Ok(self.references.get_by_ref(project_id, reference)?)
    }

    fn with_retry<T>(
        &self,
        name: &str,
        mut op: impl FnMut() -> SequenceResult<T>,
    ) -> AllocResult<T> {
        let attempts = self.config.retry.attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(SequenceError::Unavailable(details)) if attempt >= attempts => {
                    error!(
                        "event=sequence_retry module=reference status=error error_code=store_unavailable name={} attempts={} error={}",
                        name, attempt, details
                    );
                    return Err(AllocError::StoreUnavailable {
                        name: name.to_string(),
                        attempts: attempt,
                        details,
                    });
                }
                Err(SequenceError::Unavailable(details)) => {
                    warn!(
                        "event=sequence_retry module=reference status=retry name={} attempt={} error={}",
                        name, attempt, details
                    );
                    thread::sleep(self.config.retry.delay_after(attempt));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
