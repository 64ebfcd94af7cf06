//! Reference record repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist the binding between an allocated number and its entity.
//! - Resolve numbers back to entities and enumerate a project's history.
//!
//! # Invariants
//! - `(project_id, ref)` uniqueness is enforced by storage, not by callers.
//! - Records are insert-only; `delete_for_project` exists for explicit
//!   external cascades and is never called by lifecycle hooks.
//! - Listing order is creation order (`created_at`, then insertion id).

use crate::db::is_unique_violation;
use crate::model::entity::{EntityKind, EntityRef, ProjectId};
use crate::model::reference::{NewReference, ReferenceRecord};
use crate::repo::{now_epoch_ms, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

const REFERENCE_SELECT_SQL: &str = "SELECT
    project_id,
    entity_type,
    entity_id,
    ref,
    created_at
FROM project_references";

/// Repository interface for reference records.
pub trait ReferenceRepository {
    fn insert_reference(&self, new: &NewReference) -> RepoResult<ReferenceRecord>;
    fn get_by_ref(&self, project_id: ProjectId, reference: i64)
        -> RepoResult<Option<ReferenceRecord>>;
    fn find_for_entity(&self, entity: EntityRef) -> RepoResult<Option<ReferenceRecord>>;
    fn list_for_project(&self, project_id: ProjectId) -> RepoResult<Vec<ReferenceRecord>>;
    /// Highest recorded number in the project, if any.
    fn max_ref(&self, project_id: ProjectId) -> RepoResult<Option<i64>>;
    /// Removes every record of a project and returns how many were removed.
    fn delete_for_project(&self, project_id: ProjectId) -> RepoResult<usize>;
}

impl<T: ReferenceRepository + ?Sized> ReferenceRepository for &T {
    fn insert_reference(&self, new: &NewReference) -> RepoResult<ReferenceRecord> {
        (**self).insert_reference(new)
    }

    fn get_by_ref(
        &self,
        project_id: ProjectId,
        reference: i64,
    ) -> RepoResult<Option<ReferenceRecord>> {
        (**self).get_by_ref(project_id, reference)
    }

    fn find_for_entity(&self, entity: EntityRef) -> RepoResult<Option<ReferenceRecord>> {
        (**self).find_for_entity(entity)
    }

    fn list_for_project(&self, project_id: ProjectId) -> RepoResult<Vec<ReferenceRecord>> {
        (**self).list_for_project(project_id)
    }

    fn max_ref(&self, project_id: ProjectId) -> RepoResult<Option<i64>> {
        (**self).max_ref(project_id)
    }

    fn delete_for_project(&self, project_id: ProjectId) -> RepoResult<usize> {
        (**self).delete_for_project(project_id)
    }
}

/// SQLite-backed reference repository over `project_references`.
pub struct SqliteReferenceRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteReferenceRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ReferenceRepository for SqliteReferenceRepository<'_> {
    fn insert_reference(&self, new: &NewReference) -> RepoResult<ReferenceRecord> {
        if new.reference <= 0 {
            return Err(RepoError::InvalidData(format!(
                "reference numbers must be positive, got {}",
                new.reference
            )));
        }

        let record = ReferenceRecord {
            project_id: new.project_id,
            entity_type: new.entity.kind,
            entity_id: new.entity.id,
            reference: new.reference,
            created_at: now_epoch_ms(),
        };

        let inserted = self.conn.execute(
            "INSERT INTO project_references (
                project_id,
                entity_type,
                entity_id,
                ref,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                record.project_id,
                record.entity_type.as_str(),
                record.entity_id,
                record.reference,
                record.created_at,
            ],
        );

        match inserted {
            Ok(_) => Ok(record),
            Err(err) if is_unique_violation(&err) => Err(RepoError::DuplicateReference {
                project_id: new.project_id,
                reference: new.reference,
            }),
            Err(err) => Err(err.into()),
        }
    }

    fn get_by_ref(
        &self,
        project_id: ProjectId,
        reference: i64,
    ) -> RepoResult<Option<ReferenceRecord>> {
        let row = self
            .conn
            .query_row(
                &format!("{REFERENCE_SELECT_SQL} WHERE project_id = ?1 AND ref = ?2;"),
                params![project_id, reference],
                parse_reference_columns,
            )
            .optional()?;
        row.map(finish_reference).transpose()
    }

    fn find_for_entity(&self, entity: EntityRef) -> RepoResult<Option<ReferenceRecord>> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "{REFERENCE_SELECT_SQL}
                     WHERE entity_type = ?1 AND entity_id = ?2
                     ORDER BY created_at ASC, id ASC
                     LIMIT 1;"
                ),
                params![entity.kind.as_str(), entity.id],
                parse_reference_columns,
            )
            .optional()?;
        row.map(finish_reference).transpose()
    }

    fn list_for_project(&self, project_id: ProjectId) -> RepoResult<Vec<ReferenceRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{REFERENCE_SELECT_SQL}
             WHERE project_id = ?1
             ORDER BY created_at ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([project_id])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(finish_reference(parse_reference_columns(row)?)?);
        }
        Ok(records)
    }

    fn max_ref(&self, project_id: ProjectId) -> RepoResult<Option<i64>> {
        let max = self.conn.query_row(
            "SELECT MAX(ref) FROM project_references WHERE project_id = ?1;",
            [project_id],
            |row| row.get::<_, Option<i64>>(0),
        )?;
        Ok(max)
    }

    fn delete_for_project(&self, project_id: ProjectId) -> RepoResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM project_references WHERE project_id = ?1;",
            [project_id],
        )?;
        Ok(removed)
    }
}

struct RawReference {
    project_id: ProjectId,
    entity_type: String,
    entity_id: i64,
    reference: i64,
    created_at: i64,
}

fn parse_reference_columns(row: &Row<'_>) -> rusqlite::Result<RawReference> {
    Ok(RawReference {
        project_id: row.get("project_id")?,
        entity_type: row.get("entity_type")?,
        entity_id: row.get("entity_id")?,
        reference: row.get("ref")?,
        created_at: row.get("created_at")?,
    })
}

fn finish_reference(raw: RawReference) -> RepoResult<ReferenceRecord> {
    let entity_type = EntityKind::parse(&raw.entity_type).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid entity type `{}` in project_references.entity_type",
            raw.entity_type
        ))
    })?;

    Ok(ReferenceRecord {
        project_id: raw.project_id,
        entity_type,
        entity_id: raw.entity_id,
        reference: raw.reference,
        created_at: raw.created_at,
    })
}
