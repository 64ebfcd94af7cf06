//! Host entity tables: projects and their work items.
//!
//! # Responsibility
//! - Persist projects, user stories, issues and tasks for the tracker host.
//! - Provide the field-scoped `ref` write used by the attach hook.
//!
//! # Invariants
//! - Table names come from `EntityKind::table_name`, never from input.
//! - `set_ref` updates the `ref` column only; other columns are untouched.
//! - Deleting a project cascades to its work items (foreign keys are on).

use crate::model::entity::{EntityKind, EntityRef, ProjectId};
use crate::repo::{RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Project read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRecord {
    pub id: ProjectId,
    pub name: String,
    pub created_at: i64,
}

/// Work item read model (story, issue or task).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub entity: EntityRef,
    pub project_id: ProjectId,
    /// `None` until a number is assigned or imported.
    pub reference: Option<i64>,
    pub subject: String,
    pub created_at: i64,
}

/// Insert payload for a work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWorkItem {
    pub kind: EntityKind,
    pub project_id: ProjectId,
    pub subject: String,
    /// Pre-set number supplied by import paths.
    pub reference: Option<i64>,
}

/// Repository interface for host entities.
pub trait EntityRepository {
    fn insert_project(&self, name: &str) -> RepoResult<ProjectId>;
    fn get_project(&self, project_id: ProjectId) -> RepoResult<Option<ProjectRecord>>;
    fn delete_project(&self, project_id: ProjectId) -> RepoResult<()>;
    fn insert_item(&self, item: &NewWorkItem) -> RepoResult<EntityRef>;
    fn get_item(&self, entity: EntityRef) -> RepoResult<Option<WorkItem>>;
    fn list_items(&self, project_id: ProjectId) -> RepoResult<Vec<WorkItem>>;
    /// Writes only the `ref` column of one work item.
    fn set_ref(&self, entity: EntityRef, reference: i64) -> RepoResult<()>;
    /// Highest `ref` held by any work item of the project.
    fn max_item_ref(&self, project_id: ProjectId) -> RepoResult<Option<i64>>;
}

/// SQLite-backed host entity repository.
pub struct SqliteEntityRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEntityRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl EntityRepository for SqliteEntityRepository<'_> {
    fn insert_project(&self, name: &str) -> RepoResult<ProjectId> {
        self.conn
            .execute("INSERT INTO projects (name) VALUES (?1);", [name])?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_project(&self, project_id: ProjectId) -> RepoResult<Option<ProjectRecord>> {
        let project = self
            .conn
            .query_row(
                "SELECT id, name, created_at FROM projects WHERE id = ?1;",
                [project_id],
                |row| {
                    Ok(ProjectRecord {
                        id: row.get("id")?,
                        name: row.get("name")?,
                        created_at: row.get("created_at")?,
                    })
                },
            )
            .optional()?;
        Ok(project)
    }

    fn delete_project(&self, project_id: ProjectId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM projects WHERE id = ?1;", [project_id])?;
        if changed == 0 {
            return Err(RepoError::NotFound(EntityRef::project(project_id)));
        }
        Ok(())
    }

    fn insert_item(&self, item: &NewWorkItem) -> RepoResult<EntityRef> {
        let table = work_item_table(item.kind)?;
        self.conn.execute(
            &format!("INSERT INTO {table} (project_id, ref, subject) VALUES (?1, ?2, ?3);"),
            params![item.project_id, item.reference, item.subject.as_str()],
        )?;
        Ok(EntityRef::new(item.kind, self.conn.last_insert_rowid()))
    }

    fn get_item(&self, entity: EntityRef) -> RepoResult<Option<WorkItem>> {
        let table = work_item_table(entity.kind)?;
        let item = self
            .conn
            .query_row(
                &format!(
                    "SELECT id, project_id, ref, subject, created_at FROM {table} WHERE id = ?1;"
                ),
                [entity.id],
                |row| parse_item_row(entity.kind, row),
            )
            .optional()?;
        Ok(item)
    }

    fn list_items(&self, project_id: ProjectId) -> RepoResult<Vec<WorkItem>> {
        let mut items = Vec::new();
        for kind in EntityKind::WORK_ITEMS {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT id, project_id, ref, subject, created_at
                 FROM {}
                 WHERE project_id = ?1;",
                kind.table_name()
            ))?;
            let mut rows = stmt.query([project_id])?;
            while let Some(row) = rows.next()? {
                items.push(parse_item_row(kind, row)?);
            }
        }
        items.sort_by_key(|item| (item.reference.is_none(), item.reference, item.created_at));
        Ok(items)
    }

    fn set_ref(&self, entity: EntityRef, reference: i64) -> RepoResult<()> {
        let table = work_item_table(entity.kind)?;
        let changed = self.conn.execute(
            &format!("UPDATE {table} SET ref = ?1 WHERE id = ?2;"),
            params![reference, entity.id],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(entity));
        }
        Ok(())
    }

    fn max_item_ref(&self, project_id: ProjectId) -> RepoResult<Option<i64>> {
        let max = self.conn.query_row(
            "SELECT MAX(ref) FROM (
                SELECT ref FROM userstories WHERE project_id = ?1
                UNION ALL SELECT ref FROM issues WHERE project_id = ?1
                UNION ALL SELECT ref FROM tasks WHERE project_id = ?1
            );",
            [project_id],
            |row| row.get::<_, Option<i64>>(0),
        )?;
        Ok(max)
    }
}

fn work_item_table(kind: EntityKind) -> RepoResult<&'static str> {
    if !kind.is_work_item() {
        return Err(RepoError::InvalidData(format!(
            "`{kind}` is not a work item kind"
        )));
    }
    Ok(kind.table_name())
}

fn parse_item_row(kind: EntityKind, row: &Row<'_>) -> rusqlite::Result<WorkItem> {
    Ok(WorkItem {
        entity: EntityRef::new(kind, row.get("id")?),
        project_id: row.get("project_id")?,
        reference: row.get("ref")?,
        subject: row.get("subject")?,
        created_at: row.get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::{EntityRepository, NewWorkItem, SqliteEntityRepository};
    use crate::db::open_db_in_memory;
    use crate::model::entity::{EntityKind, EntityRef};
    use crate::repo::RepoError;

    #[test]
    fn set_ref_touches_only_the_ref_column() {
        let conn = open_db_in_memory().expect("in-memory db");
        let repo = SqliteEntityRepository::new(&conn);
        let project_id = repo.insert_project("alpha").unwrap();
        let story = repo
            .insert_item(&NewWorkItem {
                kind: EntityKind::UserStory,
                project_id,
                subject: "login".to_string(),
                reference: None,
            })
            .unwrap();

        conn.execute(
            "UPDATE userstories SET subject = 'login v2' WHERE id = ?1;",
            [story.id],
        )
        .unwrap();
        repo.set_ref(story, 7).unwrap();

        let loaded = repo.get_item(story).unwrap().expect("story exists");
        assert_eq!(loaded.reference, Some(7));
        assert_eq!(loaded.subject, "login v2");
    }

    #[test]
    fn projects_are_not_work_items() {
        let conn = open_db_in_memory().expect("in-memory db");
        let repo = SqliteEntityRepository::new(&conn);
        let err = repo
            .set_ref(EntityRef::project(1), 1)
            .expect_err("projects carry no ref column");
        assert!(matches!(err, RepoError::InvalidData(_)));
    }

    #[test]
    fn deleting_a_project_cascades_to_items() {
        let conn = open_db_in_memory().expect("in-memory db");
        let repo = SqliteEntityRepository::new(&conn);
        let project_id = repo.insert_project("alpha").unwrap();
        let task = repo
            .insert_item(&NewWorkItem {
                kind: EntityKind::Task,
                project_id,
                subject: "t".to_string(),
                reference: Some(4),
            })
            .unwrap();
        assert_eq!(repo.max_item_ref(project_id).unwrap(), Some(4));

        repo.delete_project(project_id).unwrap();
        assert!(repo.get_item(task).unwrap().is_none());
        assert!(matches!(
            repo.delete_project(project_id),
            Err(RepoError::NotFound(_))
        ));
    }
}
