//! Tracker host: persists projects and work items and fires lifecycle hooks.
//!
//! # Responsibility
//! - Own the write transaction around each entity insert/delete.
//! - Dispatch lifecycle events inside that transaction.
//! - Refuse to commit a work item that should have a reference but has none.
//!
//! # Invariants
//! - Each write uses one `IMMEDIATE` transaction; hook failures roll back the
//!   entity together with any sequence or reference changes.
//! - Imported work items keep their pre-set `ref` and trigger no allocation.

use crate::config::ReferenceConfig;
use crate::db::DbError;
use crate::hooks::reference_hooks::register_reference_hooks;
use crate::hooks::{HookError, HookRegistry, HookRegistryError};
use crate::model::entity::{EntityKind, EntityRef, ProjectId};
use crate::model::event::LifecycleEvent;
use crate::model::reference::ReferenceRecord;
use crate::repo::entity_repo::{
    EntityRepository, NewWorkItem, ProjectRecord, SqliteEntityRepository, WorkItem,
};
use crate::repo::reference_repo::{ReferenceRepository, SqliteReferenceRepository};
use crate::repo::sequence_repo::SqliteSequenceStore;
use crate::repo::RepoError;
use crate::service::reference_service::{AllocError, ReferenceAllocator};
use log::{error, info};
use rusqlite::{Connection, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub type TrackerResult<T> = Result<T, TrackerError>;

/// Tracker use-case errors.
#[derive(Debug)]
pub enum TrackerError {
    /// Input rejected before touching storage.
    InvalidInput(String),
    ProjectNotFound(ProjectId),
    /// Import paths must supply a positive `ref`.
    MissingImportedRef(EntityKind),
    /// Write and read-back disagree.
    InconsistentState(&'static str),
    Hook(HookError),
    Alloc(AllocError),
    Repo(RepoError),
    Db(DbError),
}

impl TrackerError {
    /// Whether the failure came from a locked or unreachable store.
    pub fn is_store_unavailable(&self) -> bool {
        match self {
            Self::Hook(HookError::Alloc(AllocError::StoreUnavailable { .. }))
            | Self::Alloc(AllocError::StoreUnavailable { .. }) => true,
            Self::Repo(err) => err.is_busy(),
            Self::Db(err) => err.is_busy(),
            _ => false,
        }
    }
}

impl Display for TrackerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::ProjectNotFound(id) => write!(f, "project not found: {id}"),
            Self::MissingImportedRef(kind) => {
                write!(f, "imported {kind} requires a positive pre-set ref")
            }
            Self::InconsistentState(details) => write!(f, "inconsistent tracker state: {details}"),
            Self::Hook(err) => write!(f, "{err}"),
            Self::Alloc(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TrackerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Hook(err) => Some(err),
            Self::Alloc(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<HookError> for TrackerError {
    fn from(value: HookError) -> Self {
        Self::Hook(value)
    }
}

impl From<AllocError> for TrackerError {
    fn from(value: AllocError) -> Self {
        Self::Alloc(value)
    }
}

impl From<RepoError> for TrackerError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<rusqlite::Error> for TrackerError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Request model for creating one work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateItemRequest {
    pub kind: EntityKind,
    pub project_id: ProjectId,
    pub subject: String,
    /// `Some` marks a bulk-import creation carrying its own number.
    pub imported_ref: Option<i64>,
}

impl CreateItemRequest {
    pub fn new(kind: EntityKind, project_id: ProjectId, subject: impl Into<String>) -> Self {
        Self {
            kind,
            project_id,
            subject: subject.into(),
            imported_ref: None,
        }
    }

    pub fn imported(mut self, reference: i64) -> Self {
        self.imported_ref = Some(reference);
        self
    }
}

/// Entity persistence host over one SQLite connection.
pub struct TrackerService<'conn> {
    conn: &'conn mut Connection,
    hooks: Arc<HookRegistry>,
    config: ReferenceConfig,
}

impl<'conn> TrackerService<'conn> {
    pub fn new(
        conn: &'conn mut Connection,
        hooks: Arc<HookRegistry>,
        config: ReferenceConfig,
    ) -> Self {
        Self {
            conn,
            hooks,
            config,
        }
    }

    /// Builds a service with a private registry holding the reference hooks.
    pub fn with_reference_hooks(
        conn: &'conn mut Connection,
        config: ReferenceConfig,
    ) -> Result<Self, HookRegistryError> {
        let mut registry = HookRegistry::new();
        register_reference_hooks(&mut registry, &config)?;
        Ok(Self::new(conn, Arc::new(registry), config))
    }

    /// Persists a project and fires its creation hooks.
    pub fn create_project(&mut self, name: &str) -> TrackerResult<ProjectRecord> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TrackerError::InvalidInput(
                "project name cannot be empty".to_string(),
            ));
        }

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let repo = SqliteEntityRepository::new(&tx);
        let project_id = repo.insert_project(name)?;
        self.hooks
            .dispatch(&tx, &LifecycleEvent::project_created(project_id))?;
        let project = repo
            .get_project(project_id)?
            .ok_or(TrackerError::InconsistentState(
                "created project not found in read-back",
            ))?;
        tx.commit()?;

        info!(
            "event=project_create module=tracker status=ok project_id={}",
            project.id
        );
        Ok(project)
    }

    /// Removes a project, its work items, and (through hooks) its sequence.
    pub fn delete_project(&mut self, project_id: ProjectId) -> TrackerResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        SqliteEntityRepository::new(&tx)
            .delete_project(project_id)
            .map_err(|err| match err {
                RepoError::NotFound(_) => TrackerError::ProjectNotFound(project_id),
                other => other.into(),
            })?;
        self.hooks
            .dispatch(&tx, &LifecycleEvent::project_deleted(project_id))?;
        tx.commit()?;

        info!(
            "event=project_delete module=tracker status=ok project_id={}",
            project_id
        );
        Ok(())
    }

    /// Persists a work item and fires its creation hooks.
    ///
    /// # Errors
    /// - `MissingImportedRef` for imports without a positive `ref`.
    /// - `Hook` when reference assignment fails; nothing is persisted.
    /// - `InconsistentState` when no reference ended up on the item.
    pub fn create_item(&mut self, request: &CreateItemRequest) -> TrackerResult<WorkItem> {
        if !request.kind.is_work_item() {
            return Err(TrackerError::InvalidInput(format!(
                "`{}` is not a work item kind",
                request.kind
            )));
        }
        let subject = request.subject.trim();
        if subject.is_empty() {
            return Err(TrackerError::InvalidInput(
                "work item subject cannot be empty".to_string(),
            ));
        }
        if matches!(request.imported_ref, Some(value) if value <= 0) {
            return Err(TrackerError::MissingImportedRef(request.kind));
        }
        let importing = request.imported_ref.is_some();

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let repo = SqliteEntityRepository::new(&tx);
        if repo.get_project(request.project_id)?.is_none() {
            return Err(TrackerError::ProjectNotFound(request.project_id));
        }

        let entity = repo.insert_item(&NewWorkItem {
            kind: request.kind,
            project_id: request.project_id,
            subject: subject.to_string(),
            reference: request.imported_ref,
        })?;
        self.hooks.dispatch(
            &tx,
            &LifecycleEvent::Created {
                entity,
                project_id: request.project_id,
                importing,
            },
        )?;

        let item = repo
            .get_item(entity)?
            .ok_or(TrackerError::InconsistentState(
                "created work item not found in read-back",
            ))?;
        if !matches!(item.reference, Some(value) if value > 0) {
            error!(
                "event=item_create module=tracker status=error error_code=reference_missing entity={} project_id={}",
                entity, request.project_id
            );
            return Err(TrackerError::InconsistentState(
                "work item created without a reference",
            ));
        }
        tx.commit()?;

        info!(
            "event=item_create module=tracker status=ok entity={} project_id={} ref={} importing={}",
            entity,
            request.project_id,
            item.reference.unwrap_or_default(),
            importing
        );
        Ok(item)
    }

    /// Advances the project's sequence past every number already in use.
    ///
    /// Returns the sequence value after advancing.
    pub fn finish_import(&mut self, project_id: ProjectId) -> TrackerResult<i64> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let entities = SqliteEntityRepository::new(&tx);
        if entities.get_project(project_id)?.is_none() {
            return Err(TrackerError::ProjectNotFound(project_id));
        }

        let references = SqliteReferenceRepository::new(&tx);
        let floor = entities
            .max_item_ref(project_id)?
            .max(references.max_ref(project_id)?)
            .unwrap_or(0);
        let allocator = ReferenceAllocator::new(
            SqliteSequenceStore::new(&tx),
            references,
            self.config.clone(),
        );
        let value = allocator.advance_past(project_id, floor)?;
        tx.commit()?;

        info!(
            "event=import_finish module=tracker status=ok project_id={} value={}",
            project_id, value
        );
        Ok(value)
    }

    pub fn get_project(&self, project_id: ProjectId) -> TrackerResult<Option<ProjectRecord>> {
        Ok(SqliteEntityRepository::new(&*self.conn).get_project(project_id)?)
    }

    pub fn get_item(&self, entity: EntityRef) -> TrackerResult<Option<WorkItem>> {
        Ok(SqliteEntityRepository::new(&*self.conn).get_item(entity)?)
    }

    /// Lists a project's work items ordered by `ref`.
    pub fn list_items(&self, project_id: ProjectId) -> TrackerResult<Vec<WorkItem>> {
        Ok(SqliteEntityRepository::new(&*self.conn).list_items(project_id)?)
    }

    /// Lists a project's reference records in creation order.
    pub fn references(&self, project_id: ProjectId) -> TrackerResult<Vec<ReferenceRecord>> {
        Ok(SqliteReferenceRepository::new(&*self.conn).list_for_project(project_id)?)
    }

    /// Resolves a project-scoped number to its reference record.
    pub fn resolve(
        &self,
        project_id: ProjectId,
        reference: i64,
    ) -> TrackerResult<Option<ReferenceRecord>> {
        Ok(SqliteReferenceRepository::new(&*self.conn).get_by_ref(project_id, reference)?)
    }

    /// Reference record held by one entity, if any.
    pub fn reference_of(&self, entity: EntityRef) -> TrackerResult<Option<ReferenceRecord>> {
        Ok(SqliteReferenceRepository::new(&*self.conn).find_for_entity(entity)?)
    }
}

#[cfg(test)]
mod tests {
    use super::{CreateItemRequest, TrackerError, TrackerService};
    use crate::config::ReferenceConfig;
    use crate::db::open_db_in_memory;
    use crate::hooks::{HookError, HookRegistry};
    use crate::model::entity::{EntityKind, EntityRef};
    use crate::service::reference_service::AllocError;
    use std::sync::Arc;

    #[test]
    fn items_get_consecutive_numbers_across_kinds() {
        let mut conn = open_db_in_memory().expect("in-memory db");
        let mut tracker =
            TrackerService::with_reference_hooks(&mut conn, ReferenceConfig::default()).unwrap();
        let project = tracker.create_project("alpha").unwrap();

        let story = tracker
            .create_item(&CreateItemRequest::new(EntityKind::UserStory, project.id, "s"))
            .unwrap();
        let task = tracker
            .create_item(&CreateItemRequest::new(EntityKind::Task, project.id, "t"))
            .unwrap();
        assert_eq!(story.reference, Some(1));
        assert_eq!(task.reference, Some(2));
        assert_eq!(tracker.references(project.id).unwrap().len(), 2);
    }

    #[test]
    fn imports_must_carry_a_positive_ref() {
        let mut conn = open_db_in_memory().expect("in-memory db");
        let mut tracker =
            TrackerService::with_reference_hooks(&mut conn, ReferenceConfig::default()).unwrap();
        let project = tracker.create_project("alpha").unwrap();

        let err = tracker
            .create_item(&CreateItemRequest::new(EntityKind::Issue, project.id, "i").imported(0))
            .expect_err("zero is not a valid imported ref");
        assert!(matches!(err, TrackerError::MissingImportedRef(EntityKind::Issue)));
    }

    #[test]
    fn items_without_hooks_are_rolled_back() {
        let mut conn = open_db_in_memory().expect("in-memory db");
        let mut tracker = TrackerService::new(
            &mut conn,
            Arc::new(HookRegistry::new()),
            ReferenceConfig::default(),
        );
        let project = tracker.create_project("alpha").unwrap();

        let err = tracker
            .create_item(&CreateItemRequest::new(EntityKind::Task, project.id, "t"))
            .expect_err("nothing assigned a ref");
        assert!(matches!(err, TrackerError::InconsistentState(_)));
        assert!(tracker.list_items(project.id).unwrap().is_empty());
    }

    #[test]
    fn items_of_a_project_without_sequence_fail_by_default() {
        let mut conn = open_db_in_memory().expect("in-memory db");
        conn.execute("INSERT INTO projects (name) VALUES ('legacy');", [])
            .unwrap();
        let project_id = conn.last_insert_rowid();
        let mut tracker =
            TrackerService::with_reference_hooks(&mut conn, ReferenceConfig::default()).unwrap();

        let err = tracker
            .create_item(&CreateItemRequest::new(EntityKind::Task, project_id, "t"))
            .expect_err("sequence was never created");
        assert!(matches!(
            err,
            TrackerError::Hook(HookError::Alloc(AllocError::SequenceMissing(_)))
        ));
        assert!(tracker.list_items(project_id).unwrap().is_empty());
    }

    #[test]
    fn lazy_creation_provisions_a_missing_sequence() {
        let mut conn = open_db_in_memory().expect("in-memory db");
        conn.execute("INSERT INTO projects (name) VALUES ('legacy');", [])
            .unwrap();
        let project_id = conn.last_insert_rowid();
        let config = ReferenceConfig {
            lazy_sequence_creation: true,
            ..ReferenceConfig::default()
        };
        let mut tracker = TrackerService::with_reference_hooks(&mut conn, config).unwrap();

        let task = tracker
            .create_item(&CreateItemRequest::new(EntityKind::Task, project_id, "t"))
            .unwrap();
        assert_eq!(task.reference, Some(1));
    }

    #[test]
    fn created_items_can_be_looked_up_by_entity() {
        let mut conn = open_db_in_memory().expect("in-memory db");
        let mut tracker =
            TrackerService::with_reference_hooks(&mut conn, ReferenceConfig::default()).unwrap();
        let project = tracker.create_project("Gemini").unwrap();
        tracker
            .create_item(&CreateItemRequest::new(EntityKind::Task, project.id, "a"))
            .unwrap();
        let issue = tracker
            .create_item(&CreateItemRequest::new(EntityKind::Issue, project.id, "b"))
            .unwrap();

        let record = tracker
            .reference_of(issue.entity)
            .unwrap()
            .expect("issue has a record");
        assert_eq!(record.reference, 2);
        assert_eq!(record.project_id, project.id);
        assert_eq!(
            tracker.resolve(project.id, 2).unwrap().map(|r| r.entity()),
            Some(issue.entity)
        );
        assert!(tracker
            .reference_of(EntityRef::new(EntityKind::UserStory, issue.entity.id))
            .unwrap()
            .is_none());
    }

    #[test]
    fn unknown_projects_are_rejected() {
        let mut conn = open_db_in_memory().expect("in-memory db");
        let mut tracker =
            TrackerService::with_reference_hooks(&mut conn, ReferenceConfig::default()).unwrap();
        assert!(matches!(
            tracker.create_item(&CreateItemRequest::new(EntityKind::Task, 404, "t")),
            Err(TrackerError::ProjectNotFound(404))
        ));
        assert!(matches!(
            tracker.delete_project(404),
            Err(TrackerError::ProjectNotFound(404))
        ));
        assert!(matches!(
            tracker.finish_import(404),
            Err(TrackerError::ProjectNotFound(404))
        ));
    }
}
