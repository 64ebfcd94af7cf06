//! Hooks that drive project sequences and reference assignment.
//!
//! Per project: no sequence -> (project created) -> sequence exists ->
//! (project deleted) -> no sequence. Work items created in between get the
//! next number of their project, unless they come from a bulk import.

use crate::config::ReferenceConfig;
use crate::hooks::{
    HookError, HookRegistry, HookRegistryError, HookResult, HookTrigger, LifecycleHook,
};
use crate::model::entity::EntityKind;
use crate::model::event::LifecycleEvent;
use crate::repo::entity_repo::{EntityRepository, SqliteEntityRepository};
use crate::repo::reference_repo::SqliteReferenceRepository;
use crate::repo::sequence_repo::SqliteSequenceStore;
use crate::service::reference_service::ReferenceAllocator;
use log::{debug, info};
use rusqlite::Connection;
use std::sync::Arc;

pub const PROJECT_CREATED_DISPATCH_ID: &str = "refproj";
pub const USERSTORY_CREATED_DISPATCH_ID: &str = "refus";
pub const ISSUE_CREATED_DISPATCH_ID: &str = "refissue";
pub const TASK_CREATED_DISPATCH_ID: &str = "reftask";
pub const PROJECT_DELETED_DISPATCH_ID: &str = "refprojdel";

const REFERENCE_DISPATCH_IDS: [&str; 5] = [
    PROJECT_CREATED_DISPATCH_ID,
    USERSTORY_CREATED_DISPATCH_ID,
    ISSUE_CREATED_DISPATCH_ID,
    TASK_CREATED_DISPATCH_ID,
    PROJECT_DELETED_DISPATCH_ID,
];

type SqliteAllocator<'conn> =
    ReferenceAllocator<SqliteSequenceStore<'conn>, SqliteReferenceRepository<'conn>>;

fn allocator<'conn>(conn: &'conn Connection, config: &ReferenceConfig) -> SqliteAllocator<'conn> {
    ReferenceAllocator::new(
        SqliteSequenceStore::new(conn),
        SqliteReferenceRepository::new(conn),
        config.clone(),
    )
}

/// Creates the project's sequence when a project is first persisted.
#[derive(Debug, Clone)]
pub struct CreateSequenceHook {
    config: ReferenceConfig,
}

impl CreateSequenceHook {
    pub fn new(config: ReferenceConfig) -> Self {
        Self { config }
    }
}

impl LifecycleHook for CreateSequenceHook {
    fn handle(&self, conn: &Connection, event: &LifecycleEvent) -> HookResult<()> {
        let LifecycleEvent::Created { entity, .. } = event else {
            return Err(HookError::UnexpectedEvent(*event));
        };
        if entity.kind != EntityKind::Project {
            return Err(HookError::UnexpectedEvent(*event));
        }

        let created = allocator(conn, &self.config).ensure_sequence(entity.id)?;
        debug!(
            "event=hook_create_sequence module=hooks status=ok project_id={} created={}",
            entity.id, created
        );
        Ok(())
    }
}

/// Assigns a reference to a newly persisted work item and writes it back.
#[derive(Debug, Clone)]
pub struct AttachReferenceHook {
    config: ReferenceConfig,
}

impl AttachReferenceHook {
    pub fn new(config: ReferenceConfig) -> Self {
        Self { config }
    }
}

impl LifecycleHook for AttachReferenceHook {
    fn handle(&self, conn: &Connection, event: &LifecycleEvent) -> HookResult<()> {
        let LifecycleEvent::Created {
            entity,
            project_id,
            importing,
        } = *event
        else {
            return Err(HookError::UnexpectedEvent(*event));
        };
        if !entity.kind.is_work_item() {
            return Err(HookError::UnexpectedEvent(*event));
        }

        if importing {
            debug!(
                "event=hook_attach_reference module=hooks status=skipped reason=importing entity={}",
                entity
            );
            return Ok(());
        }

        let (value, _) = allocator(conn, &self.config).assign_reference(entity, project_id)?;
        SqliteEntityRepository::new(conn).set_ref(entity, value)?;
        Ok(())
    }
}

/// Deletes the project's sequence when the project is removed.
///
/// Reference records of the project are kept.
#[derive(Debug, Clone)]
pub struct DeleteSequenceHook {
    config: ReferenceConfig,
}

impl DeleteSequenceHook {
    pub fn new(config: ReferenceConfig) -> Self {
        Self { config }
    }
}

impl LifecycleHook for DeleteSequenceHook {
    fn handle(&self, conn: &Connection, event: &LifecycleEvent) -> HookResult<()> {
        let LifecycleEvent::Deleted { entity, .. } = event else {
            return Err(HookError::UnexpectedEvent(*event));
        };
        if entity.kind != EntityKind::Project {
            return Err(HookError::UnexpectedEvent(*event));
        }

        let removed = allocator(conn, &self.config).drop_sequence(entity.id)?;
        debug!(
            "event=hook_delete_sequence module=hooks status=ok project_id={} removed={}",
            entity.id, removed
        );
        Ok(())
    }
}

/// Wires the reference hooks into `registry`.
pub fn register_reference_hooks(
    registry: &mut HookRegistry,
    config: &ReferenceConfig,
) -> Result<(), HookRegistryError> {
    let attach: Arc<dyn LifecycleHook> = Arc::new(AttachReferenceHook::new(config.clone()));

    registry.register(
        PROJECT_CREATED_DISPATCH_ID,
        HookTrigger::PostCreate(EntityKind::Project),
        Arc::new(CreateSequenceHook::new(config.clone())),
    )?;
    registry.register(
        USERSTORY_CREATED_DISPATCH_ID,
        HookTrigger::PostCreate(EntityKind::UserStory),
        Arc::clone(&attach),
    )?;
    registry.register(
        ISSUE_CREATED_DISPATCH_ID,
        HookTrigger::PostCreate(EntityKind::Issue),
        Arc::clone(&attach),
    )?;
    registry.register(
        TASK_CREATED_DISPATCH_ID,
        HookTrigger::PostCreate(EntityKind::Task),
        attach,
    )?;
    registry.register(
        PROJECT_DELETED_DISPATCH_ID,
        HookTrigger::PostDelete(EntityKind::Project),
        Arc::new(DeleteSequenceHook::new(config.clone())),
    )?;

    info!("event=hooks_register module=hooks status=ok count=5");
    Ok(())
}

/// Removes the reference hooks and returns how many were registered.
pub fn unregister_reference_hooks(registry: &mut HookRegistry) -> usize {
    let mut removed = 0;
    for dispatch_id in REFERENCE_DISPATCH_IDS {
        if registry.unregister(dispatch_id) {
            removed += 1;
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::{register_reference_hooks, unregister_reference_hooks, REFERENCE_DISPATCH_IDS};
    use crate::config::ReferenceConfig;
    use crate::db::open_db_in_memory;
    use crate::hooks::{HookError, HookRegistry, HookRegistryError};
    use crate::model::entity::{EntityKind, EntityRef};
    use crate::model::event::LifecycleEvent;

    #[test]
    fn registers_all_subscriptions_once() {
        let mut registry = HookRegistry::new();
        let config = ReferenceConfig::default();
        register_reference_hooks(&mut registry, &config).unwrap();
        assert_eq!(registry.dispatch_ids(), REFERENCE_DISPATCH_IDS.to_vec());

        let err = register_reference_hooks(&mut registry, &config).unwrap_err();
        assert!(matches!(err, HookRegistryError::DuplicateDispatchId(_)));

        assert_eq!(unregister_reference_hooks(&mut registry), 5);
        assert!(registry.is_empty());
    }

    #[test]
    fn deleting_a_work_item_triggers_nothing() {
        let conn = open_db_in_memory().expect("in-memory db");
        let mut registry = HookRegistry::new();
        register_reference_hooks(&mut registry, &ReferenceConfig::default()).unwrap();

        let event = LifecycleEvent::Deleted {
            entity: EntityRef::new(EntityKind::Task, 3),
            project_id: 1,
        };
        assert_eq!(registry.dispatch(&conn, &event).unwrap(), 0);
    }

    #[test]
    fn miswired_hook_rejects_foreign_events() {
        use super::CreateSequenceHook;
        use crate::hooks::LifecycleHook;

        let conn = open_db_in_memory().expect("in-memory db");
        let hook = CreateSequenceHook::new(ReferenceConfig::default());
        let err = hook
            .handle(&conn, &LifecycleEvent::project_deleted(1))
            .unwrap_err();
        assert!(matches!(err, HookError::UnexpectedEvent(_)));
    }
}
