//! Per-project monotonic reference numbering for tracker entities.
//! Projects own a counter; user stories, issues and tasks draw `#N` from it.

pub mod config;
pub mod db;
pub mod hooks;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{RefseqConfig, ReferenceConfig, RetryPolicy, StoreConfig};
pub use db::{open_db, open_db_in_memory, open_db_with, DbError, DbResult};
pub use hooks::reference_hooks::{register_reference_hooks, unregister_reference_hooks};
pub use hooks::{HookError, HookRegistry, HookRegistryError, HookTrigger, LifecycleHook};
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig, LoggingError};
pub use model::entity::{EntityId, EntityKind, EntityRef, ProjectId};
pub use model::event::LifecycleEvent;
pub use model::reference::{NewReference, ReferenceRecord};
pub use repo::entity_repo::{
    EntityRepository, NewWorkItem, ProjectRecord, SqliteEntityRepository, WorkItem,
};
pub use repo::memory_sequence::InMemorySequenceStore;
pub use repo::reference_repo::{ReferenceRepository, SqliteReferenceRepository};
pub use repo::sequence_repo::{
    SequenceError, SequenceResult, SequenceSnapshot, SequenceStore, SqliteSequenceStore,
};
pub use repo::{RepoError, RepoResult};
pub use rusqlite::Connection;
pub use service::reference_service::{
    project_id_from_sequence_name, sequence_name_for, AllocError, AllocResult,
    ReferenceAllocator,
};
pub use service::tracker_service::{
    CreateItemRequest, TrackerError, TrackerResult, TrackerService,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
