//! Lifecycle notifications delivered by the entity persistence layer.

use crate::model::entity::{EntityRef, ProjectId};

/// One entity lifecycle transition.
///
/// Every notification carries the entity's kind, its id and its owning
/// project. For projects, `project_id == entity.id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Entity persisted for the first time.
    Created {
        entity: EntityRef,
        project_id: ProjectId,
        /// Set by bulk-import paths that supply `ref` themselves.
        importing: bool,
    },
    /// Entity removed.
    Deleted {
        entity: EntityRef,
        project_id: ProjectId,
    },
}

impl LifecycleEvent {
    pub fn project_created(project_id: ProjectId) -> Self {
        Self::Created {
            entity: EntityRef::project(project_id),
            project_id,
            importing: false,
        }
    }

    pub fn project_deleted(project_id: ProjectId) -> Self {
        Self::Deleted {
            entity: EntityRef::project(project_id),
            project_id,
        }
    }

    pub fn entity(&self) -> EntityRef {
        match self {
            Self::Created { entity, .. } | Self::Deleted { entity, .. } => *entity,
        }
    }

    pub fn project_id(&self) -> ProjectId {
        match self {
            Self::Created { project_id, .. } | Self::Deleted { project_id, .. } => *project_id,
        }
    }

    /// Short name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Deleted { .. } => "deleted",
        }
    }
}
