//! Persisted reference record.
//!
//! # Invariants
//! - `(project_id, reference)` is unique across all records.
//! - Records are never updated after insertion.

use crate::model::entity::{EntityId, EntityKind, EntityRef, ProjectId};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Binding of one allocated number to the entity that consumed it.
///
/// Serialized with the field name `ref` for inspection tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    pub project_id: ProjectId,
    pub entity_type: EntityKind,
    pub entity_id: EntityId,
    #[serde(rename = "ref")]
    pub reference: i64,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

impl ReferenceRecord {
    pub fn entity(&self) -> EntityRef {
        EntityRef::new(self.entity_type, self.entity_id)
    }
}

impl Display for ReferenceRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "reference #{} -> {} (project {})",
            self.reference,
            self.entity(),
            self.project_id
        )
    }
}

/// Insert payload for a new reference record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewReference {
    pub project_id: ProjectId,
    pub entity: EntityRef,
    pub reference: i64,
}
