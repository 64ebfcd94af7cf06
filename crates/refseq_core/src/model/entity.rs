//! Trackable entity identities.
//!
//! # Responsibility
//! - Name the entity kinds that may hold a reference number.
//! - Resolve each kind to its storage table through a static lookup.
//!
//! # Invariants
//! - Serialized tags are `project|userstory|issue|task` and never change.
//! - Only work items (stories, issues, tasks) receive allocated numbers.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Numeric project identifier.
pub type ProjectId = i64;

/// Numeric entity identifier, unique within its kind.
pub type EntityId = i64;

/// Closed set of entity kinds known to the reference subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Project,
    UserStory,
    Issue,
    Task,
}

struct KindEntry {
    kind: EntityKind,
    tag: &'static str,
    table: &'static str,
}

const KIND_TABLE: &[KindEntry] = &[
    KindEntry {
        kind: EntityKind::Project,
        tag: "project",
        table: "projects",
    },
    KindEntry {
        kind: EntityKind::UserStory,
        tag: "userstory",
        table: "userstories",
    },
    KindEntry {
        kind: EntityKind::Issue,
        tag: "issue",
        table: "issues",
    },
    KindEntry {
        kind: EntityKind::Task,
        tag: "task",
        table: "tasks",
    },
];

impl EntityKind {
    /// Kinds that receive a reference number when created.
    pub const WORK_ITEMS: [EntityKind; 3] = [Self::UserStory, Self::Issue, Self::Task];

    fn entry(self) -> &'static KindEntry {
        // KIND_TABLE lists every variant in declaration order.
        &KIND_TABLE[self as usize]
    }

    /// Stable storage/wire tag.
    pub fn as_str(self) -> &'static str {
        self.entry().tag
    }

    /// Host table holding entities of this kind.
    pub fn table_name(self) -> &'static str {
        self.entry().table
    }

    /// Whether entities of this kind carry a `ref` column.
    pub fn is_work_item(self) -> bool {
        self != Self::Project
    }

    /// Parses a storage tag.
    pub fn parse(value: &str) -> Option<Self> {
        KIND_TABLE
            .iter()
            .find(|entry| entry.tag == value)
            .map(|entry| entry.kind)
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value.trim()).ok_or_else(|| {
            format!("unknown entity kind `{value}`; expected project|userstory|issue|task")
        })
    }
}

/// Typed pointer to one entity instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: EntityId,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: EntityId) -> Self {
        Self { kind, id }
    }

    pub fn project(id: ProjectId) -> Self {
        Self::new(EntityKind::Project, id)
    }
}

impl Display for EntityRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
