//! Database models for Taskboard
//!
//! Each model owns the SQL for its table. Functions take any Postgres
//! executor so they can run against the pool or inside a transaction.
//!
//! # Models
//!
//! - `user`: Registered accounts
//! - `session`: Opaque login sessions
//! - `project`: Root of the hierarchy
//! - `membership`: (project, user, role) rows, the only source of access truth
//! - `board`: Ordered boards of a project
//! - `column`: Ordered columns of a board
//! - `task`: Ordered tasks of a column, optionally nested as subtasks

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub mod board;
pub mod column;
pub mod membership;
pub mod project;
pub mod session;
pub mod task;
pub mod user;

/// A stored enum column held a value this build does not know
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub(crate) fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// Kind of entity addressed by an operation or an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    User,
    Session,
    Project,
    Board,
    Column,
    Task,
}

impl EntityKind {
    /// Lowercase name used in logs and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Session => "session",
            EntityKind::Project => "project",
            EntityKind::Board => "board",
            EntityKind::Column => "column",
            EntityKind::Task => "task",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a node of the project hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum EntityRef {
    Project(Uuid),
    Board(Uuid),
    Column(Uuid),
    Task(Uuid),
}

impl EntityRef {
    /// Entity kind of the reference
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityRef::Project(_) => EntityKind::Project,
            EntityRef::Board(_) => EntityKind::Board,
            EntityRef::Column(_) => EntityKind::Column,
            EntityRef::Task(_) => EntityKind::Task,
        }
    }

    /// Referenced id
    pub fn id(&self) -> Uuid {
        match self {
            EntityRef::Project(id)
            | EntityRef::Board(id)
            | EntityRef::Column(id)
            | EntityRef::Task(id) => *id,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_ref_kind_and_id() {
        let id = Uuid::new_v4();
        assert_eq!(EntityRef::Task(id).kind(), EntityKind::Task);
        assert_eq!(EntityRef::Column(id).id(), id);
        assert_eq!(EntityRef::Board(id).to_string(), format!("board {}", id));
    }

    #[test]
    fn test_unknown_variant_message() {
        let err = UnknownVariant::new("role", "viewer");
        assert_eq!(err.to_string(), "unknown role value: \"viewer\"");
    }

    #[test]
    fn test_entity_ref_serialization() {
        let id = Uuid::nil();
        let json = serde_json::to_value(EntityRef::Project(id)).unwrap();
        assert_eq!(json["type"], "project");
        assert_eq!(json["id"], id.to_string());
    }
}
