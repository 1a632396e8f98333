//! Task model and database operations
//!
//! Tasks are ordered within their column by `position` and may be nested
//! through `parent_task_id`. Subtasks are ordinary tasks: they live in a
//! column of the same project and are deleted with their parent.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE tasks (
//!     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
//!     column_id UUID NOT NULL REFERENCES columns(id) ON DELETE CASCADE,
//!     parent_task_id UUID REFERENCES tasks(id) ON DELETE CASCADE,
//!     title VARCHAR(500) NOT NULL,
//!     description TEXT NOT NULL DEFAULT '',
//!     priority VARCHAR(16) NOT NULL DEFAULT 'medium',
//!     status VARCHAR(64) NOT NULL DEFAULT 'todo',
//!     assignee_id UUID REFERENCES users(id) ON DELETE SET NULL,
//!     position BIGINT NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     CONSTRAINT tasks_column_position_key UNIQUE (column_id, position)
//!         DEFERRABLE INITIALLY IMMEDIATE
//! );
//! ```
//!
//! # Updates
//!
//! [`TaskPatch`] is the only way to change task content. It has no column or
//! position fields and rejects them when deserialized, so a task can only be
//! relocated through a move.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::PgExecutor;
use std::str::FromStr;
use uuid::Uuid;

use super::UnknownVariant;

/// Upper bound on the parent chain walked by ancestor queries
const MAX_ANCESTOR_DEPTH: i32 = 10_000;

const TASK_COLUMNS: &str = "id, column_id, parent_task_id, title, description, priority, status, \
                            assignee_id, position, created_at, updated_at";

/// Task priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::Urgent => "urgent",
        }
    }
}

impl FromStr for TaskPriority {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(TaskPriority::Low),
            "medium" => Ok(TaskPriority::Medium),
            "high" => Ok(TaskPriority::High),
            "urgent" => Ok(TaskPriority::Urgent),
            other => Err(UnknownVariant::new("priority", other)),
        }
    }
}

impl TryFrom<String> for TaskPriority {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A task within a column
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    pub id: Uuid,
    pub column_id: Uuid,

    /// Parent task when this is a subtask
    pub parent_task_id: Option<Uuid>,

    pub title: String,
    pub description: String,

    #[sqlx(try_from = "String")]
    pub priority: TaskPriority,

    /// Free-form workflow status
    pub status: String,

    pub assignee_id: Option<Uuid>,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTask {
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub priority: TaskPriority,

    /// Initial status (defaults to "todo")
    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub assignee_id: Option<Uuid>,

    /// Makes the new task a subtask of an existing task
    #[serde(default)]
    pub parent_task_id: Option<Uuid>,

    /// Slot among the column's tasks; appends when absent
    #[serde(default)]
    pub index: Option<usize>,
}

impl CreateTask {
    /// Minimal input with defaults for everything but the title
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            priority: TaskPriority::default(),
            status: None,
            assignee_id: None,
            parent_task_id: None,
            index: None,
        }
    }
}

/// Partial update of task content
///
/// Absent fields are left unchanged. For `assignee_id` and `parent_task_id`,
/// an explicit `null` clears the value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskPatch {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub priority: Option<TaskPriority>,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default, deserialize_with = "present")]
    pub assignee_id: Option<Option<Uuid>>,

    #[serde(default, deserialize_with = "present")]
    pub parent_task_id: Option<Option<Uuid>>,
}

impl TaskPatch {
    /// True when no content field is set, ignoring `parent_task_id`
    pub fn has_content_changes(&self) -> bool {
        self.title.is_some()
            || self.description.is_some()
            || self.priority.is_some()
            || self.status.is_some()
            || self.assignee_id.is_some()
    }
}

/// Maps a present field (even `null`) to `Some`
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl Task {
    /// Inserts a task at an already computed position
    pub async fn insert<'e, E>(
        executor: E,
        column_id: Uuid,
        data: &CreateTask,
        position: i64,
    ) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            r#"
            INSERT INTO tasks (column_id, parent_task_id, title, description, priority,
                               status, assignee_id, position)
            VALUES ($1, $2, $3, $4, $5, COALESCE($6, 'todo'), $7, $8)
            RETURNING {}
            "#,
            TASK_COLUMNS
        );

        sqlx::query_as::<_, Task>(&query)
            .bind(column_id)
            .bind(data.parent_task_id)
            .bind(&data.title)
            .bind(&data.description)
            .bind(data.priority.as_str())
            .bind(&data.status)
            .bind(data.assignee_id)
            .bind(position)
            .fetch_one(executor)
            .await
    }

    /// Finds a task by ID
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("SELECT {} FROM tasks WHERE id = $1", TASK_COLUMNS);

        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Finds a task and locks its row for the rest of the transaction
    pub async fn find_for_update<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("SELECT {} FROM tasks WHERE id = $1 FOR UPDATE", TASK_COLUMNS);

        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Lists a column's tasks in display order
    pub async fn list_by_column<'e, E>(executor: E, column_id: Uuid) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {} FROM tasks WHERE column_id = $1 ORDER BY position, created_at, id",
            TASK_COLUMNS
        );

        sqlx::query_as::<_, Task>(&query)
            .bind(column_id)
            .fetch_all(executor)
            .await
    }

    /// Lists the direct subtasks of a task
    pub async fn list_subtasks<'e, E>(executor: E, parent_id: Uuid) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {} FROM tasks WHERE parent_task_id = $1 ORDER BY position, created_at, id",
            TASK_COLUMNS
        );

        sqlx::query_as::<_, Task>(&query)
            .bind(parent_id)
            .fetch_all(executor)
            .await
    }

    /// Places a task in a column at a position
    pub async fn relocate<'e, E>(
        executor: E,
        id: Uuid,
        column_id: Uuid,
        position: i64,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            r#"
            UPDATE tasks
            SET column_id = $2, position = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            TASK_COLUMNS
        );

        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .bind(column_id)
            .bind(position)
            .fetch_optional(executor)
            .await
    }

    /// Applies the content fields of a patch
    ///
    /// `parent_task_id` is ignored here; see [`Task::set_parent`].
    pub async fn update_content<'e, E>(
        executor: E,
        id: Uuid,
        patch: &TaskPatch,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        // Build dynamic update query based on which fields are present
        let mut query = String::from("UPDATE tasks SET updated_at = NOW()");
        let mut bind_count = 1;

        if patch.title.is_some() {
            bind_count += 1;
            query.push_str(&format!(", title = ${}", bind_count));
        }
        if patch.description.is_some() {
            bind_count += 1;
            query.push_str(&format!(", description = ${}", bind_count));
        }
        if patch.priority.is_some() {
            bind_count += 1;
            query.push_str(&format!(", priority = ${}", bind_count));
        }
        if patch.status.is_some() {
            bind_count += 1;
            query.push_str(&format!(", status = ${}", bind_count));
        }
        if patch.assignee_id.is_some() {
            bind_count += 1;
            query.push_str(&format!(", assignee_id = ${}", bind_count));
        }

        query.push_str(&format!(" WHERE id = $1 RETURNING {}", TASK_COLUMNS));

        let mut q = sqlx::query_as::<_, Task>(&query).bind(id);

        if let Some(title) = &patch.title {
            q = q.bind(title.clone());
        }
        if let Some(description) = &patch.description {
            q = q.bind(description.clone());
        }
        if let Some(priority) = patch.priority {
            q = q.bind(priority.as_str());
        }
        if let Some(status) = &patch.status {
            q = q.bind(status.clone());
        }
        if let Some(assignee_id) = patch.assignee_id {
            q = q.bind(assignee_id);
        }

        q.fetch_optional(executor).await
    }

    /// Sets or clears the parent task
    ///
    /// Performs no cycle check; callers validate the chain first.
    pub async fn set_parent<'e, E>(
        executor: E,
        id: Uuid,
        parent_id: Option<Uuid>,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE tasks SET parent_task_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(parent_id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Returns `id` followed by its ancestors, nearest first
    pub async fn ancestor_chain<'e, E>(executor: E, id: Uuid) -> Result<Vec<Uuid>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar(
            r#"
            WITH RECURSIVE chain AS (
                SELECT id, parent_task_id, 0 AS depth
                FROM tasks
                WHERE id = $1
                UNION ALL
                SELECT t.id, t.parent_task_id, c.depth + 1
                FROM tasks t
                JOIN chain c ON t.id = c.parent_task_id
                WHERE c.depth < $2
            )
            SELECT id FROM chain ORDER BY depth
            "#,
        )
        .bind(id)
        .bind(MAX_ANCESTOR_DEPTH)
        .fetch_all(executor)
        .await
    }

    /// Counts a task and all of its transitive subtasks
    pub async fn count_subtree<'e, E>(executor: E, id: Uuid) -> Result<i64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar(
            r#"
            WITH RECURSIVE doomed AS (
                SELECT id FROM tasks WHERE id = $1
                UNION
                SELECT t.id FROM tasks t JOIN doomed d ON t.parent_task_id = d.id
            )
            SELECT COUNT(*) FROM doomed
            "#,
        )
        .bind(id)
        .fetch_one(executor)
        .await
    }

    /// Counts the tasks of the given columns plus all of their subtasks
    ///
    /// Subtasks living in other columns are included because they cascade
    /// with their parent.
    pub async fn count_in_columns<'e, E>(executor: E, column_ids: &[Uuid]) -> Result<i64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar(
            r#"
            WITH RECURSIVE doomed AS (
                SELECT id FROM tasks WHERE column_id = ANY($1)
                UNION
                SELECT t.id FROM tasks t JOIN doomed d ON t.parent_task_id = d.id
            )
            SELECT COUNT(*) FROM doomed
            "#,
        )
        .bind(column_ids)
        .fetch_one(executor)
        .await
    }

    /// Deletes a task; subtasks cascade
    pub async fn delete<'e, E>(executor: E, id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_parsing() {
        assert_eq!("urgent".parse::<TaskPriority>().unwrap(), TaskPriority::Urgent);
        assert_eq!(TaskPriority::default(), TaskPriority::Medium);
        assert!("critical".parse::<TaskPriority>().is_err());
    }

    #[test]
    fn test_create_task_defaults() {
        let data: CreateTask = serde_json::from_str(r#"{"title":"Write docs"}"#).unwrap();
        assert_eq!(data.priority, TaskPriority::Medium);
        assert_eq!(data.description, "");
        assert!(data.status.is_none());
        assert!(data.index.is_none());
        assert!(data.parent_task_id.is_none());
    }

    #[test]
    fn test_patch_rejects_position_fields() {
        let result: Result<TaskPatch, _> = serde_json::from_str(r#"{"position": 5}"#);
        assert!(result.is_err());

        let result: Result<TaskPatch, _> =
            serde_json::from_str(r#"{"column_id": "00000000-0000-0000-0000-000000000000"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_patch_distinguishes_null_from_absent() {
        let patch: TaskPatch = serde_json::from_str(r#"{"title":"New"}"#).unwrap();
        assert_eq!(patch.title.as_deref(), Some("New"));
        assert_eq!(patch.assignee_id, None);
        assert_eq!(patch.parent_task_id, None);

        let patch: TaskPatch = serde_json::from_str(r#"{"assignee_id":null}"#).unwrap();
        assert_eq!(patch.assignee_id, Some(None));
        assert!(patch.has_content_changes());

        let id = Uuid::new_v4();
        let patch: TaskPatch =
            serde_json::from_value(serde_json::json!({ "parent_task_id": id })).unwrap();
        assert_eq!(patch.parent_task_id, Some(Some(id)));
        assert!(!patch.has_content_changes());
    }

    #[test]
    fn test_patch_rejects_unknown_priority() {
        let result: Result<TaskPatch, _> = serde_json::from_str(r#"{"priority":"blocker"}"#);
        assert!(result.is_err());
    }
}
