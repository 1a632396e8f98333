//! Board model and database operations
//!
//! Boards are ordered within their project by `position`. Keys are sparse;
//! only their relative order is meaningful.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE boards (
//!     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
//!     project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
//!     name VARCHAR(255) NOT NULL,
//!     position BIGINT NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     CONSTRAINT boards_project_position_key UNIQUE (project_id, position)
//!         DEFERRABLE INITIALLY IMMEDIATE
//! );
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

/// A board within a project
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Board {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a board
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBoard {
    pub name: String,

    /// Slot among the existing boards; appends when absent
    #[serde(default)]
    pub index: Option<usize>,
}

impl Board {
    /// Inserts a board at an already computed position
    pub async fn insert<'e, E>(
        executor: E,
        project_id: Uuid,
        name: &str,
        position: i64,
    ) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Board>(
            r#"
            INSERT INTO boards (project_id, name, position)
            VALUES ($1, $2, $3)
            RETURNING id, project_id, name, position, created_at, updated_at
            "#,
        )
        .bind(project_id)
        .bind(name)
        .bind(position)
        .fetch_one(executor)
        .await
    }

    /// Finds a board by ID
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Board>(
            r#"
            SELECT id, project_id, name, position, created_at, updated_at
            FROM boards
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Lists a project's boards in display order
    pub async fn list_by_project<'e, E>(executor: E, project_id: Uuid) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Board>(
            r#"
            SELECT id, project_id, name, position, created_at, updated_at
            FROM boards
            WHERE project_id = $1
            ORDER BY position, created_at, id
            "#,
        )
        .bind(project_id)
        .fetch_all(executor)
        .await
    }

    /// Locks every board of a project in ascending id order
    pub async fn lock_by_project<'e, E>(executor: E, project_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar("SELECT id FROM boards WHERE project_id = $1 ORDER BY id FOR UPDATE")
            .bind(project_id)
            .fetch_all(executor)
            .await
    }

    /// Moves a board to a new position within its project
    pub async fn set_position<'e, E>(executor: E, id: Uuid, position: i64) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Board>(
            r#"
            UPDATE boards
            SET position = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, project_id, name, position, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(position)
        .fetch_optional(executor)
        .await
    }

    /// Renames a board
    pub async fn rename<'e, E>(executor: E, id: Uuid, name: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Board>(
            r#"
            UPDATE boards
            SET name = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, project_id, name, position, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(name)
        .fetch_optional(executor)
        .await
    }

    /// Deletes a board; columns and tasks cascade
    pub async fn delete<'e, E>(executor: E, id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM boards WHERE id = $1")
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
    fn test_create_board_index_is_optional() {
        let data: CreateBoard = serde_json::from_str(r#"{"name":"Sprint"}"#).unwrap();
        assert_eq!(data.index, None);

        let data: CreateBoard = serde_json::from_str(r#"{"name":"Sprint","index":0}"#).unwrap();
        assert_eq!(data.index, Some(0));
    }
}
