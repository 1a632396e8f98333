//! Column model and database operations
//!
//! Columns are ordered within their board by `position`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

/// A column within a board
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Column {
    pub id: Uuid,
    pub board_id: Uuid,
    pub name: String,
    pub position: i64,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateColumn {
    pub name: String,

    /// Slot among the existing columns; appends when absent
    #[serde(default)]
    pub index: Option<usize>,
}

impl Column {
    /// Inserts a column at an already computed position
    pub async fn insert<'e, E>(
        executor: E,
        board_id: Uuid,
        name: &str,
        position: i64,
    ) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Column>(
            r#"
            INSERT INTO columns (board_id, name, position)
            VALUES ($1, $2, $3)
            RETURNING id, board_id, name, position, created_at
            "#,
        )
        .bind(board_id)
        .bind(name)
        .bind(position)
        .fetch_one(executor)
        .await
    }

    /// Finds a column by ID
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Column>(
            "SELECT id, board_id, name, position, created_at FROM columns WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Lists a board's columns in display order
    pub async fn list_by_board<'e, E>(executor: E, board_id: Uuid) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Column>(
            r#"
            SELECT id, board_id, name, position, created_at
            FROM columns
            WHERE board_id = $1
            ORDER BY position, created_at, id
            "#,
        )
        .bind(board_id)
        .fetch_all(executor)
        .await
    }

    /// IDs of every column on a board
    pub async fn ids_by_board<'e, E>(executor: E, board_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar("SELECT id FROM columns WHERE board_id = $1")
            .bind(board_id)
            .fetch_all(executor)
            .await
    }

    /// Locks the given columns in ascending id order
    ///
    /// Returns the IDs that still exist. Rows are locked in the order they
    /// are returned.
    pub async fn lock_ids<'e, E>(executor: E, ids: &[Uuid]) -> Result<Vec<Uuid>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar("SELECT id FROM columns WHERE id = ANY($1) ORDER BY id FOR UPDATE")
            .bind(ids)
            .fetch_all(executor)
            .await
    }

    /// IDs of every column in a project
    pub async fn ids_by_project<'e, E>(executor: E, project_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar(
            r#"
            SELECT c.id
            FROM columns c
            JOIN boards b ON b.id = c.board_id
            WHERE b.project_id = $1
            "#,
        )
        .bind(project_id)
        .fetch_all(executor)
        .await
    }

    /// Moves a column to a new position within its board
    pub async fn set_position<'e, E>(executor: E, id: Uuid, position: i64) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Column>(
            r#"
            UPDATE columns
            SET position = $2
            WHERE id = $1
            RETURNING id, board_id, name, position, created_at
            "#,
        )
        .bind(id)
        .bind(position)
        .fetch_optional(executor)
        .await
    }

    /// Renames a column
    pub async fn rename<'e, E>(executor: E, id: Uuid, name: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Column>(
            r#"
            UPDATE columns
            SET name = $2
            WHERE id = $1
            RETURNING id, board_id, name, position, created_at
            "#,
        )
        .bind(id)
        .bind(name)
        .fetch_optional(executor)
        .await
    }

    /// Deletes a column; its tasks cascade
    pub async fn delete<'e, E>(executor: E, id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM columns WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
