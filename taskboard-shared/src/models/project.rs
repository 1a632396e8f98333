//! Project model and database operations
//!
//! A project is the root of the hierarchy and the unit of access control.
//! `owner_id` records who created the project; it is informational only and
//! never consulted for authorization.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE projects (
//!     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
//!     name VARCHAR(255) NOT NULL,
//!     owner_id UUID REFERENCES users(id) ON DELETE SET NULL,
//!     color VARCHAR(32),
//!     icon VARCHAR(64),
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

/// A project
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: Uuid,
    pub name: String,

    /// Creator, kept for display
    pub owner_id: Option<Uuid>,

    pub color: Option<String>,
    pub icon: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProject {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

impl Project {
    /// Inserts a project
    ///
    /// The caller is responsible for adding the owner membership in the same
    /// transaction.
    pub async fn create<'e, E>(
        executor: E,
        owner_id: Uuid,
        data: &CreateProject,
    ) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Project>(
            r#"
            INSERT INTO projects (name, owner_id, color, icon)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, owner_id, color, icon, created_at, updated_at
            "#,
        )
        .bind(&data.name)
        .bind(owner_id)
        .bind(&data.color)
        .bind(&data.icon)
        .fetch_one(executor)
        .await
    }

    /// Finds a project by ID
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Project>(
            r#"
            SELECT id, name, owner_id, color, icon, created_at, updated_at
            FROM projects
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Locks the project row for the rest of the transaction
    ///
    /// Returns false if the project does not exist.
    pub async fn lock<'e, E>(executor: E, id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let locked: Option<Uuid> = sqlx::query_scalar("SELECT id FROM projects WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(executor)
            .await?;

        Ok(locked.is_some())
    }

    /// Lists the projects a user is a member of, by name
    pub async fn list_for_user<'e, E>(executor: E, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Project>(
            r#"
            SELECT p.id, p.name, p.owner_id, p.color, p.icon, p.created_at, p.updated_at
            FROM projects p
            JOIN project_members m ON m.project_id = p.id
            WHERE m.user_id = $1
            ORDER BY p.name, p.id
            "#,
        )
        .bind(user_id)
        .fetch_all(executor)
        .await
    }

    /// Deletes a project; boards, columns, tasks and memberships cascade
    pub async fn delete<'e, E>(executor: E, id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
