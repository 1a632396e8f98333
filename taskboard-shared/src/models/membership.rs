//! Membership model and database operations
//!
//! A membership row `(project_id, user_id, role)` is the only source of
//! access truth. A user without a row has no access to the project at all.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE project_members (
//!     project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
//!     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
//!     role VARCHAR(16) NOT NULL DEFAULT 'member',
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     PRIMARY KEY (project_id, user_id)
//! );
//! ```
//!
//! # Roles
//!
//! - **owner**: Everything, including deleting the project and granting ownership
//! - **admin**: Manage members and all content
//! - **member**: Read and change boards, columns and tasks
//!
//! # Example
//!
//! ```no_run
//! use taskboard_shared::models::membership::{CreateMembership, Membership, ProjectRole};
//! use sqlx::PgPool;
//! use uuid::Uuid;
//!
//! # async fn example(pool: PgPool, project_id: Uuid, user_id: Uuid) -> Result<(), sqlx::Error> {
//! Membership::create(&pool, CreateMembership {
//!     project_id,
//!     user_id,
//!     role: ProjectRole::Admin,
//! }).await?;
//!
//! if let Some(role) = Membership::get_role(&pool, project_id, user_id).await? {
//!     println!("User role: {}", role.as_str());
//! }
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::UnknownVariant;

/// Role of a user within a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectRole {
    /// Full control, including project deletion
    Owner,

    /// Can manage members and all content
    Admin,

    /// Can read and change content
    Member,
}

impl ProjectRole {
    /// All roles, strongest first
    pub const ALL: [ProjectRole; 3] = [ProjectRole::Owner, ProjectRole::Admin, ProjectRole::Member];

    /// Converts role to its stored string
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectRole::Owner => "owner",
            ProjectRole::Admin => "admin",
            ProjectRole::Member => "member",
        }
    }

    /// Checks if this role ranks at least as high as `required`
    ///
    /// Hierarchy: Owner > Admin > Member
    pub fn has_permission(&self, required: &ProjectRole) -> bool {
        self.permission_level() >= required.permission_level()
    }

    fn permission_level(&self) -> u8 {
        match self {
            ProjectRole::Owner => 3,
            ProjectRole::Admin => 2,
            ProjectRole::Member => 1,
        }
    }
}

impl fmt::Display for ProjectRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectRole {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(ProjectRole::Owner),
            "admin" => Ok(ProjectRole::Admin),
            "member" => Ok(ProjectRole::Member),
            other => Err(UnknownVariant::new("role", other)),
        }
    }
}

impl TryFrom<String> for ProjectRole {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A user's membership in a project
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Membership {
    pub project_id: Uuid,
    pub user_id: Uuid,

    #[sqlx(try_from = "String")]
    pub role: ProjectRole,

    pub created_at: DateTime<Utc>,
}

/// Input for creating a membership
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMembership {
    pub project_id: Uuid,
    pub user_id: Uuid,

    /// Role to assign (defaults to Member)
    #[serde(default = "default_role")]
    pub role: ProjectRole,
}

fn default_role() -> ProjectRole {
    ProjectRole::Member
}

impl Membership {
    /// Adds a user to a project
    ///
    /// # Errors
    ///
    /// Returns an error if the membership already exists (unique violation)
    /// or the project or user does not exist (foreign key violation).
    pub async fn create<'e, E>(executor: E, data: CreateMembership) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Membership>(
            r#"
            INSERT INTO project_members (project_id, user_id, role)
            VALUES ($1, $2, $3)
            RETURNING project_id, user_id, role, created_at
            "#,
        )
        .bind(data.project_id)
        .bind(data.user_id)
        .bind(data.role.as_str())
        .fetch_one(executor)
        .await
    }

    /// Finds a membership by project and user
    pub async fn find<'e, E>(
        executor: E,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Membership>(
            r#"
            SELECT project_id, user_id, role, created_at
            FROM project_members
            WHERE project_id = $1 AND user_id = $2
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }

    /// Gets a user's role in a project, None if not a member
    pub async fn get_role<'e, E>(
        executor: E,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ProjectRole>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let role: Option<String> = sqlx::query_scalar(
            r#"
            SELECT role FROM project_members
            WHERE project_id = $1 AND user_id = $2
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(executor)
        .await?;

        role.map(|r| r.parse::<ProjectRole>())
            .transpose()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))
    }

    /// Changes a user's role, None if the membership does not exist
    pub async fn update_role<'e, E>(
        executor: E,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Membership>(
            r#"
            UPDATE project_members
            SET role = $3
            WHERE project_id = $1 AND user_id = $2
            RETURNING project_id, user_id, role, created_at
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .bind(role.as_str())
        .fetch_optional(executor)
        .await
    }

    /// Removes a user from a project
    pub async fn delete<'e, E>(executor: E, project_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM project_members WHERE project_id = $1 AND user_id = $2")
            .bind(project_id)
            .bind(user_id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists the members of a project, strongest role first
    pub async fn list_by_project<'e, E>(executor: E, project_id: Uuid) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Membership>(
            r#"
            SELECT project_id, user_id, role, created_at
            FROM project_members
            WHERE project_id = $1
            ORDER BY CASE role WHEN 'owner' THEN 0 WHEN 'admin' THEN 1 ELSE 2 END,
                     created_at, user_id
            "#,
        )
        .bind(project_id)
        .fetch_all(executor)
        .await
    }

    /// Counts the owners of a project
    pub async fn count_owners<'e, E>(executor: E, project_id: Uuid) -> Result<i64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM project_members WHERE project_id = $1 AND role = 'owner'",
        )
        .bind(project_id)
        .fetch_one(executor)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_as_str() {
        assert_eq!(ProjectRole::Owner.as_str(), "owner");
        assert_eq!(ProjectRole::Admin.as_str(), "admin");
        assert_eq!(ProjectRole::Member.as_str(), "member");
    }

    #[test]
    fn test_role_parsing_round_trips() {
        for role in ProjectRole::ALL {
            assert_eq!(role.as_str().parse::<ProjectRole>().unwrap(), role);
        }
        assert!("viewer".parse::<ProjectRole>().is_err());
        assert!(ProjectRole::try_from("Owner".to_string()).is_err());
    }

    #[test]
    fn test_role_hierarchy() {
        assert!(ProjectRole::Owner.has_permission(&ProjectRole::Admin));
        assert!(ProjectRole::Admin.has_permission(&ProjectRole::Member));
        assert!(ProjectRole::Admin.has_permission(&ProjectRole::Admin));
        assert!(!ProjectRole::Member.has_permission(&ProjectRole::Admin));
        assert!(!ProjectRole::Admin.has_permission(&ProjectRole::Owner));
    }

    #[test]
    fn test_create_membership_defaults_to_member() {
        let data: CreateMembership = serde_json::from_value(serde_json::json!({
            "project_id": Uuid::nil(),
            "user_id": Uuid::nil(),
        }))
        .unwrap();
        assert_eq!(data.role, ProjectRole::Member);
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&ProjectRole::Admin).unwrap();
        assert_eq!(json, "\"admin\"");
    }
}
