//! User model and database operations
//!
//! Users are identities only. What a user may do is decided per project by
//! the `project_members` table, never by anything stored here.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE users (
//!     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
//!     email CITEXT NOT NULL UNIQUE,
//!     display_name VARCHAR(255) NOT NULL,
//!     password_hash VARCHAR(255) NOT NULL,
//!     tier VARCHAR(16) NOT NULL DEFAULT 'default',
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```
//!
//! # Example
//!
//! ```no_run
//! use taskboard_shared::models::user::{CreateUser, User, UserTier};
//! use sqlx::PgPool;
//!
//! # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
//! let user = User::create(&pool, CreateUser {
//!     email: "ada@example.com".to_string(),
//!     display_name: "Ada".to_string(),
//!     password_hash: "$argon2id$...".to_string(),
//!     tier: UserTier::Default,
//! }).await?;
//!
//! let found = User::find_by_email(&pool, "ADA@example.com").await?;
//! assert_eq!(found.map(|u| u.id), Some(user.id));
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use std::str::FromStr;
use uuid::Uuid;

use super::UnknownVariant;

/// Account tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserTier {
    #[default]
    Default,
    Admin,
}

impl UserTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserTier::Default => "default",
            UserTier::Admin => "admin",
        }
    }
}

impl FromStr for UserTier {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(UserTier::Default),
            "admin" => Ok(UserTier::Admin),
            other => Err(UnknownVariant::new("tier", other)),
        }
    }
}

impl TryFrom<String> for UserTier {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A registered account
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,

    /// Unique, compared case-insensitively (CITEXT)
    pub email: String,

    pub display_name: String,

    /// Opaque hash produced by the excluded credential layer
    #[serde(skip_serializing)]
    pub password_hash: String,

    #[sqlx(try_from = "String")]
    pub tier: UserTier,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
    #[serde(default)]
    pub tier: UserTier,
}

impl User {
    /// Creates a new user
    ///
    /// # Errors
    ///
    /// Returns an error if the email is already taken (unique violation) or
    /// the database is unavailable.
    pub async fn create<'e, E>(executor: E, data: CreateUser) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, display_name, password_hash, tier)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email::TEXT AS email, display_name, password_hash, tier,
                      created_at, updated_at
            "#,
        )
        .bind(&data.email)
        .bind(&data.display_name)
        .bind(&data.password_hash)
        .bind(data.tier.as_str())
        .fetch_one(executor)
        .await
    }

    /// Finds a user by ID
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email::TEXT AS email, display_name, password_hash, tier,
                   created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Finds a user by email, ignoring case
    pub async fn find_by_email<'e, E>(executor: E, email: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email::TEXT AS email, display_name, password_hash, tier,
                   created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(executor)
        .await
    }

    /// Checks whether a user exists
    pub async fn exists<'e, E>(executor: E, id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(id)
            .fetch_one(executor)
            .await
    }

    /// Deletes a user
    ///
    /// Sessions and memberships cascade. Returns false if the user did not
    /// exist.
    pub async fn delete<'e, E>(executor: E, id: Uuid) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
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
    fn test_tier_parsing() {
        assert_eq!("admin".parse::<UserTier>().unwrap(), UserTier::Admin);
        assert_eq!(UserTier::try_from("default".to_string()).unwrap(), UserTier::Default);
        assert!("root".parse::<UserTier>().is_err());
    }

    #[test]
    fn test_create_user_defaults_tier() {
        let data: CreateUser = serde_json::from_str(
            r#"{"email":"a@b.c","display_name":"A","password_hash":"x"}"#,
        )
        .unwrap();
        assert_eq!(data.tier, UserTier::Default);
    }

    #[test]
    fn test_password_hash_is_not_serialized() {
        let user = User {
            id: Uuid::new_v4(),
            email: "a@b.c".to_string(),
            display_name: "A".to_string(),
            password_hash: "secret".to_string(),
            tier: UserTier::Default,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["tier"], "default");
    }
}
