//! Error taxonomy for Taskboard operations
//!
//! Every repository, authorizer and lifecycle operation returns
//! [`CoreResult`]. The variant is preserved unchanged from the point of
//! failure to the caller, so an HTTP layer can map it deterministically with
//! [`CoreError::status_code`].
//!
//! | Kind | Status |
//! |------|--------|
//! | `Unauthenticated` | 401 |
//! | `Denied` | 403 |
//! | `NotFound`, `ParentNotFound` | 404 |
//! | `CycleDetected` | 400 |
//! | `ConstraintViolation` | 409 |
//! | `Timeout` | 503 |
//! | `Database` | 500 |
//!
//! # Example
//!
//! ```
//! use taskboard_shared::error::{CoreError, ErrorKind};
//! use taskboard_shared::models::EntityKind;
//! use uuid::Uuid;
//!
//! let err = CoreError::NotFound { entity: EntityKind::Task, id: Uuid::nil() };
//! assert_eq!(err.kind(), ErrorKind::NotFound);
//! assert_eq!(err.status_code(), 404);
//! assert!(!err.is_retryable());
//! ```

use std::fmt;
use uuid::Uuid;

use crate::auth::authorization::Action;
use crate::models::EntityKind;
use crate::ordering::OrderingError;

/// Result alias used across the crate
pub type CoreResult<T> = Result<T, CoreError>;

/// SQLSTATE codes the store reports for integrity failures
const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";
const QUERY_CANCELED: &str = "57014";

/// Suffix shared by the `(parent, position)` uniqueness constraints
const POSITION_CONSTRAINT_SUFFIX: &str = "_position_key";

/// Why a session could not be turned into a user identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// No token was presented
    Missing,

    /// The token does not match any session
    NotFound,

    /// The session existed but its expiry has passed
    Expired,
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthFailure::Missing => f.write_str("session token missing"),
            AuthFailure::NotFound => f.write_str("session not found"),
            AuthFailure::Expired => f.write_str("session expired"),
        }
    }
}

/// Error kinds, stable for mapping to transport status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthenticated,
    Denied,
    NotFound,
    ParentNotFound,
    CycleDetected,
    ConstraintViolation,
    Timeout,
    Database,
}

/// Unified error type for the access-control and ordering core
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Session token missing, unknown or expired
    #[error("Unauthenticated: {0}")]
    Unauthenticated(AuthFailure),

    /// Authenticated, but the membership role does not permit the action
    #[error("Permission denied: {action} on project {project_id}")]
    Denied { action: Action, project_id: Uuid },

    /// The addressed entity does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: Uuid },

    /// A create or move named a parent that does not exist
    #[error("parent {entity} {id} not found")]
    ParentNotFound { entity: EntityKind, id: Uuid },

    /// Making `parent_id` the parent of `task_id` would close a loop
    #[error("task {parent_id} cannot become the parent of task {task_id}: cycle detected")]
    CycleDetected { task_id: Uuid, parent_id: Uuid },

    /// Referential or uniqueness failure at the store layer
    #[error("Constraint violation: {message}")]
    ConstraintViolation {
        constraint: Option<String>,
        message: String,
    },

    /// The transaction exceeded its time budget and was rolled back
    #[error("Transaction timed out")]
    Timeout,

    /// Any other database failure
    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl CoreError {
    /// Builds a constraint violation that did not come from the store
    pub fn constraint(message: impl Into<String>) -> Self {
        CoreError::ConstraintViolation {
            constraint: None,
            message: message.into(),
        }
    }

    /// Builds a position conflict on the named uniqueness constraint
    ///
    /// Used when a sibling set changed between an unlocked read and the
    /// lock, so [`with_position_retry`](crate::db::transaction::with_position_retry)
    /// reruns the transaction.
    pub(crate) fn position_conflict(constraint: &str, message: impl Into<String>) -> Self {
        CoreError::ConstraintViolation {
            constraint: Some(constraint.to_string()),
            message: message.into(),
        }
    }

    /// Returns the stable kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            CoreError::Denied { .. } => ErrorKind::Denied,
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::ParentNotFound { .. } => ErrorKind::ParentNotFound,
            CoreError::CycleDetected { .. } => ErrorKind::CycleDetected,
            CoreError::ConstraintViolation { .. } => ErrorKind::ConstraintViolation,
            CoreError::Timeout => ErrorKind::Timeout,
            CoreError::Database(_) => ErrorKind::Database,
        }
    }

    /// Suggested HTTP status code for the error kind
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Unauthenticated => 401,
            ErrorKind::Denied => 403,
            ErrorKind::NotFound | ErrorKind::ParentNotFound => 404,
            ErrorKind::CycleDetected => 400,
            ErrorKind::ConstraintViolation => 409,
            ErrorKind::Timeout => 503,
            ErrorKind::Database => 500,
        }
    }

    /// Whether the caller may retry the whole operation unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Timeout)
    }

    /// True when two siblings collided on the same ordering key
    pub fn is_position_conflict(&self) -> bool {
        match self {
            CoreError::ConstraintViolation {
                constraint: Some(name),
                ..
            } => name.ends_with(POSITION_CONSTRAINT_SUFFIX),
            _ => false,
        }
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        if matches!(err, sqlx::Error::PoolTimedOut) {
            return CoreError::Timeout;
        }

        let classified = err.as_database_error().and_then(|db_err| {
            let code = db_err.code()?;
            match code.as_ref() {
                UNIQUE_VIOLATION | FOREIGN_KEY_VIOLATION | CHECK_VIOLATION => {
                    Some(CoreError::ConstraintViolation {
                        constraint: db_err.constraint().map(str::to_string),
                        message: db_err.message().to_string(),
                    })
                }
                QUERY_CANCELED => Some(CoreError::Timeout),
                _ => None,
            }
        });

        classified.unwrap_or(CoreError::Database(err))
    }
}

impl From<OrderingError> for CoreError {
    fn from(err: OrderingError) -> Self {
        CoreError::constraint(err.to_string())
    }
}
