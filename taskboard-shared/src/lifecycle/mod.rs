//! Authorized operations
//!
//! The services here are what an outer transport calls. Each one resolves
//! the owning project, checks the caller's role with the [`Authorizer`] and
//! only then hands the work to the [`HierarchyRepository`]. Errors from
//! either side are returned unchanged.
//!
//! - [`TaskLifecycle`]: create, update, move and delete tasks
//! - [`BoardService`]: projects, boards and columns
//!
//! [`Authorizer`]: crate::auth::Authorizer
//! [`HierarchyRepository`]: crate::hierarchy::HierarchyRepository

pub mod board;
pub mod task;

pub use board::BoardService;
pub use task::TaskLifecycle;

use crate::error::CoreError;

/// Reports a missing container as a missing parent
///
/// Used where an entity is addressed as the destination of a create or
/// move rather than as the subject of the operation.
pub(crate) fn as_parent_not_found(err: CoreError) -> CoreError {
    match err {
        CoreError::NotFound { entity, id } => CoreError::ParentNotFound { entity, id },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityKind;
    use uuid::Uuid;

    #[test]
    fn test_not_found_becomes_parent_not_found() {
        let id = Uuid::new_v4();
        let err = as_parent_not_found(CoreError::NotFound {
            entity: EntityKind::Column,
            id,
        });
        assert!(matches!(
            err,
            CoreError::ParentNotFound { entity: EntityKind::Column, id: found } if found == id
        ));
    }

    #[test]
    fn test_other_errors_pass_through() {
        let err = as_parent_not_found(CoreError::Timeout);
        assert!(matches!(err, CoreError::Timeout));
    }
}
