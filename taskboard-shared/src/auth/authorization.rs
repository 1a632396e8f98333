//! Membership-based authorization
//!
//! Access is decided per project from the caller's membership role. There
//! are no per-board or per-task overrides: any entity is authorized against
//! the project that owns it.
//!
//! # Policy
//!
//! | Action | owner | admin | member | no membership |
//! |--------|-------|-------|--------|---------------|
//! | Read, CreateChild, UpdateChild, DeleteChild | ✓ | ✓ | ✓ | ✗ |
//! | ManageMembers | ✓ | ✓ | ✗ | ✗ |
//! | DeleteProject | ✓ | ✗ | ✗ | ✗ |
//!
//! Granting or revoking the owner role additionally requires the caller to
//! be an owner, and a project can never lose its last owner.
//!
//! # Example
//!
//! ```no_run
//! use taskboard_shared::auth::authorization::{Action, Authorizer};
//! use taskboard_shared::db::transaction::TransactionPolicy;
//! use taskboard_shared::models::EntityRef;
//! use sqlx::PgPool;
//! use uuid::Uuid;
//!
//! # async fn example(pool: PgPool, user_id: Uuid, task_id: Uuid) -> taskboard_shared::CoreResult<()> {
//! let authorizer = Authorizer::new(pool, TransactionPolicy::default());
//! let project_id = authorizer
//!     .authorize_entity(user_id, EntityRef::Task(task_id), Action::UpdateChild)
//!     .await?;
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use std::fmt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::transaction::{with_timeout, TransactionPolicy};
use crate::error::{CoreError, CoreResult};
use crate::hierarchy::resolve_project_id;
use crate::models::membership::{CreateMembership, Membership, ProjectRole};
use crate::models::user::User;
use crate::models::{EntityKind, EntityRef};

/// Operations subject to authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Read,
    CreateChild,
    UpdateChild,
    DeleteChild,
    ManageMembers,
    DeleteProject,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Read,
        Action::CreateChild,
        Action::UpdateChild,
        Action::DeleteChild,
        Action::ManageMembers,
        Action::DeleteProject,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::CreateChild => "create_child",
            Action::UpdateChild => "update_child",
            Action::DeleteChild => "delete_child",
            Action::ManageMembers => "manage_members",
            Action::DeleteProject => "delete_project",
        }
    }

    /// Weakest role allowed to perform the action
    pub fn min_role(&self) -> ProjectRole {
        match self {
            Action::Read | Action::CreateChild | Action::UpdateChild | Action::DeleteChild => {
                ProjectRole::Member
            }
            Action::ManageMembers => ProjectRole::Admin,
            Action::DeleteProject => ProjectRole::Owner,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a policy check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allowed,
    Denied,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

/// Applies the role policy
///
/// `None` means the user has no membership in the project.
pub fn decide(role: Option<ProjectRole>, action: Action) -> Decision {
    match role {
        Some(role) if role.has_permission(&action.min_role()) => Decision::Allowed,
        _ => Decision::Denied,
    }
}

/// Resolves roles and enforces the policy against the membership table
#[derive(Debug, Clone)]
pub struct Authorizer {
    pool: PgPool,
    policy: TransactionPolicy,
}

impl Authorizer {
    pub fn new(pool: PgPool, policy: TransactionPolicy) -> Self {
        Self { pool, policy }
    }

    /// Role of `user_id` in `project_id`, None if not a member
    pub async fn role_of(&self, user_id: Uuid, project_id: Uuid) -> CoreResult<Option<ProjectRole>> {
        Ok(Membership::get_role(&self.pool, project_id, user_id).await?)
    }

    /// Decides whether `user_id` may perform `action` on `project_id`
    pub async fn authorize(&self, user_id: Uuid, project_id: Uuid, action: Action) -> CoreResult<Decision> {
        let role = self.role_of(user_id, project_id).await?;
        Ok(decide(role, action))
    }

    /// Like [`Authorizer::authorize`] but fails with [`CoreError::Denied`]
    ///
    /// Returns the caller's role on success.
    pub async fn require(&self, user_id: Uuid, project_id: Uuid, action: Action) -> CoreResult<ProjectRole> {
        let role = self.role_of(user_id, project_id).await?;
        check(role, user_id, project_id, action)
    }

    /// Authorizes an action on any entity through its owning project
    ///
    /// Returns the owning project's ID.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the entity does not exist and
    /// [`CoreError::Denied`] if the policy refuses the action.
    pub async fn authorize_entity(&self, user_id: Uuid, entity: EntityRef, action: Action) -> CoreResult<Uuid> {
        let project_id = resolve_project_id(&self.pool, entity).await?;
        self.require(user_id, project_id, action).await?;
        Ok(project_id)
    }

    /// Lists a project's members; any member may look
    pub async fn list_members(&self, actor_id: Uuid, project_id: Uuid) -> CoreResult<Vec<Membership>> {
        self.require(actor_id, project_id, Action::Read).await?;
        Ok(Membership::list_by_project(&self.pool, project_id).await?)
    }

    /// Adds `user_id` to the project with `role`
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Denied`] unless the actor may manage members
    /// (and is an owner when granting ownership), [`CoreError::NotFound`]
    /// if the user does not exist and [`CoreError::ConstraintViolation`] if
    /// the user is already a member.
    pub async fn add_member(
        &self,
        actor_id: Uuid,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
    ) -> CoreResult<Membership> {
        let membership = with_timeout(
            &self.policy,
            self.add_member_tx(actor_id, project_id, user_id, role),
        )
        .await?;

        info!(project_id = %project_id, user_id = %user_id, role = %role, actor_id = %actor_id, "Member added");
        Ok(membership)
    }

    async fn add_member_tx(
        &self,
        actor_id: Uuid,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
    ) -> CoreResult<Membership> {
        let mut tx = self.policy.begin(&self.pool).await?;

        let actor_role = lock_and_require(&mut tx, actor_id, project_id, Action::ManageMembers).await?;
        require_owner_for(actor_role, actor_id, project_id, role)?;

        if !User::exists(&mut *tx, user_id).await? {
            return Err(CoreError::NotFound {
                entity: EntityKind::User,
                id: user_id,
            });
        }

        let membership = Membership::create(
            &mut *tx,
            CreateMembership {
                project_id,
                user_id,
                role,
            },
        )
        .await?;

        tx.commit().await?;
        Ok(membership)
    }

    /// Changes the role of an existing member
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConstraintViolation`] when the change would
    /// demote the last owner.
    pub async fn change_role(
        &self,
        actor_id: Uuid,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
    ) -> CoreResult<Membership> {
        let membership = with_timeout(
            &self.policy,
            self.change_role_tx(actor_id, project_id, user_id, role),
        )
        .await?;

        info!(project_id = %project_id, user_id = %user_id, role = %role, actor_id = %actor_id, "Member role changed");
        Ok(membership)
    }

    async fn change_role_tx(
        &self,
        actor_id: Uuid,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
    ) -> CoreResult<Membership> {
        let mut tx = self.policy.begin(&self.pool).await?;

        let actor_role = lock_and_require(&mut tx, actor_id, project_id, Action::ManageMembers).await?;
        let current = member_role(&mut tx, project_id, user_id).await?;

        if current == role {
            let membership = Membership::find(&mut *tx, project_id, user_id)
                .await?
                .ok_or(CoreError::NotFound {
                    entity: EntityKind::User,
                    id: user_id,
                })?;
            tx.commit().await?;
            return Ok(membership);
        }

        require_owner_for(actor_role, actor_id, project_id, current)?;
        require_owner_for(actor_role, actor_id, project_id, role)?;

        if current == ProjectRole::Owner {
            ensure_not_last_owner(&mut tx, project_id, user_id).await?;
        }

        let membership = Membership::update_role(&mut *tx, project_id, user_id, role)
            .await?
            .ok_or(CoreError::NotFound {
                entity: EntityKind::User,
                id: user_id,
            })?;

        tx.commit().await?;
        Ok(membership)
    }

    /// Removes a member from the project
    ///
    /// Any member may remove themselves; removing someone else requires
    /// `ManageMembers`, and removing an owner requires being an owner.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConstraintViolation`] when the member is the
    /// last owner.
    pub async fn remove_member(&self, actor_id: Uuid, project_id: Uuid, user_id: Uuid) -> CoreResult<()> {
        with_timeout(&self.policy, self.remove_member_tx(actor_id, project_id, user_id)).await?;

        info!(project_id = %project_id, user_id = %user_id, actor_id = %actor_id, "Member removed");
        Ok(())
    }

    async fn remove_member_tx(&self, actor_id: Uuid, project_id: Uuid, user_id: Uuid) -> CoreResult<()> {
        let mut tx = self.policy.begin(&self.pool).await?;

        let leaving = actor_id == user_id;
        let action = if leaving { Action::Read } else { Action::ManageMembers };
        let actor_role = lock_and_require(&mut tx, actor_id, project_id, action).await?;
        let current = member_role(&mut tx, project_id, user_id).await?;

        if !leaving {
            require_owner_for(actor_role, actor_id, project_id, current)?;
        }

        if current == ProjectRole::Owner {
            ensure_not_last_owner(&mut tx, project_id, user_id).await?;
        }

        Membership::delete(&mut *tx, project_id, user_id).await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Turns a role lookup into the caller's role or [`CoreError::Denied`]
fn check(role: Option<ProjectRole>, user_id: Uuid, project_id: Uuid, action: Action) -> CoreResult<ProjectRole> {
    match role {
        Some(role) if decide(Some(role), action).is_allowed() => {
            debug!(user_id = %user_id, project_id = %project_id, action = %action, role = %role, "Access granted");
            Ok(role)
        }
        _ => {
            warn!(
                user_id = %user_id,
                project_id = %project_id,
                action = %action,
                role = ?role,
                "Access denied"
            );
            Err(CoreError::Denied { action, project_id })
        }
    }
}

/// Only owners may hand out or take away the owner role
fn require_owner_for(
    actor_role: ProjectRole,
    actor_id: Uuid,
    project_id: Uuid,
    affected_role: ProjectRole,
) -> CoreResult<()> {
    if affected_role == ProjectRole::Owner && actor_role != ProjectRole::Owner {
        warn!(actor_id = %actor_id, project_id = %project_id, "Non-owner attempted to change ownership");
        return Err(CoreError::Denied {
            action: Action::ManageMembers,
            project_id,
        });
    }
    Ok(())
}

/// Locks the project row, then checks the actor's role
///
/// The lock serialises membership changes of one project, which keeps the
/// last-owner check race free.
async fn lock_and_require(
    conn: &mut PgConnection,
    actor_id: Uuid,
    project_id: Uuid,
    action: Action,
) -> CoreResult<ProjectRole> {
    if !crate::models::project::Project::lock(&mut *conn, project_id).await? {
        return Err(CoreError::NotFound {
            entity: EntityKind::Project,
            id: project_id,
        });
    }

    let role = Membership::get_role(&mut *conn, project_id, actor_id).await?;
    check(role, actor_id, project_id, action)
}

async fn member_role(conn: &mut PgConnection, project_id: Uuid, user_id: Uuid) -> CoreResult<ProjectRole> {
    Membership::get_role(&mut *conn, project_id, user_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: EntityKind::User,
            id: user_id,
        })
}

async fn ensure_not_last_owner(conn: &mut PgConnection, project_id: Uuid, user_id: Uuid) -> CoreResult<()> {
    if Membership::count_owners(&mut *conn, project_id).await? <= 1 {
        warn!(project_id = %project_id, user_id = %user_id, "Refused to remove the last owner");
        return Err(CoreError::constraint(format!(
            "project {} must keep at least one owner",
            project_id
        )));
    }
    Ok(())
}
