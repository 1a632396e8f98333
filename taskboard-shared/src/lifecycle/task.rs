//! Task lifecycle
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use taskboard_shared::auth::PgSessionStore;
//! use taskboard_shared::db::transaction::TransactionPolicy;
//! use taskboard_shared::lifecycle::TaskLifecycle;
//! use taskboard_shared::models::task::CreateTask;
//! use sqlx::PgPool;
//! use uuid::Uuid;
//!
//! # async fn example(pool: PgPool, token: &str, column_id: Uuid) -> taskboard_shared::CoreResult<()> {
//! let sessions = Arc::new(PgSessionStore::new(pool.clone()));
//! let tasks = TaskLifecycle::new(pool, TransactionPolicy::default(), sessions);
//!
//! let user_id = tasks.authenticate(Some(token)).await?;
//! let task = tasks.create(column_id, CreateTask::titled("Ship it"), user_id).await?;
//! tasks.move_task(task.id, column_id, 0, user_id).await?;
//! # Ok(())
//! # }
//! ```

use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::as_parent_not_found;
use crate::auth::{Action, Authorizer, SessionStore};
use crate::db::transaction::{with_timeout, TransactionPolicy};
use crate::error::{AuthFailure, CoreError, CoreResult};
use crate::hierarchy::{link_task_parent, DeleteSummary, HierarchyRepository};
use crate::models::task::{CreateTask, Task, TaskPatch};
use crate::models::{EntityKind, EntityRef};

/// Authorized task operations
#[derive(Clone)]
pub struct TaskLifecycle {
    authorizer: Authorizer,
    repo: HierarchyRepository,
    sessions: Arc<dyn SessionStore>,
}

impl TaskLifecycle {
    pub fn new(pool: PgPool, policy: TransactionPolicy, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            authorizer: Authorizer::new(pool.clone(), policy),
            repo: HierarchyRepository::new(pool, policy),
            sessions,
        }
    }

    /// Turns a presented session token into the acting user
    pub async fn authenticate(&self, token: Option<&str>) -> CoreResult<Uuid> {
        let token = token.ok_or(CoreError::Unauthenticated(AuthFailure::Missing))?;
        let identity = self.sessions.validate(token).await?;
        Ok(identity.user_id)
    }

    /// Creates a task in `column_id`
    ///
    /// Appends unless `data.index` names a slot.
    pub async fn create(&self, column_id: Uuid, data: CreateTask, acting_user: Uuid) -> CoreResult<Task> {
        let project_id = self
            .authorizer
            .authorize_entity(acting_user, EntityRef::Column(column_id), Action::CreateChild)
            .await
            .map_err(as_parent_not_found)?;

        let task = self.repo.create_task(column_id, data).await?;

        info!(task_id = %task.id, project_id = %project_id, user_id = %acting_user, "Task created by user");
        Ok(task)
    }

    /// Fetches a task
    pub async fn get(&self, task_id: Uuid, acting_user: Uuid) -> CoreResult<Task> {
        self.authorizer
            .authorize_entity(acting_user, EntityRef::Task(task_id), Action::Read)
            .await?;
        self.repo.get_task(task_id).await
    }

    /// Lists the tasks of a column in order
    pub async fn list_column(&self, column_id: Uuid, acting_user: Uuid) -> CoreResult<Vec<Task>> {
        self.authorizer
            .authorize_entity(acting_user, EntityRef::Column(column_id), Action::Read)
            .await?;
        self.repo.list_tasks(column_id).await
    }

    /// Applies a content patch
    ///
    /// A parent change in the patch is cycle checked and written in the same
    /// transaction as the content fields.
    pub async fn update(&self, task_id: Uuid, patch: TaskPatch, acting_user: Uuid) -> CoreResult<Task> {
        self.authorizer
            .authorize_entity(acting_user, EntityRef::Task(task_id), Action::UpdateChild)
            .await?;

        let task = with_timeout(self.repo.policy(), self.update_tx(task_id, &patch)).await?;

        info!(task_id = %task_id, user_id = %acting_user, "Task updated");
        Ok(task)
    }

    async fn update_tx(&self, task_id: Uuid, patch: &TaskPatch) -> CoreResult<Task> {
        let mut tx = self.repo.policy().begin(self.repo.pool()).await?;

        let mut task = match patch.parent_task_id {
            Some(parent_id) => link_task_parent(&mut tx, task_id, parent_id).await?,
            None => Task::find_for_update(&mut *tx, task_id)
                .await?
                .ok_or(CoreError::NotFound {
                    entity: EntityKind::Task,
                    id: task_id,
                })?,
        };

        if patch.has_content_changes() {
            task = Task::update_content(&mut *tx, task_id, patch)
                .await?
                .ok_or(CoreError::NotFound {
                    entity: EntityKind::Task,
                    id: task_id,
                })?;
        }

        tx.commit().await?;
        Ok(task)
    }

    /// Moves a task to `index` in `target_column`
    ///
    /// The caller needs `UpdateChild` on the source project and on the
    /// destination project.
    pub async fn move_task(
        &self,
        task_id: Uuid,
        target_column: Uuid,
        index: usize,
        acting_user: Uuid,
    ) -> CoreResult<Task> {
        let source = self
            .authorizer
            .authorize_entity(acting_user, EntityRef::Task(task_id), Action::UpdateChild)
            .await?;
        let destination = self
            .authorizer
            .authorize_entity(acting_user, EntityRef::Column(target_column), Action::UpdateChild)
            .await
            .map_err(as_parent_not_found)?;

        let task = self.repo.move_task(task_id, target_column, index).await?;

        if source != destination {
            info!(task_id = %task_id, from = %source, to = %destination, "Task moved across projects");
        }
        Ok(task)
    }

    /// Deletes a task and its subtasks
    pub async fn delete(&self, task_id: Uuid, acting_user: Uuid) -> CoreResult<DeleteSummary> {
        self.authorizer
            .authorize_entity(acting_user, EntityRef::Task(task_id), Action::DeleteChild)
            .await?;
        self.repo.delete_task(task_id).await
    }
}
