//! Project → Board → Column → Task repository
//!
//! Every mutation runs in one transaction bounded by the configured
//! [`TransactionPolicy`]. Writes that assign ordering keys lock the parent of
//! the sibling set first and are retried on key collisions with
//! [`with_position_retry`]. A failure at any step rolls the whole transaction
//! back.
//!
//! Row locks are always taken top down (projects, boards, columns, tasks)
//! and in ascending id order within a level. Parent-link changes lock the owning
//! project, so cycle and same-project checks see every committed link.
//!
//! The repository performs no authorization. Callers resolve the owning
//! project with [`resolve_project_id`] and consult the authorizer first.
//!
//! # Example
//!
//! ```no_run
//! use taskboard_shared::db::transaction::TransactionPolicy;
//! use taskboard_shared::hierarchy::HierarchyRepository;
//! use taskboard_shared::models::board::CreateBoard;
//! use sqlx::PgPool;
//! use uuid::Uuid;
//!
//! # async fn example(pool: PgPool, project_id: Uuid) -> taskboard_shared::CoreResult<()> {
//! let repo = HierarchyRepository::new(pool, TransactionPolicy::default());
//! let board = repo
//!     .create_board(project_id, CreateBoard { name: "Roadmap".to_string(), index: None })
//!     .await?;
//! let summary = repo.delete_board(board.id).await?;
//! assert_eq!(summary.boards, 1);
//! # Ok(())
//! # }
//! ```

pub mod siblings;

use serde::Serialize;
use sqlx::{PgConnection, PgExecutor, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::transaction::{with_position_retry, with_timeout, PositionAttempt, TransactionPolicy};
use crate::error::{CoreError, CoreResult};
use crate::models::board::{Board, CreateBoard};
use crate::models::column::{Column, CreateColumn};
use crate::models::membership::{CreateMembership, Membership, ProjectRole};
use crate::models::project::{CreateProject, Project};
use crate::models::task::{CreateTask, Task};
use crate::models::user::User;
use crate::models::{EntityKind, EntityRef};

pub use siblings::SiblingSet;

/// Uniqueness constraint on `(column_id, position)`
const TASK_POSITION_CONSTRAINT: &str = "tasks_column_position_key";

/// Rows removed by a cascading delete
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeleteSummary {
    pub boards: u64,
    pub columns: u64,
    pub tasks: u64,
}

impl DeleteSummary {
    /// Total rows removed across all levels
    pub fn total(&self) -> u64 {
        self.boards + self.columns + self.tasks
    }
}

/// Resolves the project that owns an entity
///
/// Walks Task → Column → Board → Project with one joined query.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] for the addressed entity if it, or any
/// link of its chain, does not exist.
pub async fn resolve_project_id<'e, E>(executor: E, entity: EntityRef) -> CoreResult<Uuid>
where
    E: PgExecutor<'e>,
{
    let query = match entity {
        EntityRef::Project(_) => "SELECT id FROM projects WHERE id = $1",
        EntityRef::Board(_) => {
            r#"
            SELECT p.id
            FROM boards b
            JOIN projects p ON p.id = b.project_id
            WHERE b.id = $1
            "#
        }
        EntityRef::Column(_) => {
            r#"
            SELECT p.id
            FROM columns c
            JOIN boards b ON b.id = c.board_id
            JOIN projects p ON p.id = b.project_id
            WHERE c.id = $1
            "#
        }
        EntityRef::Task(_) => {
            r#"
            SELECT p.id
            FROM tasks t
            JOIN columns c ON c.id = t.column_id
            JOIN boards b ON b.id = c.board_id
            JOIN projects p ON p.id = b.project_id
            WHERE t.id = $1
            "#
        }
    };

    let project_id: Option<Uuid> = sqlx::query_scalar(query)
        .bind(entity.id())
        .fetch_optional(executor)
        .await?;

    project_id.ok_or(CoreError::NotFound {
        entity: entity.kind(),
        id: entity.id(),
    })
}

/// True when `task_id` appears in the ancestor chain of a prospective parent
///
/// `parent_chain` starts with the parent itself, so self-parenting is a
/// cycle too.
pub fn closes_cycle(task_id: Uuid, parent_chain: &[Uuid]) -> bool {
    parent_chain.contains(&task_id)
}

/// Locks the given projects in ascending id order
async fn lock_projects_in_order(conn: &mut PgConnection, mut project_ids: Vec<Uuid>) -> CoreResult<()> {
    project_ids.sort();
    project_ids.dedup();

    for project_id in project_ids {
        if !Project::lock(&mut *conn, project_id).await? {
            return Err(CoreError::NotFound {
                entity: EntityKind::Project,
                id: project_id,
            });
        }
    }

    Ok(())
}

/// Locks the project that owns `entity` and returns its id
///
/// A task can change project while the lock is awaited, so ownership is
/// resolved again once the lock is held.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] for `entity` if it no longer exists and
/// [`CoreError::ConstraintViolation`] if it moved to another project.
pub(crate) async fn lock_owning_project(conn: &mut PgConnection, entity: EntityRef) -> CoreResult<Uuid> {
    let project_id = resolve_project_id(&mut *conn, entity).await?;
    Project::lock(&mut *conn, project_id).await?;

    let locked_id = resolve_project_id(&mut *conn, entity).await?;
    if locked_id != project_id {
        return Err(CoreError::constraint(format!(
            "{} {} moved to another project concurrently",
            entity.kind(),
            entity.id()
        )));
    }

    Ok(project_id)
}

/// Validates a prospective parent for `task_id` inside a transaction
///
/// The parent must exist, belong to `project_id` and not have `task_id` in
/// its ancestor chain.
pub(crate) async fn check_task_parent(
    conn: &mut PgConnection,
    task_id: Option<Uuid>,
    parent_id: Uuid,
    project_id: Uuid,
) -> CoreResult<()> {
    if task_id == Some(parent_id) {
        return Err(CoreError::CycleDetected {
            task_id: parent_id,
            parent_id,
        });
    }

    let parent_project = match resolve_project_id(&mut *conn, EntityRef::Task(parent_id)).await {
        Ok(id) => id,
        Err(CoreError::NotFound { .. }) => {
            return Err(CoreError::ParentNotFound {
                entity: EntityKind::Task,
                id: parent_id,
            })
        }
        Err(err) => return Err(err),
    };

    if parent_project != project_id {
        return Err(CoreError::constraint(format!(
            "parent task {} belongs to a different project",
            parent_id
        )));
    }

    if let Some(task_id) = task_id {
        let chain = Task::ancestor_chain(&mut *conn, parent_id).await?;
        if closes_cycle(task_id, &chain) {
            return Err(CoreError::CycleDetected { task_id, parent_id });
        }
    }

    Ok(())
}

/// Transactional repository for the project hierarchy
#[derive(Debug, Clone)]
pub struct HierarchyRepository {
    pool: PgPool,
    policy: TransactionPolicy,
}

impl HierarchyRepository {
    pub fn new(pool: PgPool, policy: TransactionPolicy) -> Self {
        Self { pool, policy }
    }

    /// Underlying pool, for reads outside a transaction
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Transaction limits used by this repository
    pub fn policy(&self) -> &TransactionPolicy {
        &self.policy
    }

    /// Resolves the project that owns an entity
    pub async fn resolve_project_id(&self, entity: EntityRef) -> CoreResult<Uuid> {
        resolve_project_id(&self.pool, entity).await
    }

    // Projects

    /// Creates a project and makes `owner_id` its owner
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the owner does not exist.
    pub async fn create_project(&self, owner_id: Uuid, data: CreateProject) -> CoreResult<Project> {
        let project = with_timeout(&self.policy, self.create_project_tx(owner_id, &data)).await?;

        info!(project_id = %project.id, owner_id = %owner_id, "Project created");
        Ok(project)
    }

    async fn create_project_tx(&self, owner_id: Uuid, data: &CreateProject) -> CoreResult<Project> {
        let mut tx = self.policy.begin(&self.pool).await?;

        if !User::exists(&mut *tx, owner_id).await? {
            return Err(CoreError::NotFound {
                entity: EntityKind::User,
                id: owner_id,
            });
        }

        let project = Project::create(&mut *tx, owner_id, data).await?;
        Membership::create(
            &mut *tx,
            CreateMembership {
                project_id: project.id,
                user_id: owner_id,
                role: ProjectRole::Owner,
            },
        )
        .await?;

        tx.commit().await?;
        Ok(project)
    }

    /// Fetches a project
    pub async fn get_project(&self, project_id: Uuid) -> CoreResult<Project> {
        Project::find_by_id(&self.pool, project_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: EntityKind::Project,
                id: project_id,
            })
    }

    /// Deletes a project with all boards, columns, tasks and memberships
    pub async fn delete_project(&self, project_id: Uuid) -> CoreResult<DeleteSummary> {
        let summary = with_timeout(&self.policy, self.delete_project_tx(project_id)).await?;

        info!(
            project_id = %project_id,
            boards = summary.boards,
            columns = summary.columns,
            tasks = summary.tasks,
            "Project deleted"
        );
        Ok(summary)
    }

    async fn delete_project_tx(&self, project_id: Uuid) -> CoreResult<DeleteSummary> {
        let mut tx = self.policy.begin(&self.pool).await?;

        if !Project::lock(&mut *tx, project_id).await? {
            return Err(CoreError::NotFound {
                entity: EntityKind::Project,
                id: project_id,
            });
        }

        let board_ids = Board::lock_by_project(&mut *tx, project_id).await?;
        let column_ids = Column::ids_by_project(&mut *tx, project_id).await?;
        let column_ids = Column::lock_ids(&mut *tx, &column_ids).await?;
        let tasks = Task::count_in_columns(&mut *tx, &column_ids).await?;

        Project::delete(&mut *tx, project_id).await?;
        tx.commit().await?;

        Ok(DeleteSummary {
            boards: board_ids.len() as u64,
            columns: column_ids.len() as u64,
            tasks: tasks as u64,
        })
    }

    // Boards

    /// Creates a board at `data.index` (default: last)
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ParentNotFound`] if the project does not exist.
    pub async fn create_board(&self, project_id: Uuid, data: CreateBoard) -> CoreResult<Board> {
        let data = &data;
        let board = with_position_retry("create_board", move |attempt| {
            with_timeout(&self.policy, self.create_board_tx(project_id, data, attempt))
        })
        .await?;

        info!(board_id = %board.id, project_id = %project_id, position = board.position, "Board created");
        Ok(board)
    }

    async fn create_board_tx(
        &self,
        project_id: Uuid,
        data: &CreateBoard,
        attempt: PositionAttempt,
    ) -> CoreResult<Board> {
        let mut tx = self.policy.begin(&self.pool).await?;

        let set = SiblingSet::ProjectBoards(project_id);
        set.lock_parent(&mut tx).await?;
        let position = set.place(&mut tx, None, data.index, attempt).await?;
        let board = Board::insert(&mut *tx, project_id, &data.name, position).await?;

        tx.commit().await?;
        Ok(board)
    }

    /// Fetches a board
    pub async fn get_board(&self, board_id: Uuid) -> CoreResult<Board> {
        Board::find_by_id(&self.pool, board_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: EntityKind::Board,
                id: board_id,
            })
    }

    /// Lists a project's boards in order
    pub async fn list_boards(&self, project_id: Uuid) -> CoreResult<Vec<Board>> {
        Ok(Board::list_by_project(&self.pool, project_id).await?)
    }

    /// Moves a board to `index` among its siblings
    pub async fn move_board(&self, board_id: Uuid, index: usize) -> CoreResult<Board> {
        let board = with_position_retry("move_board", move |attempt| {
            with_timeout(&self.policy, self.move_board_tx(board_id, index, attempt))
        })
        .await?;

        info!(board_id = %board_id, position = board.position, "Board moved");
        Ok(board)
    }

    async fn move_board_tx(
        &self,
        board_id: Uuid,
        index: usize,
        attempt: PositionAttempt,
    ) -> CoreResult<Board> {
        let mut tx = self.policy.begin(&self.pool).await?;

        let board = Board::find_by_id(&mut *tx, board_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: EntityKind::Board,
                id: board_id,
            })?;

        let set = SiblingSet::ProjectBoards(board.project_id);
        set.lock_parent(&mut tx).await?;
        let position = set.place(&mut tx, Some(board_id), Some(index), attempt).await?;
        let board = Board::set_position(&mut *tx, board_id, position)
            .await?
            .ok_or(CoreError::NotFound {
                entity: EntityKind::Board,
                id: board_id,
            })?;

        tx.commit().await?;
        Ok(board)
    }

    /// Deletes a board with its columns and tasks
    pub async fn delete_board(&self, board_id: Uuid) -> CoreResult<DeleteSummary> {
        let summary = with_timeout(&self.policy, self.delete_board_tx(board_id)).await?;

        info!(board_id = %board_id, columns = summary.columns, tasks = summary.tasks, "Board deleted");
        Ok(summary)
    }

    async fn delete_board_tx(&self, board_id: Uuid) -> CoreResult<DeleteSummary> {
        let mut tx = self.policy.begin(&self.pool).await?;

        lock_owning_project(&mut tx, EntityRef::Board(board_id)).await?;
        match SiblingSet::BoardColumns(board_id).lock_parent(&mut tx).await {
            Ok(()) => {}
            Err(CoreError::ParentNotFound { entity, id }) => return Err(CoreError::NotFound { entity, id }),
            Err(err) => return Err(err),
        }
        let column_ids = Column::ids_by_board(&mut *tx, board_id).await?;
        let column_ids = Column::lock_ids(&mut *tx, &column_ids).await?;
        let tasks = Task::count_in_columns(&mut *tx, &column_ids).await?;

        if !Board::delete(&mut *tx, board_id).await? {
            return Err(CoreError::NotFound {
                entity: EntityKind::Board,
                id: board_id,
            });
        }

        tx.commit().await?;
        Ok(DeleteSummary {
            boards: 1,
            columns: column_ids.len() as u64,
            tasks: tasks as u64,
        })
    }

    // Columns

    /// Creates a column at `data.index` (default: last)
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ParentNotFound`] if the board does not exist.
    pub async fn create_column(&self, board_id: Uuid, data: CreateColumn) -> CoreResult<Column> {
        let data = &data;
        let column = with_position_retry("create_column", move |attempt| {
            with_timeout(&self.policy, self.create_column_tx(board_id, data, attempt))
        })
        .await?;

        info!(column_id = %column.id, board_id = %board_id, position = column.position, "Column created");
        Ok(column)
    }

    async fn create_column_tx(
        &self,
        board_id: Uuid,
        data: &CreateColumn,
        attempt: PositionAttempt,
    ) -> CoreResult<Column> {
        let mut tx = self.policy.begin(&self.pool).await?;

        let set = SiblingSet::BoardColumns(board_id);
        set.lock_parent(&mut tx).await?;
        let position = set.place(&mut tx, None, data.index, attempt).await?;
        let column = Column::insert(&mut *tx, board_id, &data.name, position).await?;

        tx.commit().await?;
        Ok(column)
    }

    /// Fetches a column
    pub async fn get_column(&self, column_id: Uuid) -> CoreResult<Column> {
        Column::find_by_id(&self.pool, column_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: EntityKind::Column,
                id: column_id,
            })
    }

    /// Lists a board's columns in order
    pub async fn list_columns(&self, board_id: Uuid) -> CoreResult<Vec<Column>> {
        Ok(Column::list_by_board(&self.pool, board_id).await?)
    }

    /// Moves a column to `index` within its board
    pub async fn move_column(&self, column_id: Uuid, index: usize) -> CoreResult<Column> {
        let column = with_position_retry("move_column", move |attempt| {
            with_timeout(&self.policy, self.move_column_tx(column_id, index, attempt))
        })
        .await?;

        info!(column_id = %column_id, position = column.position, "Column moved");
        Ok(column)
    }

    async fn move_column_tx(
        &self,
        column_id: Uuid,
        index: usize,
        attempt: PositionAttempt,
    ) -> CoreResult<Column> {
        let mut tx = self.policy.begin(&self.pool).await?;

        let column = Column::find_by_id(&mut *tx, column_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: EntityKind::Column,
                id: column_id,
            })?;

        let set = SiblingSet::BoardColumns(column.board_id);
        set.lock_parent(&mut tx).await?;
        let position = set.place(&mut tx, Some(column_id), Some(index), attempt).await?;
        let column = Column::set_position(&mut *tx, column_id, position)
            .await?
            .ok_or(CoreError::NotFound {
                entity: EntityKind::Column,
                id: column_id,
            })?;

        tx.commit().await?;
        Ok(column)
    }

    /// Deletes a column with its tasks
    pub async fn delete_column(&self, column_id: Uuid) -> CoreResult<DeleteSummary> {
        let summary = with_timeout(&self.policy, self.delete_column_tx(column_id)).await?;

        info!(column_id = %column_id, tasks = summary.tasks, "Column deleted");
        Ok(summary)
    }

    async fn delete_column_tx(&self, column_id: Uuid) -> CoreResult<DeleteSummary> {
        let mut tx = self.policy.begin(&self.pool).await?;

        // Column before its tasks, the same order a task move uses
        lock_owning_project(&mut tx, EntityRef::Column(column_id)).await?;
        if Column::lock_ids(&mut *tx, &[column_id]).await?.is_empty() {
            return Err(CoreError::NotFound {
                entity: EntityKind::Column,
                id: column_id,
            });
        }

        let tasks = Task::count_in_columns(&mut *tx, &[column_id]).await?;

        if !Column::delete(&mut *tx, column_id).await? {
            return Err(CoreError::NotFound {
                entity: EntityKind::Column,
                id: column_id,
            });
        }

        tx.commit().await?;
        Ok(DeleteSummary {
            boards: 0,
            columns: 1,
            tasks: tasks as u64,
        })
    }

    // Tasks

    /// Creates a task at `data.index` (default: last)
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ParentNotFound`] if the column or the requested
    /// parent task does not exist, and [`CoreError::ConstraintViolation`] if
    /// the parent task belongs to another project.
    pub async fn create_task(&self, column_id: Uuid, data: CreateTask) -> CoreResult<Task> {
        let data = &data;
        let task = with_position_retry("create_task", move |attempt| {
            with_timeout(&self.policy, self.create_task_tx(column_id, data, attempt))
        })
        .await?;

        info!(task_id = %task.id, column_id = %column_id, position = task.position, "Task created");
        Ok(task)
    }

    async fn create_task_tx(
        &self,
        column_id: Uuid,
        data: &CreateTask,
        attempt: PositionAttempt,
    ) -> CoreResult<Task> {
        let mut tx = self.policy.begin(&self.pool).await?;

        let project_id = match data.parent_task_id {
            Some(_) => match lock_owning_project(&mut tx, EntityRef::Column(column_id)).await {
                Ok(id) => Some(id),
                Err(CoreError::NotFound { entity, id }) => {
                    return Err(CoreError::ParentNotFound { entity, id })
                }
                Err(err) => return Err(err),
            },
            None => None,
        };

        let set = SiblingSet::ColumnTasks(column_id);
        set.lock_parent(&mut tx).await?;

        if let (Some(parent_id), Some(project_id)) = (data.parent_task_id, project_id) {
            check_task_parent(&mut tx, None, parent_id, project_id).await?;
        }

        let position = set.place(&mut tx, None, data.index, attempt).await?;
        let task = Task::insert(&mut *tx, column_id, data, position).await?;

        tx.commit().await?;
        Ok(task)
    }

    /// Fetches a task
    pub async fn get_task(&self, task_id: Uuid) -> CoreResult<Task> {
        Task::find_by_id(&self.pool, task_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: EntityKind::Task,
                id: task_id,
            })
    }

    /// Lists a column's tasks in order
    pub async fn list_tasks(&self, column_id: Uuid) -> CoreResult<Vec<Task>> {
        Ok(Task::list_by_column(&self.pool, column_id).await?)
    }

    /// Moves a task to `index` in `target_column`
    ///
    /// A move between projects locks both projects first. The source and
    /// target columns are then locked in ascending id order. A task that is
    /// linked to a parent or to subtasks cannot leave its project.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the task does not exist and
    /// [`CoreError::ParentNotFound`] if the target column does not.
    pub async fn move_task(&self, task_id: Uuid, target_column: Uuid, index: usize) -> CoreResult<Task> {
        let task = with_position_retry("move_task", move |attempt| {
            with_timeout(&self.policy, self.move_task_tx(task_id, target_column, index, attempt))
        })
        .await?;

        info!(
            task_id = %task_id,
            column_id = %target_column,
            position = task.position,
            "Task moved"
        );
        Ok(task)
    }

    async fn move_task_tx(
        &self,
        task_id: Uuid,
        target_column: Uuid,
        index: usize,
        attempt: PositionAttempt,
    ) -> CoreResult<Task> {
        let mut tx = self.policy.begin(&self.pool).await?;

        let task_not_found = || CoreError::NotFound {
            entity: EntityKind::Task,
            id: task_id,
        };
        let column_not_found = || CoreError::ParentNotFound {
            entity: EntityKind::Column,
            id: target_column,
        };

        let source_column = Task::find_by_id(&mut *tx, task_id)
            .await?
            .ok_or_else(task_not_found)?
            .column_id;

        let mut cross_project = false;
        if source_column != target_column {
            let target_project = match resolve_project_id(&mut *tx, EntityRef::Column(target_column)).await {
                Ok(id) => id,
                Err(CoreError::NotFound { .. }) => return Err(column_not_found()),
                Err(err) => return Err(err),
            };
            let source_project = match resolve_project_id(&mut *tx, EntityRef::Column(source_column)).await {
                Ok(id) => id,
                Err(CoreError::NotFound { .. }) => return Err(task_not_found()),
                Err(err) => return Err(err),
            };

            if source_project != target_project {
                lock_projects_in_order(&mut tx, vec![source_project, target_project]).await?;
                cross_project = true;
            }
        }

        let locked = Column::lock_ids(&mut *tx, &[source_column, target_column]).await?;
        if !locked.contains(&target_column) {
            return Err(column_not_found());
        }

        let task = Task::find_for_update(&mut *tx, task_id)
            .await?
            .ok_or_else(task_not_found)?;

        // Moved by another writer before the locks were granted
        if task.column_id != source_column {
            return Err(CoreError::position_conflict(
                TASK_POSITION_CONSTRAINT,
                format!("task {} changed column during the move", task_id),
            ));
        }

        if cross_project {
            let has_subtasks = !Task::list_subtasks(&mut *tx, task_id).await?.is_empty();
            if task.parent_task_id.is_some() || has_subtasks {
                return Err(CoreError::constraint(format!(
                    "task {} has subtask links and cannot move to another project",
                    task_id
                )));
            }
        }

        let set = SiblingSet::ColumnTasks(target_column);
        let position = set.place(&mut tx, Some(task_id), Some(index), attempt).await?;
        let task = Task::relocate(&mut *tx, task_id, target_column, position)
            .await?
            .ok_or(CoreError::NotFound {
                entity: EntityKind::Task,
                id: task_id,
            })?;

        tx.commit().await?;
        Ok(task)
    }

    /// Deletes a task with all of its subtasks
    pub async fn delete_task(&self, task_id: Uuid) -> CoreResult<DeleteSummary> {
        let summary = with_timeout(&self.policy, self.delete_task_tx(task_id)).await?;

        info!(task_id = %task_id, tasks = summary.tasks, "Task deleted");
        Ok(summary)
    }

    async fn delete_task_tx(&self, task_id: Uuid) -> CoreResult<DeleteSummary> {
        let mut tx = self.policy.begin(&self.pool).await?;

        lock_owning_project(&mut tx, EntityRef::Task(task_id)).await?;
        let tasks = Task::count_subtree(&mut *tx, task_id).await?;

        if !Task::delete(&mut *tx, task_id).await? {
            return Err(CoreError::NotFound {
                entity: EntityKind::Task,
                id: task_id,
            });
        }

        tx.commit().await?;
        Ok(DeleteSummary {
            boards: 0,
            columns: 0,
            tasks: tasks as u64,
        })
    }

    /// Sets or clears the parent of a task
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CycleDetected`] for self-parenting or an ancestor
    /// loop, [`CoreError::ParentNotFound`] for a missing parent and
    /// [`CoreError::ConstraintViolation`] for a parent in another project.
    pub async fn set_task_parent(&self, task_id: Uuid, parent_id: Option<Uuid>) -> CoreResult<Task> {
        let task = with_timeout(&self.policy, self.set_task_parent_tx(task_id, parent_id)).await?;

        info!(task_id = %task_id, parent_task_id = ?parent_id, "Task parent changed");
        Ok(task)
    }

    async fn set_task_parent_tx(&self, task_id: Uuid, parent_id: Option<Uuid>) -> CoreResult<Task> {
        let mut tx = self.policy.begin(&self.pool).await?;
        let task = link_task_parent(&mut tx, task_id, parent_id).await?;
        tx.commit().await?;
        Ok(task)
    }

    /// Rewrites the keys of a sibling set to evenly spaced values
    ///
    /// Returns the new `(id, position)` assignments in order.
    pub async fn rebalance_siblings(&self, set: SiblingSet) -> CoreResult<Vec<(Uuid, i64)>> {
        let assignments = with_timeout(&self.policy, self.rebalance_siblings_tx(set)).await?;

        debug!(parent = %set.parent_id(), count = assignments.len(), "Sibling set rebalanced on request");
        Ok(assignments)
    }

    async fn rebalance_siblings_tx(&self, set: SiblingSet) -> CoreResult<Vec<(Uuid, i64)>> {
        let mut tx = self.policy.begin(&self.pool).await?;
        set.lock_parent(&mut tx).await?;
        let assignments = set.rebalance(&mut tx).await?;
        tx.commit().await?;
        Ok(assignments)
    }
}

/// Validates and writes a parent link inside an open transaction
///
/// Setting a parent locks the owning project before the task row, so two
/// links in one project never check their ancestor chains concurrently.
/// Returns the task as it is after the change.
pub(crate) async fn link_task_parent(
    conn: &mut PgConnection,
    task_id: Uuid,
    parent_id: Option<Uuid>,
) -> CoreResult<Task> {
    let project_id = match parent_id {
        Some(_) => Some(lock_owning_project(&mut *conn, EntityRef::Task(task_id)).await?),
        None => None,
    };

    let task = Task::find_for_update(&mut *conn, task_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: EntityKind::Task,
            id: task_id,
        })?;

    if task.parent_task_id == parent_id {
        return Ok(task);
    }

    if let (Some(parent_id), Some(project_id)) = (parent_id, project_id) {
        check_task_parent(&mut *conn, Some(task_id), parent_id, project_id).await?;
    }

    Task::set_parent(&mut *conn, task_id, parent_id).await?;

    Task::find_by_id(&mut *conn, task_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: EntityKind::Task,
            id: task_id,
        })
}
