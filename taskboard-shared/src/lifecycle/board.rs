//! Project, board and column operations

use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use super::as_parent_not_found;
use crate::auth::{Action, Authorizer};
use crate::db::transaction::TransactionPolicy;
use crate::error::CoreResult;
use crate::hierarchy::{DeleteSummary, HierarchyRepository, SiblingSet};
use crate::models::board::{Board, CreateBoard};
use crate::models::column::{Column, CreateColumn};
use crate::models::project::{CreateProject, Project};
use crate::models::EntityRef;

/// Authorized operations on projects, boards and columns
#[derive(Debug, Clone)]
pub struct BoardService {
    authorizer: Authorizer,
    repo: HierarchyRepository,
}

impl BoardService {
    pub fn new(pool: PgPool, policy: TransactionPolicy) -> Self {
        Self {
            authorizer: Authorizer::new(pool.clone(), policy),
            repo: HierarchyRepository::new(pool, policy),
        }
    }

    /// Membership management for the same projects
    pub fn authorizer(&self) -> &Authorizer {
        &self.authorizer
    }

    /// Creates a project owned by the acting user
    pub async fn create_project(&self, data: CreateProject, acting_user: Uuid) -> CoreResult<Project> {
        self.repo.create_project(acting_user, data).await
    }

    pub async fn get_project(&self, project_id: Uuid, acting_user: Uuid) -> CoreResult<Project> {
        self.authorizer.require(acting_user, project_id, Action::Read).await?;
        self.repo.get_project(project_id).await
    }

    /// Lists the projects the acting user belongs to
    pub async fn list_projects(&self, acting_user: Uuid) -> CoreResult<Vec<Project>> {
        Ok(Project::list_for_user(self.repo.pool(), acting_user).await?)
    }

    /// Deletes a project and everything in it; owners only
    pub async fn delete_project(&self, project_id: Uuid, acting_user: Uuid) -> CoreResult<DeleteSummary> {
        self.authorizer
            .authorize_entity(acting_user, EntityRef::Project(project_id), Action::DeleteProject)
            .await?;

        let summary = self.repo.delete_project(project_id).await?;
        info!(project_id = %project_id, user_id = %acting_user, "Project deleted by owner");
        Ok(summary)
    }

    pub async fn create_board(&self, project_id: Uuid, data: CreateBoard, acting_user: Uuid) -> CoreResult<Board> {
        self.authorizer
            .authorize_entity(acting_user, EntityRef::Project(project_id), Action::CreateChild)
            .await
            .map_err(as_parent_not_found)?;
        self.repo.create_board(project_id, data).await
    }

    pub async fn list_boards(&self, project_id: Uuid, acting_user: Uuid) -> CoreResult<Vec<Board>> {
        self.authorizer
            .authorize_entity(acting_user, EntityRef::Project(project_id), Action::Read)
            .await?;
        self.repo.list_boards(project_id).await
    }

    pub async fn move_board(&self, board_id: Uuid, index: usize, acting_user: Uuid) -> CoreResult<Board> {
        self.authorizer
            .authorize_entity(acting_user, EntityRef::Board(board_id), Action::UpdateChild)
            .await?;
        self.repo.move_board(board_id, index).await
    }

    pub async fn delete_board(&self, board_id: Uuid, acting_user: Uuid) -> CoreResult<DeleteSummary> {
        self.authorizer
            .authorize_entity(acting_user, EntityRef::Board(board_id), Action::DeleteChild)
            .await?;
        self.repo.delete_board(board_id).await
    }

    pub async fn create_column(&self, board_id: Uuid, data: CreateColumn, acting_user: Uuid) -> CoreResult<Column> {
        self.authorizer
            .authorize_entity(acting_user, EntityRef::Board(board_id), Action::CreateChild)
            .await
            .map_err(as_parent_not_found)?;
        self.repo.create_column(board_id, data).await
    }

    pub async fn list_columns(&self, board_id: Uuid, acting_user: Uuid) -> CoreResult<Vec<Column>> {
        self.authorizer
            .authorize_entity(acting_user, EntityRef::Board(board_id), Action::Read)
            .await?;
        self.repo.list_columns(board_id).await
    }

    pub async fn move_column(&self, column_id: Uuid, index: usize, acting_user: Uuid) -> CoreResult<Column> {
        self.authorizer
            .authorize_entity(acting_user, EntityRef::Column(column_id), Action::UpdateChild)
            .await?;
        self.repo.move_column(column_id, index).await
    }

    pub async fn delete_column(&self, column_id: Uuid, acting_user: Uuid) -> CoreResult<DeleteSummary> {
        self.authorizer
            .authorize_entity(acting_user, EntityRef::Column(column_id), Action::DeleteChild)
            .await?;
        self.repo.delete_column(column_id).await
    }

    /// Respaces the keys of a sibling set
    pub async fn rebalance(&self, set: SiblingSet, acting_user: Uuid) -> CoreResult<Vec<(Uuid, i64)>> {
        let parent = match set {
            SiblingSet::ProjectBoards(id) => EntityRef::Project(id),
            SiblingSet::BoardColumns(id) => EntityRef::Board(id),
            SiblingSet::ColumnTasks(id) => EntityRef::Column(id),
        };

        self.authorizer
            .authorize_entity(acting_user, parent, Action::UpdateChild)
            .await?;
        self.repo.rebalance_siblings(set).await
    }
}
