//! Sibling sets as stored in the database
//!
//! A sibling set is every child of one parent row: the boards of a project,
//! the columns of a board or the tasks of a column. Writers lock the parent
//! row before reading sibling keys, which serialises all writers of the same
//! set for the rest of the transaction.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::debug;
use uuid::Uuid;

use crate::db::transaction::PositionAttempt;
use crate::error::{CoreError, CoreResult};
use crate::models::EntityKind;
use crate::ordering::{self, InsertPlan, Sibling};

/// The children of one parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiblingSet {
    ProjectBoards(Uuid),
    BoardColumns(Uuid),
    ColumnTasks(Uuid),
}

struct Layout {
    parent_kind: EntityKind,
    parent_table: &'static str,
    child_table: &'static str,
    parent_column: &'static str,
}

impl SiblingSet {
    /// ID of the parent row
    pub fn parent_id(&self) -> Uuid {
        match self {
            SiblingSet::ProjectBoards(id)
            | SiblingSet::BoardColumns(id)
            | SiblingSet::ColumnTasks(id) => *id,
        }
    }

    /// Kind of the parent row
    pub fn parent_kind(&self) -> EntityKind {
        self.layout().parent_kind
    }

    /// Kind of the children
    pub fn child_kind(&self) -> EntityKind {
        match self {
            SiblingSet::ProjectBoards(_) => EntityKind::Board,
            SiblingSet::BoardColumns(_) => EntityKind::Column,
            SiblingSet::ColumnTasks(_) => EntityKind::Task,
        }
    }

    fn layout(&self) -> Layout {
        match self {
            SiblingSet::ProjectBoards(_) => Layout {
                parent_kind: EntityKind::Project,
                parent_table: "projects",
                child_table: "boards",
                parent_column: "project_id",
            },
            SiblingSet::BoardColumns(_) => Layout {
                parent_kind: EntityKind::Board,
                parent_table: "boards",
                child_table: "columns",
                parent_column: "board_id",
            },
            SiblingSet::ColumnTasks(_) => Layout {
                parent_kind: EntityKind::Column,
                parent_table: "columns",
                child_table: "tasks",
                parent_column: "column_id",
            },
        }
    }

    /// Locks the parent row
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ParentNotFound`] if the parent does not exist.
    pub async fn lock_parent(&self, conn: &mut PgConnection) -> CoreResult<()> {
        let layout = self.layout();
        let query = format!("SELECT id FROM {} WHERE id = $1 FOR UPDATE", layout.parent_table);

        let locked: Option<Uuid> = sqlx::query_scalar(&query)
            .bind(self.parent_id())
            .fetch_optional(&mut *conn)
            .await?;

        match locked {
            Some(_) => Ok(()),
            None => Err(CoreError::ParentNotFound {
                entity: layout.parent_kind,
                id: self.parent_id(),
            }),
        }
    }

    /// Reads the current keys of every sibling
    pub async fn load(&self, conn: &mut PgConnection) -> CoreResult<Vec<Sibling>> {
        let layout = self.layout();
        let query = format!(
            "SELECT id, position, created_at FROM {} WHERE {} = $1",
            layout.child_table, layout.parent_column
        );

        let rows: Vec<(Uuid, i64, DateTime<Utc>)> = sqlx::query_as(&query)
            .bind(self.parent_id())
            .fetch_all(&mut *conn)
            .await?;

        let mut siblings: Vec<Sibling> = rows.into_iter().map(Sibling::from).collect();
        ordering::sort_siblings(&mut siblings);
        Ok(siblings)
    }

    /// Writes rebalanced keys
    ///
    /// Position uniqueness is deferred to commit for the rest of the
    /// transaction, so keys may pass through each other while being
    /// rewritten.
    pub async fn apply_rebalance(
        &self,
        conn: &mut PgConnection,
        assignments: &[(Uuid, i64)],
    ) -> CoreResult<()> {
        if assignments.is_empty() {
            return Ok(());
        }

        let layout = self.layout();

        sqlx::query("SET CONSTRAINTS ALL DEFERRED")
            .execute(&mut *conn)
            .await?;

        let (ids, positions): (Vec<Uuid>, Vec<i64>) = assignments.iter().copied().unzip();
        let query = format!(
            r#"
            UPDATE {table} AS t
            SET position = v.position
            FROM UNNEST($1::UUID[], $2::BIGINT[]) AS v(id, position)
            WHERE t.id = v.id AND t.{parent} = $3
            "#,
            table = layout.child_table,
            parent = layout.parent_column
        );

        sqlx::query(&query)
            .bind(&ids)
            .bind(&positions)
            .bind(self.parent_id())
            .execute(&mut *conn)
            .await?;

        debug!(
            parent = %self.parent_id(),
            children = self.child_kind().as_str(),
            count = assignments.len(),
            "Rebalanced sibling set"
        );

        Ok(())
    }

    /// Computes the key for placing an entity at `index`
    ///
    /// `moving` is the entity being repositioned when it may already be part
    /// of this set; it is left out of the planning. Any rebalance the plan
    /// needs is written before returning. `index` of `None` appends.
    ///
    /// The parent must already be locked.
    pub async fn place(
        &self,
        conn: &mut PgConnection,
        moving: Option<Uuid>,
        index: Option<usize>,
        attempt: PositionAttempt,
    ) -> CoreResult<i64> {
        let siblings = self.load(&mut *conn).await?;
        let index = index.unwrap_or(usize::MAX);

        let plan: InsertPlan = match moving {
            Some(id) => ordering::plan_move(&siblings, id, index, attempt.forces_rebalance())?,
            None if attempt.forces_rebalance() => ordering::plan_insert_rebalanced(&siblings, index)?,
            None => ordering::plan_insert(&siblings, index)?,
        };

        if plan.requires_rebalance() {
            self.apply_rebalance(&mut *conn, &plan.rebalanced).await?;
        }

        Ok(plan.position)
    }

    /// Rewrites every key of the set to evenly spaced values
    ///
    /// The parent must already be locked.
    pub async fn rebalance(&self, conn: &mut PgConnection) -> CoreResult<Vec<(Uuid, i64)>> {
        let siblings = self.load(&mut *conn).await?;
        let assignments = ordering::rebalance(&siblings);
        self.apply_rebalance(&mut *conn, &assignments).await?;
        Ok(assignments)
    }
}
