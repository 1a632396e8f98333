//! Integration tests for the hierarchy repository and task lifecycle
//!
//! Run with: cargo test --test hierarchy_tests

mod common;

use common::{seed_user, Fixture};
use taskboard_shared::error::{CoreError, ErrorKind};
use taskboard_shared::hierarchy::{resolve_project_id, SiblingSet};
use taskboard_shared::models::board::CreateBoard;
use taskboard_shared::models::column::CreateColumn;
use taskboard_shared::models::membership::ProjectRole;
use taskboard_shared::models::task::{CreateTask, TaskPatch};
use taskboard_shared::models::{EntityKind, EntityRef};
use taskboard_shared::ordering::POSITION_STEP;
use uuid::Uuid;

#[tokio::test]
async fn test_board_example_scenario() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let fx = Fixture::new(pool).await;
    let owner = fx.owner.id;

    let t1 = fx.tasks.create(fx.c1.id, CreateTask::titled("T1"), owner).await.unwrap();
    let t2 = fx.tasks.create(fx.c1.id, CreateTask::titled("T2"), owner).await.unwrap();
    let t3 = fx.tasks.create(fx.c2.id, CreateTask::titled("T3"), owner).await.unwrap();
    assert_eq!(fx.task_ids(fx.c1.id).await, vec![t1.id, t2.id]);

    let moved = fx.tasks.move_task(t2.id, fx.c2.id, 0, owner).await.unwrap();
    assert_eq!(moved.column_id, fx.c2.id);
    assert_eq!(fx.task_ids(fx.c1.id).await, vec![t1.id]);
    assert_eq!(fx.task_ids(fx.c2.id).await, vec![t2.id, t3.id]);

    let t3_now = fx.repo.get_task(t3.id).await.unwrap();
    assert!(moved.position < t3_now.position);

    let summary = fx.boards.delete_column(fx.c1.id, owner).await.unwrap();
    assert_eq!(summary.columns, 1);
    assert_eq!(summary.tasks, 1);
    assert!(matches!(
        fx.repo.get_task(t1.id).await,
        Err(CoreError::NotFound { entity: EntityKind::Task, .. })
    ));
    assert_eq!(fx.task_ids(fx.c2.id).await, vec![t2.id, t3.id]);

    let member = seed_user(&fx.pool, "member").await;
    fx.boards
        .authorizer()
        .add_member(owner, fx.project.id, member.id, ProjectRole::Member)
        .await
        .unwrap();

    let denied = fx
        .boards
        .authorizer()
        .add_member(member.id, fx.project.id, seed_user(&fx.pool, "x").await.id, ProjectRole::Member)
        .await
        .unwrap_err();
    assert_eq!(denied.kind(), ErrorKind::Denied);

    let created = fx
        .tasks
        .create(fx.c2.id, CreateTask::titled("by member"), member.id)
        .await
        .unwrap();
    assert_eq!(fx.task_ids(fx.c2.id).await.last(), Some(&created.id));
}

#[tokio::test]
async fn test_insert_at_index_and_clamping() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let fx = Fixture::new(pool).await;

    let a = fx.repo.create_task(fx.c1.id, CreateTask::titled("a")).await.unwrap();
    let c = fx.repo.create_task(fx.c1.id, CreateTask::titled("c")).await.unwrap();

    let mut b = CreateTask::titled("b");
    b.index = Some(1);
    let b = fx.repo.create_task(fx.c1.id, b).await.unwrap();

    let mut first = CreateTask::titled("first");
    first.index = Some(0);
    let first = fx.repo.create_task(fx.c1.id, first).await.unwrap();

    let mut last = CreateTask::titled("last");
    last.index = Some(999);
    let last = fx.repo.create_task(fx.c1.id, last).await.unwrap();

    assert_eq!(
        fx.task_ids(fx.c1.id).await,
        vec![first.id, a.id, b.id, c.id, last.id]
    );
    assert_eq!(a.position, POSITION_STEP);
}

#[tokio::test]
async fn test_repeated_inserts_rebalance_transparently() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let fx = Fixture::new(pool).await;

    let head = fx.repo.create_task(fx.c1.id, CreateTask::titled("head")).await.unwrap();
    let tail = fx.repo.create_task(fx.c1.id, CreateTask::titled("tail")).await.unwrap();

    // Halving the same gap exhausts it long before 40 inserts
    let mut inserted = Vec::new();
    for i in 0..40 {
        let mut data = CreateTask::titled(format!("t{}", i));
        data.index = Some(1);
        inserted.push(fx.repo.create_task(fx.c1.id, data).await.unwrap().id);
    }

    let mut expected = vec![head.id];
    expected.extend(inserted.iter().rev());
    expected.push(tail.id);
    assert_eq!(fx.task_ids(fx.c1.id).await, expected);

    let tasks = fx.repo.list_tasks(fx.c1.id).await.unwrap();
    assert!(tasks.windows(2).all(|w| w[0].position < w[1].position));
}

#[tokio::test]
async fn test_move_within_column() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let fx = Fixture::new(pool).await;
    let owner = fx.owner.id;

    let mut ids = Vec::new();
    for title in ["a", "b", "c", "d"] {
        ids.push(fx.tasks.create(fx.c1.id, CreateTask::titled(title), owner).await.unwrap().id);
    }

    fx.tasks.move_task(ids[0], fx.c1.id, 2, owner).await.unwrap();
    assert_eq!(fx.task_ids(fx.c1.id).await, vec![ids[1], ids[2], ids[0], ids[3]]);

    fx.tasks.move_task(ids[3], fx.c1.id, 0, owner).await.unwrap();
    assert_eq!(fx.task_ids(fx.c1.id).await, vec![ids[3], ids[1], ids[2], ids[0]]);

    // Moving into its own slot is a no-op on order
    fx.tasks.move_task(ids[2], fx.c1.id, 2, owner).await.unwrap();
    assert_eq!(fx.task_ids(fx.c1.id).await, vec![ids[3], ids[1], ids[2], ids[0]]);
}

#[tokio::test]
async fn test_move_board_and_column() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let fx = Fixture::new(pool).await;
    let owner = fx.owner.id;

    let second = fx
        .boards
        .create_board(fx.project.id, CreateBoard { name: "B2".to_string(), index: None }, owner)
        .await
        .unwrap();
    fx.boards.move_board(second.id, 0, owner).await.unwrap();

    let boards: Vec<Uuid> = fx
        .boards
        .list_boards(fx.project.id, owner)
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.id)
        .collect();
    assert_eq!(boards, vec![second.id, fx.board.id]);

    fx.boards.move_column(fx.c1.id, 5, owner).await.unwrap();
    let columns: Vec<Uuid> = fx
        .boards
        .list_columns(fx.board.id, owner)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(columns, vec![fx.c2.id, fx.c1.id]);
}

#[tokio::test]
async fn test_create_in_missing_parent_fails() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let fx = Fixture::new(pool).await;
    let missing = Uuid::new_v4();

    let err = fx
        .tasks
        .create(missing, CreateTask::titled("orphan"), fx.owner.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::ParentNotFound { entity: EntityKind::Column, id } if id == missing
    ));

    let err = fx
        .repo
        .create_column(missing, CreateColumn { name: "x".to_string(), index: None })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ParentNotFound { entity: EntityKind::Board, .. }));

    let err = fx
        .tasks
        .move_task(Uuid::new_v4(), fx.c1.id, 0, fx.owner.id)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound { entity: EntityKind::Task, .. }));
}

#[tokio::test]
async fn test_resolve_project_id_walks_the_chain() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let fx = Fixture::new(pool).await;
    let task = fx.repo.create_task(fx.c2.id, CreateTask::titled("t")).await.unwrap();

    for entity in [
        EntityRef::Project(fx.project.id),
        EntityRef::Board(fx.board.id),
        EntityRef::Column(fx.c2.id),
        EntityRef::Task(task.id),
    ] {
        assert_eq!(resolve_project_id(&fx.pool, entity).await.unwrap(), fx.project.id);
    }

    let err = resolve_project_id(&fx.pool, EntityRef::Board(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_cascade_delete_counts_everything() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let fx = Fixture::new(pool).await;
    let owner = fx.owner.id;

    let parent = fx.repo.create_task(fx.c1.id, CreateTask::titled("parent")).await.unwrap();
    let mut child = CreateTask::titled("child");
    child.parent_task_id = Some(parent.id);
    let child = fx.repo.create_task(fx.c2.id, child).await.unwrap();
    let mut grandchild = CreateTask::titled("grandchild");
    grandchild.parent_task_id = Some(child.id);
    fx.repo.create_task(fx.c2.id, grandchild).await.unwrap();
    fx.repo.create_task(fx.c2.id, CreateTask::titled("loose")).await.unwrap();

    let summary = fx.tasks.delete(parent.id, owner).await.unwrap();
    assert_eq!(summary.tasks, 3);
    assert_eq!(fx.task_ids(fx.c2.id).await.len(), 1);

    let summary = fx.boards.delete_project(fx.project.id, owner).await.unwrap();
    assert_eq!(summary.boards, 1);
    assert_eq!(summary.columns, 2);
    assert_eq!(summary.tasks, 1);

    assert!(matches!(
        fx.repo.get_column(fx.c2.id).await,
        Err(CoreError::NotFound { .. })
    ));
    assert!(fx.boards.authorizer().role_of(owner, fx.project.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_subtask_cycles_are_refused() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let fx = Fixture::new(pool).await;
    let owner = fx.owner.id;

    let a = fx.repo.create_task(fx.c1.id, CreateTask::titled("a")).await.unwrap();
    let b = fx.repo.create_task(fx.c1.id, CreateTask::titled("b")).await.unwrap();
    let c = fx.repo.create_task(fx.c1.id, CreateTask::titled("c")).await.unwrap();

    fx.repo.set_task_parent(b.id, Some(a.id)).await.unwrap();
    fx.repo.set_task_parent(c.id, Some(b.id)).await.unwrap();

    let err = fx.repo.set_task_parent(a.id, Some(c.id)).await.unwrap_err();
    assert!(matches!(err, CoreError::CycleDetected { task_id, parent_id } if task_id == a.id && parent_id == c.id));

    let err = fx.repo.set_task_parent(a.id, Some(a.id)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CycleDetected);

    let patch = TaskPatch {
        parent_task_id: Some(Some(c.id)),
        title: Some("renamed".to_string()),
        ..Default::default()
    };
    let err = fx.tasks.update(a.id, patch, owner).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CycleDetected);

    // The failed update left the title untouched
    assert_eq!(fx.repo.get_task(a.id).await.unwrap().title, "a");

    let patch = TaskPatch {
        parent_task_id: Some(None),
        ..Default::default()
    };
    let detached = fx.tasks.update(c.id, patch, owner).await.unwrap();
    assert_eq!(detached.parent_task_id, None);
}

#[tokio::test]
async fn test_parent_must_share_the_project() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let fx = Fixture::new(pool.clone()).await;
    let other = Fixture::new(pool).await;

    let here = fx.repo.create_task(fx.c1.id, CreateTask::titled("here")).await.unwrap();
    let there = other.repo.create_task(other.c1.id, CreateTask::titled("there")).await.unwrap();

    let err = fx.repo.set_task_parent(here.id, Some(there.id)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);

    let err = fx
        .repo
        .set_task_parent(here.id, Some(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ParentNotFound { entity: EntityKind::Task, .. }));
}

#[tokio::test]
async fn test_update_applies_content_fields() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let fx = Fixture::new(pool).await;
    let owner = fx.owner.id;

    let task = fx.tasks.create(fx.c1.id, CreateTask::titled("draft"), owner).await.unwrap();
    let patch: TaskPatch = serde_json::from_value(serde_json::json!({
        "title": "final",
        "status": "done",
        "priority": "urgent",
        "assignee_id": owner,
    }))
    .unwrap();

    let updated = fx.tasks.update(task.id, patch, owner).await.unwrap();
    assert_eq!(updated.title, "final");
    assert_eq!(updated.status, "done");
    assert_eq!(updated.assignee_id, Some(owner));
    assert_eq!(updated.position, task.position);
    assert_eq!(updated.column_id, task.column_id);
}

#[tokio::test]
async fn test_rebalance_respaces_keys_in_order() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let fx = Fixture::new(pool).await;

    let mut ids = Vec::new();
    for i in 0..5 {
        let mut data = CreateTask::titled(format!("t{}", i));
        data.index = Some(0);
        ids.push(fx.repo.create_task(fx.c1.id, data).await.unwrap().id);
    }
    ids.reverse();

    let assignments = fx
        .boards
        .rebalance(SiblingSet::ColumnTasks(fx.c1.id), fx.owner.id)
        .await
        .unwrap();

    let expected: Vec<(Uuid, i64)> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, (i as i64 + 1) * POSITION_STEP))
        .collect();
    assert_eq!(assignments, expected);
    assert_eq!(fx.task_ids(fx.c1.id).await, ids);
}

#[tokio::test]
async fn test_concurrent_appends_keep_distinct_keys() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let fx = Fixture::new(pool).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let repo = fx.repo.clone();
        let column_id = fx.c1.id;
        handles.push(tokio::spawn(async move {
            repo.create_task(column_id, CreateTask::titled(format!("t{}", i))).await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let tasks = fx.repo.list_tasks(fx.c1.id).await.unwrap();
    assert_eq!(tasks.len(), 8);
    assert!(tasks.windows(2).all(|w| w[0].position < w[1].position));
}

/// Follows parent links from `task_id`, failing if they loop
async fn assert_parent_chain_ends(fx: &Fixture, task_id: Uuid, max_depth: usize) {
    let mut current = Some(task_id);
    for _ in 0..=max_depth {
        match current {
            Some(id) => current = fx.repo.get_task(id).await.unwrap().parent_task_id,
            None => return,
        }
    }
    panic!("parent chain of task {} does not end", task_id);
}

#[tokio::test]
async fn test_concurrent_links_never_commit_a_cycle() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let fx = Fixture::new(pool).await;

    for round in 0..5 {
        let a = fx.repo.create_task(fx.c1.id, CreateTask::titled(format!("a{}", round))).await.unwrap();
        let b = fx.repo.create_task(fx.c1.id, CreateTask::titled(format!("b{}", round))).await.unwrap();
        let c = fx.repo.create_task(fx.c2.id, CreateTask::titled(format!("c{}", round))).await.unwrap();
        fx.repo.set_task_parent(b.id, Some(c.id)).await.unwrap();
        let (a, b, c) = (a.id, b.id, c.id);

        // a -> b and c -> a together would close a -> b -> c -> a
        let first = {
            let repo = fx.repo.clone();
            tokio::spawn(async move { repo.set_task_parent(a, Some(b)).await })
        };
        let second = {
            let repo = fx.repo.clone();
            tokio::spawn(async move { repo.set_task_parent(c, Some(a)).await })
        };

        let results = [first.await.unwrap(), second.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert_eq!(err.kind(), ErrorKind::CycleDetected);
        }

        for id in [a, b, c] {
            assert_parent_chain_ends(&fx, id, 3).await;
        }
    }
}

#[tokio::test]
async fn test_concurrent_mutual_links_refuse_one_side() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let fx = Fixture::new(pool).await;

    for _ in 0..5 {
        let a = fx.repo.create_task(fx.c1.id, CreateTask::titled("a")).await.unwrap().id;
        let b = fx.repo.create_task(fx.c1.id, CreateTask::titled("b")).await.unwrap().id;

        let repo = fx.repo.clone();
        let first = tokio::spawn(async move { repo.set_task_parent(a, Some(b)).await });
        let repo = fx.repo.clone();
        let second = tokio::spawn(async move { repo.set_task_parent(b, Some(a)).await });

        let results = [first.await.unwrap(), second.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let err = results.into_iter().find_map(Result::err).unwrap();
        assert_eq!(err.kind(), ErrorKind::CycleDetected);

        assert_parent_chain_ends(&fx, a, 2).await;
        assert_parent_chain_ends(&fx, b, 2).await;
    }
}

#[tokio::test]
async fn test_concurrent_link_and_cross_project_move_keep_projects_aligned() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let fx = Fixture::new(pool.clone()).await;
    let other = Fixture::new(pool).await;

    for _ in 0..5 {
        let parent = fx.repo.create_task(fx.c1.id, CreateTask::titled("parent")).await.unwrap().id;
        let child = fx.repo.create_task(fx.c2.id, CreateTask::titled("child")).await.unwrap().id;

        let repo = fx.repo.clone();
        let target = other.c1.id;
        let mover = tokio::spawn(async move { repo.move_task(parent, target, 0).await });
        let repo = fx.repo.clone();
        let linker = tokio::spawn(async move { repo.set_task_parent(child, Some(parent)).await });

        let moved = mover.await.unwrap();
        let linked = linker.await.unwrap();
        assert!(moved.is_ok() != linked.is_ok(), "exactly one side must win");
        for err in [moved.err(), linked.err()].into_iter().flatten() {
            assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
        }

        let child_now = fx.repo.get_task(child).await.unwrap();
        if child_now.parent_task_id == Some(parent) {
            let parent_project = fx.repo.resolve_project_id(EntityRef::Task(parent)).await.unwrap();
            let child_project = fx.repo.resolve_project_id(EntityRef::Task(child)).await.unwrap();
            assert_eq!(parent_project, child_project);
        }
    }
}

#[tokio::test]
async fn test_moves_racing_a_column_delete_do_not_fail_in_the_store() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let fx = Fixture::new(pool).await;

    let mut ids = Vec::new();
    for i in 0..4 {
        let task = fx.repo.create_task(fx.c1.id, CreateTask::titled(format!("t{}", i))).await.unwrap();
        ids.push(task.id);
    }

    let mut moves = Vec::new();
    for id in ids {
        let repo = fx.repo.clone();
        let target = fx.c2.id;
        moves.push(tokio::spawn(async move { repo.move_task(id, target, 0).await }));
    }
    let repo = fx.repo.clone();
    let column_id = fx.c1.id;
    let delete = tokio::spawn(async move { repo.delete_column(column_id).await });

    let mut moved = 0;
    for handle in moves {
        match handle.await.unwrap() {
            Ok(_) => moved += 1,
            Err(err) => assert!(
                matches!(err, CoreError::NotFound { entity: EntityKind::Task, .. }),
                "unexpected error: {:?}",
                err
            ),
        }
    }

    let summary = delete.await.unwrap().unwrap();
    assert_eq!(summary.columns, 1);
    assert_eq!(moved + summary.tasks as usize, 4);
    assert_eq!(fx.task_ids(fx.c2.id).await.len(), moved);
}
