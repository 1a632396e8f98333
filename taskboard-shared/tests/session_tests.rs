//! Integration tests for the PostgreSQL session store
//!
//! Run with: cargo test --test session_tests

mod common;

use chrono::Duration;
use common::seed_user;
use std::sync::Arc;
use taskboard_shared::auth::session::{hash_token, TOKEN_LENGTH};
use taskboard_shared::auth::{PgSessionStore, SessionStore};
use taskboard_shared::db::transaction::TransactionPolicy;
use taskboard_shared::error::{AuthFailure, CoreError};
use taskboard_shared::lifecycle::TaskLifecycle;
use taskboard_shared::models::session::Session;

#[tokio::test]
async fn test_create_and_validate() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let user = seed_user(&pool, "session").await;
    let store = PgSessionStore::new(pool.clone());

    let issued = store.create(user.id, Duration::hours(1)).await.unwrap();
    assert_eq!(issued.token.len(), TOKEN_LENGTH);
    assert_eq!(issued.user_id, user.id);

    let identity = store.validate(&issued.token).await.unwrap();
    assert_eq!(identity.user_id, user.id);
    // The store keeps microsecond precision
    let drift = identity.expires_at - issued.expires_at;
    assert!(drift.num_milliseconds().abs() < 1);

    // Only the hash is stored
    let stored = Session::find_by_hash(&pool, &hash_token(&issued.token))
        .await
        .unwrap()
        .expect("session row should exist");
    assert_eq!(stored.user_id, user.id);
    assert_ne!(stored.token_hash, issued.token);
}

#[tokio::test]
async fn test_validate_failures() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let store = PgSessionStore::new(pool);

    assert!(matches!(
        store.validate("").await,
        Err(CoreError::Unauthenticated(AuthFailure::Missing))
    ));
    assert!(matches!(
        store.validate("not-a-token").await,
        Err(CoreError::Unauthenticated(AuthFailure::NotFound))
    ));

    let unknown = taskboard_shared::auth::session::generate_token();
    assert!(matches!(
        store.validate(&unknown).await,
        Err(CoreError::Unauthenticated(AuthFailure::NotFound))
    ));
}

#[tokio::test]
async fn test_expired_session_is_removed_on_access() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let user = seed_user(&pool, "expired").await;
    let store = PgSessionStore::new(pool.clone());

    let issued = store.create(user.id, Duration::seconds(-1)).await.unwrap();

    assert!(matches!(
        store.validate(&issued.token).await,
        Err(CoreError::Unauthenticated(AuthFailure::Expired))
    ));
    assert!(matches!(
        store.validate(&issued.token).await,
        Err(CoreError::Unauthenticated(AuthFailure::NotFound))
    ));
}

#[tokio::test]
async fn test_revoke_is_idempotent() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let user = seed_user(&pool, "revoke").await;
    let store = PgSessionStore::new(pool);

    let issued = store.create(user.id, Duration::hours(1)).await.unwrap();
    store.revoke(&issued.token).await.unwrap();
    store.revoke(&issued.token).await.unwrap();
    store.revoke("garbage").await.unwrap();

    assert!(matches!(
        store.validate(&issued.token).await,
        Err(CoreError::Unauthenticated(AuthFailure::NotFound))
    ));
}

#[tokio::test]
async fn test_revoke_all_for_user() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let user = seed_user(&pool, "many").await;
    let bystander = seed_user(&pool, "bystander").await;
    let store = PgSessionStore::new(pool);

    for _ in 0..3 {
        store.create(user.id, Duration::hours(1)).await.unwrap();
    }
    let kept = store.create(bystander.id, Duration::hours(1)).await.unwrap();

    assert_eq!(store.revoke_all_for_user(user.id).await.unwrap(), 3);
    assert_eq!(store.revoke_all_for_user(user.id).await.unwrap(), 0);
    assert_eq!(store.validate(&kept.token).await.unwrap().user_id, bystander.id);
}

#[tokio::test]
async fn test_purge_expired_keeps_live_sessions() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let user = seed_user(&pool, "purge").await;
    let store = PgSessionStore::new(pool.clone());

    let stale = store.create(user.id, Duration::seconds(-60)).await.unwrap();
    let live = store.create(user.id, Duration::hours(1)).await.unwrap();

    // Other tests may purge concurrently, so only the outcome is checked
    store.purge_expired().await.unwrap();

    assert!(Session::find_by_hash(&pool, &hash_token(&stale.token))
        .await
        .unwrap()
        .is_none());
    assert!(store.validate(&live.token).await.is_ok());
}

#[tokio::test]
async fn test_lifecycle_authenticates_tokens() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let user = seed_user(&pool, "lifecycle").await;
    let store = Arc::new(PgSessionStore::new(pool.clone()));
    let tasks = TaskLifecycle::new(pool, TransactionPolicy::default(), store.clone());

    let issued = store.create(user.id, Duration::minutes(5)).await.unwrap();
    assert_eq!(tasks.authenticate(Some(&issued.token)).await.unwrap(), user.id);

    assert!(matches!(
        tasks.authenticate(None).await,
        Err(CoreError::Unauthenticated(AuthFailure::Missing))
    ));
}

#[tokio::test]
async fn test_deleting_user_drops_sessions() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let user = seed_user(&pool, "gone").await;
    let store = PgSessionStore::new(pool.clone());
    let issued = store.create(user.id, Duration::hours(1)).await.unwrap();

    taskboard_shared::models::user::User::delete(&pool, user.id)
        .await
        .unwrap();

    assert!(matches!(
        store.validate(&issued.token).await,
        Err(CoreError::Unauthenticated(AuthFailure::NotFound))
    ));
}
