//! Opaque session tokens
//!
//! A session token is `tbs_` followed by 64 hex characters (32 random bytes
//! from the OS generator). The token is shown to the client once; only its
//! SHA-256 hash is stored, so a database leak does not leak live sessions.
//!
//! # Example
//!
//! ```no_run
//! use taskboard_shared::auth::session::{PgSessionStore, SessionStore};
//! use sqlx::PgPool;
//! use uuid::Uuid;
//!
//! # async fn example(pool: PgPool, user_id: Uuid) -> taskboard_shared::CoreResult<()> {
//! let store = PgSessionStore::new(pool);
//! let issued = store.create(user_id, chrono::Duration::days(7)).await?;
//!
//! let identity = store.validate(&issued.token).await?;
//! assert_eq!(identity.user_id, user_id);
//!
//! store.revoke(&issued.token).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AuthFailure, CoreError, CoreResult};
use crate::models::session::Session;

/// Prefix of every session token
pub const TOKEN_PREFIX: &str = "tbs_";

/// Random bytes in a token
const TOKEN_BYTES: usize = 32;

/// Total length of a token (prefix + hex)
pub const TOKEN_LENGTH: usize = TOKEN_PREFIX.len() + TOKEN_BYTES * 2;

/// The identity behind a valid session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// A newly created session
///
/// `token` is the only copy of the plaintext token.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Session persistence and validation
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Resolves a token to its user
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Unauthenticated`] with [`AuthFailure::Missing`]
    /// for an empty token, [`AuthFailure::NotFound`] for an unknown or
    /// malformed token and [`AuthFailure::Expired`] for an expired session,
    /// which is deleted.
    async fn validate(&self, token: &str) -> CoreResult<SessionIdentity>;

    /// Creates a session for `user_id` that lives for `ttl`
    async fn create(&self, user_id: Uuid, ttl: Duration) -> CoreResult<IssuedSession>;

    /// Deletes a session; revoking an unknown token succeeds
    async fn revoke(&self, token: &str) -> CoreResult<()>;

    /// Deletes every session of a user, returning how many were removed
    async fn revoke_all_for_user(&self, user_id: Uuid) -> CoreResult<u64>;

    /// Deletes every expired session, returning how many were removed
    async fn purge_expired(&self) -> CoreResult<u64>;
}

/// Generates a new random session token
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    format!("{}{}", TOKEN_PREFIX, hex::encode(bytes))
}

/// Hashes a token for storage and lookup
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Checks the token shape without touching the database
pub fn token_format_is_valid(token: &str) -> bool {
    token.len() == TOKEN_LENGTH
        && token
            .strip_prefix(TOKEN_PREFIX)
            .map(|rest| rest.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)))
            .unwrap_or(false)
}

/// A session expires at its expiry instant
pub fn is_expired(now: DateTime<Utc>, expires_at: DateTime<Utc>) -> bool {
    now >= expires_at
}

/// Rejection for an expired session after its eager removal was attempted
///
/// A failed removal is logged and left to the sweeper.
fn expired_after_cleanup(user_id: Uuid, removal: Result<bool, sqlx::Error>) -> CoreError {
    match removal {
        Ok(_) => debug!(user_id = %user_id, "Expired session removed on access"),
        Err(e) => warn!(user_id = %user_id, error = %e, "Failed to remove expired session"),
    }
    CoreError::Unauthenticated(AuthFailure::Expired)
}

/// Postgres-backed session store
#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn validate(&self, token: &str) -> CoreResult<SessionIdentity> {
        if token.is_empty() {
            return Err(CoreError::Unauthenticated(AuthFailure::Missing));
        }
        if !token_format_is_valid(token) {
            debug!("Rejected malformed session token");
            return Err(CoreError::Unauthenticated(AuthFailure::NotFound));
        }

        let token_hash = hash_token(token);
        let session = Session::find_by_hash(&self.pool, &token_hash)
            .await?
            .ok_or(CoreError::Unauthenticated(AuthFailure::NotFound))?;

        let now = Utc::now();
        if is_expired(now, session.expires_at) {
            let removal = Session::delete_by_hash(&self.pool, &token_hash).await;
            return Err(expired_after_cleanup(session.user_id, removal));
        }

        // Activity tracking must never fail an otherwise valid request
        if let Err(e) = Session::touch(&self.pool, &token_hash, now).await {
            warn!(user_id = %session.user_id, error = %e, "Failed to record session activity");
        }

        Ok(SessionIdentity {
            user_id: session.user_id,
            expires_at: session.expires_at,
        })
    }

    async fn create(&self, user_id: Uuid, ttl: Duration) -> CoreResult<IssuedSession> {
        let token = generate_token();
        let expires_at = Utc::now() + ttl;

        Session::create(&self.pool, &hash_token(&token), user_id, expires_at).await?;

        info!(user_id = %user_id, expires_at = %expires_at, "Session created");
        Ok(IssuedSession {
            token,
            user_id,
            expires_at,
        })
    }

    async fn revoke(&self, token: &str) -> CoreResult<()> {
        if !token_format_is_valid(token) {
            return Ok(());
        }

        let removed = Session::delete_by_hash(&self.pool, &hash_token(token)).await?;
        debug!(removed, "Session revoked");
        Ok(())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> CoreResult<u64> {
        let count = Session::delete_for_user(&self.pool, user_id).await?;

        info!(user_id = %user_id, count, "All sessions revoked");
        Ok(count)
    }

    async fn purge_expired(&self) -> CoreResult<u64> {
        let count = Session::delete_expired(&self.pool, Utc::now()).await?;

        if count > 0 {
            info!(count, "Expired sessions purged");
        }
        Ok(count)
    }
}
