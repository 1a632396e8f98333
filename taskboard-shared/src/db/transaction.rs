//! Bounded transactions and ordering-key collision retries
//!
//! Every mutating operation runs in a single Postgres transaction. The
//! transaction is bounded twice: `SET LOCAL statement_timeout` stops a
//! runaway statement inside the server, and [`with_timeout`] abandons the
//! whole attempt on the client side. Abandoning drops the
//! [`sqlx::Transaction`], which rolls it back, so a timeout never leaves
//! partial state.
//!
//! Position collisions are the one failure recovered locally:
//! [`with_position_retry`] reruns the complete transaction with freshly read
//! sibling keys, and the final attempt rebalances the sibling set first.

use sqlx::{PgPool, Postgres, Transaction};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};

/// Attempts allowed for an operation that writes ordering keys
pub const MAX_POSITION_ATTEMPTS: u32 = 3;

/// Time limits applied to every transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionPolicy {
    /// Wall-clock budget for the whole transaction
    pub timeout: Duration,

    /// Server-side limit for any single statement
    pub statement_timeout: Duration,
}

impl Default for TransactionPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            statement_timeout: Duration::from_secs(4),
        }
    }
}

impl TransactionPolicy {
    /// Opens a transaction with the statement timeout applied
    ///
    /// # Errors
    ///
    /// Returns an error if no connection can be acquired or the setting fails.
    pub async fn begin(&self, pool: &PgPool) -> CoreResult<Transaction<'static, Postgres>> {
        let mut tx = pool.begin().await?;

        // SET does not take bind parameters; the value is an integer we format
        let millis = self.statement_timeout.as_millis();
        sqlx::query(&format!("SET LOCAL statement_timeout = {}", millis))
            .execute(&mut *tx)
            .await?;

        Ok(tx)
    }
}

/// How an attempt should compute ordering keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionAttempt {
    /// Split the gap between neighbours, rebalancing only when exhausted
    Normal,

    /// Rebalance the sibling set before inserting
    ForceRebalance,
}

impl PositionAttempt {
    pub fn forces_rebalance(&self) -> bool {
        matches!(self, PositionAttempt::ForceRebalance)
    }
}

/// Runs `operation` within the policy's wall-clock budget
///
/// # Errors
///
/// Returns [`CoreError::Timeout`] when the budget is exceeded, otherwise the
/// operation's own result.
pub async fn with_timeout<T, F>(policy: &TransactionPolicy, operation: F) -> CoreResult<T>
where
    F: Future<Output = CoreResult<T>>,
{
    match tokio::time::timeout(policy.timeout, operation).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                timeout_ms = policy.timeout.as_millis() as u64,
                "Transaction exceeded its time budget and was rolled back"
            );
            Err(CoreError::Timeout)
        }
    }
}

/// Retries `attempt` while it fails with a position collision
///
/// Each call must run a complete transaction. Attempts before the last use
/// [`PositionAttempt::Normal`]; the last uses
/// [`PositionAttempt::ForceRebalance`]. Any other error, or a collision on
/// the last attempt, is returned unchanged.
///
/// # Errors
///
/// Returns the first non-collision error, or the collision from the final
/// attempt as [`CoreError::ConstraintViolation`].
pub async fn with_position_retry<T, F, Fut>(operation: &'static str, mut attempt: F) -> CoreResult<T>
where
    F: FnMut(PositionAttempt) -> Fut,
    Fut: Future<Output = CoreResult<T>>,
{
    let mut number = 1;

    loop {
        let mode = if number >= MAX_POSITION_ATTEMPTS {
            PositionAttempt::ForceRebalance
        } else {
            PositionAttempt::Normal
        };

        match attempt(mode).await {
            Err(err) if err.is_position_conflict() && number < MAX_POSITION_ATTEMPTS => {
                warn!(operation, attempt = number, error = %err, "Ordering key collision, retrying");
                number += 1;
            }
            result => {
                if number > 1 {
                    debug!(operation, attempts = number, ok = result.is_ok(), "Position retry finished");
                }
                return result;
            }
        }
    }
}
