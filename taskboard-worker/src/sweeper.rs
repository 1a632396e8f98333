//! Expired session sweeper
//!
//! Sessions are already rejected and removed when an expired token is
//! presented. Tokens that are never presented again would stay in the table
//! forever, so the worker purges them on a fixed interval.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use taskboard_shared::auth::PgSessionStore;
//! use taskboard_worker::sweeper::SessionSweeper;
//!
//! # async fn example(store: PgSessionStore) {
//! let sweeper = SessionSweeper::new(Arc::new(store), Duration::from_secs(300));
//! let shutdown = sweeper.shutdown_token();
//!
//! let handle = tokio::spawn(async move { sweeper.run().await });
//!
//! // Later, on SIGINT
//! shutdown.cancel();
//! handle.await.ok();
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;
use taskboard_shared::auth::SessionStore;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Shortest allowed sweep interval
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Periodically purges expired sessions until cancelled
pub struct SessionSweeper {
    store: Arc<dyn SessionStore>,
    period: Duration,
    shutdown_token: CancellationToken,
}

/// Totals for one sweeper run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Sweeps that completed
    pub sweeps: u64,

    /// Sweeps that failed
    pub failures: u64,

    /// Sessions removed across all sweeps
    pub purged: u64,
}

impl SessionSweeper {
    /// Creates a sweeper; periods below [`MIN_INTERVAL`] are raised to it
    pub fn new(store: Arc<dyn SessionStore>, period: Duration) -> Self {
        Self {
            store,
            period: period.max(MIN_INTERVAL),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Token that stops [`SessionSweeper::run`] when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Runs one purge, logging instead of failing
    pub async fn sweep_once(&self, stats: &mut SweepStats) {
        match self.store.purge_expired().await {
            Ok(count) => {
                stats.sweeps += 1;
                stats.purged += count;
                tracing::debug!(purged = count, "Session sweep finished");
            }
            Err(e) => {
                stats.failures += 1;
                tracing::error!(error = %e, retryable = e.is_retryable(), "Session sweep failed");
            }
        }
    }

    /// Sweeps on every tick until the shutdown token is cancelled
    ///
    /// The first sweep runs immediately.
    pub async fn run(&self) -> SweepStats {
        tracing::info!(period_secs = self.period.as_secs(), "Session sweeper starting");

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stats = SweepStats::default();

        loop {
            tokio::select! {
                _ = self.shutdown_token.cancelled() => {
                    break;
                }
                _ = ticker.tick() => {
                    self.sweep_once(&mut stats).await;
                }
            }
        }

        tracing::info!(
            sweeps = stats.sweeps,
            failures = stats.failures,
            purged = stats.purged,
            "Session sweeper stopped"
        );
        stats
    }
}
