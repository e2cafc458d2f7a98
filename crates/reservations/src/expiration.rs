//! Guest reservation expiry: the policy and the background sweep.
//!
//! Expiry happens two ways that must not race: lazily, when a status query
//! finds a reservation past due, and periodically, from the sweeper spawned
//! here. Both go through [`ReservationCoordinator::expire_if_due`], whose
//! conditional write lets exactly one of them perform each transition.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reservation_store::ReservationStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::coordinator::ReservationCoordinator;
use crate::error::Result;
use crate::services::notifier::Notifier;

/// How long guest reservations live and how often stale ones are swept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpirationPolicy {
    /// Lifetime of a guest reservation. Account reservations never expire.
    pub guest_ttl: chrono::Duration,
    /// Time between sweeps.
    pub sweep_interval: Duration,
    /// Reservations loaded per sweep batch.
    pub batch_size: u32,
}

impl ExpirationPolicy {
    pub const DEFAULT_GUEST_TTL_DAYS: i64 = 30;
    pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
    pub const DEFAULT_BATCH_SIZE: u32 = 100;

    pub fn with_guest_ttl(mut self, guest_ttl: chrono::Duration) -> Self {
        self.guest_ttl = guest_ttl;
        self
    }

    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }
}

impl Default for ExpirationPolicy {
    fn default() -> Self {
        Self {
            guest_ttl: chrono::Duration::days(Self::DEFAULT_GUEST_TTL_DAYS),
            sweep_interval: Self::DEFAULT_SWEEP_INTERVAL,
            batch_size: Self::DEFAULT_BATCH_SIZE,
        }
    }
}

/// Periodically expires guest reservations that are past due.
pub struct ExpirationSweeper<S, N>
where
    S: ReservationStore,
    N: Notifier,
{
    coordinator: Arc<ReservationCoordinator<S, N>>,
    interval: Duration,
}

impl<S, N> ExpirationSweeper<S, N>
where
    S: ReservationStore + 'static,
    N: Notifier + 'static,
{
    /// Creates a sweeper running at the coordinator's policy interval.
    pub fn new(coordinator: Arc<ReservationCoordinator<S, N>>) -> Self {
        let interval = coordinator.policy().sweep_interval;
        Self {
            coordinator,
            interval,
        }
    }

    /// Runs a single sweep at `now`, returning how many reservations it expired.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<usize> {
        self.coordinator.sweep_expired(now).await
    }

    /// Starts sweeping in the background. The first sweep runs immediately.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        SweeperHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "expiration sweeper started"
        );

        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep_once(Utc::now()).await {
                        Ok(0) => tracing::debug!("expiration sweep found nothing to expire"),
                        Ok(expired) => tracing::info!(expired, "expiration sweep finished"),
                        // Keep sweeping; the next tick retries the same rows
                        Err(err) => tracing::error!(error = %err, "expiration sweep failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("expiration sweeper stopped");
    }
}

/// Handle to a running sweeper.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signals the sweeper to stop and waits for it to finish.
    ///
    /// A sweep in progress completes before the task exits.
    pub async fn shutdown(self) {
        // The receiver is gone only if the task already ended
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            tracing::warn!(error = %err, "expiration sweeper task ended abnormally");
        }
    }
}
