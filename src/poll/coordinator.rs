//! Resilient collection poller.
//!
//! [`PollCoordinator::poll`] always returns a snapshot. Failures only change
//! the status; the dates and last-success time of the previous snapshot are
//! carried over. Concurrent callers are coalesced: a caller that had to wait
//! for an in-flight fetch receives that fetch's result instead of starting
//! another one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::models::{CollectionSnapshot, FetchStatus};

use super::client::CollectionSource;

/// Default bound on a single fetch.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the fetch seam and the latest snapshot for one address.
pub struct PollCoordinator {
    source: Arc<dyn CollectionSource>,
    address: String,
    timeout: Duration,
    in_flight: Mutex<()>,
    completed: AtomicU64,
    snapshot_tx: watch::Sender<CollectionSnapshot>,
}

impl PollCoordinator {
    /// Create a coordinator starting from the empty snapshot.
    #[must_use]
    pub fn new(source: Arc<dyn CollectionSource>, address: String, timeout: Duration) -> Self {
        let (snapshot_tx, _) = watch::channel(CollectionSnapshot::empty());
        Self {
            source,
            address,
            timeout,
            in_flight: Mutex::new(()),
            completed: AtomicU64::new(0),
            snapshot_tx,
        }
    }

    /// Address this coordinator polls for.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Latest snapshot.
    #[must_use]
    pub fn snapshot(&self) -> CollectionSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Receiver notified after every poll attempt, successful or not.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CollectionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Fetch once and publish the resulting snapshot.
    pub async fn poll(&self) -> CollectionSnapshot {
        let seen = self.completed.load(Ordering::SeqCst);
        let _guard = self.in_flight.lock().await;
        if self.completed.load(Ordering::SeqCst) != seen {
            // A fetch finished while we waited; share its result.
            return self.snapshot();
        }

        let previous = self.snapshot();
        let next = match self.fetch_bounded().await {
            Ok(dates) => {
                info!(red = ?dates.red, yellow = ?dates.yellow, "collection dates fetched");
                CollectionSnapshot::success(dates.red, dates.yellow, Utc::now())
            }
            Err(status) => {
                warn!(status = status.as_str(), "collection fetch failed, keeping last known dates");
                previous.failed(status)
            }
        };

        self.snapshot_tx.send_replace(next.clone());
        self.completed.fetch_add(1, Ordering::SeqCst);
        next
    }

    /// Run the fetch on its own task so a panic or a timeout cannot leak
    /// partial state into the snapshot.
    async fn fetch_bounded(&self) -> Result<super::client::CollectionDates, FetchStatus> {
        let source = Arc::clone(&self.source);
        let address = self.address.clone();
        let mut handle = tokio::spawn(async move { source.fetch(&address).await });

        match tokio::time::timeout(self.timeout, &mut handle).await {
            Err(_) => {
                handle.abort();
                warn!(timeout_secs = self.timeout.as_secs(), "collection fetch timed out");
                Err(FetchStatus::NetworkError)
            }
            Ok(Err(join_err)) => {
                warn!(%join_err, "collection fetch task failed");
                Err(FetchStatus::UnexpectedError)
            }
            Ok(Ok(Err(fetch_err))) => {
                warn!(%fetch_err, "collection fetch error");
                Err(fetch_err.status())
            }
            Ok(Ok(Ok(dates))) => Ok(dates),
        }
    }
}

/// Spawn the periodic poller.
///
/// The first poll runs immediately, then every `every`.
#[must_use]
pub fn spawn_poller(
    coordinator: Arc<PollCoordinator>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let span = info_span!("poller", address = %coordinator.address());
    tokio::spawn(
        async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("poller shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        let snapshot = coordinator.poll().await;
                        info!(status = snapshot.status.as_str(), "scheduled poll complete");
                    }
                }
            }
        }
        .instrument(span),
    )
}
