//! Worker consumer: drains the durable queue into the tally store.
//!
//! Each tick runs, in order:
//! 1. queue health check (reconnect; on failure wait the reconnect backoff),
//! 2. proactive credential refresh for any link using expiring tokens,
//! 3. a non-blocking pop (empty queue sends a keep-alive to the store),
//! 4. the store write.
//!
//! The loop is single-threaded, so submissions are applied in pop order and
//! a later submission for a voter always overwrites an earlier one. A
//! submission popped while the store cannot be reached is dropped, not
//! re-queued.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use votepipe_model::Submission;

use crate::{
    link::{Connector, Link},
    queue::QueueConnection,
    retry::{Backoff, RetryPolicy},
    store::{StoreConnection, UpsertOutcome},
};

/// Connectivity of the worker's two links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Neither link is open.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Queue and store are both open.
    Connected,
    /// Exactly one of the two links is open.
    Degraded,
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Fixed period of the drain loop.
    pub poll_interval: Duration,
    /// Wait after a failed queue reconnect.
    pub queue_reconnect: RetryPolicy,
    /// Schedule for the blocking store open at startup.
    pub store_open: RetryPolicy,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            queue_reconnect: RetryPolicy::fixed(Duration::from_secs(1)),
            store_open: RetryPolicy::fixed(Duration::from_secs(1)),
        }
    }
}

/// Why a popped entry was not written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The payload could not be decoded into a submission.
    Malformed,
    /// The store link was down and could not be reopened.
    StoreUnavailable,
    /// The store link was up but the write failed.
    WriteFailed,
}

/// Result of a single loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The queue could not be reached; wait `retry_in` before the next tick.
    QueueUnavailable { retry_in: Duration },
    /// The queue was empty.
    Idle,
    Written(UpsertOutcome),
    Dropped(DropReason),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub written: u64,
    pub malformed: u64,
    /// Submissions popped but never written because of a store failure.
    pub lost: u64,
    pub keep_alives: u64,
    pub credential_refreshes: u64,
    pub queue_reconnects: u64,
}

pub struct Worker<Q: Connector, S: Connector> {
    queue: Link<Q>,
    store: Link<S>,
    settings: WorkerSettings,
    state: WorkerState,
    queue_backoff: Backoff,
    stats: WorkerStats,
}

impl<Q: Connector, S: Connector> std::fmt::Debug for Worker<Q, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("queue", &self.queue)
            .field("store", &self.store)
            .field("state", &self.state)
            .field("stats", &self.stats)
            .finish()
    }
}

impl<Q, S> Worker<Q, S>
where
    Q: Connector,
    Q::Conn: QueueConnection,
    S: Connector,
    S::Conn: StoreConnection,
{
    pub fn new(queue: Link<Q>, store: Link<S>, settings: WorkerSettings) -> Self {
        let queue_backoff = settings.queue_reconnect.backoff();
        Self {
            queue,
            store,
            settings,
            state: WorkerState::Disconnected,
            queue_backoff,
            stats: WorkerStats::default(),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats
    }

    pub fn queue_link(&self) -> &Link<Q> {
        &self.queue
    }

    pub fn store_link(&self) -> &Link<S> {
        &self.store
    }

    fn set_state(&mut self, next: WorkerState) {
        if self.state != next {
            info!(from = ?self.state, to = ?next, "worker state changed");
            self.state = next;
        }
    }

    fn sync_state(&mut self) {
        let next = match (self.queue.is_open(), self.store.is_open()) {
            (true, true) => WorkerState::Connected,
            (false, false) => WorkerState::Disconnected,
            _ => WorkerState::Degraded,
        };
        self.set_state(next);
    }

    /// Run one iteration of the drain loop.
    pub async fn tick(&mut self) -> TickOutcome {
        if !self.queue.is_open() {
            self.set_state(WorkerState::Connecting);
            match self.queue.ensure_open().await.map(|_| ()) {
                Ok(()) => {
                    self.queue_backoff.reset();
                    self.stats.queue_reconnects += 1;
                }
                Err(err) => {
                    let retry_in = self.queue_backoff.next_delay();
                    warn!(
                        error = %err,
                        retry_in_ms = retry_in.as_millis() as u64,
                        "queue unavailable"
                    );
                    self.sync_state();
                    return TickOutcome::QueueUnavailable { retry_in };
                }
            }
        }

        self.refresh_credentials().await;
        self.sync_state();

        let popped = match self.queue.connection_mut() {
            Some(conn) => conn.pop().await,
            None => return self.queue_lost("queue connection closed"),
        };

        match popped {
            Ok(None) => {
                self.keep_alive().await;
                TickOutcome::Idle
            }
            Ok(Some(payload)) => match Submission::from_json(&payload) {
                Ok(submission) => self.write(submission).await,
                Err(err) => {
                    warn!(
                        error = %err,
                        payload = %String::from_utf8_lossy(&payload),
                        "dropping malformed queue entry"
                    );
                    self.stats.malformed += 1;
                    TickOutcome::Dropped(DropReason::Malformed)
                }
            },
            Err(err) => {
                if err.is_disconnect() {
                    self.queue.discard();
                }
                self.queue_lost(&err.to_string())
            }
        }
    }

    fn queue_lost(&mut self, reason: &str) -> TickOutcome {
        let retry_in = self.queue_backoff.next_delay();
        warn!(reason, "lost queue connection");
        self.sync_state();
        TickOutcome::QueueUnavailable { retry_in }
    }

    async fn refresh_credentials(&mut self) {
        match self.store.refresh_credentials_if_due().await {
            Ok(true) => self.stats.credential_refreshes += 1,
            Ok(false) => {}
            Err(err) => {
                warn!(error = %err, "store credential refresh failed");
            }
        }
        match self.queue.refresh_credentials_if_due().await {
            Ok(true) => self.stats.credential_refreshes += 1,
            Ok(false) => {}
            Err(err) => {
                warn!(error = %err, "queue credential refresh failed");
            }
        }
    }

    /// Probe the store while idle so a silently dropped connection is noticed
    /// before the next real write.
    async fn keep_alive(&mut self) {
        if !self.store.is_open() {
            if let Err(err) = self.store.ensure_open().await.map(|_| ()) {
                debug!(error = %err, "store still unavailable");
            }
            self.sync_state();
            return;
        }

        self.stats.keep_alives += 1;
        let result = match self.store.connection_mut() {
            Some(conn) => conn.ping().await,
            None => return,
        };
        if let Err(err) = result {
            warn!(error = %err, "store keep-alive failed");
            if err.is_auth() {
                self.store.invalidate_credentials();
            }
            self.store.discard();
            self.sync_state();
        }
    }

    async fn write(&mut self, submission: Submission) -> TickOutcome {
        if !self.store.is_open() {
            warn!("store connection not open; reconnecting");
            if let Err(err) = self.store.ensure_open().await.map(|_| ()) {
                error!(
                    error = %err,
                    voter_id = %submission.voter_id,
                    vote = %submission.vote,
                    "store unavailable; submission lost"
                );
                self.stats.lost += 1;
                self.sync_state();
                return TickOutcome::Dropped(DropReason::StoreUnavailable);
            }
            self.sync_state();
        }

        let result = match self.store.connection_mut() {
            Some(conn) => conn.upsert(&submission).await,
            None => {
                self.stats.lost += 1;
                return TickOutcome::Dropped(DropReason::StoreUnavailable);
            }
        };

        match result {
            Ok(outcome) => {
                self.stats.written += 1;
                debug!(
                    voter_id = %submission.voter_id,
                    vote = %submission.vote,
                    ?outcome,
                    "recorded submission"
                );
                TickOutcome::Written(outcome)
            }
            Err(err) => {
                error!(
                    error = %err,
                    voter_id = %submission.voter_id,
                    "store write failed; submission lost"
                );
                if err.is_auth() {
                    self.store.invalidate_credentials();
                }
                if err.is_disconnect() {
                    self.store.discard();
                }
                self.stats.lost += 1;
                self.sync_state();
                TickOutcome::Dropped(DropReason::WriteFailed)
            }
        }
    }

    /// Open the store (blocking until it accepts a connection), then drain
    /// the queue on a fixed period until `cancel` fires.
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!(
            queue = %self.queue.connector().endpoint(),
            store = %self.store.connector().endpoint(),
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            "worker starting"
        );

        self.set_state(WorkerState::Connecting);
        let store_open = self.settings.store_open.clone();
        if self.store.open_blocking(&store_open, &cancel).await.is_err() {
            info!("worker cancelled before store became available");
            return;
        }
        self.sync_state();

        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let TickOutcome::QueueUnavailable { retry_in } = self.tick().await {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(retry_in) => {}
                }
            }
        }

        self.queue.disconnect().await;
        self.store.disconnect().await;
        self.set_state(WorkerState::Disconnected);
        info!(stats = ?self.stats, "worker stopped");
    }
}
