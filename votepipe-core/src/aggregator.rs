//! Periodic tally of the store, pushed to every live viewer.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use votepipe_model::AggregateSnapshot;

use crate::{
    broadcast::Broadcaster,
    link::{Connector, Link},
    store::StoreConnection,
};

pub const DEFAULT_AGGREGATE_INTERVAL: Duration = Duration::from_secs(1);

pub struct Aggregator<S: Connector> {
    store: Link<S>,
    broadcaster: Broadcaster,
    interval: Duration,
}

impl<S: Connector> std::fmt::Debug for Aggregator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("store", &self.store)
            .field("interval", &self.interval)
            .field("viewers", &self.broadcaster.subscriber_count())
            .finish()
    }
}

impl<S> Aggregator<S>
where
    S: Connector,
    S::Conn: StoreConnection,
{
    pub fn new(store: Link<S>, broadcaster: Broadcaster, interval: Duration) -> Self {
        Self {
            store,
            broadcaster,
            interval,
        }
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn store_link(&self) -> &Link<S> {
        &self.store
    }

    /// Query the grouped counts once and publish them. Any failure skips this
    /// cycle; the next cycle tries again with a fresh connection.
    pub async fn tick(&mut self) -> Option<AggregateSnapshot> {
        if let Err(err) = self.store.refresh_credentials_if_due().await {
            warn!(error = %err, "store credential refresh failed");
        }

        let result = match self.store.ensure_open().await {
            Ok(conn) => conn.tally().await,
            Err(err) => {
                warn!(error = %err, "store unavailable; skipping aggregate");
                return None;
            }
        };

        match result {
            Ok(snapshot) => {
                let viewers = self.broadcaster.publish(snapshot.clone());
                debug!(
                    total = snapshot.total(),
                    viewers, "published aggregate"
                );
                Some(snapshot)
            }
            Err(err) => {
                warn!(error = %err, "aggregate query failed; skipping");
                if err.is_auth() {
                    self.store.invalidate_credentials();
                }
                if err.is_disconnect() {
                    self.store.discard();
                }
                None
            }
        }
    }

    pub async fn run(&mut self, cancel: CancellationToken) {
        info!(
            store = %self.store.connector().endpoint(),
            interval_ms = self.interval.as_millis() as u64,
            "aggregator starting"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.tick().await;
        }

        self.store.disconnect().await;
        info!("aggregator stopped");
    }
}
