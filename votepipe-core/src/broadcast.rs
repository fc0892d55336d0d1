//! Fan-out of aggregate snapshots to live viewers.

use tokio::sync::broadcast;
use tracing::debug;
use votepipe_model::{AggregateSnapshot, ViewerEvent};

const DEFAULT_CAPACITY: usize = 16;

/// Publish/subscribe channel carrying snapshots to every connected viewer.
///
/// Viewers only ever see snapshots published after they subscribed; there is
/// no replay of history.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<AggregateSnapshot>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Push a snapshot to all current subscribers; returns how many received
    /// it.
    pub fn publish(&self, snapshot: AggregateSnapshot) -> usize {
        self.tx.send(snapshot).unwrap_or(0)
    }

    pub fn subscribe(&self) -> ViewerSubscription {
        ViewerSubscription {
            welcomed: false,
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// One viewer's event stream: a welcome message, then live snapshots.
#[derive(Debug)]
pub struct ViewerSubscription {
    welcomed: bool,
    rx: broadcast::Receiver<AggregateSnapshot>,
}

impl ViewerSubscription {
    /// Next event for this viewer; `None` once the broadcaster is gone.
    pub async fn next(&mut self) -> Option<ViewerEvent> {
        if !self.welcomed {
            self.welcomed = true;
            return Some(ViewerEvent::welcome());
        }
        loop {
            match self.rx.recv().await {
                Ok(snapshot) => return Some(ViewerEvent::Scores(snapshot)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Only the latest counts matter to a viewer.
                    debug!(skipped, "viewer lagged; skipping stale snapshots");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
