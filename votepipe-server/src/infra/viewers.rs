use dashmap::DashMap;
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::time::Instant;
use uuid::Uuid;

/// One connected results viewer.
#[derive(Debug)]
pub struct Viewer {
    pub id: Uuid,
    pub connected_at: Instant,
    delivered: AtomicU64,
}

impl Viewer {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            connected_at: Instant::now(),
            delivered: AtomicU64::new(0),
        }
    }

    pub fn record_delivery(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Events pushed to this viewer so far, welcome included.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

impl Default for Viewer {
    fn default() -> Self {
        Self::new()
    }
}

/// Live WebSocket viewers keyed by connection ID.
#[derive(Clone, Default)]
pub struct ViewerRegistry {
    viewers: Arc<DashMap<Uuid, Arc<Viewer>>>,
}

impl fmt::Debug for ViewerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewerRegistry")
            .field("viewer_count", &self.viewers.len())
            .finish()
    }
}

impl ViewerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new viewer
    pub fn add(&self) -> Arc<Viewer> {
        let viewer = Arc::new(Viewer::new());
        self.viewers.insert(viewer.id, Arc::clone(&viewer));
        viewer
    }

    pub fn remove(&self, id: &Uuid) -> Option<Arc<Viewer>> {
        self.viewers.remove(id).map(|(_, viewer)| viewer)
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<Viewer>> {
        self.viewers.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn count(&self) -> usize {
        self.viewers.len()
    }
}
