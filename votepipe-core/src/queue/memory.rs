use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::QueueConnection;
use crate::{
    credentials::Credential,
    error::{ConnectError, QueueError},
    link::{Connection, Connector},
};

/// In-process queue for local runs and tests.
///
/// Cloning shares the same underlying list. Taking the queue offline drops
/// every open connection, the way a restarted server would.
#[derive(Debug, Clone)]
pub struct MemoryQueue {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    entries: Mutex<VecDeque<Vec<u8>>>,
    available: AtomicBool,
    epoch: AtomicU64,
    connects: AtomicU64,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(VecDeque::new()),
                available: AtomicBool::new(true),
                epoch: AtomicU64::new(0),
                connects: AtomicU64::new(0),
            }),
        }
    }

    pub fn set_available(&self, available: bool) {
        if !available {
            self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Append a raw entry, bypassing any connection.
    pub fn push_raw(&self, payload: impl Into<Vec<u8>>) {
        self.inner.entries.lock().push_back(payload.into());
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entries(&self) -> Vec<Vec<u8>> {
        self.inner.entries.lock().iter().cloned().collect()
    }

    /// Successful connects so far.
    pub fn connects(&self) -> u64 {
        self.inner.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryQueue {
    type Conn = MemoryQueueConnection;

    fn endpoint(&self) -> String {
        "memory://queue".to_string()
    }

    async fn connect(
        &self,
        _credential: &Credential,
    ) -> Result<MemoryQueueConnection, ConnectError> {
        if !self.inner.available.load(Ordering::SeqCst) {
            return Err(ConnectError::Transport {
                endpoint: self.endpoint(),
                reason: "connection refused".to_string(),
            });
        }
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryQueueConnection {
            queue: self.clone(),
            epoch: self.inner.epoch.load(Ordering::SeqCst),
        })
    }
}

#[derive(Debug)]
pub struct MemoryQueueConnection {
    queue: MemoryQueue,
    epoch: u64,
}

impl MemoryQueueConnection {
    fn check(&self) -> Result<(), QueueError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(QueueError::Disconnected("connection reset".to_string()))
        }
    }
}

#[async_trait]
impl Connection for MemoryQueueConnection {
    fn is_open(&self) -> bool {
        let inner = &self.queue.inner;
        inner.available.load(Ordering::SeqCst)
            && inner.epoch.load(Ordering::SeqCst) == self.epoch
    }

    async fn close(self) {}
}

#[async_trait]
impl QueueConnection for MemoryQueueConnection {
    async fn pop(&mut self) -> Result<Option<Vec<u8>>, QueueError> {
        self.check()?;
        Ok(self.queue.inner.entries.lock().pop_front())
    }

    async fn push(&mut self, payload: &[u8]) -> Result<(), QueueError> {
        self.check()?;
        self.queue.push_raw(payload);
        Ok(())
    }

    async fn ping(&mut self) -> Result<(), QueueError> {
        self.check()
    }
}
