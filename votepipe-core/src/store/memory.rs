use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use votepipe_model::{AggregateSnapshot, Choice, Submission, TallyRow, VoterId};

use super::{StoreConnection, UpsertOutcome};
use crate::{
    credentials::Credential,
    error::{ConnectError, StoreError},
    link::{Connection, Connector},
};

/// In-process tally table for local runs and tests.
///
/// Cloning shares the same table. The store can be taken offline (closing
/// every open connection) and can enforce a token lifetime, rejecting
/// operations on connections whose credential has aged past it.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    rows: Mutex<BTreeMap<VoterId, Choice>>,
    available: AtomicBool,
    epoch: AtomicU64,
    token_lifetime: Mutex<Option<Duration>>,
    required_secret: Mutex<Option<String>>,
    connects: AtomicU64,
    pings: AtomicU64,
    writes: AtomicU64,
    schema_checks: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                rows: Mutex::new(BTreeMap::new()),
                available: AtomicBool::new(true),
                epoch: AtomicU64::new(0),
                token_lifetime: Mutex::new(None),
                required_secret: Mutex::new(None),
                connects: AtomicU64::new(0),
                pings: AtomicU64::new(0),
                writes: AtomicU64::new(0),
                schema_checks: AtomicU64::new(0),
            }),
        }
    }

    pub fn set_available(&self, available: bool) {
        if !available {
            self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Reject operations on connections whose credential is older than
    /// `lifetime`, as a server validating short-lived tokens would.
    pub fn enforce_token_lifetime(&self, lifetime: Duration) {
        *self.inner.token_lifetime.lock() = Some(lifetime);
    }

    /// Only accept connections presenting this secret.
    pub fn require_secret(&self, secret: impl Into<String>) {
        *self.inner.required_secret.lock() = Some(secret.into());
    }

    pub fn rows(&self) -> Vec<TallyRow> {
        self.inner
            .rows
            .lock()
            .iter()
            .map(|(id, vote)| TallyRow {
                id: id.clone(),
                vote: *vote,
            })
            .collect()
    }

    pub fn vote_of(&self, voter: &VoterId) -> Option<Choice> {
        self.inner.rows.lock().get(voter).copied()
    }

    /// Seed a row directly, bypassing any connection.
    pub fn insert_row(&self, row: TallyRow) {
        self.inner.rows.lock().insert(row.id, row.vote);
    }

    pub fn connects(&self) -> u64 {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> u64 {
        self.inner.pings.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> u64 {
        self.inner.writes.load(Ordering::SeqCst)
    }

    pub fn schema_checks(&self) -> u64 {
        self.inner.schema_checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryStore {
    type Conn = MemoryStoreConnection;

    fn endpoint(&self) -> String {
        "memory://store".to_string()
    }

    async fn connect(
        &self,
        credential: &Credential,
    ) -> Result<MemoryStoreConnection, ConnectError> {
        if !self.inner.available.load(Ordering::SeqCst) {
            return Err(ConnectError::Transport {
                endpoint: self.endpoint(),
                reason: "connection refused".to_string(),
            });
        }
        if let Some(required) = self.inner.required_secret.lock().as_deref()
            && credential.secret() != Some(required)
        {
            return Err(ConnectError::Auth {
                endpoint: self.endpoint(),
                reason: "password authentication failed".to_string(),
            });
        }

        let mut conn = MemoryStoreConnection {
            store: self.clone(),
            epoch: self.inner.epoch.load(Ordering::SeqCst),
            credential_minted_at: credential.minted_at(),
            closed: false,
        };
        if let Err(err) = conn.check() {
            return Err(ConnectError::Auth {
                endpoint: self.endpoint(),
                reason: err.to_string(),
            });
        }
        conn.ensure_schema()
            .await
            .map_err(|err| ConnectError::NotReady {
                endpoint: self.endpoint(),
                reason: err.to_string(),
            })?;
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        Ok(conn)
    }
}

#[derive(Debug)]
pub struct MemoryStoreConnection {
    store: MemoryStore,
    epoch: u64,
    credential_minted_at: Instant,
    closed: bool,
}

impl MemoryStoreConnection {
    fn check(&self) -> Result<(), StoreError> {
        if !self.is_open() {
            return Err(StoreError::Disconnected(
                "server closed the connection unexpectedly".to_string(),
            ));
        }
        if let Some(lifetime) = *self.store.inner.token_lifetime.lock()
            && self.credential_minted_at.elapsed() > lifetime
        {
            return Err(StoreError::Auth("token expired".to_string()));
        }
        Ok(())
    }

    fn guard(&mut self) -> Result<(), StoreError> {
        let checked = self.check();
        if let Err(StoreError::Auth(_)) = &checked {
            self.closed = true;
        }
        checked
    }
}

#[async_trait]
impl Connection for MemoryStoreConnection {
    fn is_open(&self) -> bool {
        let inner = &self.store.inner;
        !self.closed
            && inner.available.load(Ordering::SeqCst)
            && inner.epoch.load(Ordering::SeqCst) == self.epoch
    }

    async fn close(self) {}
}

#[async_trait]
impl StoreConnection for MemoryStoreConnection {
    async fn ensure_schema(&mut self) -> Result<(), StoreError> {
        self.guard()?;
        self.store.inner.schema_checks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn upsert(
        &mut self,
        submission: &Submission,
    ) -> Result<UpsertOutcome, StoreError> {
        self.guard()?;
        let previous = self
            .store
            .inner
            .rows
            .lock()
            .insert(submission.voter_id.clone(), submission.vote);
        let outcome = match previous {
            None => UpsertOutcome::Inserted,
            Some(_) => UpsertOutcome::Updated,
        };
        self.store.inner.writes.fetch_add(1, Ordering::SeqCst);
        Ok(outcome)
    }

    async fn ping(&mut self) -> Result<(), StoreError> {
        self.guard()?;
        self.store.inner.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn tally(&mut self) -> Result<AggregateSnapshot, StoreError> {
        self.guard()?;
        let rows = self.store.rows();
        Ok(AggregateSnapshot::from_rows(&rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(voter: &str, vote: Choice) -> Submission {
        Submission::new(VoterId::parse(voter).unwrap(), vote)
    }

    #[tokio::test]
    async fn later_writes_override_earlier_ones() {
        let store = MemoryStore::new();
        let mut conn = store.connect(&Credential::anonymous(None)).await.unwrap();
        assert_eq!(
            conn.upsert(&submission("abc", Choice::A)).await.unwrap(),
            UpsertOutcome::Inserted
        );
        assert_eq!(
            conn.upsert(&submission("abc", Choice::B)).await.unwrap(),
            UpsertOutcome::Updated
        );
        assert_eq!(store.rows().len(), 1);
        assert_eq!(
            store.vote_of(&VoterId::parse("abc").unwrap()),
            Some(Choice::B)
        );
    }

    #[tokio::test]
    async fn wrong_secret_is_an_auth_error() {
        let store = MemoryStore::new();
        store.require_secret("right");
        let err = store
            .connect(&Credential::new(None, "wrong"))
            .await
            .unwrap_err();
        assert!(err.is_auth());
        assert!(store.connect(&Credential::new(None, "right")).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn aged_tokens_are_rejected() {
        let store = MemoryStore::new();
        store.enforce_token_lifetime(Duration::from_secs(600));
        let mut conn = store.connect(&Credential::new(None, "t")).await.unwrap();
        tokio::time::advance(Duration::from_secs(601)).await;
        let err = conn.ping().await.unwrap_err();
        assert!(err.is_auth());
        assert!(!conn.is_open());
    }
}
