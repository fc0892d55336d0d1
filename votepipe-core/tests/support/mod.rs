#![allow(dead_code)]

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use anyhow::Result;
use async_trait::async_trait;
use votepipe_core::{
    Credential, CredentialError, CredentialManager, CredentialSource, Link,
    credentials::StaticCredentials,
    queue::MemoryQueue,
    store::MemoryStore,
};
use votepipe_model::{Choice, Submission, VoterId};

pub fn anonymous() -> CredentialManager {
    CredentialManager::fixed(StaticCredentials::anonymous(None))
}

pub fn queue_link(queue: &MemoryQueue) -> Link<MemoryQueue> {
    Link::new("queue", queue.clone(), anonymous())
}

pub fn store_link(store: &MemoryStore) -> Link<MemoryStore> {
    Link::new("store", store.clone(), anonymous())
}

pub fn voter(raw: &str) -> VoterId {
    VoterId::parse(raw).expect("valid voter id")
}

pub fn enqueue(queue: &MemoryQueue, voter_id: &str, vote: Choice) -> Result<()> {
    let payload = Submission::new(voter(voter_id), vote).to_json()?;
    queue.push_raw(payload);
    Ok(())
}

/// Mints a distinct token per call and counts the calls.
#[derive(Debug, Clone, Default)]
pub struct CountingTokens {
    minted: Arc<AtomicU64>,
}

impl CountingTokens {
    pub fn minted(&self) -> u64 {
        self.minted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialSource for CountingTokens {
    fn describe(&self) -> String {
        "counting tokens".to_string()
    }

    async fn mint(&self) -> Result<Credential, CredentialError> {
        let n = self.minted.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Credential::new(Some("worker".to_string()), format!("token-{n}")))
    }
}
