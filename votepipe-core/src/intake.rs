//! Submission intake: validate a choice, attach a voter identity and append
//! the serialized submission to the durable queue.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};
use votepipe_model::{Choice, Submission, VoterId};

use crate::{
    link::{Connector, Link},
    queue::QueueConnection,
};

#[derive(Error, Debug)]
pub enum IntakeError {
    /// Rejected before anything was enqueued.
    #[error("invalid choice {0:?}")]
    InvalidChoice(String),

    /// Transient; the caller may retry.
    #[error("queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("failed to encode submission: {0}")]
    Encode(String),
}

impl IntakeError {
    pub fn is_transient(&self) -> bool {
        matches!(self, IntakeError::QueueUnavailable(_))
    }
}

/// Fault injection for demos and resilience tests, fixed at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IntakeFaults {
    #[default]
    Off,
    /// Every submission fails as if the queue were unreachable.
    RejectSubmissions,
    /// Every submission is delayed before it is enqueued.
    Latency(Duration),
}

/// What was accepted for a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub voter_id: VoterId,
    pub vote: Choice,
    /// Whether a new identity was minted for this request.
    pub minted: bool,
}

/// Object-safe entry point used by the HTTP layer.
#[async_trait]
pub trait SubmissionSink: Send + Sync {
    async fn submit(
        &self,
        raw_choice: &str,
        voter: Option<VoterId>,
    ) -> Result<Receipt, IntakeError>;
}

pub struct Intake<C: Connector> {
    queue: Mutex<Link<C>>,
    faults: IntakeFaults,
}

impl<C: Connector> std::fmt::Debug for Intake<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Intake")
            .field("faults", &self.faults)
            .finish_non_exhaustive()
    }
}

impl<C> Intake<C>
where
    C: Connector,
    C::Conn: QueueConnection,
{
    pub fn new(queue: Link<C>, faults: IntakeFaults) -> Self {
        Self {
            queue: Mutex::new(queue),
            faults,
        }
    }

    pub fn faults(&self) -> IntakeFaults {
        self.faults
    }

    /// Accept one submission. `voter` is the identity from the client's
    /// session, if it has one; otherwise a new identity is minted.
    pub async fn submit(
        &self,
        raw_choice: &str,
        voter: Option<VoterId>,
    ) -> Result<Receipt, IntakeError> {
        let vote = Choice::parse(raw_choice)
            .map_err(|_| IntakeError::InvalidChoice(raw_choice.to_string()))?;
        let (voter_id, minted) = match voter {
            Some(id) => (id, false),
            None => (VoterId::mint(), true),
        };

        match self.faults {
            IntakeFaults::Off => {}
            IntakeFaults::RejectSubmissions => {
                warn!("fault injection active; rejecting submission");
                return Err(IntakeError::QueueUnavailable(
                    "submissions disabled by fault injection".to_string(),
                ));
            }
            IntakeFaults::Latency(delay) => tokio::time::sleep(delay).await,
        }

        let submission = Submission::new(voter_id, vote);
        let payload = submission
            .to_json()
            .map_err(|err| IntakeError::Encode(err.to_string()))?;

        let mut link = self.queue.lock().await;
        let conn = match link.ensure_open().await {
            Ok(conn) => conn,
            Err(err) => {
                warn!(error = %err, "queue connect failed");
                return Err(IntakeError::QueueUnavailable(err.to_string()));
            }
        };
        if let Err(err) = conn.push(&payload).await {
            if err.is_disconnect() {
                link.discard();
            }
            warn!(error = %err, "queue push failed");
            return Err(IntakeError::QueueUnavailable(err.to_string()));
        }

        info!(
            voter_id = %submission.voter_id,
            vote = %submission.vote,
            "submission enqueued"
        );
        Ok(Receipt {
            voter_id: submission.voter_id,
            vote: submission.vote,
            minted,
        })
    }
}

#[async_trait]
impl<C> SubmissionSink for Intake<C>
where
    C: Connector + 'static,
    C::Conn: QueueConnection,
{
    async fn submit(
        &self,
        raw_choice: &str,
        voter: Option<VoterId>,
    ) -> Result<Receipt, IntakeError> {
        Intake::submit(self, raw_choice, voter).await
    }
}
