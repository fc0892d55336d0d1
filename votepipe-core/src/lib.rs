//! # votepipe-core
//!
//! The submission pipeline: intake pushes submissions onto a durable queue,
//! the worker drains the queue into the tally store, and the aggregator
//! periodically broadcasts grouped counts to live viewers.
//!
//! Both network endpoints (queue and store) are reached through a [`Link`],
//! which owns the live connection together with the credential used to open
//! it. Concrete backends exist for Redis and PostgreSQL, plus in-process
//! backends for local runs and tests.

#![allow(missing_docs)]

pub mod aggregator;
pub mod broadcast;
pub mod credentials;
pub mod error;
pub mod intake;
pub mod link;
pub mod queue;
pub mod retry;
pub mod store;
pub mod worker;

pub use aggregator::Aggregator;
pub use broadcast::{Broadcaster, ViewerSubscription};
pub use credentials::{Credential, CredentialManager, CredentialSource};
pub use error::{ConnectError, CredentialError, QueueError, StoreError};
pub use intake::{Intake, IntakeError, IntakeFaults, Receipt, SubmissionSink};
pub use link::{Connection, Connector, DEFAULT_CONNECT_TIMEOUT, Link};
pub use queue::QueueConnection;
pub use retry::{Backoff, Cancelled, RetryPolicy};
pub use store::{StoreConnection, UpsertOutcome, UpsertStrategy};
pub use worker::{
    DropReason, TickOutcome, Worker, WorkerSettings, WorkerState, WorkerStats,
};

pub use votepipe_model as model;
