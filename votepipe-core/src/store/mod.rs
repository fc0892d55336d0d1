//! Relational tally store: one row per voter identity, last write wins.

use std::{fmt, str::FromStr};

use async_trait::async_trait;
use votepipe_model::{AggregateSnapshot, Submission};

use crate::{error::StoreError, link::Connection};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// How a submission is written when the voter may already have a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpsertStrategy {
    /// Plain insert; a unique-key violation falls back to an update. Two
    /// round trips, racy under concurrent writers for the same voter.
    InsertThenUpdate,
    /// Single `INSERT .. ON CONFLICT DO UPDATE` statement.
    #[default]
    OnConflict,
}

impl UpsertStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertStrategy::InsertThenUpdate => "insert-then-update",
            UpsertStrategy::OnConflict => "on-conflict",
        }
    }
}

impl fmt::Display for UpsertStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpsertStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "insert-then-update" | "insert_then_update" => {
                Ok(UpsertStrategy::InsertThenUpdate)
            }
            "on-conflict" | "on_conflict" | "atomic" => {
                Ok(UpsertStrategy::OnConflict)
            }
            other => Err(format!("unknown upsert strategy {other:?}")),
        }
    }
}

/// Result of a successful upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First row for this voter.
    Inserted,
    /// Existing row's choice overwritten.
    Updated,
}

#[async_trait]
pub trait StoreConnection: Connection {
    /// Create the tally table if it does not exist.
    async fn ensure_schema(&mut self) -> Result<(), StoreError>;

    /// Record the submission's choice for its voter, replacing any earlier
    /// choice.
    async fn upsert(
        &mut self,
        submission: &Submission,
    ) -> Result<UpsertOutcome, StoreError>;

    /// Lightweight keep-alive probe.
    async fn ping(&mut self) -> Result<(), StoreError>;

    /// Grouped counts per choice across all rows.
    async fn tally(&mut self) -> Result<AggregateSnapshot, StoreError>;
}
