use crate::{choice::Choice, ids::VoterId};

/// One accepted client action, as carried on the durable queue.
///
/// Wire format: `{"voter_id": "<token>", "vote": "a"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Submission {
    pub voter_id: VoterId,
    pub vote: Choice,
}

impl Submission {
    pub fn new(voter_id: VoterId, vote: Choice) -> Self {
        Self { voter_id, vote }
    }
}

#[cfg(feature = "serde")]
impl Submission {
    /// Serialize into the queue entry payload.
    pub fn to_json(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a queue entry payload. Unknown vote values, blank voter ids and
    /// non-JSON payloads are all decode failures.
    pub fn from_json(payload: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Persisted per-voter record; `id` is the unique key.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TallyRow {
    pub id: VoterId,
    pub vote: Choice,
}

impl From<Submission> for TallyRow {
    fn from(submission: Submission) -> Self {
        TallyRow {
            id: submission.voter_id,
            vote: submission.vote,
        }
    }
}
