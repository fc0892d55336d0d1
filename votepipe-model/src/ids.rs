use std::fmt;

use uuid::Uuid;

use crate::error::{ModelError, Result};

/// Opaque per-client identity token carried in the `voter_id` cookie.
///
/// Tokens are minted once per browser session and reused for every later
/// submission from that session, which is what makes the store's
/// last-write-wins keying meaningful.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(try_from = "String", into = "String")
)]
pub struct VoterId(String);

impl VoterId {
    /// Longest accepted identity, in bytes. Matches the width of the tally
    /// table's key column.
    pub const MAX_LEN: usize = 255;

    /// Mint a fresh random identity (128 random bits, hex encoded).
    pub fn mint() -> Self {
        VoterId(Uuid::new_v4().simple().to_string())
    }

    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() || raw.len() > Self::MAX_LEN {
            return Err(ModelError::InvalidVoterId(raw));
        }
        Ok(VoterId(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for VoterId {
    type Error = ModelError;

    fn try_from(raw: String) -> Result<Self> {
        VoterId::parse(raw)
    }
}

impl From<VoterId> for String {
    fn from(id: VoterId) -> Self {
        id.0
    }
}

impl AsRef<str> for VoterId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VoterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_ids_are_distinct_hex_tokens() {
        let first = VoterId::mint();
        let second = VoterId::mint();
        assert_ne!(first, second);
        assert_eq!(first.as_str().len(), 32);
        assert!(first.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn blank_ids_are_rejected() {
        assert!(VoterId::parse("").is_err());
        assert!(VoterId::parse("   ").is_err());
        assert_eq!(VoterId::parse("abc").unwrap().as_str(), "abc");
    }

    #[test]
    fn ids_longer_than_the_key_column_are_rejected() {
        let widest = "v".repeat(VoterId::MAX_LEN);
        assert_eq!(VoterId::parse(widest.clone()).unwrap().as_str(), widest);

        let too_long = "v".repeat(VoterId::MAX_LEN + 1);
        assert!(matches!(
            VoterId::parse(too_long),
            Err(ModelError::InvalidVoterId(_))
        ));
    }
}
