use std::{fmt, str::FromStr};

use crate::error::{ModelError, Result};

/// One of the two ballot options.
///
/// The wire form is the lowercase option key (`"a"` / `"b"`); display labels
/// such as "Cats" or "Dogs" are configuration and never reach the queue or the
/// store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Choice {
    A,
    B,
}

impl Choice {
    pub const ALL: [Choice; 2] = [Choice::A, Choice::B];

    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "a" => Ok(Choice::A),
            "b" => Ok(Choice::B),
            other => Err(ModelError::InvalidChoice(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Choice::A => "a",
            Choice::B => "b",
        }
    }
}

impl FromStr for Choice {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        Choice::parse(s)
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_keys() {
        assert_eq!(Choice::parse("a").unwrap(), Choice::A);
        assert_eq!("b".parse::<Choice>().unwrap(), Choice::B);
    }

    #[test]
    fn rejects_labels_and_case_variants() {
        for raw in ["A", "Cats", "", "c", " a"] {
            assert!(
                matches!(Choice::parse(raw), Err(ModelError::InvalidChoice(_))),
                "{raw:?} should be rejected"
            );
        }
    }
}
