use std::fmt::{self, Display};

/// Errors produced by model constructors and validation routines.
#[derive(Debug)]
pub enum ModelError {
    /// A vote value outside the closed set of choices.
    InvalidChoice(String),
    /// An empty or otherwise unusable voter identity.
    InvalidVoterId(String),
    /// A queue payload that is not a well-formed submission.
    #[cfg(feature = "serde")]
    Decode(serde_json::Error),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::InvalidChoice(raw) => {
                write!(f, "invalid choice: {raw:?}")
            }
            ModelError::InvalidVoterId(raw) => {
                write!(f, "invalid voter id: {raw:?}")
            }
            #[cfg(feature = "serde")]
            ModelError::Decode(err) => write!(f, "malformed submission: {err}"),
        }
    }
}

impl std::error::Error for ModelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            #[cfg(feature = "serde")]
            ModelError::Decode(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(feature = "serde")]
impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Decode(err)
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
