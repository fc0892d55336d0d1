use std::{fmt, sync::Arc};

use votepipe_config::BallotConfig;
use votepipe_core::{Broadcaster, SubmissionSink};

use crate::infra::viewers::ViewerRegistry;

/// State shared by the ballot handlers.
#[derive(Clone)]
pub struct VoteState {
    pub intake: Arc<dyn SubmissionSink>,
    pub ballot: Arc<BallotConfig>,
    /// Shown on the page so a client can tell which instance served it.
    pub instance: Arc<str>,
}

impl fmt::Debug for VoteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoteState")
            .field("ballot", &self.ballot)
            .field("instance", &self.instance)
            .finish_non_exhaustive()
    }
}

impl VoteState {
    pub fn new(
        intake: Arc<dyn SubmissionSink>,
        ballot: BallotConfig,
        instance: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            intake,
            ballot: Arc::new(ballot),
            instance: instance.into(),
        }
    }
}

/// State shared by the results handlers.
#[derive(Debug, Clone)]
pub struct ResultState {
    pub broadcaster: Broadcaster,
    pub viewers: ViewerRegistry,
    pub ballot: Arc<BallotConfig>,
}

impl ResultState {
    pub fn new(broadcaster: Broadcaster, ballot: BallotConfig) -> Self {
        Self {
            broadcaster,
            viewers: ViewerRegistry::new(),
            ballot: Arc::new(ballot),
        }
    }
}
