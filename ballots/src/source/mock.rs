use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::oneshot::Receiver;

use super::{EventSource, SourceError};
use crate::{publisher::VoteSender, util::should_destruct};

/// Emits a fixed list of votes, then finishes.
#[derive(Debug, Clone, Default)]
pub struct IterSource {
    votes: VecDeque<String>,
}

impl IterSource {
    pub fn new<I, T>(votes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            votes: votes.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl EventSource for IterSource {
    async fn produce(
        &mut self,
        votes: &VoteSender,
        destructor: &mut Receiver<()>,
    ) -> Result<(), SourceError> {
        while let Some(vote) = self.votes.pop_front() {
            if should_destruct(destructor) {
                break;
            }
            votes.send(vote).await.map_err(|_| SourceError::QueueClosed)?;
        }
        Ok(())
    }
}
