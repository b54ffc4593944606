//! Event sources feed votes into the ingress queue.
//!
//! A source may be asked to stop at any time. Once it has seen that
//! request it sends nothing more, releases its upstream connection and
//! returns. [SourceContext::stopped] hands the queue's sending half back,
//! so the caller decides when the queue is closed.

#[cfg(any(test, feature = "mocks"))]
pub mod mock;
mod tweets;

use std::{error::Error, io};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot::Receiver;
use tracing::{error, info};
pub use tweets::TweetStreamSource;

use crate::{publisher::VoteSender, util::TaskContext};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("the vote queue was closed")]
    QueueClosed,
    #[error("could not load poll options")]
    Options(#[source] Box<dyn Error + Send + Sync>),
    #[error("io error")]
    Io(#[from] io::Error),
}

/// Something producing votes.
#[async_trait]
pub trait EventSource: Send + 'static {
    /// Send votes to `votes` until the source runs dry or `destructor`
    /// fires. Nothing may be sent after the destructor has been observed.
    async fn produce(
        &mut self,
        votes: &VoteSender,
        destructor: &mut Receiver<()>,
    ) -> Result<(), SourceError>;
}

/// An [EventSource] producing in the background.
#[derive(Debug)]
pub struct SourceContext {
    task: TaskContext<Option<VoteSender>>,
}

impl SourceContext {
    /// Start `source` producing into `votes`.
    pub fn spawn<E: EventSource>(mut source: E, votes: VoteSender) -> Self {
        let task = TaskContext::spawn("source", move |mut destructor| async move {
            match source.produce(&votes, &mut destructor).await {
                Ok(()) => info!("Event source finished"),
                Err(SourceError::QueueClosed) => {
                    error!("Vote queue closed under the event source");
                    return None;
                }
                Err(e) => error!("Event source failed: {}", e),
            }
            Some(votes)
        });
        Self { task }
    }

    /// Ask the source to stop.
    pub fn stop(&mut self) {
        self.task.destruct();
    }

    /// Wait for the source to stop, getting back the queue's sending half
    /// unless it was lost along the way.
    pub async fn stopped(self) -> Option<VoteSender> {
        self.task.finished().await.ok().flatten()
    }
}
