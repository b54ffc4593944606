//! [PublisherContext] is the public interface to a [Publisher] draining in
//! the background. Its only job is to tell the owner when the publisher is
//! done, which happens once the ingress queue has been closed and emptied.
//!
//! [Publisher]: super::Publisher

use tokio::sync::oneshot::{error::RecvError, Receiver};

/// How a publisher's run went.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    /// Votes the broker accepted.
    pub published: usize,
    /// Votes the broker refused. These are lost.
    pub failed: usize,
}

/// Represents a publisher draining its queue in the background.
#[derive(Debug)]
pub struct PublisherContext {
    done: Receiver<PublishReport>,
}

impl PublisherContext {
    pub(super) fn new(done: Receiver<PublishReport>) -> Self {
        Self { done }
    }

    /// Wait for the publisher to drain the queue and disconnect. An error
    /// means the publisher task died without reporting.
    pub async fn done(self) -> Result<PublishReport, RecvError> {
        self.done.await
    }
}
