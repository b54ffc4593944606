//! The broker sits between the relay, which publishes each vote, and the
//! counter, which subscribes to them.
//!
//! Votes travel under a single topic as raw option bytes, with no envelope.
//! Delivery is at-least-once and unordered, which is fine: counts are
//! commutative.
//!
//! - [Producer] is the publishing half, owned by a single
//! [Publisher](crate::Publisher) task.
//! - [MessageHandler] is what a subscription invokes for each delivered
//! message, possibly from many tasks at once.
//! - [Subscription] represents a subscription running in the background.

#[cfg(any(test, feature = "mocks"))]
pub mod mock;
pub mod nsq;

use std::error::Error;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{sync::oneshot::Receiver, task::JoinError};

use crate::util::TaskContext;

/// Error returned by a [MessageHandler]; the message will be redelivered.
pub type HandlerError = Box<dyn Error + Send + Sync>;

/// The publishing half of a broker connection.
#[async_trait]
pub trait Producer: Send + 'static {
    /// An error occurring from an operation.
    type Error: Error + Send + Sync + 'static;

    /// Publish a single message, returning once the broker has accepted it.
    async fn publish(&mut self, topic: &str, body: Bytes) -> Result<(), Self::Error>;

    /// Flush anything still buffered client-side and disconnect.
    async fn stop(&mut self) -> Result<(), Self::Error>;
}

/// Invoked once per delivered message.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle_message(&self, body: &[u8]) -> Result<(), HandlerError>;
}

/// A subscription delivering messages to a [MessageHandler] in the
/// background.
///
/// Stopping is cooperative: after [stop](Subscription::stop), the
/// subscription finishes any message it is handling before
/// [stopped](Subscription::stopped) resolves.
#[derive(Debug)]
pub struct Subscription {
    task: TaskContext<()>,
}

impl Subscription {
    pub(crate) fn spawn<F, Fut>(task: F) -> Self
    where
        F: FnOnce(Receiver<()>) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        Self {
            task: TaskContext::spawn("subscription", task),
        }
    }

    /// Ask the subscription to stop receiving messages.
    pub fn stop(&mut self) {
        self.task.destruct();
    }

    /// Wait until all in-flight messages are handled and the connection is
    /// closed.
    pub async fn stopped(self) -> Result<(), JoinError> {
        self.task.finished().await
    }
}
