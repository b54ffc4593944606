//! A [Publisher] relays votes from the ingress queue to the broker.
//!
//! The queue is the only thing connecting the event source to the
//! publisher. Its sending half belongs to whoever produces votes, and
//! dropping it is how the publisher learns that no more are coming: it
//! then publishes whatever is still buffered, disconnects from the broker
//! and reports, exactly once, through its [PublisherContext].
//!
//! Example usage:
//!
//! ``` no_run
//! # use ballots::{vote_queue, Publisher};
//! # use ballots::transport::nsq::NsqProducer;
//! #
//! # async fn inner() {
//! let producer = NsqProducer::connect("127.0.0.1:4150").await.unwrap();
//! let (votes, queue) = vote_queue(1024);
//! let publisher = Publisher::new(producer).run(queue);
//!
//! votes.send("yes".to_owned()).await.unwrap();
//! // closing the queue lets the publisher finish
//! drop(votes);
//! let report = publisher.done().await.unwrap();
//! assert_eq!(report.published, 1);
//! # }
//! ```

mod context;

use bytes::Bytes;
pub use context::{PublishReport, PublisherContext};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::{constants::VOTES_TOPIC, transport::Producer};

/// Producer-owned end of the ingress queue.
pub type VoteSender = mpsc::Sender<String>;
/// Publisher-owned end of the ingress queue.
pub type VoteReceiver = mpsc::Receiver<String>;

/// Create the bounded queue between an event source and a [Publisher].
/// Senders wait while it is full.
///
/// # Panics
///
/// If `capacity` is zero.
pub fn vote_queue(capacity: usize) -> (VoteSender, VoteReceiver) {
    mpsc::channel(capacity)
}

pub struct Publisher<P> {
    producer: P,
    topic: String,
}

impl<P: Producer> Publisher<P> {
    /// Create a new instance publishing to the votes topic.
    pub fn new(producer: P) -> Self {
        Self::with_topic(producer, VOTES_TOPIC)
    }

    pub fn with_topic(producer: P, topic: &str) -> Self {
        Self {
            producer,
            topic: topic.to_owned(),
        }
    }

    /// Start draining `queue` in the background.
    pub fn run(self, queue: VoteReceiver) -> PublisherContext {
        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(self.drain(queue, done_tx));
        PublisherContext::new(done_rx)
    }

    /// Publish every vote received, in order, until the queue is closed and
    /// empty. A vote the broker refuses is logged and dropped.
    async fn drain(mut self, mut queue: VoteReceiver, done: oneshot::Sender<PublishReport>) {
        let mut report = PublishReport::default();
        while let Some(vote) = queue.recv().await {
            let body = Bytes::from(vote);
            match self.producer.publish(&self.topic, body.clone()).await {
                Ok(()) => {
                    debug!(vote = %String::from_utf8_lossy(&body), "Published vote");
                    report.published += 1;
                }
                Err(e) => {
                    // TODO: retry with backoff instead of dropping the vote
                    error!(vote = %String::from_utf8_lossy(&body), "Failed to publish vote: {}", e);
                    report.failed += 1;
                }
            }
        }

        info!("Publish queue closed, stopping producer");
        if let Err(e) = self.producer.stop().await {
            error!("Failed to stop producer cleanly: {}", e);
        }
        info!(
            published = report.published,
            failed = report.failed,
            "Publisher stopped"
        );
        if done.send(report).is_err() {
            warn!("Nobody is waiting for the publisher to finish");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{MemoryBroker, ProducerEvent};

    fn publish(vote: &'static str) -> ProducerEvent {
        ProducerEvent::Publish {
            topic: VOTES_TOPIC.to_owned(),
            body: Bytes::from_static(vote.as_bytes()),
        }
    }

    #[tokio::test]
    async fn buffered_votes_are_published_before_done() {
        let broker = MemoryBroker::new();
        let producer = broker.producer();
        let log = producer.log();
        let (votes, queue) = vote_queue(16);
        for vote in ["yes", "no", "yes", "maybe"] {
            votes.send(vote.to_owned()).await.unwrap();
        }
        drop(votes);

        let report = Publisher::new(producer).run(queue).done().await.unwrap();
        assert_eq!(
            report,
            PublishReport {
                published: 4,
                failed: 0
            }
        );
        assert_eq!(
            *log.lock().await,
            vec![
                publish("yes"),
                publish("no"),
                publish("yes"),
                publish("maybe"),
                ProducerEvent::Stop
            ]
        );
    }

    #[tokio::test]
    async fn failed_publishes_are_not_retried() {
        let broker = MemoryBroker::new();
        let producer = broker.producer().refuse("no");
        let log = producer.log();
        let (votes, queue) = vote_queue(4);
        let publisher = Publisher::new(producer).run(queue);
        for vote in ["yes", "no", "yes"] {
            votes.send(vote.to_owned()).await.unwrap();
        }
        drop(votes);

        let report = publisher.done().await.unwrap();
        assert_eq!(report.published, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(log.lock().await.len(), 4);
    }

    #[tokio::test]
    async fn waits_for_the_queue_to_close() {
        let broker = MemoryBroker::new();
        let producer = broker.producer();
        let log = producer.log();
        let (votes, queue) = vote_queue(4);
        let publisher = Publisher::new(producer).run(queue);
        votes.send("yes".to_owned()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        // still connected while the queue is open
        assert_eq!(*log.lock().await, vec![publish("yes")]);

        drop(votes);
        publisher.done().await.unwrap();
        assert_eq!(*log.lock().await, vec![publish("yes"), ProducerEvent::Stop]);
    }
}
