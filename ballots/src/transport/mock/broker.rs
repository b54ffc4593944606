use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex as StdMutex},
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    Mutex,
};
use tracing::{debug, warn};

use super::MockBrokerError;
use crate::transport::{MessageHandler, Producer, Subscription};

type Topic = (UnboundedSender<Bytes>, Option<UnboundedReceiver<Bytes>>);

/// Topics are created on first use. Each topic has a single channel: the
/// first subscriber takes every message, including those published before
/// it subscribed.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    topics: Arc<StdMutex<HashMap<String, Topic>>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Default::default()
    }

    fn sender(&self, topic: &str) -> UnboundedSender<Bytes> {
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics
            .entry(topic.to_owned())
            .or_insert_with(|| {
                let (tx, rx) = unbounded_channel();
                (tx, Some(rx))
            })
            .0
            .clone()
    }

    fn receiver(&self, topic: &str) -> Result<UnboundedReceiver<Bytes>, MockBrokerError> {
        self.sender(topic);
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics
            .get_mut(topic)
            .and_then(|(_, rx)| rx.take())
            .ok_or_else(|| MockBrokerError::AlreadySubscribed(topic.to_owned()))
    }

    /// A new producer publishing to this broker.
    pub fn producer(&self) -> MemoryProducer {
        MemoryProducer {
            broker: self.clone(),
            log: Default::default(),
            refused: Default::default(),
            stopped: false,
        }
    }

    /// Deliver every message published to `topic` to `handler`, one at a
    /// time. Messages the handler fails on go to the back of the topic.
    pub fn subscribe<H: MessageHandler>(
        &self,
        topic: &str,
        handler: Arc<H>,
    ) -> Result<Subscription, MockBrokerError> {
        let mut rx = self.receiver(topic)?;
        let requeue = self.sender(topic);
        Ok(Subscription::spawn(move |mut destructor| async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut destructor => break,
                    body = rx.recv() => {
                        let Some(body) = body else { break };
                        if let Err(e) = handler.handle_message(&body).await {
                            warn!("Handler failed, requeueing: {}", e);
                            let _ = requeue.send(body);
                        }
                    }
                }
            }
            debug!("Memory subscription stopped");
        }))
    }
}

/// Everything a [MemoryProducer] was asked to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProducerEvent {
    Publish { topic: String, body: Bytes },
    Stop,
}

pub type ProducerLog = Arc<Mutex<Vec<ProducerEvent>>>;

/// Records every call, so tests can check what the publisher attempted
/// even when the attempt failed.
#[derive(Debug)]
pub struct MemoryProducer {
    broker: MemoryBroker,
    log: ProducerLog,
    refused: HashSet<Bytes>,
    stopped: bool,
}

impl MemoryProducer {
    /// Fail every publish of `body`.
    pub fn refuse(mut self, body: &'static str) -> Self {
        self.refused.insert(Bytes::from_static(body.as_bytes()));
        self
    }

    /// A handle on the event log which outlives the producer.
    pub fn log(&self) -> ProducerLog {
        Arc::clone(&self.log)
    }
}

#[async_trait]
impl Producer for MemoryProducer {
    type Error = MockBrokerError;

    async fn publish(&mut self, topic: &str, body: Bytes) -> Result<(), Self::Error> {
        self.log.lock().await.push(ProducerEvent::Publish {
            topic: topic.to_owned(),
            body: body.clone(),
        });
        if self.stopped {
            return Err(MockBrokerError::Stopped);
        }
        if self.refused.contains(&body) {
            return Err(MockBrokerError::Refused(
                String::from_utf8_lossy(&body).into_owned(),
            ));
        }
        // the receiver goes away with a stopped subscription
        self.broker
            .sender(topic)
            .send(body)
            .map_err(|_| MockBrokerError::Closed(topic.to_owned()))
    }

    async fn stop(&mut self) -> Result<(), Self::Error> {
        self.log.lock().await.push(ProducerEvent::Stop);
        self.stopped = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::Mutex;

    use super::*;
    use crate::transport::HandlerError;

    #[derive(Default)]
    struct Recorder {
        bodies: Mutex<Vec<Bytes>>,
        fail_first: Mutex<bool>,
    }

    #[async_trait]
    impl MessageHandler for Recorder {
        async fn handle_message(&self, body: &[u8]) -> Result<(), HandlerError> {
            let mut fail = self.fail_first.lock().await;
            if *fail {
                *fail = false;
                return Err("first delivery refused".into());
            }
            self.bodies.lock().await.push(Bytes::copy_from_slice(body));
            Ok(())
        }
    }

    async fn wait_for(handler: &Recorder, n: usize) {
        for _ in 0..100 {
            if handler.bodies.lock().await.len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("handler never saw {n} messages");
    }

    #[tokio::test]
    async fn delivers_messages_published_before_subscribing() {
        let broker = MemoryBroker::new();
        let mut producer = broker.producer();
        producer.publish("votes", Bytes::from("yes")).await.unwrap();
        producer.publish("votes", Bytes::from("no")).await.unwrap();

        let handler = Arc::new(Recorder::default());
        let mut subscription = broker.subscribe("votes", Arc::clone(&handler)).unwrap();
        wait_for(&handler, 2).await;
        subscription.stop();
        subscription.stopped().await.unwrap();
        assert_eq!(
            *handler.bodies.lock().await,
            vec![Bytes::from("yes"), Bytes::from("no")]
        );
    }

    #[tokio::test]
    async fn failed_messages_are_redelivered() {
        let broker = MemoryBroker::new();
        let handler = Arc::new(Recorder {
            fail_first: Mutex::new(true),
            ..Default::default()
        });
        let mut subscription = broker.subscribe("votes", Arc::clone(&handler)).unwrap();
        let mut producer = broker.producer();
        producer.publish("votes", Bytes::from("yes")).await.unwrap();
        wait_for(&handler, 1).await;
        subscription.stop();
        subscription.stopped().await.unwrap();
        assert_eq!(*handler.bodies.lock().await, vec![Bytes::from("yes")]);
    }

    #[tokio::test]
    async fn single_subscriber_per_topic() {
        let broker = MemoryBroker::new();
        let handler = Arc::new(Recorder::default());
        let _subscription = broker.subscribe("votes", Arc::clone(&handler)).unwrap();
        assert!(matches!(
            broker.subscribe("votes", handler),
            Err(MockBrokerError::AlreadySubscribed(_))
        ));
    }

    #[tokio::test]
    async fn publish_after_subscription_stopped_fails() {
        let broker = MemoryBroker::new();
        let mut subscription = broker
            .subscribe("votes", Arc::new(Recorder::default()))
            .unwrap();
        subscription.stop();
        subscription.stopped().await.unwrap();

        let mut producer = broker.producer();
        assert!(matches!(
            producer.publish("votes", Bytes::from("yes")).await,
            Err(MockBrokerError::Closed(topic)) if topic == "votes"
        ));
    }

    #[tokio::test]
    async fn producer_records_every_attempt() {
        let broker = MemoryBroker::new();
        let mut producer = broker.producer().refuse("no");
        let log = producer.log();
        producer.publish("votes", Bytes::from("yes")).await.unwrap();
        assert!(producer.publish("votes", Bytes::from("no")).await.is_err());
        producer.stop().await.unwrap();
        assert!(producer.publish("votes", Bytes::from("yes")).await.is_err());
        assert_eq!(
            *log.lock().await,
            vec![
                ProducerEvent::Publish {
                    topic: "votes".into(),
                    body: Bytes::from("yes")
                },
                ProducerEvent::Publish {
                    topic: "votes".into(),
                    body: Bytes::from("no")
                },
                ProducerEvent::Stop,
                ProducerEvent::Publish {
                    topic: "votes".into(),
                    body: Bytes::from("yes")
                },
            ]
        );
    }
}
