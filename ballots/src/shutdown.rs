//! Ordered shutdown of a running pipeline.
//!
//! A [Coordinator] waits for a termination signal and then drains up to two
//! independent arms concurrently:
//!
//! - the producer arm stops the event source, closes the ingress queue by
//! dropping its last sender, and waits for the publisher to empty it;
//! - the consumer arm stops the flush timer and the broker subscription.
//!
//! The coordinator returns only once every arm present has finished. There
//! is no drain timeout: a stuck broker holds shutdown up until the process
//! is killed.

use std::{fmt, future::Future};

#[cfg(unix)]
use futures::future::select_all;
use tokio::signal;
use tracing::{error, info};

use crate::{
    counter::FlusherContext,
    publisher::{PublishReport, PublisherContext},
    source::SourceContext,
    transport::Subscription,
};

/// How far the producer arm has got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Running,
    /// Waiting for the event source to stop sending.
    DrainingSource,
    /// Closing the ingress queue.
    DrainingQueue,
    /// Waiting for the publisher to empty the queue and disconnect.
    DrainingPublisher,
    Terminal,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Running => "running",
            Stage::DrainingSource => "draining source",
            Stage::DrainingQueue => "draining queue",
            Stage::DrainingPublisher => "draining publisher",
            Stage::Terminal => "terminal",
        };
        f.write_str(name)
    }
}

/// Event source feeding a publisher through the ingress queue.
#[derive(Debug)]
pub struct ProducerArm {
    pub source: SourceContext,
    pub publisher: PublisherContext,
}

impl ProducerArm {
    async fn drain(self) -> Option<PublishReport> {
        let Self {
            mut source,
            publisher,
        } = self;

        info!(stage = %Stage::DrainingSource, "Stopping event source");
        source.stop();
        let votes = source.stopped().await;

        info!(stage = %Stage::DrainingQueue, "Closing vote queue");
        drop(votes);

        info!(stage = %Stage::DrainingPublisher, "Waiting for publisher");
        match publisher.done().await {
            Ok(report) => Some(report),
            Err(e) => {
                error!("Publisher exited without reporting: {}", e);
                None
            }
        }
    }
}

/// Broker subscription feeding a flushed tally.
#[derive(Debug)]
pub struct ConsumerArm {
    pub flusher: FlusherContext,
    pub subscription: Subscription,
}

impl ConsumerArm {
    async fn drain(self) {
        let Self {
            mut flusher,
            mut subscription,
        } = self;
        info!("Stopping flusher and subscription");
        flusher.stop();
        subscription.stop();
        let (flushed, subscribed) = tokio::join!(flusher.stopped(), subscription.stopped());
        if let Err(e) = flushed {
            error!("Flusher did not stop cleanly: {}", e);
        }
        if let Err(e) = subscribed {
            error!("Subscription did not stop cleanly: {}", e);
        }
    }
}

/// Drains whichever arms it was given once a signal arrives.
#[derive(Debug, Default)]
pub struct Coordinator {
    producer: Option<ProducerArm>,
    consumer: Option<ConsumerArm>,
}

impl Coordinator {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_producer(mut self, source: SourceContext, publisher: PublisherContext) -> Self {
        self.producer = Some(ProducerArm { source, publisher });
        self
    }

    pub fn with_consumer(mut self, flusher: FlusherContext, subscription: Subscription) -> Self {
        self.consumer = Some(ConsumerArm {
            flusher,
            subscription,
        });
        self
    }

    /// Wait for `signal`, then drain both arms. Returns the publisher's
    /// report when there is a producer arm.
    pub async fn run<F: Future<Output = ()>>(self, signal: F) -> Option<PublishReport> {
        info!(stage = %Stage::Running, "Pipeline running");
        signal.await;

        let Self { producer, consumer } = self;
        let producer = async move {
            match producer {
                Some(arm) => arm.drain().await,
                None => None,
            }
        };
        let consumer = async move {
            if let Some(arm) = consumer {
                arm.drain().await;
            }
        };
        let (report, ()) = tokio::join!(producer, consumer);

        info!(stage = %Stage::Terminal, ?report, "Pipeline stopped");
        report
    }
}

/// Signals other than Ctrl+C which end the pipeline. A hangup means the
/// controlling terminal went away, so there is nobody left to stop us.
#[cfg(unix)]
fn unix_signals() -> [(signal::unix::SignalKind, &'static str); 2] {
    use signal::unix::SignalKind;
    [
        (SignalKind::terminate(), "SIGTERM"),
        (SignalKind::hangup(), "SIGHUP"),
    ]
}

/// Wait for SIGINT (Ctrl+C), SIGTERM or SIGHUP.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let other = async {
        let mut waiting = Vec::new();
        for (kind, name) in unix_signals() {
            match signal::unix::signal(kind) {
                Ok(mut sig) => waiting.push(Box::pin(async move {
                    sig.recv().await;
                    name
                })),
                Err(e) => error!("Failed to install {} handler: {}", name, e),
            }
        }
        if waiting.is_empty() {
            return std::future::pending::<&'static str>().await;
        }
        select_all(waiting).await.0
    };

    #[cfg(not(unix))]
    let other = std::future::pending::<&'static str>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        name = other => info!("Received {}, shutting down", name),
    }
}
