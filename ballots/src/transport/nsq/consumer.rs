use std::{sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use tokio::{sync::oneshot::Receiver, task::JoinSet, time::sleep};
use tracing::{debug, error, info, warn};

use super::{
    connection::{connect, expect_ok, validate_name, Connection},
    NsqError,
};
use crate::{
    codec::{Command, Frame, MessageId, CLOSE_WAIT},
    transport::{HandlerError, MessageHandler, Subscription},
};

/// How long nsqd should hold a message back after a handler failed on it.
const REQUEUE_DELAY: Duration = Duration::from_secs(1);

/// Pause between attempts to resubscribe after losing the connection.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Why a connection stopped being read.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    Stopped,
    Lost,
}

/// A consumer of one topic's channel on a single nsqd.
///
/// A lost connection is replaced, and the subscription renewed, until the
/// consumer is asked to stop.
pub struct NsqConsumer<H> {
    addr: String,
    topic: String,
    channel: String,
    max_in_flight: usize,
    handler: Arc<H>,
}

impl<H: MessageHandler> NsqConsumer<H> {
    /// Subscribe to `topic` on `channel`, allowing up to `max_in_flight`
    /// messages to be handled concurrently, and start consuming in the
    /// background.
    ///
    /// Only the first subscription is reported to the caller. Later ones,
    /// after a lost connection, are retried until stopped.
    pub async fn subscribe(
        addr: &str,
        topic: &str,
        channel: &str,
        max_in_flight: usize,
        handler: Arc<H>,
    ) -> Result<Subscription, NsqError> {
        validate_name(topic)?;
        validate_name(channel)?;
        let consumer = Self {
            addr: addr.to_owned(),
            topic: topic.to_owned(),
            channel: channel.to_owned(),
            max_in_flight,
            handler,
        };
        let conn = consumer.open().await?;
        info!(topic, channel, max_in_flight, "Subscribed to nsqd");

        Ok(Subscription::spawn(move |destructor| {
            consumer.run(conn, destructor)
        }))
    }

    async fn open(&self) -> Result<Connection, NsqError> {
        let mut conn = connect(self.addr.as_str()).await?;
        conn.send(Command::Sub {
            topic: self.topic.clone(),
            channel: self.channel.clone(),
        })
        .await?;
        expect_ok(&mut conn).await?;
        conn.send(Command::Rdy(self.max_in_flight)).await?;
        Ok(conn)
    }

    async fn run(self, mut conn: Connection, mut destructor: Receiver<()>) {
        while self.session(conn, &mut destructor).await == SessionEnd::Lost {
            match self.reconnect(&mut destructor).await {
                Some(next) => conn = next,
                None => break,
            }
        }
        info!("Subscription stopped");
    }

    /// Retry subscribing until it works, or `None` once stopped.
    async fn reconnect(&self, destructor: &mut Receiver<()>) -> Option<Connection> {
        loop {
            tokio::select! {
                _ = &mut *destructor => return None,
                _ = sleep(RECONNECT_DELAY) => {}
            }
            tokio::select! {
                _ = &mut *destructor => return None,
                res = self.open() => match res {
                    Ok(conn) => {
                        info!(topic = %self.topic, channel = %self.channel, "Resubscribed to nsqd");
                        return Some(conn);
                    }
                    Err(e) => warn!("Failed to resubscribe: {}", e),
                },
            }
        }
    }

    /// Handle messages from one connection until it fails or we are
    /// stopped. Stopping sends `CLS`, after which nsqd sends no new messages
    /// and acknowledges with `CLOSE_WAIT`; we keep finishing whatever is in
    /// flight until both have happened.
    async fn session(&self, mut conn: Connection, destructor: &mut Receiver<()>) -> SessionEnd {
        let mut in_flight: JoinSet<(MessageId, Result<(), HandlerError>)> = JoinSet::new();
        let mut closing = false;
        let mut close_acked = false;

        loop {
            if close_acked && in_flight.is_empty() {
                break;
            }
            tokio::select! {
                _ = &mut *destructor, if !closing => {
                    info!("Stopping subscription");
                    closing = true;
                    if let Err(e) = conn.send(Command::Cls).await {
                        error!("Failed to send CLS: {}", e);
                        break;
                    }
                }
                Some(done) = in_flight.join_next(), if !in_flight.is_empty() => {
                    let command = match done {
                        Ok((id, Ok(()))) => Command::Fin(id),
                        Ok((id, Err(e))) => {
                            warn!(%id, "Handler failed, requeueing: {}", e);
                            Command::Req(id, REQUEUE_DELAY)
                        }
                        Err(e) => {
                            // nsqd redelivers it once the message times out
                            error!("Handler task failed: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = conn.send(command).await {
                        error!("Failed to respond to nsqd: {}", e);
                        break;
                    }
                }
                frame = conn.next(), if !close_acked => match frame {
                    Some(Ok(Frame::Message(message))) => {
                        debug!(id = %message.id, attempts = message.attempts, "Received message");
                        let handler = Arc::clone(&self.handler);
                        in_flight.spawn(async move {
                            let result = handler.handle_message(&message.body).await;
                            (message.id, result)
                        });
                    }
                    Some(Ok(frame)) if frame.is_heartbeat() => {
                        if let Err(e) = conn.send(Command::Nop).await {
                            error!("Failed to answer heartbeat: {}", e);
                            break;
                        }
                    }
                    Some(Ok(Frame::Response(data))) if data.as_ref() == CLOSE_WAIT => {
                        debug!("nsqd acknowledged close");
                        close_acked = true;
                    }
                    Some(Ok(Frame::Response(data))) => {
                        debug!("Ignoring response {:?}", data);
                    }
                    Some(Ok(Frame::Error(data))) => {
                        error!("nsqd error: {}", String::from_utf8_lossy(&data));
                    }
                    Some(Err(e)) => {
                        error!("Failed to read from nsqd: {}", e);
                        break;
                    }
                    None => {
                        warn!("nsqd closed the connection");
                        break;
                    }
                },
            }
        }

        // Anything still running can't be acknowledged any more, but let it
        // finish so its side effects are not cut short.
        while in_flight.join_next().await.is_some() {}
        if let Err(e) = conn.close().await {
            debug!("Error closing nsqd connection: {}", e);
        }
        if closing {
            SessionEnd::Stopped
        } else {
            SessionEnd::Lost
        }
    }
}
