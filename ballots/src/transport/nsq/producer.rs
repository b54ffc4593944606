use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::{
    connection::{connect, validate_name, Connection},
    NsqError,
};
use crate::{
    codec::{Command, Frame, OK},
    transport::Producer,
    util::TaskContext,
};

type Reply = oneshot::Sender<Result<(), NsqError>>;

/// A command waiting to be written, and where its response should go.
struct Request {
    command: Command,
    reply: Reply,
}

/// One nsqd connection, owned by a background task which writes requests,
/// hands each response to the oldest request still waiting, and answers
/// heartbeats whether or not anything is being published.
struct LiveConnection {
    requests: mpsc::Sender<Request>,
    task: TaskContext<()>,
}

impl LiveConnection {
    async fn open(addr: &str) -> Result<Self, NsqError> {
        let conn = connect(addr).await?;
        let (requests, rx) = mpsc::channel(1);
        let task = TaskContext::spawn("nsq producer", move |destructor| {
            drive(conn, rx, destructor)
        });
        Ok(Self { requests, task })
    }

    /// Whether the task gave up on the connection.
    fn is_closed(&self) -> bool {
        self.requests.is_closed()
    }

    async fn request(&self, command: Command) -> Result<(), NsqError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request { command, reply })
            .await
            .map_err(|_| NsqError::ConnectionClosed)?;
        response.await.map_err(|_| NsqError::ConnectionClosed)?
    }

    async fn close(mut self) {
        self.task.destruct();
        // failures are logged by the context
        let _ = self.task.finished().await;
    }
}

/// Runs until the connection fails or the destructor fires. Requests still
/// waiting for a response when it returns see
/// [ConnectionClosed](NsqError::ConnectionClosed).
async fn drive(
    mut conn: Connection,
    mut requests: mpsc::Receiver<Request>,
    mut destructor: oneshot::Receiver<()>,
) {
    let mut waiting: VecDeque<Reply> = VecDeque::new();
    loop {
        tokio::select! {
            _ = &mut destructor => {
                debug!("Closing producer connection");
                if let Err(e) = conn.close().await {
                    debug!("Error closing nsqd connection: {}", e);
                }
                return;
            }
            request = requests.recv() => match request {
                Some(Request { command, reply }) => match conn.send(command).await {
                    Ok(()) => waiting.push_back(reply),
                    Err(e) => {
                        let _ = reply.send(Err(e.into()));
                        break;
                    }
                },
                // the producer was dropped
                None => break,
            },
            frame = conn.next() => match frame {
                Some(Ok(frame)) if frame.is_heartbeat() => {
                    debug!("Answering heartbeat");
                    if let Err(e) = conn.send(Command::Nop).await {
                        error!("Failed to answer heartbeat: {}", e);
                        break;
                    }
                }
                Some(Ok(frame)) => {
                    let result = match frame {
                        Frame::Response(data) if data.as_ref() == OK => Ok(()),
                        Frame::Response(data) => Err(NsqError::UnexpectedResponse(
                            String::from_utf8_lossy(&data).into_owned(),
                        )),
                        Frame::Error(data) => {
                            Err(NsqError::Server(String::from_utf8_lossy(&data).into_owned()))
                        }
                        Frame::Message(message) => Err(NsqError::UnexpectedMessage(message.id)),
                    };
                    match waiting.pop_front() {
                        Some(reply) => {
                            let _ = reply.send(result);
                        }
                        None => warn!(?result, "Response from nsqd with nothing waiting for it"),
                    }
                }
                Some(Err(e)) => {
                    warn!("Producer connection failed: {}", e);
                    break;
                }
                None => {
                    warn!("nsqd closed the producer connection");
                    break;
                }
            },
        }
    }
}

/// Publishes over a single nsqd connection, one message at a time.
///
/// Every `PUB` waits for nsqd's `OK`, so once [publish](Producer::publish)
/// returns there is nothing buffered client-side. A connection which was
/// lost is replaced at the start of the next publish.
pub struct NsqProducer {
    addr: String,
    conn: Option<LiveConnection>,
    stopped: bool,
}

impl NsqProducer {
    /// Connect to nsqd. Failing to do so is a setup error for the caller to
    /// deal with.
    pub async fn connect(addr: &str) -> Result<Self, NsqError> {
        let conn = LiveConnection::open(addr).await?;
        info!(addr, "Producer connected to nsqd");
        Ok(Self {
            addr: addr.to_owned(),
            conn: Some(conn),
            stopped: false,
        })
    }

    async fn live_connection(&mut self) -> Result<&LiveConnection, NsqError> {
        if let Some(conn) = self.conn.take() {
            if !conn.is_closed() {
                return Ok(self.conn.insert(conn));
            }
            conn.close().await;
        }
        info!(addr = %self.addr, "Reconnecting producer to nsqd");
        let conn = LiveConnection::open(&self.addr).await?;
        Ok(self.conn.insert(conn))
    }
}

#[async_trait]
impl Producer for NsqProducer {
    type Error = NsqError;

    async fn publish(&mut self, topic: &str, body: Bytes) -> Result<(), Self::Error> {
        validate_name(topic)?;
        if self.stopped {
            return Err(NsqError::Stopped);
        }
        let result = self
            .live_connection()
            .await?
            .request(Command::Pub {
                topic: topic.to_owned(),
                body,
            })
            .await;
        if matches!(
            result,
            Err(NsqError::ConnectionClosed | NsqError::Io(_) | NsqError::Codec(_))
        ) {
            if let Some(conn) = self.conn.take() {
                conn.close().await;
            }
        }
        result
    }

    async fn stop(&mut self) -> Result<(), Self::Error> {
        self.stopped = true;
        if let Some(conn) = self.conn.take() {
            conn.close().await;
        }
        Ok(())
    }
}
