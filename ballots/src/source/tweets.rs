use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tokio::{
    net::TcpStream,
    sync::oneshot::Receiver,
    time::{sleep, sleep_until, Instant},
};
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, info, warn};

use super::{EventSource, SourceError};
use crate::{persistence::PollStore, publisher::VoteSender};

/// Longest line accepted from the stream. Anything longer is an error and
/// the connection is cycled.
const MAX_LINE_LENGTH: usize = 64 * 1024;
/// How long to wait before trying again after failing to connect.
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// The part of a streamed status update we care about.
#[derive(Debug, Deserialize)]
struct Tweet {
    text: String,
}

/// Reads newline-delimited JSON status updates from a TCP stream and
/// emits a vote for every poll option mentioned in each one.
///
/// Matching ignores case, but the vote carries the option exactly as the
/// poll spells it. The connection is closed and reopened every
/// `reconnect_interval`, and whenever the upstream ends or misbehaves.
#[derive(Debug)]
pub struct TweetStreamSource {
    addr: String,
    /// (option as stored, lowercased option)
    options: Vec<(String, String)>,
    reconnect_interval: Duration,
}

impl TweetStreamSource {
    pub fn new(addr: &str, options: Vec<String>, reconnect_interval: Duration) -> Self {
        let options = options
            .into_iter()
            .map(|o| {
                let lower = o.to_lowercase();
                (o, lower)
            })
            .collect();
        Self {
            addr: addr.to_owned(),
            options,
            reconnect_interval,
        }
    }

    /// Track every option any poll in `store` offers.
    pub async fn from_store<S: PollStore>(
        addr: &str,
        store: &S,
        reconnect_interval: Duration,
    ) -> Result<Self, SourceError> {
        let options = store
            .options()
            .await
            .map_err(|e| SourceError::Options(Box::new(e)))?;
        info!(options = options.len(), "Loaded poll options");
        Ok(Self::new(addr, options, reconnect_interval))
    }

    /// Options mentioned in a line of the stream.
    fn votes_in(&self, line: &str) -> Vec<String> {
        if line.trim().is_empty() {
            // keep-alive
            return Vec::new();
        }
        let tweet: Tweet = match serde_json::from_str(line) {
            Ok(tweet) => tweet,
            Err(e) => {
                debug!("Skipping unreadable line: {}", e);
                return Vec::new();
            }
        };
        let text = tweet.text.to_lowercase();
        self.options
            .iter()
            .filter(|(_, lower)| text.contains(lower.as_str()))
            .map(|(option, _)| option.clone())
            .collect()
    }
}

#[async_trait]
impl EventSource for TweetStreamSource {
    async fn produce(
        &mut self,
        votes: &VoteSender,
        destructor: &mut Receiver<()>,
    ) -> Result<(), SourceError> {
        loop {
            let stream = tokio::select! {
                _ = &mut *destructor => return Ok(()),
                stream = TcpStream::connect(&self.addr) => stream,
            };
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(addr = %self.addr, "Failed to connect to the vote stream: {}", e);
                    tokio::select! {
                        _ = &mut *destructor => return Ok(()),
                        _ = sleep(RETRY_DELAY) => continue,
                    }
                }
            };
            info!(addr = %self.addr, "Reading the vote stream");

            let mut lines =
                FramedRead::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
            let deadline = Instant::now() + self.reconnect_interval;
            loop {
                tokio::select! {
                    _ = &mut *destructor => {
                        info!("Closing the vote stream");
                        return Ok(());
                    }
                    _ = sleep_until(deadline) => {
                        debug!("Cycling the vote stream connection");
                        break;
                    }
                    line = lines.next() => match line {
                        Some(Ok(line)) => {
                            for vote in self.votes_in(&line) {
                                debug!(vote = %vote, "Vote");
                                votes.send(vote).await.map_err(|_| SourceError::QueueClosed)?;
                            }
                        }
                        Some(Err(e)) => {
                            warn!("Vote stream error: {}", e);
                            break;
                        }
                        None => {
                            info!("Vote stream ended");
                            break;
                        }
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::{io::AsyncWriteExt, net::TcpListener, sync::oneshot};

    use super::*;
    use crate::{
        persistence::mock::MockPollStore,
        publisher::vote_queue,
        source::SourceContext,
    };

    fn source(options: &[&str]) -> TweetStreamSource {
        TweetStreamSource::new(
            "127.0.0.1:0",
            options.iter().map(|o| o.to_string()).collect(),
            Duration::from_secs(60),
        )
    }

    #[test]
    fn matches_options_ignoring_case() {
        let source = source(&["Yes", "no", "maybe"]);
        assert_eq!(
            source.votes_in(r#"{"text": "YES and No, definitely"}"#),
            vec!["Yes", "no"]
        );
        assert!(source.votes_in(r#"{"text": "something else"}"#).is_empty());
    }

    #[test]
    fn skips_keep_alives_and_garbage() {
        let source = source(&["yes"]);
        assert!(source.votes_in("").is_empty());
        assert!(source.votes_in("   ").is_empty());
        assert!(source.votes_in("yes").is_empty());
        assert!(source.votes_in(r#"{"id": 1}"#).is_empty());
    }

    #[tokio::test]
    async fn loads_options_from_the_store() {
        let store = MockPollStore::new();
        store.add_poll(&["yes", "no"]).await;
        store.add_poll(&["yes", "maybe"]).await;
        let source = TweetStreamSource::from_store("127.0.0.1:0", &store, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(source.votes_in(r#"{"text": "maybe yes"}"#), vec!["maybe", "yes"]);
    }

    #[tokio::test]
    async fn reads_votes_until_stopped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (closed_tx, closed_rx) = oneshot::channel();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream
                .write_all(b"{\"text\": \"yes\"}\n\n{\"text\": \"no way\"}\nnot json\n{\"text\": \"YES\"}\n")
                .await
                .unwrap();
            // hold the connection open until the source hangs up
            let mut buf = [0u8; 1];
            let n = tokio::io::AsyncReadExt::read(&mut stream, &mut buf).await.unwrap();
            closed_tx.send(n).unwrap();
        });

        let (votes, mut queue) = vote_queue(8);
        let source = TweetStreamSource::new(
            &addr,
            vec!["yes".into(), "no".into()],
            Duration::from_secs(60),
        );
        let mut context = SourceContext::spawn(source, votes);
        let mut received = Vec::new();
        for _ in 0..3 {
            received.push(queue.recv().await.unwrap());
        }
        assert_eq!(received, vec!["yes", "no", "yes"]);

        context.stop();
        drop(context.stopped().await.unwrap());
        assert!(queue.recv().await.is_none());
        assert_eq!(closed_rx.await.unwrap(), 0);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn reconnects_after_the_stream_ends() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            for vote in ["first", "second"] {
                let (mut stream, _) = listener.accept().await.unwrap();
                let line = format!("{{\"text\": \"{vote}\"}}\n");
                stream.write_all(line.as_bytes()).await.unwrap();
            }
        });

        let (votes, mut queue) = vote_queue(8);
        let source = TweetStreamSource::new(
            &addr,
            vec!["first".into(), "second".into()],
            Duration::from_secs(60),
        );
        let mut context = SourceContext::spawn(source, votes);
        assert_eq!(queue.recv().await.unwrap(), "first");
        assert_eq!(queue.recv().await.unwrap(), "second");
        context.stop();
        context.stopped().await.unwrap();
    }
}
