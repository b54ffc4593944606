use std::{borrow::Cow, sync::Arc};

use async_trait::async_trait;
use tracing::{trace, warn};

use crate::{
    counter::Tally,
    transport::{HandlerError, MessageHandler},
};

/// Counts every vote delivered by the broker into a shared [Tally].
///
/// Handling never fails: a message is acknowledged as soon as its vote is
/// in the tally, and writing the tally out is the
/// [Flusher](crate::Flusher)'s job.
#[derive(Debug, Clone)]
pub struct Aggregator {
    tally: Arc<Tally>,
}

impl Aggregator {
    pub fn new(tally: Arc<Tally>) -> Self {
        Self { tally }
    }
}

#[async_trait]
impl MessageHandler for Aggregator {
    async fn handle_message(&self, body: &[u8]) -> Result<(), HandlerError> {
        let option = String::from_utf8_lossy(body);
        if let Cow::Owned(_) = option {
            warn!("Vote is not valid utf-8, counting it as {:?}", option);
        }
        trace!(option = %option, "Counting vote");
        self.tally.increment(&option).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_each_message() {
        let tally = Arc::new(Tally::new());
        let aggregator = Aggregator::new(Arc::clone(&tally));
        for body in [&b"yes"[..], b"no", b"yes"] {
            aggregator.handle_message(body).await.unwrap();
        }
        let counts = tally.snapshot().await.unwrap();
        assert_eq!(counts["yes"], 2);
        assert_eq!(counts["no"], 1);
    }

    #[tokio::test]
    async fn invalid_utf8_is_still_acknowledged() {
        let tally = Arc::new(Tally::new());
        let aggregator = Aggregator::new(Arc::clone(&tally));
        assert!(aggregator.handle_message(b"y\xffs").await.is_ok());
        assert_eq!(tally.snapshot().await.unwrap()["y\u{fffd}s"], 1);
    }
}
