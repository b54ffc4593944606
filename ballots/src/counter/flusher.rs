use std::{sync::Arc, time::Duration};

use tokio::{sync::oneshot::Receiver, task::JoinError, time::sleep};
use tracing::{debug, info, warn};

use crate::{
    counter::{FlushOutcome, Tally},
    persistence::PollStore,
    util::TaskContext,
};

/// Writes the [Tally] to a [PollStore] every `interval`.
///
/// The timer is re-armed only once a cycle has finished, so cycles never
/// overlap and a slow store pushes the next cycle back.
pub struct Flusher<S> {
    tally: Arc<Tally>,
    store: Arc<S>,
    interval: Duration,
}

impl<S: PollStore> Flusher<S> {
    /// Create a new instance.
    pub fn new(tally: Arc<Tally>, store: Arc<S>, interval: Duration) -> Self {
        Self {
            tally,
            store,
            interval,
        }
    }

    /// Run one cycle now.
    pub async fn cycle(&self) -> FlushOutcome {
        self.tally.flush(self.store.as_ref()).await
    }

    /// Start flushing in the background.
    pub fn run(self) -> FlusherContext {
        let tally = Arc::clone(&self.tally);
        FlusherContext {
            task: TaskContext::spawn("flusher", move |destructor| self.run_loop(destructor)),
            tally,
        }
    }

    async fn run_loop(self, mut destructor: Receiver<()>) {
        info!(interval = ?self.interval, "Flushing votes periodically");
        loop {
            tokio::select! {
                _ = &mut destructor => break,
                _ = sleep(self.interval) => {}
            }
            // a cycle in progress always runs to completion
            let outcome = self.cycle().await;
            debug!(?outcome, "Flush cycle finished");
        }
        info!("Flusher stopped");
    }
}

/// A [Flusher] running in the background.
#[derive(Debug)]
pub struct FlusherContext {
    task: TaskContext<()>,
    tally: Arc<Tally>,
}

impl FlusherContext {
    /// Stop the timer. A cycle already underway still finishes.
    pub fn stop(&mut self) {
        self.task.destruct();
    }

    /// Wait for the flusher to stop. Votes still in the tally at this point
    /// will not be written.
    pub async fn stopped(self) -> Result<(), JoinError> {
        self.task.finished().await?;
        let pending = self.tally.pending().await;
        if pending > 0 {
            warn!(pending, "Votes left unflushed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::mock::{Increment, MockPollStore};

    #[tokio::test]
    async fn flushes_periodically_until_stopped() {
        let tally = Arc::new(Tally::new());
        let store = Arc::new(MockPollStore::new());
        tally.increment("yes").await;
        tally.increment("yes").await;
        let mut flusher = Flusher::new(
            Arc::clone(&tally),
            Arc::clone(&store),
            Duration::from_millis(10),
        )
        .run();

        for _ in 0..100 {
            if tally.snapshot().await.is_none() {
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(tally.snapshot().await, None);
        assert_eq!(store.take_calls().await, vec![Increment::new("yes", 2)]);

        flusher.stop();
        flusher.stopped().await.unwrap();

        // nothing is written once stopped
        tally.increment("no").await;
        sleep(Duration::from_millis(50)).await;
        assert!(store.calls().await.is_empty());
        assert_eq!(tally.pending().await, 1);
    }

    #[tokio::test]
    async fn failed_cycles_are_retried() {
        let tally = Arc::new(Tally::new());
        let store = Arc::new(MockPollStore::new());
        store.fail("no").await;
        tally.increment("no").await;
        let flusher = Flusher::new(
            Arc::clone(&tally),
            Arc::clone(&store),
            Duration::from_millis(10),
        );
        assert!(matches!(flusher.cycle().await, FlushOutcome::Retained { .. }));
        assert!(matches!(flusher.cycle().await, FlushOutcome::Retained { .. }));
        store.recover("no").await;
        assert!(matches!(flusher.cycle().await, FlushOutcome::Flushed { .. }));
        assert_eq!(store.take_calls().await.len(), 3);
    }
}
