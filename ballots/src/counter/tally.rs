use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::persistence::PollStore;

/// Pending votes per option.
pub type Counts = HashMap<String, u64>;

/// What a single flush cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was pending, so the store was not touched.
    Idle,
    /// Every option was written and the tally is empty again.
    Flushed { options: usize, votes: u64 },
    /// Some options failed. The whole tally is kept for the next cycle,
    /// including the options that were written successfully.
    Retained { failed: Vec<String> },
}

/// The counter's only shared mutable state: votes received but not yet
/// written to storage.
///
/// `None` means nothing is pending, as opposed to a map whose counts
/// happen to be zero. Increments and whole flush cycles are serialized by
/// the same lock, so an increment waits for any flush in progress,
/// storage round-trips included.
#[derive(Debug, Default)]
pub struct Tally {
    counts: Mutex<Option<Counts>>,
}

impl Tally {
    pub fn new() -> Self {
        Default::default()
    }

    /// Count one vote for `option`.
    pub async fn increment(&self, option: &str) {
        let mut guard = self.counts.lock().await;
        *guard
            .get_or_insert_with(HashMap::new)
            .entry(option.to_owned())
            .or_default() += 1;
    }

    /// A copy of the pending counts.
    pub async fn snapshot(&self) -> Option<Counts> {
        self.counts.lock().await.clone()
    }

    /// Total votes pending.
    pub async fn pending(&self) -> u64 {
        self.counts
            .lock()
            .await
            .as_ref()
            .map(|c| c.values().sum())
            .unwrap_or(0)
    }

    /// Run one flush cycle: add every pending count to `store`, one option
    /// at a time, and clear the tally only if all of them succeeded.
    ///
    /// A failed option never stops the others being written. Because the
    /// tally is only cleared as a whole, the options which did succeed are
    /// written again on the next cycle alongside the failed ones. The store
    /// applies `+count` each time, so those votes are counted twice.
    pub async fn flush<S: PollStore + ?Sized>(&self, store: &S) -> FlushOutcome {
        let mut guard = self.counts.lock().await;
        let counts = match guard.as_ref() {
            Some(counts) if !counts.is_empty() => counts,
            _ => {
                debug!("No new votes, skipping the store");
                return FlushOutcome::Idle;
            }
        };

        info!(options = counts.len(), "Updating poll results");
        let mut failed = Vec::new();
        for (option, &count) in counts {
            match store.increment(option, count).await {
                Ok(polls) => debug!(option = %option, count, polls, "Updated poll results"),
                Err(e) => {
                    error!(option = %option, count, "Failed to update poll results: {}", e);
                    failed.push(option.clone());
                }
            }
        }

        if failed.is_empty() {
            let outcome = FlushOutcome::Flushed {
                options: counts.len(),
                votes: counts.values().sum(),
            };
            *guard = None;
            info!("Poll results updated");
            outcome
        } else {
            warn!(
                failed = failed.len(),
                "Keeping the tally for the next cycle"
            );
            FlushOutcome::Retained { failed }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::persistence::mock::{Increment, MockPollStore};

    #[tokio::test]
    async fn n_increments_flush_as_n() {
        let tally = Tally::new();
        let store = MockPollStore::new();
        for _ in 0..25 {
            tally.increment("yes").await;
        }
        assert_eq!(tally.pending().await, 25);
        assert_eq!(
            tally.flush(&store).await,
            FlushOutcome::Flushed {
                options: 1,
                votes: 25
            }
        );
        assert_eq!(store.take_calls().await, vec![Increment::new("yes", 25)]);
        assert_eq!(tally.snapshot().await, None);
    }

    #[tokio::test]
    async fn empty_tally_skips_the_store() {
        let tally = Tally::new();
        let store = MockPollStore::new();
        assert_eq!(tally.flush(&store).await, FlushOutcome::Idle);
        assert!(store.calls().await.is_empty());
    }

    #[tokio::test]
    async fn options_are_case_sensitive() {
        let tally = Tally::new();
        tally.increment("Yes").await;
        tally.increment("yes").await;
        let counts = tally.snapshot().await.unwrap();
        assert_eq!(counts["Yes"], 1);
        assert_eq!(counts["yes"], 1);
    }

    #[tokio::test]
    async fn flush_applies_each_option_and_clears() {
        let tally = Tally::new();
        let store = MockPollStore::new();
        let poll = store.add_poll(&["yes", "no"]).await;
        for vote in ["yes", "no", "yes"] {
            tally.increment(vote).await;
        }
        tally.flush(&store).await;
        assert_eq!(
            store.take_calls().await,
            vec![Increment::new("no", 1), Increment::new("yes", 2)]
        );
        assert_eq!(tally.snapshot().await, None);
        assert_eq!(store.results(poll).await["yes"], 2);
        assert_eq!(store.results(poll).await["no"], 1);
        // the next cycle has nothing to do
        assert_eq!(tally.flush(&store).await, FlushOutcome::Idle);
    }

    #[tokio::test]
    async fn partial_failure_resubmits_the_whole_tally() {
        let tally = Tally::new();
        let store = MockPollStore::new();
        let poll = store.add_poll(&["yes", "no"]).await;
        for vote in ["yes", "no", "yes"] {
            tally.increment(vote).await;
        }

        store.fail("no").await;
        assert_eq!(
            tally.flush(&store).await,
            FlushOutcome::Retained {
                failed: vec!["no".to_owned()]
            }
        );
        assert_eq!(
            store.take_calls().await,
            vec![Increment::new("no", 1), Increment::new("yes", 2)]
        );
        let counts = tally.snapshot().await.unwrap();
        assert_eq!(counts["yes"], 2);
        assert_eq!(counts["no"], 1);

        // no new votes: "yes" is written a second time
        store.recover("no").await;
        tally.flush(&store).await;
        assert_eq!(
            store.take_calls().await,
            vec![Increment::new("no", 1), Increment::new("yes", 2)]
        );
        assert_eq!(store.results(poll).await["yes"], 4);
        assert_eq!(store.results(poll).await["no"], 1);
        assert_eq!(tally.snapshot().await, None);
    }

    #[tokio::test]
    async fn failed_option_keeps_interim_votes() {
        let tally = Tally::new();
        let store = MockPollStore::new();
        tally.increment("no").await;
        tally.increment("no").await;
        store.fail("no").await;
        tally.flush(&store).await;

        tally.increment("no").await;
        store.recover("no").await;
        store.take_calls().await;
        tally.flush(&store).await;
        assert_eq!(store.take_calls().await, vec![Increment::new("no", 3)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_not_lost() {
        const HANDLERS: usize = 16;
        const TIMES: u64 = 500;
        let tally = Arc::new(Tally::new());
        let handles: Vec<_> = (0..HANDLERS)
            .map(|k| {
                let tally = Arc::clone(&tally);
                tokio::spawn(async move {
                    // half share an option, half have their own
                    let option = if k % 2 == 0 {
                        "shared".to_owned()
                    } else {
                        format!("own-{k}")
                    };
                    for _ in 0..TIMES {
                        tally.increment(&option).await;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let counts = tally.snapshot().await.unwrap();
        assert_eq!(counts["shared"], TIMES * (HANDLERS as u64 / 2));
        assert_eq!(counts["own-1"], TIMES);
        assert_eq!(tally.pending().await, TIMES * HANDLERS as u64);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn increments_during_flush_land_in_the_next_cycle() {
        let tally = Arc::new(Tally::new());
        let store = Arc::new(MockPollStore::new());
        for _ in 0..10 {
            tally.increment("yes").await;
        }
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let tally = Arc::clone(&tally);
                tokio::spawn(async move {
                    for _ in 0..50 {
                        tally.increment("yes").await;
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        let mut flushed = 0;
        for _ in 0..20 {
            if let FlushOutcome::Flushed { votes, .. } = tally.flush(store.as_ref()).await {
                flushed += votes;
            }
            tokio::task::yield_now().await;
        }
        for writer in writers {
            writer.await.unwrap();
        }
        if let FlushOutcome::Flushed { votes, .. } = tally.flush(store.as_ref()).await {
            flushed += votes;
        }
        // every vote is written exactly once when no cycle fails
        assert_eq!(flushed, 10 + 4 * 50);
    }
}
