use std::collections::{BTreeMap, BTreeSet, HashSet};

use tokio::sync::{Mutex, MutexGuard};

use crate::persistence::{mock::MockStoreError, PollStore};

/// One call to [increment](PollStore::increment), successful or not.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Increment {
    pub option: String,
    pub count: u64,
}

impl Increment {
    pub fn new(option: &str, count: u64) -> Self {
        Self {
            option: option.to_owned(),
            count,
        }
    }
}

/// An in-memory poll store which records every increment and can be told
/// to fail particular options.
#[derive(Debug, Default)]
pub struct MockPollStore {
    polls: Mutex<Vec<BTreeMap<String, u64>>>,
    calls: Mutex<Vec<Increment>>,
    failing: Mutex<HashSet<String>>,
}

impl MockPollStore {
    pub fn new() -> Self {
        Default::default()
    }

    /// Add a poll offering `options`, returning its index.
    pub async fn add_poll(&self, options: &[&str]) -> usize {
        let mut polls = self.polls.lock().await;
        polls.push(options.iter().map(|o| (o.to_string(), 0)).collect());
        polls.len() - 1
    }

    /// Results of the poll at `index`.
    pub async fn results(&self, index: usize) -> BTreeMap<String, u64> {
        self.polls.lock().await[index].clone()
    }

    /// Make every increment of `option` fail until [recover](Self::recover)
    /// is called.
    pub async fn fail(&self, option: &str) {
        self.failing.lock().await.insert(option.to_owned());
    }

    pub async fn recover(&self, option: &str) {
        self.failing.lock().await.remove(option);
    }

    /// Every increment attempted so far.
    pub async fn calls(&self) -> MutexGuard<'_, Vec<Increment>> {
        self.calls.lock().await
    }

    /// Every increment attempted since the last call, sorted so that tests
    /// don't depend on the tally's iteration order.
    pub async fn take_calls(&self) -> Vec<Increment> {
        let mut calls = std::mem::take(&mut *self.calls.lock().await);
        calls.sort();
        calls
    }
}

#[async_trait::async_trait]
impl PollStore for MockPollStore {
    type Error = MockStoreError;

    async fn options(&self) -> Result<Vec<String>, Self::Error> {
        let polls = self.polls.lock().await;
        let options: BTreeSet<_> = polls.iter().flat_map(|p| p.keys().cloned()).collect();
        Ok(options.into_iter().collect())
    }

    async fn increment(&self, option: &str, count: u64) -> Result<u64, Self::Error> {
        self.calls.lock().await.push(Increment::new(option, count));
        if self.failing.lock().await.contains(option) {
            return Err(MockStoreError::Unavailable(option.to_owned()));
        }
        let mut updated = 0;
        for poll in self.polls.lock().await.iter_mut() {
            if let Some(result) = poll.get_mut(option) {
                *result += count;
                updated += 1;
            }
        }
        Ok(updated)
    }
}
