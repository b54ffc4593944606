use std::error::Error;

use async_trait::async_trait;

/// This is the interface the counter flushes its tally through.
#[async_trait]
pub trait PollStore: Send + Sync + 'static {
    /// An error occurring from an operation.
    type Error: Error + Send + Sync + 'static;

    /// Every option offered by any poll, without duplicates.
    async fn options(&self) -> Result<Vec<String>, Self::Error>;

    /// Add `count` to the result of `option` in every poll offering it.
    /// Returns how many polls were updated, which may be zero.
    async fn increment(&self, option: &str, count: u64) -> Result<u64, Self::Error>;
}
