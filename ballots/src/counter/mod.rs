//! The counter consumes votes from the broker and keeps a running
//! [Tally] of them, which a [Flusher] periodically writes to a
//! [PollStore](crate::PollStore).
//!
//! Acknowledging a message to the broker only means its vote is in the
//! tally. Anything in the tally when the process dies is lost; the window
//! is bounded by the flush interval.
//!
//! ``` no_run
//! # use std::sync::Arc;
//! # use ballots::{Aggregator, Flusher, Tally};
//! # use ballots::sqlite::{open_pool, SqlitePollStore};
//! # async fn inner() {
//! let tally = Arc::new(Tally::new());
//! let store = Arc::new(SqlitePollStore::new(open_pool("sqlite://ballots.db").await.unwrap()));
//! // hand this to a subscription
//! let aggregator = Arc::new(Aggregator::new(Arc::clone(&tally)));
//! // flush every second until stopped
//! let mut flusher = Flusher::new(tally, store, std::time::Duration::from_secs(1)).run();
//! # flusher.stop();
//! # }
//! ```

mod aggregator;
mod flusher;
mod tally;

pub use aggregator::Aggregator;
pub use flusher::{Flusher, FlusherContext};
pub use tally::{Counts, FlushOutcome, Tally};
