//! # Ballots
//!
//! Ballots counts votes arriving from a high-volume event stream and keeps
//! poll results up to date without writing to storage once per vote.
//!
//! The pipeline has two halves, which can run in separate processes:
//!
//! - The **relay** reads votes from an [EventSource](source::EventSource)
//! into a bounded queue, and a [Publisher] forwards each of them to the
//! broker.
//! - The **counter** subscribes to the broker, counts every delivered vote
//! into a shared [Tally] through an [Aggregator], and a [Flusher]
//! periodically writes the tally to a [PollStore] in a single batch per
//! option.
//!
//! A [Coordinator](shutdown::Coordinator) drains both halves in order on
//! SIGINT, SIGTERM or SIGHUP, so votes already accepted are not dropped on the
//! floor.
//!
//! ## Delivery
//!
//! The broker delivers each vote at least once and in no particular order.
//! Counting is commutative, so order doesn't matter; redelivery may count
//! a vote twice. A flush cycle which fails for any option keeps the whole
//! tally, including options which were written successfully, and writes it
//! again next cycle. Those options are counted twice. Votes still in the
//! tally when the process is killed are lost.
//!
//! ## Crate feature flags
//!
//! - `sqlite`: Poll storage backed by sqlite. Enabled by default.
//! - `mocks`: In-memory broker, store and event source for testing.

pub mod codec;
pub mod config;
mod constants;
mod counter;
mod persistence;
mod publisher;
pub mod shutdown;
pub mod source;
pub mod transport;
mod util;

pub use config::{Config, ConfigError};
pub use constants::{COUNTER_CHANNEL, VOTES_TOPIC};
pub use counter::*;
pub use persistence::*;
pub use publisher::{
    vote_queue, PublishReport, Publisher, PublisherContext, VoteReceiver, VoteSender,
};
pub use util::should_destruct;
