//! # Where poll results end up
//!
//! Each poll offers a fixed set of options, and keeps a running result per
//! option. The counter never reads results back: all it needs from a store
//! is [increment](PollStore::increment), which adds a batch of votes to
//! every poll offering the option, atomically.
//!
//! The same option string may appear in several polls. It accrues to each
//! of them independently.
//!
//! The relay needs to know which options exist at all, so that it only
//! forwards votes somebody can count; that is
//! [options](PollStore::options).

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(test, feature = "mocks"))]
pub mod mock;

mod poll_store;

pub use poll_store::PollStore;
