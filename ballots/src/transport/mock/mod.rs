//! An in-memory broker for tests. Don't use this for any real-life purpose:
//! nothing survives the process and nothing bounds its memory usage.

mod broker;
mod error;

pub use broker::{MemoryBroker, MemoryProducer, ProducerEvent, ProducerLog};
pub use error::MockBrokerError;
