//! A minimal nsqd client: enough of the TCP protocol to publish to a topic
//! and to consume from a channel with a bounded number of messages in
//! flight.

mod connection;
mod consumer;
mod error;
mod producer;

pub use connection::validate_name;
pub use consumer::NsqConsumer;
pub use error::NsqError;
pub use producer::NsqProducer;
