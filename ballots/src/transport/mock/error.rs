use thiserror::Error;

#[derive(Debug, Error)]
pub enum MockBrokerError {
    #[error("publish of {0:?} refused")]
    Refused(String),
    #[error("producer already stopped")]
    Stopped,
    #[error("topic {0} already has a subscriber")]
    AlreadySubscribed(String),
    #[error("topic {0} has no subscriber any more")]
    Closed(String),
}
