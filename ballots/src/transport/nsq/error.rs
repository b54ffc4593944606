use std::io;

use thiserror::Error;

use crate::codec::{CodecError, MessageId};

#[derive(Debug, Error)]
pub enum NsqError {
    #[error("invalid topic or channel name {0:?}")]
    InvalidName(String),
    #[error("nsqd error: {0}")]
    Server(String),
    #[error("unexpected response from nsqd: {0}")]
    UnexpectedResponse(String),
    #[error("unexpected message {0} outside a subscription")]
    UnexpectedMessage(MessageId),
    #[error("connection closed by nsqd")]
    ConnectionClosed,
    #[error("producer already stopped")]
    Stopped,
    #[error("codec error")]
    Codec(#[from] CodecError),
    #[error("io error")]
    Io(#[from] io::Error),
}
