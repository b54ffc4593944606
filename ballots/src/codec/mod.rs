//! The codec speaks the nsqd TCP protocol (V2).
//!
//! Everything nsqd sends is a frame: a `u32` size (counting the type and
//! the data), a `u32` frame type and `size - 4` bytes of data. Commands
//! going the other way are newline-terminated text, some followed by a
//! size-prefixed body.
//!
//! The 4-byte protocol magic is written straight to the socket before the
//! connection is framed, so it is not a [Command].

mod decoder;
mod encoder;
mod frame;

use std::io;

pub use decoder::Decoder;
pub use encoder::Encoder;
pub use frame::{Command, Frame, MessageId, NsqMessage, CLOSE_WAIT, HEARTBEAT, OK};
use thiserror::Error;
use tokio_util::codec;

/// Failure to read or write a frame.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),
    #[error("frame size {0} is too small to hold a frame type")]
    FrameTooSmall(usize),
    #[error("unknown frame type {0}")]
    UnknownFrameType(u32),
    #[error("message frame of {0} bytes is shorter than a message header")]
    TruncatedMessage(usize),
    #[error("io error")]
    Io(#[from] io::Error),
}

/// Both halves of the protocol, for use with
/// [Framed](tokio_util::codec::Framed).
#[derive(Debug, Default)]
pub struct NsqCodec {
    decoder: Decoder,
    encoder: Encoder,
}

impl NsqCodec {
    pub fn new() -> Self {
        Default::default()
    }
}

impl codec::Decoder for NsqCodec {
    type Error = CodecError;
    type Item = Frame;

    fn decode(&mut self, src: &mut bytes::BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decoder.decode(src)
    }
}

impl codec::Encoder<Command> for NsqCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Command, dst: &mut bytes::BytesMut) -> Result<(), Self::Error> {
        self.encoder.encode(item, dst)
    }
}
