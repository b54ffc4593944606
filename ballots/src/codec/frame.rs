use std::{fmt, time::Duration};

use bytes::{Buf, Bytes};
use chrono::{DateTime, TimeZone, Utc};

use super::CodecError;
use crate::constants::{NSQ_MESSAGE_HEADER_SIZE, NSQ_MESSAGE_ID_SIZE};

const FRAME_TYPE_RESPONSE: u32 = 0;
const FRAME_TYPE_ERROR: u32 = 1;
const FRAME_TYPE_MESSAGE: u32 = 2;

/// Response body nsqd sends periodically, which must be answered with a
/// [Command::Nop].
pub const HEARTBEAT: &[u8] = b"_heartbeat_";
pub const OK: &[u8] = b"OK";
/// Acknowledgement of a [Command::Cls].
pub const CLOSE_WAIT: &[u8] = b"CLOSE_WAIT";

/// nsqd's identifier for a delivered message, echoed back in `FIN` and
/// `REQ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub [u8; NSQ_MESSAGE_ID_SIZE]);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

/// A message delivered to a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsqMessage {
    pub id: MessageId,
    /// How many times nsqd has delivered this message, including this one.
    pub attempts: u16,
    /// When the message was published, according to nsqd.
    pub timestamp: DateTime<Utc>,
    pub body: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Response(Bytes),
    Error(Bytes),
    Message(NsqMessage),
}

impl Frame {
    pub(super) fn parse(frame_type: u32, mut data: Bytes) -> Result<Self, CodecError> {
        match frame_type {
            FRAME_TYPE_RESPONSE => Ok(Frame::Response(data)),
            FRAME_TYPE_ERROR => Ok(Frame::Error(data)),
            FRAME_TYPE_MESSAGE => {
                if data.len() < NSQ_MESSAGE_HEADER_SIZE {
                    return Err(CodecError::TruncatedMessage(data.len()));
                }
                let timestamp = Utc.timestamp_nanos(data.get_i64());
                let attempts = data.get_u16();
                let mut id = [0u8; NSQ_MESSAGE_ID_SIZE];
                data.copy_to_slice(&mut id);
                Ok(Frame::Message(NsqMessage {
                    id: MessageId(id),
                    attempts,
                    timestamp,
                    body: data,
                }))
            }
            other => Err(CodecError::UnknownFrameType(other)),
        }
    }

    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Frame::Response(data) if data.as_ref() == HEARTBEAT)
    }
}

/// Everything a client sends after the protocol magic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Publish a single message to a topic.
    Pub { topic: String, body: Bytes },
    /// Subscribe this connection to a topic's channel.
    Sub { topic: String, channel: String },
    /// Allow nsqd to have this many messages in flight to us.
    Rdy(usize),
    /// Finish (acknowledge) a message.
    Fin(MessageId),
    /// Requeue a message, to be redelivered after the timeout.
    Req(MessageId, Duration),
    /// Answer to a heartbeat.
    Nop,
    /// Clean close: nsqd stops sending messages and replies `CLOSE_WAIT`.
    Cls,
}
