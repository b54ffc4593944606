use bytes::{Buf, BytesMut};
use tokio_util::codec;

use super::{CodecError, Frame};
use crate::constants::{NSQ_FRAME_HEADER_SIZE, NSQ_MAX_FRAME_SIZE};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum State {
    ReadHeader,
    ReadBody { len: usize, frame_type: u32 },
}

#[derive(Debug)]
pub struct Decoder {
    state: State,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            state: State::ReadHeader,
        }
    }
}

impl codec::Decoder for Decoder {
    type Error = CodecError;
    type Item = Frame;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let State::ReadHeader = self.state {
            if src.remaining() < NSQ_FRAME_HEADER_SIZE {
                return Ok(None);
            }
            // the size counts the frame type as well as the data
            let size = src.get_u32() as usize;
            if size < std::mem::size_of::<u32>() {
                return Err(CodecError::FrameTooSmall(size));
            }
            if size > NSQ_MAX_FRAME_SIZE {
                return Err(CodecError::FrameTooLarge(size));
            }
            let frame_type = src.get_u32();
            let len = size - std::mem::size_of::<u32>();
            src.reserve(len);
            self.state = State::ReadBody { len, frame_type };
        }

        if let State::ReadBody { len, frame_type } = self.state {
            if src.len() < len {
                Ok(None)
            } else {
                let data = src.split_to(len).freeze();
                self.state = State::ReadHeader;
                Frame::parse(frame_type, data).map(Some)
            }
        } else {
            Ok(None)
        }
    }
}
