use bytes::{BufMut, BytesMut};
use tokio_util::codec;

use super::{CodecError, Command};
use crate::constants::NSQ_MAX_FRAME_SIZE;

#[derive(Debug, Clone, Default)]
pub struct Encoder;

impl Encoder {
    fn put_line(dst: &mut BytesMut, parts: &[&[u8]]) {
        let len: usize = parts.iter().map(|p| p.len() + 1).sum();
        dst.reserve(len);
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                dst.put_u8(b' ');
            }
            dst.put_slice(part);
        }
        dst.put_u8(b'\n');
    }
}

impl codec::Encoder<Command> for Encoder {
    type Error = CodecError;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Command::Pub { topic, body } => {
                if body.len() > NSQ_MAX_FRAME_SIZE {
                    return Err(CodecError::FrameTooLarge(body.len()));
                }
                Self::put_line(dst, &[&b"PUB"[..], topic.as_bytes()]);
                dst.reserve(std::mem::size_of::<u32>() + body.len());
                dst.put_u32(body.len() as u32);
                dst.put_slice(&body);
            }
            Command::Sub { topic, channel } => {
                Self::put_line(dst, &[&b"SUB"[..], topic.as_bytes(), channel.as_bytes()])
            }
            Command::Rdy(count) => Self::put_line(dst, &[&b"RDY"[..], count.to_string().as_bytes()]),
            Command::Fin(id) => Self::put_line(dst, &[&b"FIN"[..], &id.0[..]]),
            Command::Req(id, timeout) => Self::put_line(
                dst,
                &[&b"REQ"[..], &id.0[..], timeout.as_millis().to_string().as_bytes()],
            ),
            Command::Nop => Self::put_line(dst, &[&b"NOP"[..]]),
            Command::Cls => Self::put_line(dst, &[&b"CLS"[..]]),
        }
        Ok(())
    }
}
