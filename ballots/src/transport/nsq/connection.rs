use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpStream, ToSocketAddrs},
};
use tokio_util::codec::Framed;

use super::NsqError;
use crate::{
    codec::{Command, Frame, NsqCodec, OK},
    constants::NSQ_MAGIC_V2,
};

pub(super) type Connection = Framed<TcpStream, NsqCodec>;

/// Open a connection to nsqd and announce the protocol version.
pub(super) async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Connection, NsqError> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    stream.write_all(NSQ_MAGIC_V2).await?;
    Ok(Framed::new(stream, NsqCodec::new()))
}

/// Wait for the response to the last command, answering any heartbeats
/// received in the meantime.
pub(super) async fn read_response(conn: &mut Connection) -> Result<Bytes, NsqError> {
    loop {
        match conn.next().await {
            Some(Ok(frame)) if frame.is_heartbeat() => conn.send(Command::Nop).await?,
            Some(Ok(Frame::Response(data))) => return Ok(data),
            Some(Ok(Frame::Error(data))) => {
                return Err(NsqError::Server(String::from_utf8_lossy(&data).into_owned()))
            }
            Some(Ok(Frame::Message(message))) => {
                return Err(NsqError::UnexpectedMessage(message.id))
            }
            Some(Err(e)) => return Err(e.into()),
            None => return Err(NsqError::ConnectionClosed),
        }
    }
}

pub(super) async fn expect_ok(conn: &mut Connection) -> Result<(), NsqError> {
    let data = read_response(conn).await?;
    if data.as_ref() == OK {
        Ok(())
    } else {
        Err(NsqError::UnexpectedResponse(
            String::from_utf8_lossy(&data).into_owned(),
        ))
    }
}

/// nsqd accepts topic and channel names of 1 to 64 characters from
/// `[.a-zA-Z0-9_-]`, optionally suffixed with `#ephemeral`.
pub fn validate_name(name: &str) -> Result<(), NsqError> {
    let base = name.strip_suffix("#ephemeral").unwrap_or(name);
    let valid = !name.is_empty()
        && name.len() <= 64
        && !base.is_empty()
        && base
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(NsqError::InvalidName(name.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        assert!(validate_name("votes").is_ok());
        assert!(validate_name("counter#ephemeral").is_ok());
        assert!(validate_name("a.b_c-d").is_ok());
    }

    #[test]
    fn invalid_names() {
        assert!(validate_name("").is_err());
        assert!(validate_name("#ephemeral").is_err());
        assert!(validate_name("with space").is_err());
        assert!(validate_name(&"x".repeat(65)).is_err());
    }
}
