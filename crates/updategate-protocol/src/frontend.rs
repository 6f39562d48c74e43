use crate::messages::{
    Command, CommandFrame, Frame, PacketHeader, COM_QUERY, COM_STMT_PREPARE, HEADER_LEN,
    LAST_COMMAND,
};
use anyhow::Result;
use bytes::{BufMut, BytesMut};
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt};
use updategate_core::GuardError;

/// Decodes the leading frame of `buf` as a client command.
pub fn decode_command(buf: &[u8]) -> Result<CommandFrame, GuardError> {
    let header = PacketHeader::parse(buf)?;
    if header.payload_len == 0 {
        return Err(GuardError::EmptyPayload);
    }
    let frame_len = header.frame_len();
    if buf.len() < frame_len {
        return Err(GuardError::Incomplete {
            needed: frame_len,
            available: buf.len(),
        });
    }
    let payload = &buf[HEADER_LEN..frame_len];
    let command = match payload[0] {
        COM_QUERY => Command::Query(read_text(&payload[1..])),
        COM_STMT_PREPARE => Command::StmtPrepare(read_text(&payload[1..])),
        code if code <= LAST_COMMAND => Command::Other(code),
        code => return Err(GuardError::UnknownCommand(code)),
    };
    Ok(CommandFrame { header, command })
}

/// Reads exactly one packet. `Ok(None)` means the peer closed cleanly
/// between packets; a close inside a packet is an error.
pub async fn read_frame<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Option<Frame>> {
    let first = match stream.read_u8().await {
        Ok(v) => v,
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let mut head = [first, 0, 0, 0];
    stream.read_exact(&mut head[1..]).await?;
    let header = PacketHeader::parse(&head)?;

    let mut buf = BytesMut::with_capacity(header.frame_len());
    buf.put_slice(&head);
    buf.resize(header.frame_len(), 0);
    stream.read_exact(&mut buf[HEADER_LEN..]).await?;
    Ok(Some(Frame {
        header,
        bytes: buf.freeze(),
    }))
}

fn read_text(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf).into_owned()
}
