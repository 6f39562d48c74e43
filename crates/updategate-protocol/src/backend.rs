use crate::messages::{ErrPacket, PacketHeader, ERR_MARKER, HEADER_LEN, MAX_PAYLOAD_LEN};
use anyhow::Result;
use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use updategate_core::GuardError;

impl ErrPacket {
    /// Serializes to a single frame with sequence id 0:
    /// `len(3, LE) | seq | 0xFF | code(2, LE) | message`.
    pub fn encode(&self) -> BytesMut {
        let payload_len = 1 + 2 + self.message.len();
        assert!(
            payload_len < MAX_PAYLOAD_LEN,
            "error message does not fit in one packet"
        );
        let mut buf = BytesMut::with_capacity(HEADER_LEN + payload_len);
        buf.put_uint_le(payload_len as u64, 3);
        buf.put_u8(0);
        buf.put_u8(ERR_MARKER);
        buf.put_u16_le(self.code);
        buf.extend_from_slice(self.message.as_bytes());
        buf
    }
}

pub fn decode_err_packet(buf: &[u8]) -> Result<ErrPacket, GuardError> {
    let header = PacketHeader::parse(buf)?;
    let frame_len = header.frame_len();
    if header.payload_len < 3 || buf.len() < frame_len {
        return Err(GuardError::Incomplete {
            needed: frame_len.max(HEADER_LEN + 3),
            available: buf.len(),
        });
    }
    let payload = &buf[HEADER_LEN..frame_len];
    if payload[0] != ERR_MARKER {
        return Err(GuardError::NotErrPacket(payload[0]));
    }
    let code = u16::from_le_bytes([payload[1], payload[2]]);
    let message = String::from_utf8_lossy(&payload[3..]).into_owned();
    Ok(ErrPacket { code, message })
}

pub async fn write_err_packet<S: AsyncWrite + Unpin>(stream: &mut S, packet: &ErrPacket) -> Result<()> {
    stream.write_all(&packet.encode()).await?;
    stream.flush().await?;
    Ok(())
}
