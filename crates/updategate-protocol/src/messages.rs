use bytes::Bytes;
use updategate_core::GuardError;

/// 3-byte little-endian payload length followed by the sequence id.
pub const HEADER_LEN: usize = 4;
/// A payload of exactly this length continues in the next packet.
pub const MAX_PAYLOAD_LEN: usize = 0xFF_FFFF;
pub const ERR_MARKER: u8 = 0xFF;

pub const COM_QUERY: u8 = 0x03;
pub const COM_STMT_PREPARE: u8 = 0x16;
/// COM_RESET_CONNECTION; anything above is not a client command.
pub const LAST_COMMAND: u8 = 0x1F;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub payload_len: usize,
    pub sequence: u8,
}

impl PacketHeader {
    pub fn parse(buf: &[u8]) -> Result<Self, GuardError> {
        if buf.len() < HEADER_LEN {
            return Err(GuardError::Incomplete {
                needed: HEADER_LEN,
                available: buf.len(),
            });
        }
        let payload_len = u32::from_le_bytes([buf[0], buf[1], buf[2], 0]) as usize;
        Ok(Self {
            payload_len,
            sequence: buf[3],
        })
    }

    pub fn frame_len(&self) -> usize {
        HEADER_LEN + self.payload_len
    }

    /// True when the payload spills over into the following packet.
    pub fn is_continued(&self) -> bool {
        self.payload_len == MAX_PAYLOAD_LEN
    }
}

/// Client command carried by a frame. Only the query-bearing commands keep
/// their statement text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Query(String),
    StmtPrepare(String),
    Other(u8),
}

impl Command {
    pub fn statement(&self) -> Option<&str> {
        match self {
            Command::Query(sql) | Command::StmtPrepare(sql) => Some(sql),
            Command::Other(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    pub header: PacketHeader,
    pub command: Command,
}

/// One complete packet as read off the wire, header included.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: PacketHeader,
    pub bytes: Bytes,
}

impl Frame {
    pub fn payload(&self) -> &[u8] {
        &self.bytes[HEADER_LEN..]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrPacket {
    pub code: u16,
    pub message: String,
}

impl ErrPacket {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}
