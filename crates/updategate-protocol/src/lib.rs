pub mod backend;
pub mod frontend;
pub mod messages;

pub use messages::{Command, CommandFrame, ErrPacket, Frame, PacketHeader};
