pub mod classifier;
pub mod normalize;

pub use classifier::{classify, inspect, QueryStatement, StatementKind};
pub use normalize::{normalize_executed, normalize_statement, starts_with_update};

use updategate_protocol::ErrPacket;

/// ER_PARSE_ERROR, what clients already know how to surface.
pub const UPDATE_REJECTED_CODE: u16 = 1064;
pub const UPDATE_REJECTED_MESSAGE: &str = "You are not allowed to execute UPDATE queries";

pub fn rejection() -> ErrPacket {
    ErrPacket::new(UPDATE_REJECTED_CODE, UPDATE_REJECTED_MESSAGE)
}
