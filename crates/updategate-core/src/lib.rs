pub mod error;
pub mod types;

pub use error::GuardError;
pub use types::{ConnectionId, Direction, Verdict};
