use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GuardError {
    #[error("incomplete frame: need {needed} bytes, have {available}")]
    Incomplete { needed: usize, available: usize },
    #[error("frame carries no command byte")]
    EmptyPayload,
    #[error("unknown command byte: {0:#04x}")]
    UnknownCommand(u8),
    #[error("not an ERR packet (marker {0:#04x})")]
    NotErrPacket(u8),
    #[error("config error: {0}")]
    Config(String),
}
