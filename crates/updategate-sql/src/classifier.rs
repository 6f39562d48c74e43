use crate::normalize::{normalize_executed, normalize_statement, starts_with_update};
use tracing::trace;
use updategate_core::{GuardError, Verdict};
use updategate_protocol::frontend::decode_command;
use updategate_protocol::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Query,
    StmtPrepare,
    Other,
}

/// Normalized statement text of one command frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryStatement {
    pub kind: StatementKind,
    /// All comments stripped.
    pub text: String,
    /// Executable comment bodies kept; equal to `text` when there are none.
    pub executed: String,
}

impl QueryStatement {
    pub fn from_command(command: &Command) -> Self {
        let (kind, sql) = match command {
            Command::Query(sql) => (StatementKind::Query, sql.as_str()),
            Command::StmtPrepare(sql) => (StatementKind::StmtPrepare, sql.as_str()),
            Command::Other(_) => (StatementKind::Other, ""),
        };
        Self {
            kind,
            text: normalize_statement(sql),
            executed: normalize_executed(sql),
        }
    }

    /// Blocked when either reading of the statement leads with `UPDATE`.
    pub fn is_update(&self) -> bool {
        self.kind != StatementKind::Other
            && (starts_with_update(&self.text) || starts_with_update(&self.executed))
    }
}

pub fn inspect(frame: &[u8]) -> Result<QueryStatement, GuardError> {
    let decoded = decode_command(frame)?;
    Ok(QueryStatement::from_command(&decoded.command))
}

/// Frames that fail to decode are let through.
pub fn classify(frame: &[u8]) -> Verdict {
    match inspect(frame) {
        Ok(stmt) if stmt.is_update() => Verdict::Blocked,
        Ok(_) => Verdict::Allowed,
        Err(err) => {
            trace!(%err, "frame not decodable as a command, passing through");
            Verdict::Allowed
        }
    }
}
