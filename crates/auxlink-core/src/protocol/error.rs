//! Protocol errors

use thiserror::Error;

/// Errors that can occur during protocol communication
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to write command {command}: {source}")]
    Write {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No sentinel received within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Empty reply to {0}")]
    EmptyReply(String),

    #[error("Reply to {command} is not numeric: '{response}'")]
    Format { command: String, response: String },

    #[error("Link closed by peer")]
    LinkClosed,

    #[error("Not connected to controller")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Invalid command '{command}': {reason}")]
    InvalidCommand { command: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ProtocolError {
    /// Layered result code: zero or negative always means failure
    pub fn code(&self) -> i32 {
        Failure::from(self).code()
    }
}

/// Failure outcome of a decoder, carried by value
///
/// The numeric codes are stable so callers that still compare raw counts
/// against small thresholds keep working.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// The peer answered with a bare sentinel
    Empty,
    /// Reading from the link failed
    Read,
    /// Writing the command failed
    Write,
    /// No sentinel within the active timeout
    Timeout,
    /// The link reached end of stream
    LinkClosed,
    /// No link is attached
    NotConnected,
    /// The command could not be sent as given
    InvalidCommand,
    /// Bytes were received but did not parse as the expected number
    Format,
}

impl Failure {
    /// Historic result code: `RES_ERR_FORMAT`
    pub const FORMAT_CODE: i32 = -1001;

    /// Numeric result code, never positive
    pub fn code(self) -> i32 {
        match self {
            Failure::Empty => 0,
            Failure::Read => -1,
            Failure::Write => -2,
            Failure::Timeout => -4,
            Failure::LinkClosed => -5,
            Failure::NotConnected => -6,
            Failure::InvalidCommand => -7,
            Failure::Format => Self::FORMAT_CODE,
        }
    }

    /// True for failures after which the link is likely unusable
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            Failure::Read | Failure::Write | Failure::LinkClosed | Failure::NotConnected
        )
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Failure::Empty => "empty reply",
            Failure::Read => "read error",
            Failure::Write => "write error",
            Failure::Timeout => "timeout",
            Failure::LinkClosed => "link closed",
            Failure::NotConnected => "not connected",
            Failure::InvalidCommand => "invalid command",
            Failure::Format => "format error",
        };
        write!(f, "{} ({})", text, self.code())
    }
}

impl From<&ProtocolError> for Failure {
    fn from(err: &ProtocolError) -> Self {
        match err {
            ProtocolError::Io(_) => Failure::Read,
            ProtocolError::Write { .. } => Failure::Write,
            ProtocolError::Timeout { .. } => Failure::Timeout,
            ProtocolError::EmptyReply(_) => Failure::Empty,
            ProtocolError::Format { .. } => Failure::Format,
            ProtocolError::LinkClosed => Failure::LinkClosed,
            ProtocolError::SerialError(_)
            | ProtocolError::NotConnected
            | ProtocolError::AlreadyConnected
            | ProtocolError::HandshakeFailed(_)
            | ProtocolError::Config(_) => Failure::NotConnected,
            ProtocolError::InvalidCommand { .. } => Failure::InvalidCommand,
        }
    }
}

impl From<ProtocolError> for Failure {
    fn from(err: ProtocolError) -> Self {
        Failure::from(&err)
    }
}
