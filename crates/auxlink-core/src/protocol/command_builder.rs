//! Command Builder
//!
//! Assembles commands that carry an argument between the mnemonic and the
//! terminator, e.g. `:FS012345#` or `:GXY3#`.

use super::{Command, ProtocolError, SENTINEL};

/// Build a command from a mnemonic prefix and arguments
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    body: String,
}

impl CommandBuilder {
    /// Start from a prefix such as `:FS`
    pub fn new(prefix: &str) -> Self {
        Self {
            body: prefix.to_string(),
        }
    }

    /// Append a plain integer, sign only when negative
    pub fn int(mut self, value: i64) -> Self {
        self.body.push_str(&value.to_string());
        self
    }

    /// Append an unsigned integer zero-padded to `width` digits
    pub fn padded(mut self, value: u64, width: usize) -> Self {
        self.body.push_str(&format!("{:0width$}", value, width = width));
        self
    }

    /// Append a float with explicit sign and fixed precision, e.g. `+3.50`
    pub fn signed_fixed(mut self, value: f64, precision: usize) -> Self {
        self.body
            .push_str(&format!("{:+.precision$}", value, precision = precision));
        self
    }

    /// Append literal text
    pub fn text(mut self, text: &str) -> Self {
        self.body.push_str(text);
        self
    }

    /// Terminate and validate
    pub fn build(mut self) -> Result<Command, ProtocolError> {
        self.body.push(SENTINEL as char);
        Command::parse(&self.body)
    }
}

/// Build an indexed query such as `:GXY3#`
pub fn indexed_command(prefix: &str, index: usize) -> Result<Command, ProtocolError> {
    CommandBuilder::new(prefix).int(index as i64).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::commands::{GET_FEATURE_DEFINITION_PART, MOVE_FOCUSER_ABS_PART};

    #[test]
    fn test_focuser_move_command() {
        let cmd = CommandBuilder::new(MOVE_FOCUSER_ABS_PART)
            .padded(12345, 6)
            .build()
            .unwrap();
        assert_eq!(cmd.as_str(), ":FS012345#");

        let cmd = CommandBuilder::new(MOVE_FOCUSER_ABS_PART)
            .int(-250)
            .build()
            .unwrap();
        assert_eq!(cmd.as_str(), ":FS-250#");
    }

    #[test]
    fn test_signed_fixed() {
        let cmd = CommandBuilder::new(":FC").signed_fixed(3.5, 5).build().unwrap();
        assert_eq!(cmd.as_str(), ":FC+3.50000#");
        let cmd = CommandBuilder::new(":FC").signed_fixed(-0.25, 2).build().unwrap();
        assert_eq!(cmd.as_str(), ":FC-0.25#");
    }

    #[test]
    fn test_indexed() {
        let cmd = indexed_command(GET_FEATURE_DEFINITION_PART, 3).unwrap();
        assert_eq!(cmd.as_str(), ":GXY3#");
    }

    #[test]
    fn test_rejects_embedded_sentinel() {
        assert!(CommandBuilder::new(":SX").text("1#2").build().is_err());
    }
}
