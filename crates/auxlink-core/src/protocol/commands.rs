//! Protocol commands
//!
//! The subset of the OnStepX auxiliary lexicon this crate issues itself.
//! Every command and every reply ends with `#`; the reply shape noted on each
//! constant is what the firmware sends back.

use std::fmt;

use super::{ProtocolError, MAX_COMMAND_LEN, SENTINEL};

/// Get product name. Reply: `On-Step#`
pub const HANDSHAKE: &str = ":GVP#";

/// Product name expected in reply to [`HANDSHAKE`]
pub const HANDSHAKE_REPLY: &str = "On-Step";

/// Get firmware version. Reply: e.g. `10.26g#`
pub const GET_FIRMWARE: &str = ":GVN#";

/// Get number of defined focusers. Reply: `0#` to `6#`
pub const GET_DEFINED_FOCUSERS: &str = ":FA#";

/// Stop the focuser. No reply
pub const STOP_FOCUSER: &str = ":FQ#";

/// Get focuser position. Reply: `n#` (steps)
pub const GET_FOCUSER_POSITION: &str = ":FG#";

/// Prefix of the absolute focuser move. Reply: `1#` on success, `0#` on failure
pub const MOVE_FOCUSER_ABS_PART: &str = ":FS";

/// Get defined rotator. Reply: `0#` undefined, otherwise `1#`, `D#` or `R#`
pub const GET_DEFINED_ROTATOR: &str = ":rA#";

/// Get weather temperature in deg C. Reply: `+/-n.n#`, `0#`, `nan#` or `N/A#`
pub const GET_TEMPERATURE: &str = ":GX9A#";

/// Get barometric pressure in mb
pub const GET_PRESSURE: &str = ":GX9B#";

/// Get relative humidity in %
pub const GET_HUMIDITY: &str = ":GX9C#";

/// Get dew point in deg C
pub const GET_DEW_POINT: &str = ":GX9E#";

/// Get defined auxiliary features. Reply: one digit per slot, e.g. `00000000#`
pub const GET_DEFINED_FEATURES: &str = ":GXY0#";

/// Prefix of the per-feature definition query `:GXYn#`. Reply: `name,type#`
pub const GET_FEATURE_DEFINITION_PART: &str = ":GXY";

// Observatory Control System

/// Get product name. Reply: `OCS#`
pub const OCS_HANDSHAKE: &str = ":IP#";
/// Product name an OCS board answers with
pub const OCS_HANDSHAKE_REPLY: &str = "OCS";
/// Get firmware version. Reply: e.g. `3.03i#`
pub const OCS_GET_FIRMWARE: &str = ":IN#";
/// Get dome status. Reply: `P#` parked, `H#` at home; unterminated `0` without a dome
pub const OCS_GET_DOME_STATUS: &str = ":DU#";
/// Get roof motion delays. Reply: `n.n,m.m#`, seconds before and after motion
pub const OCS_GET_ROOF_TIMEOUTS: &str = ":IT#";
/// Open the roof. No reply
pub const OCS_ROOF_OPEN: &str = ":RO#";
/// Close the roof. No reply
pub const OCS_ROOF_CLOSE: &str = ":RC#";

/// A validated command string, sentinel included
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command(String);

impl Command {
    /// Validate a complete command
    ///
    /// Must be ASCII, start with `:`, end with exactly one `#`, and fit the
    /// controller's command buffer.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let invalid = |reason: &str| ProtocolError::InvalidCommand {
            command: text.to_string(),
            reason: reason.to_string(),
        };

        if !text.is_ascii() {
            return Err(invalid("not ASCII"));
        }
        if !text.starts_with(':') {
            return Err(invalid("missing ':' prefix"));
        }
        let sentinel = SENTINEL as char;
        if !text.ends_with(sentinel) {
            return Err(invalid("missing '#' terminator"));
        }
        if text.matches(sentinel).count() != 1 {
            return Err(invalid("'#' inside command body"));
        }
        if text.len() > MAX_COMMAND_LEN {
            return Err(invalid("longer than the command buffer"));
        }
        Ok(Self(text.to_string()))
    }

    /// The command as sent on the wire
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Command body without the terminator
    pub fn mnemonic(&self) -> &str {
        &self.0[..self.0.len() - 1]
    }
}

impl AsRef<str> for Command {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
