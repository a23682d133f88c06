//! Engine settings
//!
//! Timeouts and limits for one controller connection, persisted as JSON.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::protocol::{
    ProtocolError, DEFAULT_FLUSH_TIMEOUT_MS, DEFAULT_NETWORK_TIMEOUT_MS,
    DEFAULT_SERIAL_TIMEOUT_MS, MAX_RESPONSE_LEN,
};

/// Oldest firmware the discovery sequence is known to work with
pub const MINIMUM_FIRMWARE: f64 = 10.25;

/// Local read timeout used with observatory (OCS) boards
pub const OCS_SERIAL_TIMEOUT_MS: u64 = 200;

/// Communication settings for one controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Read timeout on local serial links in milliseconds
    pub serial_timeout_ms: u64,

    /// Read timeout on network links in milliseconds
    pub network_timeout_ms: u64,

    /// Per-read timeout while flushing stale input in milliseconds
    pub flush_timeout_ms: u64,

    /// Reply buffer size in bytes, one of which is reserved
    pub max_response_len: usize,

    /// Firmware versions below this are reported as unsupported
    pub minimum_firmware: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            serial_timeout_ms: DEFAULT_SERIAL_TIMEOUT_MS,
            network_timeout_ms: DEFAULT_NETWORK_TIMEOUT_MS,
            flush_timeout_ms: DEFAULT_FLUSH_TIMEOUT_MS,
            max_response_len: MAX_RESPONSE_LEN,
            minimum_firmware: MINIMUM_FIRMWARE,
        }
    }
}

impl EngineSettings {
    /// Timeouts for an observatory (OCS) board: 0.2 s local, 2 s networked
    pub fn observatory() -> Self {
        Self {
            serial_timeout_ms: OCS_SERIAL_TIMEOUT_MS,
            network_timeout_ms: DEFAULT_NETWORK_TIMEOUT_MS,
            ..Self::default()
        }
    }

    /// Load settings from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self, ProtocolError> {
        let content = fs::read_to_string(path)?;
        let settings: EngineSettings = serde_json::from_str(&content)
            .map_err(|e| ProtocolError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(settings.validated())
    }

    /// Write settings as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<(), ProtocolError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ProtocolError::Config(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Bring out-of-range values back in range, warning about each change
    pub fn validated(mut self) -> Self {
        if self.serial_timeout_ms == 0 {
            warn!("serial_timeout_ms of 0 raised to 1");
            self.serial_timeout_ms = 1;
        } else if self.serial_timeout_ms >= 1000 {
            warn!(
                "serial_timeout_ms of {} clamped to 999, local links stay below one second",
                self.serial_timeout_ms
            );
            self.serial_timeout_ms = 999;
        }

        // Whole seconds, at least one, small enough for a u32 second count
        let seconds = self
            .network_timeout_ms
            .div_ceil(1000)
            .clamp(1, u64::from(u32::MAX));
        let rounded = seconds * 1000;
        if rounded != self.network_timeout_ms {
            warn!(
                "network_timeout_ms of {} rounded to {}",
                self.network_timeout_ms, rounded
            );
            self.network_timeout_ms = rounded;
        }

        if self.flush_timeout_ms == 0 {
            warn!("flush_timeout_ms of 0 raised to 1");
            self.flush_timeout_ms = 1;
        }

        if self.max_response_len < 2 {
            warn!("max_response_len of {} raised to 2", self.max_response_len);
            self.max_response_len = 2;
        } else if self.max_response_len > MAX_RESPONSE_LEN {
            warn!(
                "max_response_len of {} clamped to the {}-byte wire buffer",
                self.max_response_len, MAX_RESPONSE_LEN
            );
            self.max_response_len = MAX_RESPONSE_LEN;
        }

        if !self.minimum_firmware.is_finite() || self.minimum_firmware < 0.0 {
            warn!(
                "minimum_firmware of {} reset to {}",
                self.minimum_firmware, MINIMUM_FIRMWARE
            );
            self.minimum_firmware = MINIMUM_FIRMWARE;
        }

        self
    }
}
