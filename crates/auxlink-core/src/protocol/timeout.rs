//! Link-dependent read timeouts
//!
//! A serial link answers within a few milliseconds, a WiFi bridge can stall
//! for a second or more. The policy is picked once when the link becomes
//! connected and does not change until disconnect.

use std::time::Duration;

use super::LinkKind;
use crate::config::EngineSettings;

/// Blocking-read timeout in effect for the active link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// Local serial link, always below one second
    Local {
        /// Timeout in microseconds
        microseconds: u32,
    },
    /// Network link, always whole seconds and at least one
    Networked {
        /// Timeout in seconds
        seconds: u32,
    },
}

impl TimeoutPolicy {
    /// Longest allowed local timeout
    const LOCAL_MAX_MICROS: u32 = 999_999;

    /// Select the policy for a freshly connected link
    pub fn select(kind: LinkKind, settings: &EngineSettings) -> Self {
        match kind {
            LinkKind::Serial => Self::local(Duration::from_millis(settings.serial_timeout_ms)),
            LinkKind::Network => Self::networked(Duration::from_millis(settings.network_timeout_ms)),
        }
    }

    /// Local policy, clamped to (0, 1s)
    pub fn local(timeout: Duration) -> Self {
        let micros = timeout.as_micros().clamp(1, Self::LOCAL_MAX_MICROS as u128) as u32;
        TimeoutPolicy::Local {
            microseconds: micros,
        }
    }

    /// Networked policy, rounded up to whole seconds, at least one
    pub fn networked(timeout: Duration) -> Self {
        let mut seconds = timeout.as_secs();
        if timeout.subsec_nanos() > 0 {
            seconds += 1;
        }
        TimeoutPolicy::Networked {
            seconds: seconds.clamp(1, u32::MAX as u64) as u32,
        }
    }

    /// Link kind this policy belongs to
    pub fn link_kind(&self) -> LinkKind {
        match self {
            TimeoutPolicy::Local { .. } => LinkKind::Serial,
            TimeoutPolicy::Networked { .. } => LinkKind::Network,
        }
    }

    /// Whole-seconds part of the timeout
    pub fn seconds(&self) -> u64 {
        match self {
            TimeoutPolicy::Local { .. } => 0,
            TimeoutPolicy::Networked { seconds } => *seconds as u64,
        }
    }

    /// Sub-second part of the timeout in microseconds
    pub fn microseconds(&self) -> u32 {
        match self {
            TimeoutPolicy::Local { microseconds } => *microseconds,
            TimeoutPolicy::Networked { .. } => 0,
        }
    }

    /// Upper bound for one framed read
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.seconds()) + Duration::from_micros(self.microseconds() as u64)
    }

    /// Sleep between attempts to take the interlock: a tenth of the read timeout
    pub fn spin_interval(&self) -> Duration {
        self.read_timeout() / 10
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        TimeoutPolicy::Local {
            microseconds: 100_000,
        }
    }
}
