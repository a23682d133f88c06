//! Observatory Control System boards
//!
//! An OCS roof/dome controller speaks the same `#`-framed protocol as the
//! auxiliary board and runs on the same [`CommandEngine`]. Only the lexicon
//! and the discovery steps differ: product `OCS`, dome presence and the roof
//! motion delays.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::EngineSettings;
use crate::protocol::commands::{
    OCS_GET_DOME_STATUS, OCS_GET_FIRMWARE, OCS_GET_ROOF_TIMEOUTS, OCS_HANDSHAKE,
    OCS_HANDSHAKE_REPLY, OCS_ROOF_CLOSE, OCS_ROOF_OPEN,
};
use crate::protocol::{CommandEngine, CommunicationChannel, Failure, ProtocolError, Reply};

/// Extra wait after the pre-motion delay before polling roof status
pub const ROOF_POLL_MARGIN: Duration = Duration::from_millis(500);

/// Delays the board applies around roof motion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoofDelays {
    /// Wait before the roof starts moving
    pub pre_motion: Duration,
    /// Wait after the roof reaches its end of travel
    pub post_motion: Duration,
}

impl RoofDelays {
    /// Parse an `n.n,m.m` reply, both in seconds
    pub fn parse(text: &str) -> Option<Self> {
        let (pre, post) = text.split_once(',')?;
        Some(Self {
            pre_motion: parse_seconds(pre)?,
            post_motion: parse_seconds(post)?,
        })
    }
}

fn parse_seconds(text: &str) -> Option<Duration> {
    let seconds = text.trim().parse::<f64>().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(seconds).ok()
}

/// What the connected OCS board implements
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcsCapabilities {
    /// Firmware version string as reported
    pub firmware: Option<String>,
    /// A dome is fitted
    pub has_dome: bool,
    /// Roof delays, when the board reported them
    pub roof_delays: Option<RoofDelays>,
}

impl OcsCapabilities {
    /// How long to wait after a roof command before polling its status
    pub fn roof_poll_delay(&self) -> Duration {
        self.roof_delays
            .map(|d| d.pre_motion)
            .unwrap_or_default()
            + ROOF_POLL_MARGIN
    }
}

/// Roof direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoofMotion {
    /// Open the roof
    Open,
    /// Close the roof
    Close,
}

impl RoofMotion {
    fn command(self) -> &'static str {
        match self {
            RoofMotion::Open => OCS_ROOF_OPEN,
            RoofMotion::Close => OCS_ROOF_CLOSE,
        }
    }
}

/// Check that the board is an OCS
pub fn handshake(engine: &CommandEngine) -> Result<(), ProtocolError> {
    match engine.read_long_string(OCS_HANDSHAKE) {
        Reply::Failure(failure) => Err(ProtocolError::HandshakeFailed(format!(
            "no reply to {}: {}",
            OCS_HANDSHAKE, failure
        ))),
        reply => {
            let text = reply.text().unwrap_or_default();
            if text == OCS_HANDSHAKE_REPLY {
                debug!("OCS handshake established");
                Ok(())
            } else {
                Err(ProtocolError::HandshakeFailed(format!(
                    "OCS handshake error, response was '{}'",
                    text
                )))
            }
        }
    }
}

/// Run the OCS discovery steps
pub fn discover(engine: &CommandEngine) -> OcsCapabilities {
    let firmware = match engine.read_long_string(OCS_GET_FIRMWARE) {
        Reply::Failure(failure) => {
            warn!("Failed to read OCS firmware version: {}", failure);
            None
        }
        reply => reply.into_text(),
    };

    let has_dome = engine.read_single_char(OCS_GET_DOME_STATUS).count() > 0;
    if has_dome {
        debug!("OCS has dome");
    } else {
        debug!("OCS does not have dome");
    }

    let roof_delays = discover_roof_delays(engine);

    let caps = OcsCapabilities {
        firmware,
        has_dome,
        roof_delays,
    };
    info!(
        "OCS discovered: firmware {:?}, dome {}, roof delays {:?}",
        caps.firmware, caps.has_dome, caps.roof_delays
    );
    caps
}

fn discover_roof_delays(engine: &CommandEngine) -> Option<RoofDelays> {
    // A one-character reply is an error code, not a delay pair
    match engine.read_long_string(OCS_GET_ROOF_TIMEOUTS) {
        Reply::Overlong(text) => {
            let delays = RoofDelays::parse(&text);
            if delays.is_none() {
                warn!("Invalid response to {}: {}", OCS_GET_ROOF_TIMEOUTS, text);
            }
            delays
        }
        reply => {
            warn!(
                "Communication error on get roof delays {} ({})",
                OCS_GET_ROOF_TIMEOUTS,
                reply.count()
            );
            None
        }
    }
}

/// Connection to one OCS board
pub struct OcsSession {
    engine: CommandEngine,
    capabilities: OcsCapabilities,
}

impl OcsSession {
    /// Attach with the observatory timeouts, handshake and discover
    pub fn connect(link: Box<dyn CommunicationChannel>) -> Result<Self, ProtocolError> {
        Self::connect_with(link, &EngineSettings::observatory())
    }

    /// Attach with explicit settings
    pub fn connect_with(
        link: Box<dyn CommunicationChannel>,
        settings: &EngineSettings,
    ) -> Result<Self, ProtocolError> {
        let engine = CommandEngine::new(link, &settings.clone().validated());
        info!("Connecting to OCS over {:?} link", engine.link_kind());
        handshake(&engine)?;
        let capabilities = discover(&engine);
        Ok(Self {
            engine,
            capabilities,
        })
    }

    /// Engine for issuing commands
    pub fn engine(&self) -> &CommandEngine {
        &self.engine
    }

    /// Capabilities discovered at connect
    pub fn capabilities(&self) -> &OcsCapabilities {
        &self.capabilities
    }

    /// Start the roof moving; returns how long to wait before polling status
    pub fn move_roof(&self, motion: RoofMotion) -> Result<Duration, Failure> {
        self.engine.send_blind(motion.command())?;
        Ok(self.capabilities.roof_poll_delay())
    }

    /// Drop the session, handing back the link
    pub fn disconnect(self) -> Box<dyn CommunicationChannel> {
        debug!("Disconnecting OCS, {:?}", self.engine.stats());
        self.engine.into_link()
    }
}

impl std::fmt::Debug for OcsSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcsSession")
            .field("engine", &self.engine)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}
