//! Controller connection lifecycle
//!
//! One [`AuxController`] per physical board: it takes an open link, picks the
//! timeout policy, verifies the board with the handshake and runs discovery.
//! The capability set lives exactly as long as the connection.

use tracing::{debug, info, warn};

use crate::config::EngineSettings;
use crate::discovery::{discover, CapabilitySet, RotatorPresence, WeatherMeasurement};
use crate::protocol::commands::{GET_DEFINED_ROTATOR, HANDSHAKE, HANDSHAKE_REPLY};
use crate::protocol::{CommandEngine, CommunicationChannel, ProtocolError, Reply, TimeoutPolicy};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Handshake or discovery in progress
    Connecting,
    /// Connected and discovered
    Connected,
    /// Last connection attempt failed
    Error,
}

struct Session {
    engine: CommandEngine,
    capabilities: CapabilitySet,
}

/// Connection to one OnStepX auxiliary controller
pub struct AuxController {
    settings: EngineSettings,
    state: ConnectionState,
    session: Option<Session>,
}

impl AuxController {
    /// Create a disconnected controller
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings: settings.validated(),
            state: ConnectionState::Disconnected,
            session: None,
        }
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether a session is active
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Settings in effect
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Attach an open link, handshake and discover
    pub fn connect(
        &mut self,
        link: Box<dyn CommunicationChannel>,
    ) -> Result<&CapabilitySet, ProtocolError> {
        if self.session.is_some() {
            return Err(ProtocolError::AlreadyConnected);
        }
        self.state = ConnectionState::Connecting;

        let policy = TimeoutPolicy::select(link.link_kind(), &self.settings);
        info!("Connecting over {:?} link ({:?})", policy.link_kind(), policy);
        let engine = CommandEngine::with_policy(link, policy, &self.settings);

        if let Err(e) = handshake(&engine) {
            warn!("{}", e);
            self.state = ConnectionState::Error;
            return Err(e);
        }

        let capabilities = discover(&engine, &self.settings);
        self.state = ConnectionState::Connected;
        let session = self.session.insert(Session {
            engine,
            capabilities,
        });
        Ok(&session.capabilities)
    }

    /// Drop the engine and the capability set, handing back the link
    pub fn disconnect(&mut self) -> Option<Box<dyn CommunicationChannel>> {
        self.state = ConnectionState::Disconnected;
        let session = self.session.take()?;
        debug!("Disconnecting, {:?}", session.engine.stats());
        Some(session.engine.into_link())
    }

    /// Engine for issuing commands
    pub fn engine(&self) -> Result<&CommandEngine, ProtocolError> {
        self.session
            .as_ref()
            .map(|s| &s.engine)
            .ok_or(ProtocolError::NotConnected)
    }

    /// Capabilities discovered at connect
    pub fn capabilities(&self) -> Result<&CapabilitySet, ProtocolError> {
        self.session
            .as_ref()
            .map(|s| &s.capabilities)
            .ok_or(ProtocolError::NotConnected)
    }

    /// Active timeout policy
    pub fn policy(&self) -> Result<TimeoutPolicy, ProtocolError> {
        self.engine().map(CommandEngine::policy)
    }

    /// Read every fitted weather channel
    ///
    /// Channels whose reading fails this time are left out of the result.
    pub fn poll_weather(&self) -> Result<Vec<(WeatherMeasurement, f64)>, ProtocolError> {
        let session = self.session.as_ref().ok_or(ProtocolError::NotConnected)?;
        let mut readings = Vec::new();
        for measurement in session.capabilities.weather_measurements() {
            match session.engine.read_double(measurement.command()) {
                Ok(reading) => readings.push((measurement, reading.value)),
                Err(failure) => debug!("Weather {:?} read failed: {}", measurement, failure),
            }
        }
        Ok(readings)
    }

    /// Ask the board about its rotator again
    ///
    /// A board that answered `0` at connect is not asked again. The result is
    /// returned to the caller; the capability set keeps its connect-time value.
    pub fn probe_rotator(&self) -> Result<RotatorPresence, ProtocolError> {
        let session = self.session.as_ref().ok_or(ProtocolError::NotConnected)?;
        if !session.capabilities.rotator.may_poll() {
            return Ok(RotatorPresence::Absent);
        }
        Ok(RotatorPresence::from_reply(
            &session.engine.read_single_char(GET_DEFINED_ROTATOR),
        ))
    }
}

impl std::fmt::Debug for AuxController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuxController")
            .field("state", &self.state)
            .field("settings", &self.settings)
            .finish()
    }
}

fn handshake(engine: &CommandEngine) -> Result<(), ProtocolError> {
    match engine.read_long_string(HANDSHAKE) {
        Reply::Failure(failure) => Err(ProtocolError::HandshakeFailed(format!(
            "no reply to {}: {}",
            HANDSHAKE, failure
        ))),
        reply => {
            let text = reply.text().unwrap_or_default();
            if text == HANDSHAKE_REPLY {
                info!("Handshake ok: {}", text);
                Ok(())
            } else {
                Err(ProtocolError::HandshakeFailed(format!(
                    "unexpected product name '{}'",
                    text
                )))
            }
        }
    }
}
