//! Capability discovery
//!
//! Runs once after a successful handshake and decides which optional
//! subsystems the board implements. Every step tolerates the subsystem being
//! missing; a failed query leaves that capability off and the sequence goes on.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::EngineSettings;
use crate::protocol::command_builder::indexed_command;
use crate::protocol::commands::{
    GET_DEFINED_FEATURES, GET_DEFINED_FOCUSERS, GET_DEFINED_ROTATOR, GET_DEW_POINT,
    GET_FEATURE_DEFINITION_PART, GET_FIRMWARE, GET_HUMIDITY, GET_PRESSURE, GET_TEMPERATURE,
};
use crate::protocol::response::leading_number;
use crate::protocol::{CommandEngine, Reply};

/// Maximum number of auxiliary feature slots
pub const MAX_FEATURES: usize = 8;

/// Maximum number of focusers a board can define
pub const MAX_FOCUSERS: u8 = 6;

/// Replies that mean a weather sensor is not fitted
const ABSENT_WEATHER_REPLIES: [&str; 3] = ["N/A", "nan", "0"];

/// Rotator answer to `:rA#`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotatorPresence {
    /// A rotator is defined
    Present {
        /// Also supports derotation
        derotator: bool,
    },
    /// The board said no. Not asked again this session
    Absent,
    /// The query failed or the reply was not understood
    Unknown,
}

impl RotatorPresence {
    /// Classify a reply to the rotator query
    pub fn from_reply(reply: &Reply) -> Self {
        match reply {
            Reply::Exact(text) if text == "0" => RotatorPresence::Absent,
            Reply::Exact(text) | Reply::Overlong(text) => match text.chars().next() {
                Some('1') | Some('R') => RotatorPresence::Present { derotator: false },
                Some('D') => RotatorPresence::Present { derotator: true },
                _ => {
                    debug!("unrecognised rotator reply: {}", text);
                    RotatorPresence::Unknown
                }
            },
            Reply::Failure(_) => RotatorPresence::Unknown,
        }
    }

    /// Whether the rotator is known to exist
    pub fn is_present(&self) -> bool {
        matches!(self, RotatorPresence::Present { .. })
    }

    /// Whether polling the rotator is still allowed
    pub fn may_poll(&self) -> bool {
        !matches!(self, RotatorPresence::Absent)
    }
}

/// Weather sensor channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeatherMeasurement {
    /// Ambient temperature, deg C
    Temperature,
    /// Barometric pressure, mb
    Pressure,
    /// Relative humidity, %
    Humidity,
    /// Dew point, deg C
    DewPoint,
}

impl WeatherMeasurement {
    /// All channels, in query order
    pub const ALL: [WeatherMeasurement; 4] = [
        WeatherMeasurement::Temperature,
        WeatherMeasurement::Pressure,
        WeatherMeasurement::Humidity,
        WeatherMeasurement::DewPoint,
    ];

    /// Query command for this channel
    pub fn command(self) -> &'static str {
        match self {
            WeatherMeasurement::Temperature => GET_TEMPERATURE,
            WeatherMeasurement::Pressure => GET_PRESSURE,
            WeatherMeasurement::Humidity => GET_HUMIDITY,
            WeatherMeasurement::DewPoint => GET_DEW_POINT,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Auxiliary feature type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureKind {
    /// On/off switch (type 1)
    Switch,
    /// Analog output (type 2)
    AnalogOutput,
    /// Dew heater (type 3)
    DewHeater,
    /// Intervalometer (type 4)
    Intervalometer,
    /// Momentary switch (type 5)
    MomentarySwitch,
    /// Cover switch (type 6)
    CoverSwitch,
    /// Any other code
    Unknown(i32),
}

impl FeatureKind {
    /// Map the numeric type code from a feature definition
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => FeatureKind::Switch,
            2 => FeatureKind::AnalogOutput,
            3 => FeatureKind::DewHeater,
            4 => FeatureKind::Intervalometer,
            5 => FeatureKind::MomentarySwitch,
            6 => FeatureKind::CoverSwitch,
            other => FeatureKind::Unknown(other),
        }
    }

    /// Toggle-like outputs
    pub fn is_switch(self) -> bool {
        matches!(
            self,
            FeatureKind::Switch | FeatureKind::MomentarySwitch | FeatureKind::CoverSwitch
        )
    }
}

/// One defined auxiliary feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Slot number, 1-based
    pub index: usize,
    /// User-assigned name
    pub name: String,
    /// Output type
    pub kind: FeatureKind,
}

impl Feature {
    /// Parse a `name,type` definition reply
    pub fn parse(index: usize, text: &str) -> Option<Self> {
        let (name, kind) = text.split_once(',')?;
        let name = name.trim();
        let kind = kind.trim();
        if name.is_empty() || name == "N/A" || kind == "N/A" {
            return None;
        }
        let code = kind.parse::<i32>().ok()?;
        Some(Feature {
            index,
            name: name.to_string(),
            kind: FeatureKind::from_code(code),
        })
    }
}

/// What the connected board implements
///
/// Built once by [`discover`] and never changed until disconnect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySet {
    /// Firmware version string as reported
    pub firmware: Option<String>,
    /// Number of defined focusers
    pub focuser_count: u8,
    /// Rotator answer
    pub rotator: RotatorPresence,
    /// Present weather channels, indexed like [`WeatherMeasurement::ALL`]
    pub weather_channels: [bool; 4],
    /// Defined auxiliary features
    pub features: Vec<Feature>,
    /// The feature bitmap was positive
    pub has_features: bool,
}

impl Default for CapabilitySet {
    fn default() -> Self {
        Self {
            firmware: None,
            focuser_count: 0,
            rotator: RotatorPresence::Unknown,
            weather_channels: [false; 4],
            features: Vec::new(),
            has_features: false,
        }
    }
}

impl CapabilitySet {
    /// At least one focuser
    pub fn has_focuser(&self) -> bool {
        self.focuser_count > 0
    }

    /// A rotator is defined
    pub fn has_rotator(&self) -> bool {
        self.rotator.is_present()
    }

    /// Any weather channel is fitted
    pub fn has_weather(&self) -> bool {
        self.weather_channels.iter().any(|&present| present)
    }

    /// Auxiliary features are defined
    pub fn has_features(&self) -> bool {
        self.has_features
    }

    /// Whether one weather channel is fitted
    pub fn has_measurement(&self, measurement: WeatherMeasurement) -> bool {
        self.weather_channels[measurement.index()]
    }

    /// Fitted weather channels, in query order
    pub fn weather_measurements(&self) -> Vec<WeatherMeasurement> {
        WeatherMeasurement::ALL
            .into_iter()
            .filter(|m| self.has_measurement(*m))
            .collect()
    }

    /// Leading numeric part of the firmware version
    pub fn firmware_version(&self) -> Option<f64> {
        self.firmware.as_deref().and_then(leading_number)
    }
}

/// Run the discovery sequence
pub fn discover(engine: &CommandEngine, settings: &EngineSettings) -> CapabilitySet {
    let mut caps = CapabilitySet {
        firmware: discover_firmware(engine, settings),
        ..CapabilitySet::default()
    };

    caps.focuser_count = discover_focusers(engine);
    caps.rotator = RotatorPresence::from_reply(&engine.read_single_char(GET_DEFINED_ROTATOR));
    match caps.rotator {
        RotatorPresence::Present { derotator } => {
            debug!("Rotator found (derotator: {}), enabling rotator", derotator)
        }
        RotatorPresence::Absent => debug!("Rotator not defined, disabling rotator polling"),
        RotatorPresence::Unknown => debug!("Rotator query inconclusive, will retry later"),
    }

    for measurement in WeatherMeasurement::ALL {
        let present = weather_present(&engine.read_long_string(measurement.command()));
        debug!("Weather {:?}: {}", measurement, if present { "found" } else { "not found" });
        caps.weather_channels[measurement.index()] = present;
    }

    let (has_features, features) = discover_features(engine);
    caps.has_features = has_features;
    caps.features = features;

    info!(
        "Discovered: focusers {}, rotator {:?}, weather {}, features {}",
        caps.focuser_count,
        caps.rotator,
        caps.has_weather(),
        caps.features.len()
    );
    caps
}

fn discover_firmware(engine: &CommandEngine, settings: &EngineSettings) -> Option<String> {
    let firmware = match engine.read_long_string(GET_FIRMWARE) {
        Reply::Failure(failure) => {
            warn!("Failed to read firmware version: {}", failure);
            return None;
        }
        reply => reply.into_text()?,
    };

    match leading_number(&firmware) {
        Some(version) if version >= settings.minimum_firmware => {
            info!("Firmware version {}", firmware)
        }
        Some(_) => warn!(
            "Firmware {} is older than {}; some features may not work",
            firmware, settings.minimum_firmware
        ),
        None => warn!("Unrecognised firmware version: {}", firmware),
    }
    Some(firmware)
}

fn discover_focusers(engine: &CommandEngine) -> u8 {
    match engine.read_int(GET_DEFINED_FOCUSERS) {
        Ok(reading) if reading.value > 0 => {
            let count = reading.value.min(MAX_FOCUSERS as i64) as u8;
            debug!("{} focuser(s) found, enabling focuser", count);
            count
        }
        Ok(_) => {
            debug!("Focuser not found, disabling focuser");
            0
        }
        Err(failure) => {
            debug!("Focuser query failed ({}), disabling focuser", failure);
            0
        }
    }
}

fn weather_present(reply: &Reply) -> bool {
    match reply.text() {
        Some(text) => !ABSENT_WEATHER_REPLIES.contains(&text.trim()),
        None => false,
    }
}

fn discover_features(engine: &CommandEngine) -> (bool, Vec<Feature>) {
    let bitmap = match engine.read_int(GET_DEFINED_FEATURES) {
        Ok(reading) if reading.value > 0 => reading.raw,
        Ok(_) => {
            debug!("No auxiliary features defined");
            return (false, Vec::new());
        }
        Err(failure) => {
            debug!("Feature query failed: {}", failure);
            return (false, Vec::new());
        }
    };

    let mut features = Vec::new();
    for (slot, digit) in bitmap.trim().chars().take(MAX_FEATURES).enumerate() {
        if digit != '1' {
            continue;
        }
        let index = slot + 1;
        let command = match indexed_command(GET_FEATURE_DEFINITION_PART, index) {
            Ok(command) => command,
            Err(e) => {
                warn!("{}", e);
                continue;
            }
        };
        match engine.read_long_string(command.as_str()) {
            Reply::Failure(failure) => {
                warn!("Feature {} definition query failed: {}", index, failure)
            }
            reply => match reply.text().and_then(|text| Feature::parse(index, text)) {
                Some(feature) => {
                    debug!("Feature{} name:{}, type:{:?}", index, feature.name, feature.kind);
                    features.push(feature);
                }
                None => warn!("Invalid response to {}: {:?}", command, reply.text()),
            },
        }
    }
    (true, features)
}
