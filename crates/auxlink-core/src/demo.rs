//! Demo Mode - Simulated auxiliary controller for running without hardware
//!
//! [`DemoController`] behaves like an OnStepX auxiliary board on the other end
//! of a link: it parses `#`-terminated commands as they are written and queues
//! the replies the firmware would send. Weather readings drift slowly through
//! the night with a little sensor noise.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::discovery::{FeatureKind, MAX_FEATURES};
use crate::protocol::commands::{
    GET_DEFINED_FEATURES, GET_DEFINED_FOCUSERS, GET_DEFINED_ROTATOR, GET_DEW_POINT,
    GET_FEATURE_DEFINITION_PART, GET_FIRMWARE,
    GET_FOCUSER_POSITION, GET_HUMIDITY, GET_PRESSURE, GET_TEMPERATURE, HANDSHAKE, HANDSHAKE_REPLY,
    MOVE_FOCUSER_ABS_PART, STOP_FOCUSER,
};
use crate::protocol::{CommunicationChannel, LinkKind, SENTINEL};

/// Firmware version the simulated board reports
pub const DEMO_FIRMWARE: &str = "10.30g";

/// Hardware fitted to the simulated board
#[derive(Debug, Clone, PartialEq)]
pub struct DemoBoard {
    /// Number of defined focusers
    pub focusers: u8,
    /// Rotator reply character: `0`, `1`, `R` or `D`
    pub rotator: char,
    /// Fitted weather channels: temperature, pressure, humidity, dew point
    pub weather: [bool; 4],
    /// Defined features as (slot, name, kind); slots are 1-based
    pub features: Vec<(usize, String, FeatureKind)>,
    /// Highest focuser position in steps
    pub focuser_max: u32,
}

impl Default for DemoBoard {
    fn default() -> Self {
        Self {
            focusers: 1,
            rotator: 'R',
            weather: [true, true, true, false],
            features: vec![
                (1, "Dew1".to_string(), FeatureKind::DewHeater),
                (3, "Flat".to_string(), FeatureKind::CoverSwitch),
            ],
            focuser_max: 50_000,
        }
    }
}

impl DemoBoard {
    /// A board with nothing optional fitted
    pub fn bare() -> Self {
        Self {
            focusers: 0,
            rotator: '0',
            weather: [false; 4],
            features: Vec::new(),
            focuser_max: 0,
        }
    }

    fn feature_bitmap(&self) -> String {
        (1..=MAX_FEATURES)
            .map(|slot| {
                if self.features.iter().any(|(s, _, _)| *s == slot) {
                    '1'
                } else {
                    '0'
                }
            })
            .collect()
    }
}

fn kind_code(kind: FeatureKind) -> i32 {
    match kind {
        FeatureKind::Switch => 1,
        FeatureKind::AnalogOutput => 2,
        FeatureKind::DewHeater => 3,
        FeatureKind::Intervalometer => 4,
        FeatureKind::MomentarySwitch => 5,
        FeatureKind::CoverSwitch => 6,
        FeatureKind::Unknown(code) => code,
    }
}

/// Simulated board usable as a link
pub struct DemoController {
    board: DemoBoard,
    started: Instant,
    outgoing: VecDeque<u8>,
    partial_command: Vec<u8>,
    timeout: Duration,
    focuser_position: u32,
    rng: StdRng,
}

impl Default for DemoController {
    fn default() -> Self {
        Self::new(DemoBoard::default())
    }
}

impl DemoController {
    /// Create a simulated board
    pub fn new(board: DemoBoard) -> Self {
        Self::with_rng(board, StdRng::from_entropy())
    }

    /// Create a simulated board with reproducible sensor noise
    pub fn with_seed(board: DemoBoard, seed: u64) -> Self {
        Self::with_rng(board, StdRng::seed_from_u64(seed))
    }

    fn with_rng(board: DemoBoard, rng: StdRng) -> Self {
        let focuser_position = board.focuser_max / 2;
        Self {
            board,
            started: Instant::now(),
            outgoing: VecDeque::new(),
            partial_command: Vec::new(),
            timeout: Duration::from_millis(100),
            focuser_position,
            rng,
        }
    }

    /// Current simulated focuser position
    pub fn focuser_position(&self) -> u32 {
        self.focuser_position
    }

    /// Current reading for weather channel `index`
    fn weather_value(&mut self, index: usize) -> f64 {
        let hours = self.started.elapsed().as_secs_f64() / 3600.0;
        // Evening cool-down
        let temperature = 8.0 + 6.0 * (-hours / 3.0).exp();
        let noise = self.rng.gen_range(-0.05..0.05);
        match index {
            0 => temperature + noise,
            1 => 1013.25 + 2.0 * (hours * 0.5).sin() + noise * 10.0,
            2 => (55.0 + 10.0 * (1.0 - (-hours / 4.0).exp()) + noise * 20.0).clamp(0.0, 100.0),
            _ => temperature - 4.5 + noise,
        }
    }

    fn weather_reply(&mut self, index: usize) -> String {
        if self.board.weather[index] {
            format!("{:.1}", self.weather_value(index))
        } else {
            "N/A".to_string()
        }
    }

    /// Reply payload for one complete command, `None` for commands with no reply
    fn answer(&mut self, command: &str) -> Option<String> {
        let reply = match command {
            HANDSHAKE => HANDSHAKE_REPLY.to_string(),
            GET_FIRMWARE => DEMO_FIRMWARE.to_string(),
            GET_DEFINED_FOCUSERS => self.board.focusers.to_string(),
            GET_DEFINED_ROTATOR => self.board.rotator.to_string(),
            GET_TEMPERATURE => self.weather_reply(0),
            GET_PRESSURE => self.weather_reply(1),
            GET_HUMIDITY => self.weather_reply(2),
            GET_DEW_POINT => self.weather_reply(3),
            GET_DEFINED_FEATURES => self.board.feature_bitmap(),
            GET_FOCUSER_POSITION if self.board.focusers > 0 => self.focuser_position.to_string(),
            STOP_FOCUSER => return None,
            _ => return self.answer_with_argument(command),
        };
        Some(reply)
    }

    fn answer_with_argument(&mut self, command: &str) -> Option<String> {
        let body = command.strip_suffix(SENTINEL as char)?;

        if let Some(arg) = body.strip_prefix(GET_FEATURE_DEFINITION_PART) {
            let slot = arg.parse::<usize>().ok()?;
            let definition = self
                .board
                .features
                .iter()
                .find(|(s, _, _)| *s == slot)
                .map(|(_, name, kind)| format!("{},{}", name, kind_code(*kind)));
            return Some(definition.unwrap_or_else(|| "N/A,N/A".to_string()));
        }

        if let Some(arg) = body.strip_prefix(MOVE_FOCUSER_ABS_PART) {
            return Some(match arg.parse::<i64>() {
                Ok(target)
                    if self.board.focusers > 0
                        && (0..=self.board.focuser_max as i64).contains(&target) =>
                {
                    self.focuser_position = target as u32;
                    "1".to_string()
                }
                _ => "0".to_string(),
            });
        }

        debug!("demo: no reply to {}", command);
        None
    }

    fn complete_command(&mut self, command: &str) {
        if let Some(reply) = self.answer(command) {
            self.outgoing.extend(reply.bytes());
            self.outgoing.push_back(SENTINEL);
        }
    }
}

impl Read for DemoController {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.outgoing.is_empty() {
            // Nothing to say: behave like a quiet port
            std::thread::sleep(self.timeout);
            return Err(io::Error::new(io::ErrorKind::TimedOut, "demo: no data"));
        }
        let n = buf.len().min(self.outgoing.len());
        for (slot, byte) in buf.iter_mut().zip(self.outgoing.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for DemoController {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &b in buf {
            self.partial_command.push(b);
            if b == SENTINEL {
                let bytes = std::mem::take(&mut self.partial_command);
                let command = String::from_utf8_lossy(&bytes).into_owned();
                self.complete_command(&command);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CommunicationChannel for DemoController {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.outgoing.clear();
        Ok(())
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        Ok(self.outgoing.len() as u32)
    }

    fn link_kind(&self) -> LinkKind {
        LinkKind::Serial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineSettings;
    use crate::controller::AuxController;
    use crate::discovery::RotatorPresence;
    use crate::protocol::{CommandEngine, Reply};

    #[test]
    fn test_board_answers_handshake() {
        let engine = CommandEngine::new(
            Box::new(DemoController::with_seed(DemoBoard::default(), 7)),
            &EngineSettings::default(),
        );
        assert_eq!(engine.read_long_string(":GVP#"), Reply::Overlong("On-Step".into()));
        assert_eq!(engine.read_long_string(":GVN#").text(), Some(DEMO_FIRMWARE));
    }

    #[test]
    fn test_discovers_default_board() {
        let mut controller = AuxController::new(EngineSettings::default());
        let caps = controller
            .connect(Box::new(DemoController::with_seed(DemoBoard::default(), 1)))
            .unwrap()
            .clone();

        assert_eq!(caps.focuser_count, 1);
        assert_eq!(caps.rotator, RotatorPresence::Present { derotator: false });
        assert!(caps.has_weather());
        assert_eq!(caps.weather_measurements().len(), 3);
        assert_eq!(caps.features.len(), 2);
        assert_eq!(caps.features[1].index, 3);
        assert_eq!(caps.features[1].kind, FeatureKind::CoverSwitch);

        let readings = controller.poll_weather().unwrap();
        assert_eq!(readings.len(), 3);
        let (_, temperature) = readings[0];
        assert!((7.0..15.0).contains(&temperature), "temperature {}", temperature);
    }

    #[test]
    fn test_bare_board_has_nothing() {
        let mut controller = AuxController::new(EngineSettings::default());
        let caps = controller
            .connect(Box::new(DemoController::new(DemoBoard::bare())))
            .unwrap();
        assert!(!caps.has_focuser());
        assert_eq!(caps.rotator, RotatorPresence::Absent);
        assert!(!caps.has_weather());
        assert!(!caps.has_features());
    }

    #[test]
    fn test_focuser_move() {
        let engine = CommandEngine::new(
            Box::new(DemoController::default()),
            &EngineSettings::default(),
        );
        assert_eq!(engine.read_single_char(":FS012345#"), Reply::Exact("1".into()));
        assert_eq!(engine.read_int(":FG#").unwrap().value, 12345);
        engine.send_blind(":FQ#").unwrap();
        assert_eq!(engine.read_single_char(":FS999999#"), Reply::Exact("0".into()));
        assert_eq!(engine.read_int(":FG#").unwrap().value, 12345);
    }
}
