//! # AuxLink Core Library
//!
//! Core functionality for driving OnStepX auxiliary and observatory
//! controllers over a serial port or a TCP socket.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - `#`-terminated ASCII command framing and typed response decoding
//! - A command engine that keeps exactly one command in flight per link
//! - Stale-input flushing and link-kind dependent timeout policy
//! - Capability discovery (focuser, rotator, weather, auxiliary features)
//! - Handshake and discovery for Observatory Control System roof/dome boards
//! - A simulated controller board for running without hardware
//!
//! ## Example
//!
//! ```rust,ignore
//! use auxlink_core::{config::EngineSettings, controller::AuxController, protocol::open_port};
//!
//! let link = open_port("/dev/ttyACM0", None)?;
//! let mut controller = AuxController::new(EngineSettings::default());
//! let caps = controller.connect(Box::new(link))?;
//! println!("focuser: {}", caps.has_focuser());
//!
//! // Decoder failures are plain result codes, not `std::error::Error`
//! match controller.engine()?.read_int(":FG#") {
//!     Ok(position) => println!("focuser at {}", position.value),
//!     Err(failure) => println!("no position: {} ({})", failure, failure.code()),
//! }
//! ```

pub mod config;
pub mod controller;
pub mod demo;
pub mod discovery;
pub mod ocs;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::EngineSettings;
    pub use crate::controller::{AuxController, ConnectionState};
    pub use crate::demo::DemoController;
    pub use crate::discovery::{CapabilitySet, Feature, FeatureKind, RotatorPresence};
    pub use crate::ocs::{OcsCapabilities, OcsSession, RoofDelays, RoofMotion};
    pub use crate::protocol::{
        CommandEngine, CommunicationChannel, Failure, LinkKind, Numeric, ProtocolError, Reply,
        TimeoutPolicy,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
