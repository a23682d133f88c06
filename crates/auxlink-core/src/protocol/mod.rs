//! Controller Protocol Communication
//!
//! Implements the OnStepX `#`-terminated ASCII command/response protocol.
//!
//! Every command and every reply ends with [`SENTINEL`]. There is no framing
//! beyond that, no checksum and no command id, so correctness depends on
//! strict request/response alternation. [`CommandEngine`] enforces it.

pub mod command_builder;
pub mod commands;
mod engine;
mod error;
pub mod framing;
mod interlock;
pub mod mock;
pub mod response;
pub mod serial;
mod stream;
mod timeout;

pub use command_builder::CommandBuilder;
pub use commands::Command;
pub use engine::{CommandEngine, EngineStats};
pub use error::{Failure, ProtocolError};
pub use framing::Frame;
pub use interlock::{Interlock, InterlockGuard};
pub use response::{Numeric, Reply};
pub use serial::{list_ports, open_port, PortInfo};
pub use stream::{CommunicationChannel, LinkKind, SerialChannel, TcpChannel};
pub use timeout::TimeoutPolicy;

/// Terminator of every command and every reply
pub const SENTINEL: u8 = b'#';

/// Default baud rate for controller communication
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Maximum reply buffer size in bytes, one byte of which is reserved
pub const MAX_RESPONSE_LEN: usize = 64;

/// Maximum command length in bytes, sentinel included
pub const MAX_COMMAND_LEN: usize = 32;

/// Default read timeout for local serial links in milliseconds
pub const DEFAULT_SERIAL_TIMEOUT_MS: u64 = 100;

/// Default read timeout for network links in milliseconds
pub const DEFAULT_NETWORK_TIMEOUT_MS: u64 = 2000;

/// Default per-read timeout while draining stale input in milliseconds
pub const DEFAULT_FLUSH_TIMEOUT_MS: u64 = 20;
