//! Command engine
//!
//! Owns the link for one device instance and runs every exchange with the
//! same shape: take the interlock, flush stale input, write, read the framed
//! reply, decode, release. The interlock is released by a guard, so an early
//! return on any failure cannot wedge the link for later callers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, error, warn};

use super::framing::{drain, read_until_sentinel, write_command};
use super::response::{parse_double, parse_int};
use super::{
    Command, CommunicationChannel, Failure, Frame, Interlock, InterlockGuard, LinkKind, Numeric,
    ProtocolError, Reply, TimeoutPolicy, MAX_RESPONSE_LEN,
};
use crate::config::EngineSettings;

/// Cumulative traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Commands written
    pub commands: u64,
    /// Complete replies read
    pub replies: u64,
    /// Exchanges that ended without a sentinel
    pub timeouts: u64,
    /// Numeric replies that did not parse
    pub format_errors: u64,
    /// Stale bytes discarded by flushes
    pub flushed_bytes: u64,
}

#[derive(Debug, Default)]
struct Counters {
    commands: AtomicU64,
    replies: AtomicU64,
    timeouts: AtomicU64,
    format_errors: AtomicU64,
    flushed_bytes: AtomicU64,
}

/// Serialized command/response engine for one link
pub struct CommandEngine {
    /// Guards the bytes on the wire for one write+read pair
    link: Mutex<Box<dyn CommunicationChannel>>,
    /// Spans the whole logical exchange
    interlock: Interlock,
    policy: TimeoutPolicy,
    flush_timeout: Duration,
    max_response_len: usize,
    counters: Counters,
}

impl CommandEngine {
    /// Attach to an open link; the timeout policy follows the link kind
    pub fn new(link: Box<dyn CommunicationChannel>, settings: &EngineSettings) -> Self {
        let policy = TimeoutPolicy::select(link.link_kind(), settings);
        Self::with_policy(link, policy, settings)
    }

    /// Attach with an explicit timeout policy
    pub fn with_policy(
        link: Box<dyn CommunicationChannel>,
        policy: TimeoutPolicy,
        settings: &EngineSettings,
    ) -> Self {
        debug!(
            "command engine on {:?} link, timeout {}s {}us",
            link.link_kind(),
            policy.seconds(),
            policy.microseconds()
        );
        Self {
            link: Mutex::new(link),
            interlock: Interlock::new(),
            policy,
            flush_timeout: Duration::from_millis(settings.flush_timeout_ms),
            max_response_len: settings.max_response_len.clamp(2, MAX_RESPONSE_LEN),
            counters: Counters::default(),
        }
    }

    /// Active timeout policy
    pub fn policy(&self) -> TimeoutPolicy {
        self.policy
    }

    /// Kind of the attached link
    pub fn link_kind(&self) -> LinkKind {
        self.policy.link_kind()
    }

    /// Whether an exchange is in flight
    pub fn is_busy(&self) -> bool {
        self.interlock.is_pending()
    }

    /// Snapshot of the traffic counters
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            commands: self.counters.commands.load(Ordering::Relaxed),
            replies: self.counters.replies.load(Ordering::Relaxed),
            timeouts: self.counters.timeouts.load(Ordering::Relaxed),
            format_errors: self.counters.format_errors.load(Ordering::Relaxed),
            flushed_bytes: self.counters.flushed_bytes.load(Ordering::Relaxed),
        }
    }

    /// Give the link back, e.g. on disconnect
    pub fn into_link(self) -> Box<dyn CommunicationChannel> {
        self.link.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    /// Discard any unread input. Best effort; returns the bytes discarded
    pub fn flush(&self) -> usize {
        let mut link = self.lock_link();
        let discarded = drain(link.as_mut(), self.max_response_len, self.flush_timeout);
        if discarded > 0 {
            self.counters
                .flushed_bytes
                .fetch_add(discarded as u64, Ordering::Relaxed);
        }
        discarded
    }

    /// Send a command that has no reply
    pub fn send_blind(&self, cmd: &str) -> Result<(), Failure> {
        let _guard = self.acquire();
        let command = validate(cmd)?;

        self.flush();
        let mut link = self.lock_link();
        debug!("CMD <{}>", command);
        self.write(link.as_mut(), &command)
            .map(|_| ())
            .map_err(|e| {
                error!("CHECK CONNECTION: error sending command {}: {}", command, e);
                Failure::from(&e)
            })
    }

    /// Send a command answered by `0` on success and anything else on failure
    pub fn send_expecting_success_code(&self, cmd: &str) -> bool {
        let _guard = self.acquire();
        match self.query(cmd) {
            Ok(frame) => frame.payload().first() == Some(&b'0'),
            Err(failure) => {
                warn!("Timeout/Error on response to {}: {}. Check connection.", cmd, failure);
                false
            }
        }
    }

    /// Query with a one-character reply
    ///
    /// Longer replies come back as [`Reply::Overlong`] with the whole text.
    pub fn read_single_char(&self, cmd: &str) -> Reply {
        let _guard = self.acquire();
        match self.query(cmd) {
            Ok(frame) => {
                let reply = Reply::from_frame(&frame);
                if let Reply::Overlong(text) = &reply {
                    debug!("{} answered {} chars: {}", cmd, text.len(), text);
                }
                reply
            }
            Err(failure) => Reply::Failure(failure),
        }
    }

    /// Query with a reply of any length up to the buffer limit
    pub fn read_long_string(&self, cmd: &str) -> Reply {
        let _guard = self.acquire();
        match self.query(cmd) {
            Ok(frame) => Reply::from_frame(&frame),
            Err(failure) => Reply::Failure(failure),
        }
    }

    /// Query with an integer reply
    pub fn read_int(&self, cmd: &str) -> Result<Numeric<i64>, Failure> {
        let _guard = self.acquire();
        let frame = self.query(cmd)?;
        self.decode(cmd, &frame, parse_int)
    }

    /// Query with a floating-point reply
    pub fn read_double(&self, cmd: &str) -> Result<Numeric<f64>, Failure> {
        let _guard = self.acquire();
        let frame = self.query(cmd)?;
        self.decode(cmd, &frame, parse_double)
    }

    fn acquire(&self) -> InterlockGuard<'_> {
        self.interlock.acquire(self.policy.spin_interval())
    }

    fn lock_link(&self) -> MutexGuard<'_, Box<dyn CommunicationChannel>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(
        &self,
        link: &mut dyn CommunicationChannel,
        command: &Command,
    ) -> Result<usize, ProtocolError> {
        let written = write_command(link, command.as_str())?;
        self.counters.commands.fetch_add(1, Ordering::Relaxed);
        Ok(written)
    }

    /// Flush, write and read one framed reply. Caller holds the interlock.
    fn query(&self, cmd: &str) -> Result<Frame, Failure> {
        let command = validate(cmd)?;

        self.flush();
        let result = {
            let mut link = self.lock_link();
            debug!("CMD <{}>", command);
            self.write(link.as_mut(), &command).and_then(|_| {
                read_until_sentinel(link.as_mut(), self.max_response_len, self.policy.read_timeout())
            })
        };

        let frame = match result {
            Ok(frame) => frame,
            Err(e) => {
                let failure = Failure::from(&e);
                if failure == Failure::Timeout {
                    self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                }
                debug!("Error {} on {}: {}", failure.code(), command, e);
                return Err(failure);
            }
        };

        debug!("RES <{}>", frame.text());
        if !frame.is_complete() {
            self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
            debug!("no terminator from {}, discarding partial reply", command);
            return Err(Failure::Timeout);
        }
        self.counters.replies.fetch_add(1, Ordering::Relaxed);
        Ok(frame)
    }

    /// Parse a numeric reply; a malformed one means the link is out of step
    fn decode<T>(
        &self,
        cmd: &str,
        frame: &Frame,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Result<Numeric<T>, Failure> {
        match parse_numeric(cmd, frame, parse) {
            Ok(reading) => Ok(reading),
            Err(e @ ProtocolError::Format { .. }) => {
                warn!("{}, flushing connection", e);
                self.counters.format_errors.fetch_add(1, Ordering::Relaxed);
                self.flush();
                Err(Failure::from(&e))
            }
            Err(e) => {
                debug!("{}", e);
                Err(Failure::from(&e))
            }
        }
    }
}

/// Numeric reading from a complete frame, or why there is none
fn parse_numeric<T>(
    cmd: &str,
    frame: &Frame,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Numeric<T>, ProtocolError> {
    if frame.is_empty() {
        return Err(ProtocolError::EmptyReply(cmd.to_string()));
    }
    let raw = frame.text();
    match parse(&raw) {
        Some(value) => Ok(Numeric {
            value,
            count: frame.len(),
            raw,
        }),
        None => Err(ProtocolError::Format {
            command: cmd.to_string(),
            response: raw,
        }),
    }
}

fn validate(cmd: &str) -> Result<Command, Failure> {
    Command::parse(cmd).map_err(|e| {
        warn!("{}", e);
        Failure::InvalidCommand
    })
}

impl std::fmt::Debug for CommandEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandEngine")
            .field("policy", &self.policy)
            .field("busy", &self.is_busy())
            .field("stats", &self.stats())
            .finish()
    }
}
