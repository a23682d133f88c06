//! Sentinel framing
//!
//! Low-level write and read primitives. Nothing here knows about the
//! interlock or the reply shapes; see [`super::CommandEngine`] for that.

use std::io;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::{CommunicationChannel, ProtocolError, MAX_RESPONSE_LEN, SENTINEL};

/// Upper bound on frames discarded by one [`drain`] call
const MAX_DRAIN_FRAMES: usize = 256;

/// Bytes read for one reply, sentinel stripped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    payload: Vec<u8>,
    terminated: bool,
    truncated: bool,
}

impl Frame {
    /// Build a frame from already-collected parts
    pub fn new(payload: Vec<u8>, terminated: bool, truncated: bool) -> Self {
        Self {
            payload,
            terminated,
            truncated,
        }
    }

    /// Payload bytes without the sentinel
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload as text, one char per byte
    pub fn text(&self) -> String {
        self.payload.iter().map(|&b| b as char).collect()
    }

    /// Number of payload bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// True when no payload byte was read
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// The sentinel was seen
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// The reply hit the buffer limit and was cut
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// A frame that can be decoded: terminated, or cut at the buffer limit
    pub fn is_complete(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Write a command and push it to the link
pub fn write_command(
    channel: &mut dyn CommunicationChannel,
    command: &str,
) -> Result<usize, ProtocolError> {
    let bytes = command.as_bytes();
    channel
        .write_all(bytes)
        .and_then(|_| channel.flush())
        .map_err(|source| ProtocolError::Write {
            command: command.to_string(),
            source,
        })?;
    Ok(bytes.len())
}

/// Read until the sentinel, the timeout, or the buffer limit
///
/// `max_len` is the buffer size; one byte of it is reserved, so at most
/// `max_len - 1` payload bytes are kept. Reaching the limit is logged and the
/// frame is returned with [`Frame::is_truncated`] set. When the timeout fires
/// after some bytes arrived, those bytes are returned unterminated; when it
/// fires before any byte arrived the result is [`ProtocolError::Timeout`].
pub fn read_until_sentinel(
    channel: &mut dyn CommunicationChannel,
    max_len: usize,
    timeout: Duration,
) -> Result<Frame, ProtocolError> {
    let capacity = max_len.saturating_sub(1).max(1);
    let mut payload = Vec::with_capacity(capacity.min(MAX_RESPONSE_LEN));
    let mut byte = [0u8; 1];
    let deadline = Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        channel.set_timeout(remaining)?;

        match channel.read(&mut byte) {
            Ok(0) => {
                if payload.is_empty() {
                    return Err(ProtocolError::LinkClosed);
                }
                debug!("link closed after {} bytes without sentinel", payload.len());
                return Ok(Frame::new(payload, false, false));
            }
            Ok(_) if byte[0] == SENTINEL => {
                return Ok(Frame::new(payload, true, false));
            }
            Ok(_) => {
                if payload.len() >= capacity {
                    warn!(
                        "reply reached {} bytes without sentinel, truncating: {}",
                        max_len,
                        String::from_utf8_lossy(&payload)
                    );
                    return Ok(Frame::new(payload, false, true));
                }
                payload.push(byte[0]);
            }
            Err(ref e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) => {}
            Err(e) => return Err(ProtocolError::Io(e)),
        }
    }

    if payload.is_empty() {
        Err(ProtocolError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        })
    } else {
        debug!(
            "timeout with {} bytes and no sentinel: {}",
            payload.len(),
            String::from_utf8_lossy(&payload)
        );
        Ok(Frame::new(payload, false, false))
    }
}

/// Discard everything pending on the link
///
/// Purges the OS input buffer, then keeps doing short reads until one comes
/// back with nothing. Never fails; returns the number of bytes thrown away.
pub fn drain(channel: &mut dyn CommunicationChannel, max_len: usize, per_read: Duration) -> usize {
    if let Err(e) = channel.clear_input_buffer() {
        debug!("flush: clearing input buffer failed: {}", e);
    }

    let mut discarded = 0;
    for _ in 0..MAX_DRAIN_FRAMES {
        match read_until_sentinel(channel, max_len, per_read) {
            Ok(frame) if !frame.is_empty() || frame.is_terminated() => {
                debug!(
                    "flush: information in buffer: bytes: {}, string: {}",
                    frame.len(),
                    frame.text()
                );
                discarded += frame.len() + usize::from(frame.is_terminated());
            }
            _ => return discarded,
        }
    }

    warn!("flush: link still producing data after {} frames", MAX_DRAIN_FRAMES);
    discarded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::mock::MockChannel;

    const TIMEOUT: Duration = Duration::from_millis(30);

    #[test]
    fn test_read_strips_sentinel() {
        let mut link = MockChannel::new();
        link.push_stale(b"10.30g#");
        let frame = read_until_sentinel(&mut link, 64, TIMEOUT).unwrap();
        assert_eq!(frame.text(), "10.30g");
        assert!(frame.is_terminated());
        assert!(!frame.is_truncated());
    }

    #[test]
    fn test_read_leaves_following_frame_on_link() {
        let mut link = MockChannel::new();
        link.push_stale(b"1#2#");
        assert_eq!(read_until_sentinel(&mut link, 64, TIMEOUT).unwrap().text(), "1");
        assert_eq!(read_until_sentinel(&mut link, 64, TIMEOUT).unwrap().text(), "2");
    }

    #[test]
    fn test_read_without_sentinel_returns_partial() {
        let mut link = MockChannel::new();
        link.push_stale(b"On-St");
        let frame = read_until_sentinel(&mut link, 64, TIMEOUT).unwrap();
        assert_eq!(frame.text(), "On-St");
        assert!(!frame.is_complete());
    }

    #[test]
    fn test_read_nothing_times_out() {
        let mut link = MockChannel::new();
        let err = read_until_sentinel(&mut link, 64, TIMEOUT).unwrap_err();
        assert!(matches!(err, ProtocolError::Timeout { .. }));
    }

    #[test]
    fn test_read_truncates_at_buffer_limit() {
        let mut link = MockChannel::new();
        let long = "x".repeat(64);
        link.push_stale(format!("{}#", long).as_bytes());
        let frame = read_until_sentinel(&mut link, 64, TIMEOUT).unwrap();
        assert!(frame.is_truncated());
        assert!(frame.is_complete());
        assert_eq!(frame.len(), 63);
    }

    #[test]
    fn test_read_one_below_limit_is_not_truncated() {
        let mut link = MockChannel::new();
        let fits = "y".repeat(63);
        link.push_stale(format!("{}#", fits).as_bytes());
        let frame = read_until_sentinel(&mut link, 64, TIMEOUT).unwrap();
        assert!(frame.is_terminated());
        assert!(!frame.is_truncated());
        assert_eq!(frame.len(), 63);
    }

    #[test]
    fn test_read_with_huge_limit_does_not_preallocate() {
        let mut link = MockChannel::new();
        link.push_stale(b"On-Step#");
        let frame = read_until_sentinel(&mut link, usize::MAX, TIMEOUT).unwrap();
        assert_eq!(frame.text(), "On-Step");
        assert!(frame.is_terminated());
    }

    #[test]
    fn test_read_failure_is_io_error() {
        let mut link = MockChannel::new();
        link.fail_reads(true);
        let err = read_until_sentinel(&mut link, 64, TIMEOUT).unwrap_err();
        assert!(matches!(err, ProtocolError::Io(_)));
    }

    #[test]
    fn test_read_closed_link() {
        let mut link = MockChannel::new();
        link.close();
        let err = read_until_sentinel(&mut link, 64, TIMEOUT).unwrap_err();
        assert!(matches!(err, ProtocolError::LinkClosed));
    }

    #[test]
    fn test_drain_discards_everything() {
        let mut link = MockChannel::new();
        link.push_stale(b"0#On-Step#garbage");
        let discarded = drain(&mut link, 64, TIMEOUT);
        assert_eq!(discarded, 2 + 8 + 7);
        assert_eq!(link.pending_len(), 0);
    }

    #[test]
    fn test_drain_on_empty_link_is_noop() {
        let mut link = MockChannel::new();
        let start = Instant::now();
        assert_eq!(drain(&mut link, 64, TIMEOUT), 0);
        assert!(start.elapsed() < Duration::from_millis(500));
        assert!(link.writes().is_empty());
    }

    #[test]
    fn test_write_failure_is_reported() {
        let mut link = MockChannel::new();
        link.fail_writes(true);
        let err = write_command(&mut link, ":FQ#").unwrap_err();
        assert!(matches!(err, ProtocolError::Write { .. }));
    }
}
