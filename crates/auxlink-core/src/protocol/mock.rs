//! Scripted in-memory link for tests and offline tooling
//!
//! [`MockChannel`] answers complete commands from a script, can delay a
//! reply, inject stale bytes, fail reads or writes, or close. It records
//! wire traffic. Clones share state, so a test keeps one clone for inspection
//! after handing the other to the engine.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::{CommunicationChannel, LinkKind, SENTINEL};

/// Observable wire traffic, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    /// A complete command was written
    Write(String),
    /// The last byte of the reply to this command was read
    Reply(String),
}

/// Bytes queued on the receive side
#[derive(Debug)]
struct Segment {
    bytes: VecDeque<u8>,
    command: Option<String>,
    ready_at: Instant,
}

#[derive(Debug)]
struct MockState {
    kind: LinkKind,
    script: HashMap<String, VecDeque<Vec<u8>>>,
    latency: HashMap<String, Duration>,
    incoming: VecDeque<Segment>,
    partial_command: Vec<u8>,
    timeout: Duration,
    events: Vec<WireEvent>,
    fail_writes: bool,
    fail_reads: bool,
    closed: bool,
    clear_calls: usize,
}

/// Scripted link double
#[derive(Debug, Clone)]
pub struct MockChannel {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChannel {
    /// A serial-kind link with an empty script
    pub fn new() -> Self {
        Self::with_kind(LinkKind::Serial)
    }

    /// A network-kind link with an empty script
    pub fn network() -> Self {
        Self::with_kind(LinkKind::Network)
    }

    /// An empty link of the given kind
    pub fn with_kind(kind: LinkKind) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                kind,
                script: HashMap::new(),
                latency: HashMap::new(),
                incoming: VecDeque::new(),
                partial_command: Vec::new(),
                timeout: Duration::from_millis(100),
                events: Vec::new(),
                fail_writes: false,
                fail_reads: false,
                closed: false,
                clear_calls: 0,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Answer `command` with `reply` every time (reply bytes sent as given)
    pub fn respond(&self, command: &str, reply: &str) -> &Self {
        self.respond_sequence(command, &[reply])
    }

    /// Answer successive `command`s with successive replies; the last repeats
    pub fn respond_sequence(&self, command: &str, replies: &[&str]) -> &Self {
        let queue = replies.iter().map(|r| r.as_bytes().to_vec()).collect();
        self.state().script.insert(command.to_string(), queue);
        self
    }

    /// Delay the reply to `command`
    pub fn latency(&self, command: &str, delay: Duration) -> &Self {
        self.state().latency.insert(command.to_string(), delay);
        self
    }

    /// Queue bytes that nobody asked for
    pub fn push_stale(&self, bytes: &[u8]) -> &Self {
        self.state().incoming.push_back(Segment {
            bytes: bytes.iter().copied().collect(),
            command: None,
            ready_at: Instant::now(),
        });
        self
    }

    /// Make every write fail
    pub fn fail_writes(&self, fail: bool) -> &Self {
        self.state().fail_writes = fail;
        self
    }

    /// Make every read fail with an I/O error
    pub fn fail_reads(&self, fail: bool) -> &Self {
        self.state().fail_reads = fail;
        self
    }

    /// Simulate the peer hanging up
    pub fn close(&self) -> &Self {
        self.state().closed = true;
        self
    }

    /// Commands written so far
    pub fn writes(&self) -> Vec<String> {
        self.state()
            .events
            .iter()
            .filter_map(|e| match e {
                WireEvent::Write(cmd) => Some(cmd.clone()),
                WireEvent::Reply(_) => None,
            })
            .collect()
    }

    /// Full wire history
    pub fn events(&self) -> Vec<WireEvent> {
        self.state().events.clone()
    }

    /// Bytes not yet read
    pub fn pending_len(&self) -> usize {
        self.state().incoming.iter().map(|s| s.bytes.len()).sum()
    }

    /// Number of `clear_input_buffer` calls
    pub fn clear_calls(&self) -> usize {
        self.state().clear_calls
    }
}

impl MockState {
    fn complete_command(&mut self, command: String) {
        self.events.push(WireEvent::Write(command.clone()));

        let reply = match self.script.get_mut(&command) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        if let Some(reply) = reply {
            let delay = self.latency.get(&command).copied().unwrap_or_default();
            self.incoming.push_back(Segment {
                bytes: reply.into_iter().collect(),
                command: Some(command),
                ready_at: Instant::now() + delay,
            });
        }
    }
}

impl Read for MockChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let started = Instant::now();
        loop {
            let wait = {
                let mut state = self.state();
                if state.fail_reads {
                    return Err(io::Error::new(io::ErrorKind::Other, "mock read failure"));
                }
                let timeout = state.timeout;
                let closed = state.closed;
                let now = Instant::now();
                let waited = now.duration_since(started);

                match state.incoming.front_mut() {
                    Some(segment) if segment.ready_at <= now => {
                        let mut n = 0;
                        while n < buf.len() {
                            match segment.bytes.pop_front() {
                                Some(b) => {
                                    buf[n] = b;
                                    n += 1;
                                }
                                None => break,
                            }
                        }
                        if segment.bytes.is_empty() {
                            if let Some(segment) = state.incoming.pop_front() {
                                if let Some(command) = segment.command {
                                    state.events.push(WireEvent::Reply(command));
                                }
                            }
                        }
                        return Ok(n);
                    }
                    Some(segment) => {
                        if waited >= timeout {
                            return Err(io::Error::new(io::ErrorKind::TimedOut, "mock timeout"));
                        }
                        (segment.ready_at - now).min(timeout - waited)
                    }
                    None if closed => return Ok(0),
                    None => {
                        if waited >= timeout {
                            return Err(io::Error::new(io::ErrorKind::TimedOut, "mock timeout"));
                        }
                        timeout - waited
                    }
                }
            };
            std::thread::sleep(wait);
        }
    }
}

impl Write for MockChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state();
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure"));
        }
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock link closed"));
        }
        for &b in buf {
            state.partial_command.push(b);
            if b == SENTINEL {
                let bytes = std::mem::take(&mut state.partial_command);
                let command = String::from_utf8_lossy(&bytes).into_owned();
                state.complete_command(command);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CommunicationChannel for MockChannel {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.state().timeout = timeout;
        Ok(())
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        // Bytes stay queued so the read-side drain is what gets exercised
        self.state().clear_calls += 1;
        Ok(())
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        let now = Instant::now();
        let state = self.state();
        let ready: usize = state
            .incoming
            .iter()
            .take_while(|s| s.ready_at <= now)
            .map(|s| s.bytes.len())
            .sum();
        Ok(ready as u32)
    }

    fn link_kind(&self) -> LinkKind {
        self.state().kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_reply() {
        let mut link = MockChannel::new();
        link.respond(":GVP#", "On-Step#");
        link.write_all(b":GVP#").unwrap();

        let mut buf = [0u8; 16];
        let n = link.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"On-Step#");
        assert_eq!(
            link.events(),
            vec![
                WireEvent::Write(":GVP#".to_string()),
                WireEvent::Reply(":GVP#".to_string())
            ]
        );
    }

    #[test]
    fn test_sequence_last_reply_repeats() {
        let mut link = MockChannel::new();
        link.respond_sequence(":rA#", &["#", "1#"]);
        let mut buf = [0u8; 8];
        for expected in [&b"#"[..], b"1#", b"1#"] {
            link.write_all(b":rA#").unwrap();
            let n = link.read(&mut buf).unwrap();
            assert_eq!(&buf[..n], expected);
        }
    }

    #[test]
    fn test_unscripted_command_is_silent() {
        let mut link = MockChannel::new();
        link.set_timeout(Duration::from_millis(5)).unwrap();
        link.write_all(b":XX#").unwrap();
        let mut buf = [0u8; 8];
        let err = link.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert_eq!(link.writes(), vec![":XX#".to_string()]);
    }

    #[test]
    fn test_read_failure() {
        let mut link = MockChannel::new();
        link.push_stale(b"1#").fail_reads(true);
        let mut buf = [0u8; 4];
        let err = link.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);

        link.fail_reads(false);
        assert_eq!(link.read(&mut buf).unwrap(), 2);
    }

    #[test]
    fn test_latency_delays_reply() {
        let mut link = MockChannel::new();
        link.respond(":FG#", "100#")
            .latency(":FG#", Duration::from_millis(30));
        link.set_timeout(Duration::from_millis(5)).unwrap();
        link.write_all(b":FG#").unwrap();

        let mut buf = [0u8; 8];
        assert!(link.read(&mut buf).is_err());
        assert_eq!(link.bytes_to_read().unwrap(), 0);

        link.set_timeout(Duration::from_millis(100)).unwrap();
        let n = link.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"100#");
    }
}
