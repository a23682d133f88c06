//! Byte links to the controller
//!
//! A USB serial port and a WiFi bridge socket look the same to the engine:
//! blocking reads bounded by a timeout, plus a way to throw away input that
//! nobody asked for. [`LinkKind`] is the one thing that tells them apart.

use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use tracing::debug;

use super::DEFAULT_NETWORK_TIMEOUT_MS;

/// Physical kind of the link, which drives the timeout policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkKind {
    /// Local serial port (USB CDC, RS-232)
    Serial,
    /// TCP socket, usually a WiFi bridge on the controller
    Network,
}

/// Abstraction for communication channels (Serial or TCP)
///
/// The engine borrows an already-open channel; opening and closing it is
/// the caller's business.
pub trait CommunicationChannel: Read + Write + Send {
    /// Set timeout for blocking read operations
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Discard bytes the OS has buffered but nobody has read
    fn clear_input_buffer(&mut self) -> io::Result<()>;

    /// Get number of bytes available to read
    fn bytes_to_read(&mut self) -> io::Result<u32>;

    /// Which kind of link this is
    fn link_kind(&self) -> LinkKind;
}

/// Serial port wrapper implementing CommunicationChannel
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    /// Wrap an open port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }

    /// OS name of the port, if known
    pub fn port_name(&self) -> Option<String> {
        self.port.name()
    }
}

impl std::fmt::Debug for SerialChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialChannel")
            .field("port", &self.port_name())
            .finish()
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl CommunicationChannel for SerialChannel {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.port
            .set_timeout(timeout)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.port
            .bytes_to_read()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn link_kind(&self) -> LinkKind {
        LinkKind::Serial
    }
}

/// TCP stream wrapper implementing CommunicationChannel
#[derive(Debug)]
pub struct TcpChannel {
    stream: TcpStream,
}

impl TcpChannel {
    /// Wrap a connected socket
    pub fn new(stream: TcpStream) -> Self {
        // Commands are a few bytes each; do not let Nagle hold them back
        if let Err(e) = stream.set_nodelay(true) {
            debug!("TCP_NODELAY not set: {}", e);
        }
        // Writes keep one fixed bound; set_timeout only moves the read deadline
        let write_timeout = Duration::from_millis(DEFAULT_NETWORK_TIMEOUT_MS);
        if let Err(e) = stream.set_write_timeout(Some(write_timeout)) {
            debug!("write timeout not set: {}", e);
        }
        Self { stream }
    }

    /// Connect to a controller's network bridge
    pub fn connect(addr: &SocketAddr, timeout: Duration) -> io::Result<Self> {
        debug!("connecting to {} ({:?})", addr, timeout);
        let stream = TcpStream::connect_timeout(addr, timeout)?;
        Ok(Self::new(stream))
    }

    /// Address of the controller end
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }
}

impl Read for TcpChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TcpChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl CommunicationChannel for TcpChannel {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        // A zero duration means "no timeout" to the socket API
        let timeout = timeout.max(Duration::from_millis(1));
        self.stream.set_read_timeout(Some(timeout))
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        // No kernel-level purge for sockets: drain with non-blocking reads.
        self.stream.set_nonblocking(true)?;
        let mut buf = [0u8; 1024];
        let result = loop {
            match self.stream.read(&mut buf) {
                Ok(0) => break Ok(()),
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => break Err(e),
            }
        };
        self.stream.set_nonblocking(false)?;
        result
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.stream.set_nonblocking(true)?;
        let mut buf = [0u8; 1024];
        let result = self.stream.peek(&mut buf);
        self.stream.set_nonblocking(false)?;

        match result {
            Ok(n) => Ok(n as u32),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn link_kind(&self) -> LinkKind {
        LinkKind::Network
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn pair() -> (TcpChannel, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let channel = TcpChannel::connect(&addr, Duration::from_secs(1)).unwrap();
        let (server, _) = listener.accept().unwrap();
        (channel, server)
    }

    #[test]
    fn test_tcp_link_kind_and_peer() {
        let (channel, server) = pair();
        assert_eq!(channel.link_kind(), LinkKind::Network);
        assert_eq!(channel.peer_addr().unwrap(), server.local_addr().unwrap());
    }

    #[test]
    fn test_tcp_short_read_deadline_leaves_write_timeout() {
        let (mut channel, _server) = pair();
        channel.set_timeout(Duration::from_millis(1)).unwrap();
        assert_eq!(
            channel.stream.read_timeout().unwrap(),
            Some(Duration::from_millis(1))
        );
        assert_eq!(
            channel.stream.write_timeout().unwrap(),
            Some(Duration::from_millis(DEFAULT_NETWORK_TIMEOUT_MS))
        );
        channel.write_all(b":GVP#").unwrap();
    }

    #[test]
    fn test_tcp_clear_input_discards_stale_bytes() {
        let (mut channel, mut server) = pair();
        server.write_all(b"0#garbage").unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(channel.bytes_to_read().unwrap(), 9);

        channel.clear_input_buffer().unwrap();
        assert_eq!(channel.bytes_to_read().unwrap(), 0);

        // still blocking afterwards
        channel.set_timeout(Duration::from_millis(20)).unwrap();
        let mut buf = [0u8; 4];
        assert!(channel.read(&mut buf).is_err());
    }
}
