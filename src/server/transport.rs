//! Byte transports the registry hands between handlers.

use std::net::Shutdown;
use std::rc::Rc;

use tokio::net::TcpStream;

use crate::error::TransportError;

/// TLS options requested when a socket is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TlsFlags(u32);

impl TlsFlags {
    pub const NONE: TlsFlags = TlsFlags(0);
    pub const ENABLED: TlsFlags = TlsFlags(1);

    pub fn contains(self, other: TlsFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_tls(self) -> bool {
        self.contains(Self::ENABLED)
    }
}

/// Readiness notification delivered to a connection handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Readable,
    Writable,
    Closed,
}

/// One live socket.
///
/// `send` and `receive` never block: `Ok(0)` means nothing could be moved
/// right now and the caller should wait for the next readiness notification.
pub trait Transport {
    fn configure_tls(&mut self, flags: TlsFlags) -> Result<(), TransportError>;

    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Closes the transport. Closing twice is harmless.
    fn close(&mut self);

    fn tls_enabled(&self) -> bool;

    /// Application protocol selected during the TLS handshake, or an empty
    /// string when none was negotiated.
    fn negotiated_protocol(&self) -> Result<String, TransportError>;
}

/// Plain TCP transport over a tokio socket.
///
/// The socket is shared with the task that waits for readiness; this channel
/// is the only one that reads, writes or closes it.
#[derive(Debug)]
pub struct TcpChannel {
    stream: Rc<TcpStream>,
    closed: bool,
}

impl TcpChannel {
    pub fn new(stream: Rc<TcpStream>) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Transport for TcpChannel {
    fn configure_tls(&mut self, flags: TlsFlags) -> Result<(), TransportError> {
        if flags.is_tls() {
            return Err(TransportError::TlsUnavailable);
        }
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        match self.stream.try_write(data) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        match self.stream.try_read(buf) {
            Ok(0) => Err(TransportError::PeerClosed),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = socket2::SockRef::from(self.stream.as_ref()).shutdown(Shutdown::Both) {
            tracing::debug!(error = %e, "socket shutdown failed");
        }
    }

    fn tls_enabled(&self) -> bool {
        false
    }

    fn negotiated_protocol(&self) -> Result<String, TransportError> {
        Ok(String::new())
    }
}
