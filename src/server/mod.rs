//! Connection bootstrap.
//!
//! Accepted sockets start out owned by a [`sniffer::ProtocolSniffer`] held in
//! the [`registry::Registry`]. Once the sniffer knows the protocol it moves
//! the transport and parser to a destination handler and removes itself.

pub mod handlers;
pub mod listener;
pub mod registry;
pub mod sniffer;
pub mod transport;

pub use registry::{ConnectionHandler, ConnectionId, ConnectionRegistry, Registry};
pub use sniffer::{ProtocolDecision, ProtocolSniffer};
pub use transport::{Readiness, TlsFlags, Transport};
