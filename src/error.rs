//! Error taxonomy for the bootstrap and stream-binding layers.
//!
//! Connection-level errors (`TransportError`, `ParseError`, protocol
//! mismatch) are terminal for the whole connection. Stream-level errors only
//! ever affect the one exchange they were returned for.

use crate::h2::{ErrorCode, StreamId};
use crate::http::parser::ParseError;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("peer closed the connection")]
    PeerClosed,

    #[error("transport is closed")]
    Closed,

    #[error("TLS was requested but no TLS backend is available")]
    TlsUnavailable,
}

/// Why a sniffer gave up on its connection without reaching a decision.
#[derive(Debug, thiserror::Error)]
pub enum SniffError {
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("malformed request: {0}")]
    Parse(#[from] ParseError),

    #[error("parser consumed {consumed} of {delivered} delivered bytes")]
    ProtocolMismatch { consumed: usize, delivered: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StreamBindingError {
    #[error("the multiplexed connection is gone")]
    ConnectionGone,

    #[error("stream {0} is already bound")]
    AlreadyBound(StreamId),

    #[error("response is not attached to a stream")]
    NotAttached,

    #[error("response is already attached to a stream")]
    AlreadyAttached,

    #[error("the multiplexed connection is busy dispatching")]
    ConnectionBusy,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("stream was reset by peer ({0})")]
    Reset(ErrorCode),

    #[error(transparent)]
    Binding(#[from] StreamBindingError),

    #[error("response headers were already sent")]
    HeadersAlreadySent,

    #[error("response headers have not been sent yet")]
    HeadersNotSent,

    #[error("response is closed")]
    Closed,

    #[error("connection refused the frame: {0}")]
    Connection(String),
}
