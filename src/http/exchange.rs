//! Protocol-agnostic response interface.
//!
//! HTTP-layer code writes its response through [`ResponseStream`] and learns
//! about the request side through [`ExchangeListener`], without knowing which
//! wire protocol carries the exchange.

use crate::error::StreamError;
use crate::h2::{ErrorCode, HeaderField};

/// Outcome of a body write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// This many bytes were accepted.
    Sent(usize),
    /// Flow control is exhausted; retry after the next writable notification.
    WouldBlock,
}

pub trait ResponseStream {
    /// Buffers a response header until the status is sent.
    fn add_header(&mut self, name: &str, value: &str) -> Result<(), StreamError>;

    fn send_response(&mut self, status: u16, reason: &str, version: &str) -> Result<(), StreamError>;

    fn send_data(&mut self, data: &[u8]) -> Result<SendStatus, StreamError>;

    /// Ends the response. Calling it again has no effect.
    fn close(&mut self);
}

/// Upper-layer callbacks for one exchange.
///
/// Every callback receives the response side so it can answer in place.
pub trait ExchangeListener {
    fn on_request_headers(
        &mut self,
        _response: &mut dyn ResponseStream,
        _headers: &[HeaderField],
        _end_stream: bool,
    ) {
    }

    fn on_request_data(&mut self, _response: &mut dyn ResponseStream, _data: &[u8], _end_stream: bool) {}

    /// A send that returned [`SendStatus::WouldBlock`] may be retried.
    fn on_writable(&mut self, _response: &mut dyn ResponseStream) {}

    /// The peer aborted the exchange.
    fn on_reset(&mut self, _code: ErrorCode) {}
}
