//! Incremental HTTP/1.x request parser.
//!
//! Follows a feed/poll shape: [`RequestHeaderParser::parse`] buffers bytes,
//! [`RequestHeaderParser::poll_event`] advances one step at a time and
//! reports what happened. Because the parser only moves forward when polled,
//! a consumer can [`pause`](RequestHeaderParser::pause) it right after
//! `HeaderComplete` and every body byte stays buffered for whoever owns the
//! parser next.

use std::borrow::Cow;
use std::collections::VecDeque;

use bytes::{Buf, Bytes, BytesMut};

use crate::http::request::{BodyFraming, Method, RequestHead};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid request line")]
    InvalidRequest,
    #[error("unknown method")]
    InvalidMethod,
    #[error("invalid header line")]
    InvalidHeader,
    #[error("invalid Content-Length")]
    InvalidContentLength,
    #[error("header section exceeds {limit} bytes")]
    HeadersTooLarge { limit: usize },
    #[error("chunked transfer encoding is not supported")]
    UnsupportedTransferEncoding,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpEvent {
    HeaderComplete,
    Data(Bytes),
    MessageComplete,
    Error(ParseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Head,
    Body { remaining: usize },
    ChunkedBody,
    Complete,
    Failed,
}

#[derive(Debug)]
pub struct RequestHeaderParser {
    buf: BytesMut,
    phase: Phase,
    paused: bool,
    head: Option<RequestHead>,
    events: VecDeque<HttpEvent>,
    consumed: usize,
    max_header_bytes: usize,
}

impl RequestHeaderParser {
    pub fn new(max_header_bytes: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
            phase: Phase::Head,
            paused: false,
            head: None,
            events: VecDeque::new(),
            consumed: 0,
            max_header_bytes,
        }
    }

    /// Accepts bytes into the parser and returns how many were taken.
    ///
    /// A paused or failed parser takes nothing. Until the header section has
    /// been parsed, the buffer holds at most `max_header_bytes`; the caller
    /// keeps whatever is refused.
    pub fn parse(&mut self, data: &[u8]) -> usize {
        if self.paused || self.phase == Phase::Failed {
            return 0;
        }
        let take = match self.phase {
            Phase::Head => data
                .len()
                .min(self.max_header_bytes.saturating_sub(self.buf.len())),
            _ => data.len(),
        };
        self.buf.extend_from_slice(&data[..take]);
        self.consumed += take;
        take
    }

    pub fn poll_event(&mut self) -> Option<HttpEvent> {
        if let Some(ev) = self.events.pop_front() {
            return Some(ev);
        }
        if self.paused {
            return None;
        }
        self.advance();
        self.events.pop_front()
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Drops all parse progress and buffered bytes.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.phase = Phase::Head;
        self.paused = false;
        self.head = None;
        self.events.clear();
        self.consumed = 0;
    }

    /// Starts the next message on this connection, keeping bytes that were
    /// already buffered (pipelined requests).
    pub fn start_next(&mut self) {
        if self.phase == Phase::Failed {
            return;
        }
        self.phase = Phase::Head;
        self.head = None;
        self.events.clear();
        self.paused = false;
    }

    pub fn head(&self) -> Option<&RequestHead> {
        self.head.as_ref()
    }

    /// Case-insensitive header lookup on the current request.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.head.as_ref().and_then(|h| h.header(name))
    }

    /// Every value of a list-valued header on the current request, joined.
    pub fn combined_header_value(&self, name: &str) -> Option<Cow<'_, str>> {
        self.head.as_ref().and_then(|h| h.combined_header(name))
    }

    /// Total bytes taken by [`parse`](Self::parse) since the last reset.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Bytes taken but not yet parsed.
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    fn advance(&mut self) {
        match self.phase {
            Phase::Head => self.advance_head(),
            Phase::Body { remaining } => self.advance_body(remaining),
            Phase::ChunkedBody => self.fail(ParseError::UnsupportedTransferEncoding),
            Phase::Complete | Phase::Failed => {}
        }
    }

    fn advance_head(&mut self) {
        let Some(headers_end) = find_headers_end(&self.buf) else {
            if self.buf.len() >= self.max_header_bytes {
                self.fail(ParseError::HeadersTooLarge {
                    limit: self.max_header_bytes,
                });
            }
            return;
        };

        // The limit counts the blank line ending the section.
        if headers_end + 4 > self.max_header_bytes {
            self.fail(ParseError::HeadersTooLarge {
                limit: self.max_header_bytes,
            });
            return;
        }

        let head = match parse_request_head(&self.buf[..headers_end]) {
            Ok(head) => head,
            Err(e) => {
                self.fail(e);
                return;
            }
        };
        self.buf.advance(headers_end + 4);

        let framing = match head.body_framing() {
            Ok(framing) => framing,
            Err(_) => {
                self.fail(ParseError::InvalidContentLength);
                return;
            }
        };

        self.phase = match framing {
            BodyFraming::Empty => Phase::Body { remaining: 0 },
            BodyFraming::Length(n) => Phase::Body { remaining: n },
            // Reported once the body is actually reached.
            BodyFraming::Chunked => Phase::ChunkedBody,
        };
        self.head = Some(head);
        self.events.push_back(HttpEvent::HeaderComplete);
    }

    fn advance_body(&mut self, remaining: usize) {
        if remaining == 0 {
            self.phase = Phase::Complete;
            self.events.push_back(HttpEvent::MessageComplete);
            return;
        }

        if self.buf.is_empty() {
            return;
        }

        let take = remaining.min(self.buf.len());
        let chunk = self.buf.split_to(take).freeze();
        self.phase = Phase::Body {
            remaining: remaining - take,
        };
        self.events.push_back(HttpEvent::Data(chunk));
    }

    fn fail(&mut self, e: ParseError) {
        self.phase = Phase::Failed;
        self.events.push_back(HttpEvent::Error(e));
    }
}

/// Parses a header section (without its terminating blank line).
pub fn parse_request_head(buf: &[u8]) -> Result<RequestHead, ParseError> {
    let headers_str = std::str::from_utf8(buf).map_err(|_| ParseError::InvalidRequest)?;

    let mut lines = headers_str.split("\r\n");

    // Request line
    let request_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let mut parts = request_line.split(' ');

    let method_str = parts.next().ok_or(ParseError::InvalidRequest)?;
    let path = parts.next().ok_or(ParseError::InvalidRequest)?;
    let version = parts.next().ok_or(ParseError::InvalidRequest)?;

    if parts.next().is_some() || path.is_empty() || !version.starts_with("HTTP/1.") {
        return Err(ParseError::InvalidRequest);
    }

    let method = Method::from_str(method_str).ok_or(ParseError::InvalidMethod)?;

    let mut headers = Vec::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }

        let (key, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;

        let key = key.trim();
        if key.is_empty() || key.contains(' ') {
            return Err(ParseError::InvalidHeader);
        }

        headers.push((key.to_string(), value.trim().to_string()));
    }

    Ok(RequestHead {
        method,
        path: path.to_string(),
        version: version.to_string(),
        headers,
    })
}

fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}
