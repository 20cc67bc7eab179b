//! Binds one HTTP/2 stream to the protocol-agnostic response interface.
//!
//! ```text
//! Idle ──attach──▶ Attached ──send_response──▶ HeadersSent ──send_data──▶ Streaming
//!                     │                            │                        │
//!                     └──────────── RST_STREAM ────┴────────────────────────┴──▶ Reset
//!
//! close(): any non-terminal state ──▶ Closed
//! ```

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::error::{StreamBindingError, StreamError};
use crate::h2::stream::{MultiplexedConnection, StreamEvents, StreamSink};
use crate::h2::{ErrorCode, HeaderField, StreamId};
use crate::http::exchange::{ExchangeListener, ResponseStream, SendStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseState {
    Idle,
    Attached,
    HeadersSent,
    Streaming,
    Closed,
    Reset,
}

impl ResponseState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ResponseState::Closed | ResponseState::Reset)
    }
}

type SharedConnection = Rc<RefCell<dyn MultiplexedConnection>>;

pub struct StreamResponseBinding {
    this: Weak<RefCell<StreamResponseBinding>>,
    conn: Option<Weak<RefCell<dyn MultiplexedConnection>>>,
    stream_id: Option<StreamId>,
    state: ResponseState,
    headers: Vec<HeaderField>,
    /// Request header fragments waiting for END_HEADERS.
    request_headers: Vec<HeaderField>,
    write_blocked: bool,
    reset_code: Option<ErrorCode>,
    listener: Option<Box<dyn ExchangeListener>>,
}

impl StreamResponseBinding {
    pub fn new(listener: Box<dyn ExchangeListener>) -> Rc<RefCell<Self>> {
        Rc::new_cyclic(|this| {
            RefCell::new(Self {
                this: this.clone(),
                conn: None,
                stream_id: None,
                state: ResponseState::Idle,
                headers: Vec::new(),
                request_headers: Vec::new(),
                write_blocked: false,
                reset_code: None,
                listener: Some(listener),
            })
        })
    }

    /// Registers this binding as the event sink of `stream_id`.
    pub fn attach_stream<C>(
        &mut self,
        conn: &Rc<RefCell<C>>,
        stream_id: StreamId,
    ) -> Result<(), StreamBindingError>
    where
        C: MultiplexedConnection + 'static,
    {
        if self.state != ResponseState::Idle {
            return Err(StreamBindingError::AlreadyAttached);
        }

        {
            let mut c = conn
                .try_borrow_mut()
                .map_err(|_| StreamBindingError::ConnectionBusy)?;
            if !c.is_open() {
                return Err(StreamBindingError::ConnectionGone);
            }
            let sink: StreamSink = self.this.clone();
            c.bind_stream(stream_id, sink)?;
        }

        let weak: Weak<RefCell<C>> = Rc::downgrade(conn);
        self.conn = Some(weak);
        self.stream_id = Some(stream_id);
        self.state = ResponseState::Attached;
        debug!(stream = stream_id, "response attached");
        Ok(())
    }

    pub fn state(&self) -> ResponseState {
        self.state
    }

    pub fn stream_id(&self) -> Option<StreamId> {
        self.stream_id
    }

    pub fn reset_code(&self) -> Option<ErrorCode> {
        self.reset_code
    }

    fn bound(&self) -> Result<(StreamId, SharedConnection), StreamBindingError> {
        let (Some(conn), Some(stream_id)) = (self.conn.as_ref(), self.stream_id) else {
            return Err(StreamBindingError::NotAttached);
        };
        let conn = conn.upgrade().ok_or(StreamBindingError::ConnectionGone)?;
        if !conn.try_borrow().map(|c| c.is_open()).unwrap_or(true) {
            return Err(StreamBindingError::ConnectionGone);
        }
        Ok((stream_id, conn))
    }

    fn reset_error(&self) -> StreamError {
        StreamError::Reset(self.reset_code.unwrap_or(ErrorCode::CANCEL))
    }

    /// `:status` first, then the buffered headers in insertion order with
    /// lowercased names.
    fn build_headers(&self, status_code: u16) -> Vec<HeaderField> {
        let mut block = Vec::with_capacity(self.headers.len() + 1);
        block.push(HeaderField::new(":status", status_code.to_string()));
        block.extend(
            self.headers
                .iter()
                .map(|h| HeaderField::new(h.name.to_ascii_lowercase(), h.value.clone())),
        );
        block
    }

    /// Removes this binding from the connection's stream table.
    fn detach(&mut self) {
        let (Some(conn), Some(stream_id)) = (self.conn.take(), self.stream_id) else {
            return;
        };
        let Some(conn) = conn.upgrade() else {
            return;
        };
        // A busy connection is mid-dispatch; the dead weak sink it holds is
        // skipped and its stream id is free for rebinding.
        if let Ok(mut c) = conn.try_borrow_mut() {
            c.unbind_stream(stream_id);
        }
        trace!(stream = stream_id, "response detached");
    }

    fn notify(&mut self, f: impl FnOnce(&mut dyn ExchangeListener, &mut dyn ResponseStream)) {
        let Some(mut listener) = self.listener.take() else {
            return;
        };
        f(listener.as_mut(), self);
        self.listener = Some(listener);
    }
}

impl ResponseStream for StreamResponseBinding {
    fn add_header(&mut self, name: &str, value: &str) -> Result<(), StreamError> {
        match self.state {
            ResponseState::Attached => {
                self.headers.push(HeaderField::new(name, value));
                Ok(())
            }
            ResponseState::Idle => Err(StreamBindingError::NotAttached.into()),
            ResponseState::Reset => Err(self.reset_error()),
            ResponseState::Closed => Err(StreamError::Closed),
            ResponseState::HeadersSent | ResponseState::Streaming => {
                Err(StreamError::HeadersAlreadySent)
            }
        }
    }

    fn send_response(&mut self, status_code: u16, reason: &str, version: &str) -> Result<(), StreamError> {
        match self.state {
            ResponseState::Attached => {}
            ResponseState::Idle => return Err(StreamBindingError::NotAttached.into()),
            ResponseState::Reset => return Err(self.reset_error()),
            ResponseState::Closed => return Err(StreamError::Closed),
            ResponseState::HeadersSent | ResponseState::Streaming => {
                return Err(StreamError::HeadersAlreadySent);
            }
        }

        let (stream_id, conn) = self.bound()?;
        let block = self.build_headers(status_code);
        debug!(
            stream = stream_id,
            status = status_code,
            reason,
            version,
            headers = block.len(),
            "sending response headers"
        );

        conn.try_borrow_mut()
            .map_err(|_| StreamBindingError::ConnectionBusy)?
            .send_headers(stream_id, &block, false)?;

        self.headers.clear();
        self.state = ResponseState::HeadersSent;
        Ok(())
    }

    fn send_data(&mut self, data: &[u8]) -> Result<SendStatus, StreamError> {
        match self.state {
            ResponseState::HeadersSent | ResponseState::Streaming => {}
            ResponseState::Attached => return Err(StreamError::HeadersNotSent),
            ResponseState::Idle => return Err(StreamBindingError::NotAttached.into()),
            ResponseState::Reset => return Err(self.reset_error()),
            ResponseState::Closed => return Err(StreamError::Closed),
        }

        let (stream_id, conn) = self.bound()?;
        let status = conn
            .try_borrow_mut()
            .map_err(|_| StreamBindingError::ConnectionBusy)?
            .send_data(stream_id, data, false)?;

        match status {
            SendStatus::Sent(n) => {
                self.state = ResponseState::Streaming;
                if n < data.len() {
                    self.write_blocked = true;
                }
                trace!(stream = stream_id, sent = n, len = data.len(), "data sent");
            }
            SendStatus::WouldBlock => {
                self.write_blocked = true;
                trace!(stream = stream_id, len = data.len(), "flow control blocked");
            }
        }
        Ok(status)
    }

    fn close(&mut self) {
        if self.state.is_terminal() {
            return;
        }

        if matches!(self.state, ResponseState::HeadersSent | ResponseState::Streaming) {
            match self.bound() {
                Ok((stream_id, conn)) => match conn.try_borrow_mut() {
                    Ok(mut c) => {
                        if let Err(e) = c.send_data(stream_id, &[], true) {
                            debug!(stream = stream_id, error = %e, "failed to end stream");
                        }
                    }
                    Err(_) => debug!(stream = stream_id, "connection busy, end of stream not sent"),
                },
                Err(e) => debug!(error = %e, "closing response without a live stream"),
            }
        }

        self.detach();
        self.headers.clear();
        self.write_blocked = false;
        self.state = ResponseState::Closed;
    }
}

impl StreamEvents for StreamResponseBinding {
    fn on_headers(&mut self, headers: &[HeaderField], end_headers: bool, end_stream: bool) {
        if self.state.is_terminal() {
            return;
        }
        self.request_headers.extend_from_slice(headers);
        if !end_headers {
            return;
        }

        let headers = std::mem::take(&mut self.request_headers);
        self.notify(|listener, response| listener.on_request_headers(response, &headers, end_stream));
    }

    fn on_data(&mut self, data: &[u8], end_stream: bool) {
        if self.state.is_terminal() {
            return;
        }
        self.notify(|listener, response| listener.on_request_data(response, data, end_stream));
    }

    fn on_rst_stream(&mut self, error_code: ErrorCode) {
        if self.state.is_terminal() {
            return;
        }
        debug!(stream = ?self.stream_id, code = %error_code, "stream reset by peer");

        self.state = ResponseState::Reset;
        self.reset_code = Some(error_code);
        self.headers.clear();
        self.request_headers.clear();
        self.write_blocked = false;
        self.detach();

        if let Some(listener) = self.listener.as_mut() {
            listener.on_reset(error_code);
        }
    }

    fn on_write(&mut self) {
        if !self.write_blocked
            || !matches!(self.state, ResponseState::HeadersSent | ResponseState::Streaming)
        {
            return;
        }
        self.write_blocked = false;
        self.notify(|listener, response| listener.on_writable(response));
    }
}

impl Drop for StreamResponseBinding {
    fn drop(&mut self) {
        self.detach();
    }
}
