//! Shared fixtures: a scripted transport, a recording handler factory and an
//! in-memory multiplexed connection.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use switchyard::config::Config;
use switchyard::error::{StreamBindingError, StreamError, TransportError};
use switchyard::h2::{
    ErrorCode, HeaderField, MultiplexedConnection, StreamId, StreamSink, StreamTable, reset_streams,
};
use switchyard::http::exchange::{ExchangeListener, ResponseStream, SendStatus};
use switchyard::http::parser::RequestHeaderParser;
use switchyard::server::registry::{
    ConnectionHandler, ConnectionId, ConnectionRegistry, HandlerFactory, HandlerKind,
};
use switchyard::server::transport::{TlsFlags, Transport};

pub fn test_config() -> Config {
    Config {
        read_chunk_size: 64,
        ..Config::default()
    }
}

/// One scripted result for `receive`.
pub enum Recv {
    Data(Vec<u8>),
    /// Nothing available right now.
    Empty,
    Fail,
}

#[derive(Default)]
pub struct MockState {
    pub script: VecDeque<Recv>,
    pub sent: Vec<u8>,
    /// Largest number of bytes a single `send` accepts.
    pub send_limit: Option<usize>,
    pub tls: bool,
    pub alpn: String,
    pub receive_calls: usize,
    pub protocol_queries: usize,
    pub close_calls: usize,
    pub closed: bool,
}

impl MockState {
    pub fn sent_text(&self) -> String {
        String::from_utf8_lossy(&self.sent).into_owned()
    }
}

/// Transport whose state stays observable after it has been moved into a
/// handler.
#[derive(Clone, Default)]
pub struct MockTransport {
    pub state: Rc<RefCell<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(script: Vec<Recv>) -> Self {
        let transport = Self::new();
        transport.state.borrow_mut().script = script.into();
        transport
    }

    pub fn push(&self, recv: Recv) {
        self.state.borrow_mut().script.push_back(recv);
    }

    pub fn set_alpn(&self, proto: &str) {
        self.state.borrow_mut().alpn = proto.to_string();
    }
}

impl Transport for MockTransport {
    fn configure_tls(&mut self, flags: TlsFlags) -> Result<(), TransportError> {
        self.state.borrow_mut().tls = flags.is_tls();
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let mut state = self.state.borrow_mut();
        if state.closed {
            return Err(TransportError::Closed);
        }
        let n = state.send_limit.map_or(data.len(), |limit| limit.min(data.len()));
        state.sent.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut state = self.state.borrow_mut();
        state.receive_calls += 1;
        if state.closed {
            return Err(TransportError::Closed);
        }
        match state.script.pop_front() {
            None | Some(Recv::Empty) => Ok(0),
            Some(Recv::Fail) => Err(TransportError::PeerClosed),
            Some(Recv::Data(mut bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    state.script.push_front(Recv::Data(bytes.split_off(n)));
                }
                Ok(n)
            }
        }
    }

    fn close(&mut self) {
        let mut state = self.state.borrow_mut();
        state.close_calls += 1;
        state.closed = true;
    }

    fn tls_enabled(&self) -> bool {
        self.state.borrow().tls
    }

    fn negotiated_protocol(&self) -> Result<String, TransportError> {
        let mut state = self.state.borrow_mut();
        state.protocol_queries += 1;
        Ok(state.alpn.clone())
    }
}

/// What a destination handler was given at hand-off.
#[derive(Debug, Clone)]
pub struct Handoff {
    pub kind: HandlerKind,
    pub id: ConnectionId,
    pub consumed: usize,
    pub paused: bool,
    pub buffered: Vec<u8>,
    pub path: Option<String>,
}

pub type HandoffLog = Rc<RefCell<Vec<Handoff>>>;

#[derive(Default)]
pub struct RecordingFactory {
    pub log: HandoffLog,
}

impl RecordingFactory {
    pub fn new() -> (Self, HandoffLog) {
        let factory = Self::default();
        let log = factory.log.clone();
        (factory, log)
    }

    fn record(
        &mut self,
        kind: HandlerKind,
        id: ConnectionId,
        transport: MockTransport,
        parser: RequestHeaderParser,
    ) -> Box<dyn ConnectionHandler<MockTransport>> {
        self.log.borrow_mut().push(Handoff {
            kind,
            id,
            consumed: parser.consumed(),
            paused: parser.is_paused(),
            buffered: parser.buffered().to_vec(),
            path: parser.head().map(|h| h.path.clone()),
        });
        Box::new(RecordedHandler { id, transport })
    }
}

impl HandlerFactory<MockTransport> for RecordingFactory {
    fn http(
        &mut self,
        id: ConnectionId,
        transport: MockTransport,
        parser: RequestHeaderParser,
    ) -> Box<dyn ConnectionHandler<MockTransport>> {
        self.record(HandlerKind::Http1, id, transport, parser)
    }

    fn h2(
        &mut self,
        id: ConnectionId,
        transport: MockTransport,
        parser: RequestHeaderParser,
    ) -> Box<dyn ConnectionHandler<MockTransport>> {
        self.record(HandlerKind::H2, id, transport, parser)
    }

    fn websocket(
        &mut self,
        id: ConnectionId,
        transport: MockTransport,
        parser: RequestHeaderParser,
    ) -> Box<dyn ConnectionHandler<MockTransport>> {
        self.record(HandlerKind::WebSocket, id, transport, parser)
    }
}

/// Destination handler that only holds the transport.
pub struct RecordedHandler {
    pub id: ConnectionId,
    pub transport: MockTransport,
}

impl ConnectionHandler<MockTransport> for RecordedHandler {
    fn on_receive(&mut self, _registry: &mut dyn ConnectionRegistry<MockTransport>) {}

    fn on_send(&mut self, _registry: &mut dyn ConnectionRegistry<MockTransport>) {}

    fn on_close(&mut self, registry: &mut dyn ConnectionRegistry<MockTransport>) {
        registry.remove_object(self.id);
    }

    fn close(&mut self) {
        self.transport.close();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Headers {
        stream: StreamId,
        headers: Vec<HeaderField>,
        end_stream: bool,
    },
    Data {
        stream: StreamId,
        data: Vec<u8>,
        end_stream: bool,
    },
}

impl Frame {
    pub fn is_end_of_stream(&self) -> bool {
        match self {
            Frame::Headers { end_stream, .. } | Frame::Data { end_stream, .. } => *end_stream,
        }
    }
}

/// In-memory multiplexed connection with a single shared send window.
pub struct FakeH2Connection {
    pub open: bool,
    pub window: usize,
    pub frames: Vec<Frame>,
    pub streams: StreamTable,
}

impl FakeH2Connection {
    pub fn new(window: usize) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            open: true,
            window,
            frames: Vec::new(),
            streams: StreamTable::new(),
        }))
    }

    pub fn frames_for(&self, stream: StreamId) -> Vec<Frame> {
        self.frames
            .iter()
            .filter(|f| match f {
                Frame::Headers { stream: s, .. } | Frame::Data { stream: s, .. } => *s == stream,
            })
            .cloned()
            .collect()
    }
}

impl MultiplexedConnection for FakeH2Connection {
    fn is_open(&self) -> bool {
        self.open
    }

    fn bind_stream(&mut self, stream_id: StreamId, sink: StreamSink) -> Result<(), StreamBindingError> {
        self.streams.bind(stream_id, sink)
    }

    fn unbind_stream(&mut self, stream_id: StreamId) {
        self.streams.unbind(stream_id);
    }

    fn send_headers(
        &mut self,
        stream_id: StreamId,
        headers: &[HeaderField],
        end_stream: bool,
    ) -> Result<(), StreamError> {
        if !self.open {
            return Err(StreamError::Connection("connection closed".to_string()));
        }
        self.frames.push(Frame::Headers {
            stream: stream_id,
            headers: headers.to_vec(),
            end_stream,
        });
        Ok(())
    }

    fn send_data(
        &mut self,
        stream_id: StreamId,
        data: &[u8],
        end_stream: bool,
    ) -> Result<SendStatus, StreamError> {
        if !self.open {
            return Err(StreamError::Connection("connection closed".to_string()));
        }
        if !data.is_empty() && self.window == 0 {
            return Ok(SendStatus::WouldBlock);
        }

        let n = data.len().min(self.window);
        self.window -= n;
        self.frames.push(Frame::Data {
            stream: stream_id,
            data: data[..n].to_vec(),
            end_stream: end_stream && n == data.len(),
        });
        Ok(SendStatus::Sent(n))
    }
}

// Event delivery with the connection's borrow released, the way a real
// connection dispatches.

pub fn deliver_headers(
    conn: &Rc<RefCell<FakeH2Connection>>,
    stream: StreamId,
    headers: &[HeaderField],
    end_headers: bool,
    end_stream: bool,
) -> bool {
    let sink = conn.borrow().streams.sink(stream);
    match sink {
        Some(sink) => {
            sink.borrow_mut().on_headers(headers, end_headers, end_stream);
            true
        }
        None => false,
    }
}

pub fn deliver_data(conn: &Rc<RefCell<FakeH2Connection>>, stream: StreamId, data: &[u8], end_stream: bool) -> bool {
    let sink = conn.borrow().streams.sink(stream);
    match sink {
        Some(sink) => {
            sink.borrow_mut().on_data(data, end_stream);
            true
        }
        None => false,
    }
}

pub fn deliver_rst(conn: &Rc<RefCell<FakeH2Connection>>, stream: StreamId, code: ErrorCode) -> bool {
    let sink = conn.borrow().streams.sink(stream);
    match sink {
        Some(sink) => {
            sink.borrow_mut().on_rst_stream(code);
            true
        }
        None => false,
    }
}

/// Grows the window, then tells the stream it may write again.
pub fn deliver_window_update(conn: &Rc<RefCell<FakeH2Connection>>, stream: StreamId, increment: usize) -> bool {
    conn.borrow_mut().window += increment;
    let sink = conn.borrow().streams.sink(stream);
    match sink {
        Some(sink) => {
            sink.borrow_mut().on_write();
            true
        }
        None => false,
    }
}

/// Closes the connection and resets whatever was still bound to it.
pub fn teardown(conn: &Rc<RefCell<FakeH2Connection>>, code: ErrorCode) {
    let sinks = {
        let mut c = conn.borrow_mut();
        c.open = false;
        c.streams.drain()
    };
    reset_streams(sinks, code);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    Headers(Vec<HeaderField>, bool),
    Data(Vec<u8>, bool),
    Writable,
    Reset(ErrorCode),
}

pub type ListenerLog = Rc<RefCell<Vec<ListenerEvent>>>;

/// Records every callback and, when given a body, answers the request as
/// soon as its headers arrive. Body bytes the window refused are retried on
/// the writable notification.
#[derive(Default)]
pub struct RecordingListener {
    pub log: ListenerLog,
    pub reply: Option<Vec<u8>>,
    pending: Vec<u8>,
}

impl RecordingListener {
    pub fn new() -> (Box<Self>, ListenerLog) {
        let listener = Self::default();
        let log = listener.log.clone();
        (Box::new(listener), log)
    }

    pub fn replying(body: &[u8]) -> (Box<Self>, ListenerLog) {
        let listener = Self {
            reply: Some(body.to_vec()),
            ..Self::default()
        };
        let log = listener.log.clone();
        (Box::new(listener), log)
    }

    fn flush(&mut self, response: &mut dyn ResponseStream) {
        if self.pending.is_empty() {
            response.close();
            return;
        }
        match response.send_data(&self.pending) {
            Ok(SendStatus::Sent(n)) => {
                self.pending.drain(..n);
                if self.pending.is_empty() {
                    response.close();
                }
            }
            Ok(SendStatus::WouldBlock) => {}
            Err(_) => self.pending.clear(),
        }
    }
}

impl ExchangeListener for RecordingListener {
    fn on_request_headers(&mut self, response: &mut dyn ResponseStream, headers: &[HeaderField], end_stream: bool) {
        self.log
            .borrow_mut()
            .push(ListenerEvent::Headers(headers.to_vec(), end_stream));

        let Some(body) = self.reply.take() else {
            return;
        };
        if response.add_header("Content-Type", "text/plain").is_err() {
            return;
        }
        if response.send_response(200, "OK", "HTTP/2").is_err() {
            return;
        }
        self.pending = body;
        self.flush(response);
    }

    fn on_request_data(&mut self, _response: &mut dyn ResponseStream, data: &[u8], end_stream: bool) {
        self.log
            .borrow_mut()
            .push(ListenerEvent::Data(data.to_vec(), end_stream));
    }

    fn on_writable(&mut self, response: &mut dyn ResponseStream) {
        self.log.borrow_mut().push(ListenerEvent::Writable);
        if !self.pending.is_empty() {
            self.flush(response);
        }
    }

    fn on_reset(&mut self, code: ErrorCode) {
        self.log.borrow_mut().push(ListenerEvent::Reset(code));
        self.pending.clear();
    }
}
