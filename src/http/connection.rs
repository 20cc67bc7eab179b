use tracing::{debug, trace, warn};

use crate::http::parser::{HttpEvent, RequestHeaderParser};
use crate::http::request::Method;
use crate::http::response::{Response, StatusCode};
use crate::http::writer::ResponseWriter;
use crate::server::registry::{ConnectionHandler, ConnectionId, ConnectionRegistry};
use crate::server::transport::Transport;

/// How the handler answers each request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Plain-text greeting naming the request.
    Serve,
    /// `501 Not Implemented`, then close.
    NotImplemented,
}

#[derive(Debug)]
pub enum ConnectionState {
    Reading,
    Writing(ResponseWriter, bool), // bool = keep_alive?
    Closed,
}

/// HTTP/1.x destination handler.
///
/// Picks up the parser exactly where the sniffer paused it, so a request
/// whose header section was already read is answered without another read.
pub struct Http1Connection<T: Transport> {
    id: ConnectionId,
    transport: T,
    parser: RequestHeaderParser,
    state: ConnectionState,
    reply: Reply,
    read_chunk_size: usize,
    served: u64,
}

impl<T: Transport> Http1Connection<T> {
    pub fn new(
        id: ConnectionId,
        transport: T,
        mut parser: RequestHeaderParser,
        reply: Reply,
        read_chunk_size: usize,
    ) -> Self {
        parser.resume();
        let mut conn = Self {
            id,
            transport,
            parser,
            state: ConnectionState::Reading,
            reply,
            read_chunk_size: read_chunk_size.max(1),
            served: 0,
        };
        conn.process();
        conn
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn served(&self) -> u64 {
        self.served
    }

    /// Runs parser events until a response is ready or input runs out.
    /// Returns whether any event was handled.
    fn process(&mut self) -> bool {
        let mut progressed = false;
        while matches!(self.state, ConnectionState::Reading) {
            let Some(event) = self.parser.poll_event() else {
                break;
            };
            progressed = true;

            match event {
                HttpEvent::HeaderComplete => {}
                HttpEvent::Data(chunk) => {
                    trace!(conn = %self.id, len = chunk.len(), "discarding request body");
                }
                HttpEvent::MessageComplete => {
                    let (response, keep_alive) = self.handle_request();
                    self.state = ConnectionState::Writing(ResponseWriter::new(&response), keep_alive);
                }
                HttpEvent::Error(e) => {
                    warn!(conn = %self.id, error = %e, "malformed request");
                    let response = with_close(Response::bad_request());
                    self.state = ConnectionState::Writing(ResponseWriter::new(&response), false);
                }
            }
        }
        progressed
    }

    fn handle_request(&self) -> (Response, bool) {
        let Some(head) = self.parser.head() else {
            return (with_close(Response::bad_request()), false);
        };

        match self.reply {
            Reply::NotImplemented => (with_close(Response::not_implemented()), false),
            Reply::Serve => {
                let keep_alive = head.keep_alive();
                let body = format!(
                    "Hello from Switchyard\n{:?} {} {}\n",
                    head.method, head.path, head.version
                );
                let mut response = Response::text(StatusCode::Ok, body);
                if head.method == Method::HEAD {
                    response.body.clear();
                }
                if keep_alive {
                    (response, true)
                } else {
                    (with_close(response), false)
                }
            }
        }
    }

    /// Hands a received chunk to the parser, which takes it in parts while
    /// it is still collecting a header section. Input left over once the
    /// parser stalls is dropped.
    fn feed(&mut self, mut data: &[u8]) {
        loop {
            let taken = self.parser.parse(data);
            data = &data[taken..];
            let progressed = self.process();
            if data.is_empty() {
                return;
            }
            if taken == 0 && !progressed {
                trace!(conn = %self.id, len = data.len(), "dropping unread input");
                return;
            }
        }
    }

    fn finish(&mut self, registry: &mut dyn ConnectionRegistry<T>) {
        let id = self.id;
        self.transport.close();
        self.state = ConnectionState::Closed;
        registry.remove_object(id);
    }
}

fn with_close(mut response: Response) -> Response {
    response
        .headers
        .push(("Connection".to_string(), "close".to_string()));
    response
}

impl<T: Transport> ConnectionHandler<T> for Http1Connection<T> {
    fn on_receive(&mut self, registry: &mut dyn ConnectionRegistry<T>) {
        let mut buf = vec![0u8; self.read_chunk_size];
        while matches!(self.state, ConnectionState::Reading) {
            match self.transport.receive(&mut buf) {
                Ok(0) => break,
                Ok(n) => self.feed(&buf[..n]),
                Err(e) => {
                    debug!(conn = %self.id, error = %e, "connection ended");
                    self.finish(registry);
                    return;
                }
            }
        }
    }

    fn on_send(&mut self, registry: &mut dyn ConnectionRegistry<T>) {
        let ConnectionState::Writing(writer, keep_alive) = &mut self.state else {
            return;
        };
        let keep_alive = *keep_alive;

        match writer.write_to(&mut self.transport) {
            Ok(false) => {}
            Ok(true) => {
                self.served += 1;
                if keep_alive {
                    // go back for the next request, which may already be buffered
                    self.parser.start_next();
                    self.state = ConnectionState::Reading;
                    self.process();
                } else {
                    self.finish(registry);
                }
            }
            Err(e) => {
                warn!(conn = %self.id, error = %e, "failed to write response");
                self.finish(registry);
            }
        }
    }

    fn on_close(&mut self, registry: &mut dyn ConnectionRegistry<T>) {
        self.finish(registry);
    }

    fn close(&mut self) {
        self.transport.close();
        self.state = ConnectionState::Closed;
    }

    fn wants_read(&self) -> bool {
        matches!(self.state, ConnectionState::Reading)
    }

    fn wants_write(&self) -> bool {
        matches!(self.state, ConnectionState::Writing(..))
    }
}
