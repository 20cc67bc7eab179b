//! Destination handlers the server ships with.
//!
//! This layer carries no WebSocket or HTTP/2 engine. WebSocket upgrades are
//! refused with `501`. h2c upgrades are declined by answering over HTTP/1.1,
//! which RFC 9113 allows. Connections that negotiated h2 over TLS are closed.

use tracing::{info, warn};

use crate::config::Config;
use crate::http::connection::{Http1Connection, Reply};
use crate::http::parser::RequestHeaderParser;
use crate::server::registry::{ConnectionHandler, ConnectionId, ConnectionRegistry, HandlerFactory};
use crate::server::transport::Transport;

pub struct DefaultHandlers {
    read_chunk_size: usize,
}

impl DefaultHandlers {
    pub fn new(cfg: &Config) -> Self {
        Self {
            read_chunk_size: cfg.read_chunk_size,
        }
    }
}

impl<T: Transport + 'static> HandlerFactory<T> for DefaultHandlers {
    fn http(
        &mut self,
        id: ConnectionId,
        transport: T,
        parser: RequestHeaderParser,
    ) -> Box<dyn ConnectionHandler<T>> {
        Box::new(Http1Connection::new(
            id,
            transport,
            parser,
            Reply::Serve,
            self.read_chunk_size,
        ))
    }

    fn h2(
        &mut self,
        id: ConnectionId,
        mut transport: T,
        parser: RequestHeaderParser,
    ) -> Box<dyn ConnectionHandler<T>> {
        if parser.head().is_some() {
            info!(conn = %id, "declining h2c upgrade, answering over HTTP/1.1");
            return Box::new(Http1Connection::new(
                id,
                transport,
                parser,
                Reply::Serve,
                self.read_chunk_size,
            ));
        }

        warn!(conn = %id, "no HTTP/2 engine available, closing connection");
        transport.close();
        Box::new(Refused { id, transport })
    }

    fn websocket(
        &mut self,
        id: ConnectionId,
        transport: T,
        parser: RequestHeaderParser,
    ) -> Box<dyn ConnectionHandler<T>> {
        Box::new(Http1Connection::new(
            id,
            transport,
            parser,
            Reply::NotImplemented,
            self.read_chunk_size,
        ))
    }
}

/// Holds an already-closed transport until the next notification removes it.
struct Refused<T> {
    id: ConnectionId,
    transport: T,
}

impl<T: Transport> Refused<T> {
    fn finish(&mut self, registry: &mut dyn ConnectionRegistry<T>) {
        self.transport.close();
        registry.remove_object(self.id);
    }
}

impl<T: Transport> ConnectionHandler<T> for Refused<T> {
    fn on_receive(&mut self, registry: &mut dyn ConnectionRegistry<T>) {
        self.finish(registry);
    }

    fn on_send(&mut self, registry: &mut dyn ConnectionRegistry<T>) {
        self.finish(registry);
    }

    fn on_close(&mut self, registry: &mut dyn ConnectionRegistry<T>) {
        self.finish(registry);
    }

    fn close(&mut self) {
        self.transport.close();
    }
}
