//! Protocol sniffing for freshly accepted connections.
//!
//! A [`ProtocolSniffer`] owns a transport and a request parser until it knows
//! which protocol the peer speaks. The answer comes from either the TLS
//! negotiation result or the first request's `Connection`/`Upgrade` headers.
//! It then moves both to the registry's matching destination handler and
//! asks to be removed.
//!
//! The hand-off runs inside the sniffer's own readiness callback and ends
//! with the sniffer's removal, so every callback treats the hand-off as its
//! last action. The read loop takes a liveness token before draining parser
//! events and returns as soon as the token no longer holds.

use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::error::{SniffError, TransportError};
use crate::http::parser::{HttpEvent, RequestHeaderParser};
use crate::http::tokens::has_token;
use crate::server::registry::{ConnectionHandler, ConnectionId, ConnectionRegistry};
use crate::server::transport::{TlsFlags, Transport};

/// TLS application protocol identifier for HTTP/2.
pub const ALPN_H2: &str = "h2";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolDecision {
    Http1,
    Http2Tls,
    Http2Cleartext,
    WebSocket,
}

/// Picks the destination protocol from a request's `Connection` and
/// `Upgrade` header values.
///
/// `Connection` tokens are trimmed and matched exactly (`Upgrade`,
/// `HTTP2-Settings`). The `Upgrade` value is compared case-insensitively.
/// An upgrade to anything else stays on HTTP/1.x.
pub fn decide(connection: Option<&str>, upgrade: Option<&str>) -> ProtocolDecision {
    let connection = connection.unwrap_or("");
    if !has_token(connection, "Upgrade") {
        return ProtocolDecision::Http1;
    }

    match upgrade {
        Some(proto) if proto.eq_ignore_ascii_case("websocket") => ProtocolDecision::WebSocket,
        Some(proto)
            if proto.eq_ignore_ascii_case("h2c") && has_token(connection, "HTTP2-Settings") =>
        {
            ProtocolDecision::Http2Cleartext
        }
        _ => ProtocolDecision::Http1,
    }
}

struct Owned<T> {
    transport: T,
    parser: RequestHeaderParser,
}

pub struct ProtocolSniffer<T: Transport> {
    id: ConnectionId,
    /// Emptied exactly once, by the hand-off.
    owned: Option<Owned<T>>,
    read_chunk_size: usize,
    close_on_mismatch: bool,
}

impl<T: Transport> ProtocolSniffer<T> {
    /// Takes ownership of an accepted transport. No I/O happens here.
    pub fn attach(
        id: ConnectionId,
        mut transport: T,
        tls: TlsFlags,
        cfg: &Config,
    ) -> Result<Self, TransportError> {
        transport.configure_tls(tls)?;

        Ok(Self {
            id,
            owned: Some(Owned {
                transport,
                parser: RequestHeaderParser::new(cfg.max_header_bytes),
            }),
            read_chunk_size: cfg.read_chunk_size.max(1),
            close_on_mismatch: cfg.close_on_protocol_mismatch,
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Closes the transport and resets the parser. Calling it again is
    /// harmless.
    pub fn close(&mut self) {
        if let Some(owned) = self.owned.as_mut() {
            owned.transport.close();
            owned.parser.reset();
        }
    }

    /// Hands the connection over when TLS negotiated HTTP/2. The parser is
    /// never touched on this path.
    fn check_http2(&mut self, registry: &mut dyn ConnectionRegistry<T>) -> bool {
        let Some(owned) = self.owned.as_ref() else {
            return false;
        };
        if !owned.transport.tls_enabled() {
            return false;
        }

        match owned.transport.negotiated_protocol() {
            Ok(proto) if proto == ALPN_H2 => {
                self.hand_off(ProtocolDecision::Http2Tls, registry);
                true
            }
            Ok(_) => false,
            Err(e) => {
                debug!(conn = %self.id, error = %e, "negotiated protocol unavailable");
                false
            }
        }
    }

    fn drain_events(&mut self, registry: &mut dyn ConnectionRegistry<T>) {
        while let Some(event) = self.owned.as_mut().and_then(|o| o.parser.poll_event()) {
            match event {
                HttpEvent::HeaderComplete => {
                    let Some(owned) = self.owned.as_mut() else {
                        return;
                    };
                    // Body bytes stay buffered for the destination handler.
                    owned.parser.pause();
                    let decision = decide(
                        owned.parser.combined_header_value("Connection").as_deref(),
                        owned.parser.header_value("Upgrade"),
                    );
                    self.hand_off(decision, registry);
                    return;
                }
                HttpEvent::Error(e) => {
                    self.fail(SniffError::Parse(e), registry);
                    return;
                }
                HttpEvent::Data(chunk) => {
                    trace!(conn = %self.id, len = chunk.len(), "body bytes before decision");
                }
                HttpEvent::MessageComplete => {}
            }
        }
    }

    fn hand_off(&mut self, decision: ProtocolDecision, registry: &mut dyn ConnectionRegistry<T>) {
        let Some(Owned { transport, parser }) = self.owned.take() else {
            return;
        };
        let id = self.id;
        info!(conn = %id, ?decision, "protocol decided");

        let successor = match decision {
            ProtocolDecision::Http1 => registry.add_http(transport, parser),
            ProtocolDecision::Http2Tls | ProtocolDecision::Http2Cleartext => {
                registry.add_h2_conn(transport, parser)
            }
            ProtocolDecision::WebSocket => registry.add_websocket(transport, parser),
        };
        debug!(conn = %id, successor = %successor, "connection handed off");

        // Removal may drop this sniffer; `self` is off limits from here on.
        registry.remove_object(id);
    }

    fn fail(&mut self, err: SniffError, registry: &mut dyn ConnectionRegistry<T>) {
        let id = self.id;
        warn!(conn = %id, error = %err, "closing connection before protocol decision");
        self.close();
        registry.remove_object(id);
    }
}

impl<T: Transport> ConnectionHandler<T> for ProtocolSniffer<T> {
    fn on_receive(&mut self, registry: &mut dyn ConnectionRegistry<T>) {
        if self.check_http2(registry) {
            return;
        }

        let mut buf = vec![0u8; self.read_chunk_size];
        loop {
            let Some(owned) = self.owned.as_mut() else {
                return;
            };

            let delivered = match owned.transport.receive(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    self.fail(SniffError::Transport(e), registry);
                    return;
                }
            };
            trace!(conn = %self.id, bytes = delivered, "received");

            let consumed = owned.parser.parse(&buf[..delivered]);
            if consumed != delivered {
                let err = SniffError::ProtocolMismatch {
                    consumed,
                    delivered,
                };
                if self.close_on_mismatch {
                    self.fail(err, registry);
                    return;
                }
                // The refused tail is dropped.
                warn!(conn = %self.id, error = %err, "continuing after partial parse");
            }

            let token = registry.liveness(self.id);
            self.drain_events(registry);
            if !registry.is_alive(token) {
                return;
            }
        }
    }

    fn on_send(&mut self, registry: &mut dyn ConnectionRegistry<T>) {
        self.check_http2(registry);
    }

    fn on_close(&mut self, registry: &mut dyn ConnectionRegistry<T>) {
        let id = self.id;
        debug!(conn = %id, "peer closed before protocol decision");
        self.close();
        registry.remove_object(id);
    }

    fn close(&mut self) {
        ProtocolSniffer::close(self);
    }
}
