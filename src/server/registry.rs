//! Connection registry.
//!
//! Every per-connection object lives in a slot of a generational arena and is
//! addressed by a [`ConnectionId`]. A handler is checked out of its slot while
//! one of its callbacks runs, with the registry itself passed in as context.
//! That is what allows a callback to hand its transport to a new handler and
//! remove itself. When the callback returns, the handler only goes back into
//! its slot if its [`LivenessToken`] still holds.

use std::fmt;

use crate::config::Config;
use crate::error::TransportError;
use crate::http::parser::RequestHeaderParser;
use crate::server::sniffer::ProtocolSniffer;
use crate::server::transport::{Readiness, TlsFlags, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    index: u32,
    generation: u32,
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.index, self.generation)
    }
}

/// Proof that a registry entry has not been removed since the token was
/// taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessToken(ConnectionId);

/// Which readiness a handler currently cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest {
    pub read: bool,
    pub write: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Http1,
    H2,
    WebSocket,
}

/// A per-connection object driven by readiness callbacks.
pub trait ConnectionHandler<T: Transport> {
    fn on_receive(&mut self, registry: &mut dyn ConnectionRegistry<T>);

    fn on_send(&mut self, registry: &mut dyn ConnectionRegistry<T>);

    fn on_close(&mut self, registry: &mut dyn ConnectionRegistry<T>);

    /// Releases the transport. Must be idempotent.
    fn close(&mut self);

    fn wants_read(&self) -> bool {
        true
    }

    fn wants_write(&self) -> bool {
        false
    }
}

/// What handlers can ask of the registry that owns them.
pub trait ConnectionRegistry<T: Transport> {
    fn add_http(&mut self, transport: T, parser: RequestHeaderParser) -> ConnectionId;

    fn add_h2_conn(&mut self, transport: T, parser: RequestHeaderParser) -> ConnectionId;

    fn add_websocket(&mut self, transport: T, parser: RequestHeaderParser) -> ConnectionId;

    /// Removes an entry. If its handler is mid-callback it is dropped once
    /// the callback returns.
    fn remove_object(&mut self, id: ConnectionId);

    fn liveness(&self, id: ConnectionId) -> LivenessToken;

    fn is_alive(&self, token: LivenessToken) -> bool;
}

/// Builds the destination handlers a sniffer hands connections to.
pub trait HandlerFactory<T: Transport> {
    fn http(
        &mut self,
        id: ConnectionId,
        transport: T,
        parser: RequestHeaderParser,
    ) -> Box<dyn ConnectionHandler<T>>;

    fn h2(
        &mut self,
        id: ConnectionId,
        transport: T,
        parser: RequestHeaderParser,
    ) -> Box<dyn ConnectionHandler<T>>;

    fn websocket(
        &mut self,
        id: ConnectionId,
        transport: T,
        parser: RequestHeaderParser,
    ) -> Box<dyn ConnectionHandler<T>>;
}

enum Entry<T: Transport> {
    Vacant,
    /// Alive, but the handler is out of the slot (being built or running a
    /// callback).
    CheckedOut,
    Occupied(Box<dyn ConnectionHandler<T>>),
}

struct Slot<T: Transport> {
    generation: u32,
    entry: Entry<T>,
}

struct DispatchFrame {
    successor: Option<ConnectionId>,
}

pub struct Registry<T: Transport> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    factory: Box<dyn HandlerFactory<T>>,
    dispatching: Option<DispatchFrame>,
    live: usize,
}

impl<T: Transport + 'static> Registry<T> {
    pub fn new(factory: Box<dyn HandlerFactory<T>>) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            factory,
            dispatching: None,
            live: 0,
        }
    }

    /// Attaches a protocol sniffer to a freshly accepted transport.
    pub fn accept(
        &mut self,
        transport: T,
        tls: TlsFlags,
        cfg: &Config,
    ) -> Result<ConnectionId, TransportError> {
        let id = self.try_insert_with::<TransportError>(|id| {
            let sniffer = ProtocolSniffer::attach(id, transport, tls, cfg)?;
            Ok(Box::new(sniffer) as Box<dyn ConnectionHandler<T>>)
        })?;
        tracing::debug!(conn = %id, "sniffer attached");
        Ok(id)
    }

    /// Registers a handler built with its own id. A failed build leaves the
    /// registry unchanged.
    pub fn try_insert_with<E>(
        &mut self,
        build: impl FnOnce(ConnectionId) -> Result<Box<dyn ConnectionHandler<T>>, E>,
    ) -> Result<ConnectionId, E> {
        let id = self.allocate();
        match build(id) {
            Ok(handler) => {
                self.place(id, handler);
                Ok(id)
            }
            Err(e) => {
                self.release(id);
                Err(e)
            }
        }
    }

    /// Delivers one readiness notification.
    ///
    /// Returns the id that owns the connection's transport afterwards: `id`
    /// itself, the handler it was handed to during the callback, or `None`
    /// once the connection is gone.
    pub fn dispatch(&mut self, id: ConnectionId, readiness: Readiness) -> Option<ConnectionId> {
        let mut handler = self.checkout(id)?;
        let token = self.liveness(id);

        self.dispatching = Some(DispatchFrame { successor: None });
        match readiness {
            Readiness::Readable => handler.on_receive(self),
            Readiness::Writable => handler.on_send(self),
            Readiness::Closed => handler.on_close(self),
        }
        let successor = self.dispatching.take().and_then(|frame| frame.successor);

        if self.is_alive(token) {
            self.place(id, handler);
            return Some(id);
        }

        handler.close();
        drop(handler);
        successor
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.is_alive(LivenessToken(id))
    }

    pub fn interest(&self, id: ConnectionId) -> Option<Interest> {
        match &self.slot(id)?.entry {
            Entry::Occupied(handler) => Some(Interest {
                read: handler.wants_read(),
                write: handler.wants_write(),
            }),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Closes and drops every handler.
    pub fn shutdown(&mut self) {
        let ids: Vec<ConnectionId> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| matches!(slot.entry, Entry::Occupied(_)))
            .map(|(index, slot)| ConnectionId {
                index: index as u32,
                generation: slot.generation,
            })
            .collect();

        tracing::info!(connections = ids.len(), "closing all connections");
        for id in ids {
            self.remove_object(id);
        }
    }

    fn adopt(&mut self, kind: HandlerKind, transport: T, parser: RequestHeaderParser) -> ConnectionId {
        let id = self.allocate();
        let handler = match kind {
            HandlerKind::Http1 => self.factory.http(id, transport, parser),
            HandlerKind::H2 => self.factory.h2(id, transport, parser),
            HandlerKind::WebSocket => self.factory.websocket(id, transport, parser),
        };
        self.place(id, handler);

        if let Some(frame) = self.dispatching.as_mut() {
            frame.successor.get_or_insert(id);
        }
        tracing::debug!(conn = %id, ?kind, "handler registered");
        id
    }

    fn allocate(&mut self) -> ConnectionId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Entry::CheckedOut;
            return ConnectionId {
                index,
                generation: slot.generation,
            };
        }

        self.slots.push(Slot {
            generation: 0,
            entry: Entry::CheckedOut,
        });
        ConnectionId {
            index: (self.slots.len() - 1) as u32,
            generation: 0,
        }
    }

    fn release(&mut self, id: ConnectionId) -> Option<Box<dyn ConnectionHandler<T>>> {
        let slot = self.slot_mut(id)?;
        let previous = std::mem::replace(&mut slot.entry, Entry::Vacant);
        if matches!(previous, Entry::Vacant) {
            return None;
        }
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;

        match previous {
            Entry::Occupied(handler) => Some(handler),
            _ => None,
        }
    }

    fn place(&mut self, id: ConnectionId, handler: Box<dyn ConnectionHandler<T>>) {
        if let Some(slot) = self.slot_mut(id) {
            slot.entry = Entry::Occupied(handler);
        }
    }

    fn checkout(&mut self, id: ConnectionId) -> Option<Box<dyn ConnectionHandler<T>>> {
        let slot = self.slot_mut(id)?;
        match std::mem::replace(&mut slot.entry, Entry::CheckedOut) {
            Entry::Occupied(handler) => Some(handler),
            other => {
                slot.entry = other;
                None
            }
        }
    }

    fn slot(&self, id: ConnectionId) -> Option<&Slot<T>> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
    }

    fn slot_mut(&mut self, id: ConnectionId) -> Option<&mut Slot<T>> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
    }
}

impl<T: Transport + 'static> ConnectionRegistry<T> for Registry<T> {
    fn add_http(&mut self, transport: T, parser: RequestHeaderParser) -> ConnectionId {
        self.adopt(HandlerKind::Http1, transport, parser)
    }

    fn add_h2_conn(&mut self, transport: T, parser: RequestHeaderParser) -> ConnectionId {
        self.adopt(HandlerKind::H2, transport, parser)
    }

    fn add_websocket(&mut self, transport: T, parser: RequestHeaderParser) -> ConnectionId {
        self.adopt(HandlerKind::WebSocket, transport, parser)
    }

    fn remove_object(&mut self, id: ConnectionId) {
        match self.release(id) {
            Some(mut handler) => {
                handler.close();
                tracing::debug!(conn = %id, "connection removed");
            }
            None => tracing::trace!(conn = %id, "removal requested"),
        }
    }

    fn liveness(&self, id: ConnectionId) -> LivenessToken {
        LivenessToken(id)
    }

    fn is_alive(&self, token: LivenessToken) -> bool {
        self.slot(token.0)
            .is_some_and(|slot| !matches!(slot.entry, Entry::Vacant))
    }
}
