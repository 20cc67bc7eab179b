use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::error::{StreamBindingError, StreamError};
use crate::h2::{ErrorCode, HeaderField, StreamId};
use crate::http::exchange::SendStatus;

/// Events a connection pushes to whatever is bound to one of its streams.
pub trait StreamEvents {
    fn on_headers(&mut self, headers: &[HeaderField], end_headers: bool, end_stream: bool);

    fn on_data(&mut self, data: &[u8], end_stream: bool);

    fn on_rst_stream(&mut self, error_code: ErrorCode);

    /// Flow-control window opened up again.
    fn on_write(&mut self);
}

pub type StreamSink = Weak<RefCell<dyn StreamEvents>>;

/// The slice of an HTTP/2 connection that stream bindings talk to.
///
/// Implementations deliver [`StreamEvents`] with their own `RefCell`
/// released (look the sink up, drop the borrow, then call it), since a sink
/// typically answers by sending on the same connection.
pub trait MultiplexedConnection {
    fn is_open(&self) -> bool;

    fn bind_stream(&mut self, stream_id: StreamId, sink: StreamSink) -> Result<(), StreamBindingError>;

    fn unbind_stream(&mut self, stream_id: StreamId);

    fn send_headers(
        &mut self,
        stream_id: StreamId,
        headers: &[HeaderField],
        end_stream: bool,
    ) -> Result<(), StreamError>;

    /// Sends what the flow-control window allows. An empty end-of-stream
    /// frame never needs window.
    fn send_data(
        &mut self,
        stream_id: StreamId,
        data: &[u8],
        end_stream: bool,
    ) -> Result<SendStatus, StreamError>;
}

/// Stream-id to sink map for connection implementations.
///
/// Sinks are held weakly: a binding that was dropped without detaching no
/// longer receives events and no longer blocks its stream id.
#[derive(Debug, Default)]
pub struct StreamTable {
    sinks: HashMap<StreamId, StreamSink>,
}

impl StreamTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, stream_id: StreamId, sink: StreamSink) -> Result<(), StreamBindingError> {
        if self.is_bound(stream_id) {
            return Err(StreamBindingError::AlreadyBound(stream_id));
        }
        self.sinks.insert(stream_id, sink);
        Ok(())
    }

    pub fn unbind(&mut self, stream_id: StreamId) -> bool {
        self.sinks.remove(&stream_id).is_some()
    }

    pub fn is_bound(&self, stream_id: StreamId) -> bool {
        self.sinks
            .get(&stream_id)
            .is_some_and(|sink| sink.strong_count() > 0)
    }

    pub fn sink(&self, stream_id: StreamId) -> Option<Rc<RefCell<dyn StreamEvents>>> {
        self.sinks.get(&stream_id)?.upgrade()
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Unbinds every stream, returning the sinks that are still alive so the
    /// connection can tell them it is going away.
    pub fn drain(&mut self) -> Vec<Rc<RefCell<dyn StreamEvents>>> {
        self.sinks.drain().filter_map(|(_, sink)| sink.upgrade()).collect()
    }
}

/// Tells every drained sink that its stream is gone.
///
/// Connection teardown calls this after [`StreamTable::drain`] with its own
/// borrow released, so bindings can detach. A sink that is itself mid-call
/// is skipped.
pub fn reset_streams(sinks: Vec<Rc<RefCell<dyn StreamEvents>>>, error_code: ErrorCode) {
    debug!(streams = sinks.len(), code = %error_code, "resetting bound streams");
    for sink in sinks {
        match sink.try_borrow_mut() {
            Ok(mut sink) => sink.on_rst_stream(error_code),
            Err(_) => trace!("stream sink busy, reset skipped"),
        }
    }
}
