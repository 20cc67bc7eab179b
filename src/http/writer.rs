use crate::error::TransportError;
use crate::http::response::Response;
use crate::server::transport::Transport;

const HTTP_VERSION: &str = "HTTP/1.1";

pub fn serialize_response(resp: &Response) -> Vec<u8> {
    let mut buf = Vec::new();

    // Status line
    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.status.reason_phrase()
    );
    buf.extend_from_slice(status_line.as_bytes());

    for (k, v) in &resp.headers {
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    buf.extend_from_slice(&resp.body);

    buf
}

/// A serialized response being written out across write-ready callbacks.
#[derive(Debug)]
pub struct ResponseWriter {
    buffer: Vec<u8>,
    written: usize,
}

impl ResponseWriter {
    pub fn new(response: &Response) -> Self {
        Self {
            buffer: serialize_response(response),
            written: 0,
        }
    }

    /// Writes as much as the transport takes right now.
    ///
    /// Returns `Ok(true)` once the whole response is out, `Ok(false)` when
    /// the transport would block.
    pub fn write_to<T: Transport>(&mut self, transport: &mut T) -> Result<bool, TransportError> {
        while self.written < self.buffer.len() {
            let n = transport.send(&self.buffer[self.written..])?;

            if n == 0 {
                return Ok(false);
            }

            self.written += n;
        }

        Ok(true)
    }
}
