//! HTTP/1.x plumbing and the protocol-agnostic response interface.
//!
//! - **`tokens`**: comma-separated header token helpers
//! - **`request`**: request head representation
//! - **`parser`**: incremental request parser shared by the sniffer and the
//!   HTTP/1.x handler
//! - **`response`** / **`writer`**: HTTP/1.x response building and
//!   non-blocking serialization
//! - **`connection`**: the HTTP/1.x destination handler
//! - **`exchange`**: response interface implemented by per-stream bindings
//!
//! # HTTP/1.x connection state machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Parse the request (possibly already buffered)
//!        └──────┬──────┘
//!               │ Message complete
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← Send the response on write-ready
//!        └──────┬───────────┘
//!               │ Response sent
//!               ├─ Keep-Alive → Reading (same connection)
//!               └─ Close → Closed
//! ```

pub mod connection;
pub mod exchange;
pub mod parser;
pub mod request;
pub mod response;
pub mod tokens;
pub mod writer;
