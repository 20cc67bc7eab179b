//! Switchyard - protocol demultiplexing front door
//!
//! Decides which application protocol a freshly accepted connection speaks,
//! hands the connection to the matching handler, and binds HTTP/2 streams to
//! a protocol-agnostic response interface.

pub mod config;
pub mod error;
pub mod h2;
pub mod http;
pub mod server;
