//! HTTP-like text protocol.
//!
//! One request per connection, framed by a blank line:
//! - `GET <path>`: plain-text echo of the server identity, the path and the
//!   whole request
//! - `POST`: the literal body `POST`
//! - anything else: a 500 response
//!
//! ## Protocol Format
//!
//! ```text
//! Request:  GET /foo HTTP/1.1\r\nHost: x\r\n\r\n
//! Response: HTTP/1.1 200 OK\r\nContent-type: text/plain\r\n\r\n
//!           <name>\n<id>\n/foo\n<request>\n
//!
//! Request:  PUT /foo HTTP/1.1\r\n\r\n
//! Response: HTTP/1.1 500 Internal Server Error\nDid not recognize request
//! ```
//!
//! Request bodies are never read; bytes after the blank line are dropped.

pub mod handler;
pub mod parser;

pub use handler::handle_connection;
