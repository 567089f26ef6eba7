//! Summing protocol implementation.
//!
//! A small stateful binary protocol:
//! - Server greets with its identifier
//! - Client sends tagged numbers, then a `0` tag
//! - Server answers with the sum, or with the reason it refused
//!
//! ## Protocol Format
//!
//! All integers and doubles are big-endian. Strings are a u16 byte length
//! followed by modified UTF-8.
//!
//! ```text
//! Server:  <string id>
//! Client:  (<i32 tag> <payload>)* <i32 0>
//!            tag 1 -> payload is an i32
//!            tag 2 -> payload is an f64
//! Server:  <string "OK "> <f64 sum>
//!      or  <string "ERROR <reason>">
//! ```
//!
//! A session is valid with two to five values. Unknown tags and sums that
//! would pass `f64::MAX` end the session immediately with an error.

pub mod handler;
pub mod parser;

pub use handler::handle_connection;
