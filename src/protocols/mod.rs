//! Protocol implementations.
//!
//! Each protocol has a parser module (framing, state and response encoding)
//! and a handler module driving one connection over async streams.
//!
//! - `http`: HTTP-like text protocol framed by a blank line
//! - `sum`: tagged binary protocol summing numbers

pub mod http;
pub mod sum;
