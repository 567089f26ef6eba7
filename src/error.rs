//! Per-connection error types.
//!
//! None of these end the process: each is either answered with a protocol
//! level error response or logged before the connection is torn down.

use std::io;

/// Binary protocol conformance failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Violation {
    /// Tag other than 0, 1 or 2.
    UnknownTag(i32),
    /// Adding the value would push the sum past `f64::MAX`.
    Overflow,
    /// Fewer than two values before the terminator.
    TooFewValues,
    /// More than five values before the terminator.
    TooManyValues,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Violation::UnknownTag(tag) => {
                write!(f, "Error - Expected a 1 or a 2 but got {tag}")
            }
            Violation::Overflow => write!(f, "Sum overflowed"),
            Violation::TooFewValues => write!(f, "Received too few values"),
            Violation::TooManyValues => write!(f, "Received too many values"),
        }
    }
}

/// Errors raised while serving one connection.
#[derive(Debug)]
pub enum ServerError {
    /// Request buffer filled up before the header terminator appeared.
    BufferExhausted { capacity: usize },
    /// Request text could not be routed.
    MalformedRequest(String),
    /// Binary client broke the protocol.
    ProtocolViolation(Violation),
    /// Read, write, flush or timeout failure on the stream.
    StreamFailure(io::Error),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::BufferExhausted { capacity } => {
                write!(f, "request exceeded buffer capacity of {capacity} bytes")
            }
            ServerError::MalformedRequest(reason) => write!(f, "malformed request: {reason}"),
            ServerError::ProtocolViolation(violation) => {
                write!(f, "protocol violation: {violation}")
            }
            ServerError::StreamFailure(e) => write!(f, "stream failure: {e}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::StreamFailure(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ServerError {
    fn from(e: io::Error) -> Self {
        ServerError::StreamFailure(e)
    }
}

impl From<Violation> for ServerError {
    fn from(v: Violation) -> Self {
        ServerError::ProtocolViolation(v)
    }
}
