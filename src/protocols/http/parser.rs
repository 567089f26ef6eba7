//! HTTP-like request framing and parsing.

use crate::config::IdentityConfig;
use crate::connection::timed;
use crate::error::ServerError;
use bytes::{Bytes, BytesMut};
use std::borrow::Cow;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

/// End of the request header block.
pub const TERMINATOR: &[u8] = b"\r\n\r\n";

/// Initial request buffer size, grown by doubling up to the capacity.
const INITIAL_BUFFER_SIZE: usize = 4096;

const SUCCESS_HEADER: &[u8] = b"HTTP/1.1 200 OK\r\nContent-type: text/plain\r\n\r\n";

// The error status line ends in a bare LF, unlike the success header.
const ERROR_HEADER: &[u8] = b"HTTP/1.1 500 Internal Server Error\n";

/// Request bytes up to and including the first blank line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRequest {
    bytes: Bytes,
}

impl RawRequest {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Lossy UTF-8 view of the request.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }
}

/// Read one request header block from `reader`.
///
/// Reads into a growable buffer until the terminator shows up. Only the
/// freshly read bytes (plus the tail that could start a split terminator) are
/// searched after each read. Anything after the terminator is dropped.
pub async fn read_request<R>(
    reader: &mut R,
    capacity: usize,
    read_timeout: Duration,
) -> Result<RawRequest, ServerError>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = BytesMut::new();
    buffer.resize(INITIAL_BUFFER_SIZE.min(capacity), 0);
    let mut filled = 0;

    loop {
        if filled == buffer.len() {
            if buffer.len() >= capacity {
                return Err(ServerError::BufferExhausted { capacity });
            }
            let grown = (buffer.len() * 2).clamp(1, capacity);
            buffer.resize(grown, 0);
        }

        let n = timed(read_timeout, reader.read(&mut buffer[filled..])).await?;
        if n == 0 {
            return Err(ServerError::MalformedRequest(
                "connection closed before end of request headers".to_string(),
            ));
        }

        let search_from = filled.saturating_sub(TERMINATOR.len() - 1);
        filled += n;

        if let Some(pos) = find_terminator(&buffer[search_from..filled]) {
            buffer.truncate(search_from + pos + TERMINATOR.len());
            return Ok(RawRequest {
                bytes: buffer.freeze(),
            });
        }
    }
}

/// Find the terminator in `buffer`, returning the position of its first byte.
fn find_terminator(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(TERMINATOR.len())
        .position(|window| window == TERMINATOR)
}

/// Parsed request command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    Get { path: &'a str },
    Post,
    /// Any other method.
    Unknown(&'a str),
}

/// Route a request by its method token.
pub fn parse(request: &str) -> Result<Command<'_>, ServerError> {
    match method(request)? {
        "GET" => {
            let path = request.split_ascii_whitespace().nth(1).ok_or_else(|| {
                ServerError::MalformedRequest("GET request has no path".to_string())
            })?;
            Ok(Command::Get { path })
        }
        "POST" => Ok(Command::Post),
        other => Ok(Command::Unknown(other)),
    }
}

/// The text before the first space.
pub fn method(request: &str) -> Result<&str, ServerError> {
    request
        .find(' ')
        .map(|end| &request[..end])
        .ok_or_else(|| ServerError::MalformedRequest("request has no method".to_string()))
}

/// Format a GET response: identity, identifier, path and the request itself.
pub fn response_get(identity: &IdentityConfig, path: &str, request: &str) -> BytesMut {
    let mut response = BytesMut::with_capacity(
        SUCCESS_HEADER.len() + identity.name.len() + identity.id.len() + path.len() + request.len() + 4,
    );
    response.extend_from_slice(SUCCESS_HEADER);
    for line in [identity.name.as_str(), identity.id.as_str(), path, request] {
        response.extend_from_slice(line.as_bytes());
        response.extend_from_slice(b"\n");
    }
    response
}

/// Format a POST response.
pub fn response_post() -> BytesMut {
    let mut response = BytesMut::with_capacity(SUCCESS_HEADER.len() + 4);
    response.extend_from_slice(SUCCESS_HEADER);
    response.extend_from_slice(b"POST");
    response
}

/// Format a 500 response.
pub fn response_error(msg: &str) -> BytesMut {
    let mut response = BytesMut::with_capacity(ERROR_HEADER.len() + msg.len());
    response.extend_from_slice(ERROR_HEADER);
    response.extend_from_slice(msg.as_bytes());
    response
}
