//! HTTP-like request dispatch.

use super::parser::{self, Command};
use crate::connection::{write_response, SessionSettings};
use crate::error::ServerError;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

/// 500 body for methods other than GET and POST.
const UNRECOGNIZED: &str = "Did not recognize request";

/// 500 body when the header block outgrows the request buffer.
const TOO_LARGE: &str = "Request too large";

/// Handle a single http connection: one request, one response.
///
/// Framing and routing failures are answered with a 500 response. Stream
/// failures abandon the connection without a response.
pub async fn handle_connection<R, W>(
    reader: &mut R,
    writer: &mut W,
    settings: &SessionSettings,
) -> Result<(), ServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let request =
        match parser::read_request(reader, settings.max_request_size, settings.read_timeout).await
        {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Could not read request");
                return reject(writer, e).await;
            }
        };
    debug!(bytes = request.len(), "Read request from client");

    let text = request.text();
    match parser::parse(&text) {
        Ok(Command::Get { path }) => {
            let response = parser::response_get(&settings.identity, path, &text);
            write_response(writer, &response).await?;
            info!(path, "Sent GET response");
        }
        Ok(Command::Post) => {
            write_response(writer, &parser::response_post()).await?;
            info!("Sent POST response");
        }
        Ok(Command::Unknown(method)) => {
            debug!(method, "Unsupported method");
            send_error(writer, UNRECOGNIZED).await?;
        }
        Err(e) => {
            warn!(error = %e, "Could not route request");
            reject(writer, e).await?;
        }
    }

    Ok(())
}

/// Answer a framing or routing failure with a 500, pass anything else up.
async fn reject<W>(writer: &mut W, error: ServerError) -> Result<(), ServerError>
where
    W: AsyncWrite + Unpin,
{
    match error {
        ServerError::BufferExhausted { .. } => send_error(writer, TOO_LARGE).await,
        ServerError::MalformedRequest(reason) => send_error(writer, &reason).await,
        other => Err(other),
    }
}

async fn send_error<W>(writer: &mut W, msg: &str) -> Result<(), ServerError>
where
    W: AsyncWrite + Unpin,
{
    write_response(writer, &parser::response_error(msg)).await?;
    info!(error = msg, "Sent error message to client");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdentityConfig;
    use std::time::Duration;
    use tokio_test::io::Builder;

    fn settings(max_request_size: usize) -> SessionSettings {
        SessionSettings {
            read_timeout: Duration::from_secs(5),
            max_request_size,
            identity: IdentityConfig {
                name: "Caroline Danzi".to_string(),
                id: "danzicr".to_string(),
            },
        }
    }

    async fn exchange(chunks: &[&[u8]], max_request_size: usize) -> (Result<(), ServerError>, String) {
        let mut builder = Builder::new();
        for chunk in chunks {
            builder.read(chunk);
        }
        let mut reader = builder.build();
        let mut output = Vec::new();
        let result = handle_connection(&mut reader, &mut output, &settings(max_request_size)).await;
        (result, String::from_utf8(output).unwrap())
    }

    #[tokio::test]
    async fn test_get_echoes_identity_path_and_request() {
        let request = "GET /foo HTTP/1.1\r\nHost: x\r\n\r\n";
        let (result, response) = exchange(&[request.as_bytes()], 1024).await;
        result.unwrap();

        let (head, body) = response.split_once("\r\n\r\n").unwrap();
        assert_eq!(head, "HTTP/1.1 200 OK\r\nContent-type: text/plain");
        assert_eq!(body, format!("Caroline Danzi\ndanzicr\n/foo\n{request}\n"));
    }

    #[tokio::test]
    async fn test_get_split_request() {
        let (result, response) =
            exchange(&[b"GET /split HT", b"TP/1.1\r\nHost: x\r", b"\n\r\n"], 1024).await;
        result.unwrap();
        assert!(response.contains("danzicr\n/split\nGET /split HTTP/1.1\r\nHost: x\r\n\r\n\n"));
    }

    #[tokio::test]
    async fn test_post_body_is_post() {
        let (result, response) =
            exchange(&[b"POST /submit HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc"], 1024).await;
        result.unwrap();
        assert_eq!(response, "HTTP/1.1 200 OK\r\nContent-type: text/plain\r\n\r\nPOST");
    }

    #[tokio::test]
    async fn test_unknown_method_gets_500() {
        let (result, response) = exchange(&[b"PUT /foo HTTP/1.1\r\n\r\n"], 1024).await;
        result.unwrap();
        assert_eq!(
            response,
            "HTTP/1.1 500 Internal Server Error\nDid not recognize request"
        );
    }

    #[tokio::test]
    async fn test_missing_method_gets_500() {
        let (result, response) = exchange(&[b"GARBAGE\r\n\r\n"], 1024).await;
        result.unwrap();
        assert_eq!(response, "HTTP/1.1 500 Internal Server Error\nrequest has no method");
    }

    #[tokio::test]
    async fn test_truncated_request_gets_500() {
        let (result, response) = exchange(&[b"GET /foo HTTP/1.1\r\n"], 1024).await;
        result.unwrap();
        assert_eq!(
            response,
            "HTTP/1.1 500 Internal Server Error\nconnection closed before end of request headers"
        );
    }

    #[tokio::test]
    async fn test_oversized_request_gets_500() {
        let (result, response) = exchange(&[b"GET /0123456789abcde"], 20).await;
        result.unwrap();
        assert_eq!(response, "HTTP/1.1 500 Internal Server Error\nRequest too large");
    }

    #[tokio::test]
    async fn test_read_failure_sends_nothing() {
        let mut reader = Builder::new()
            .read(b"GET /foo")
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            ))
            .build();
        let mut output = Vec::new();
        let result = handle_connection(&mut reader, &mut output, &settings(1024)).await;

        assert!(matches!(result, Err(ServerError::StreamFailure(_))));
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_read_timeout_sends_nothing() {
        let (mut client, server) = tokio::io::duplex(64);
        let (mut reader, _) = tokio::io::split(server);
        let mut output = Vec::new();
        let settings = SessionSettings {
            read_timeout: Duration::from_millis(20),
            ..settings(1024)
        };
        tokio::io::AsyncWriteExt::write_all(&mut client, b"GET /stall").await.unwrap();

        let result = handle_connection(&mut reader, &mut output, &settings).await;

        match result {
            Err(ServerError::StreamFailure(e)) => {
                assert_eq!(e.kind(), std::io::ErrorKind::TimedOut)
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(output.is_empty());
    }
}
