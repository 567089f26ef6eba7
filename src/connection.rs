//! Per-connection lifecycle.
//!
//! A `ConnectionContext` owns the input stream, output stream and socket of
//! one accepted client. `serve` runs exactly one protocol over the streams and
//! then releases all three resources, whatever happened before.

use crate::config::{Config, IdentityConfig, Protocol};
use crate::error::ServerError;
use crate::protocols::{http, sum};
use std::future::Future;
use std::io;
use std::net::Shutdown;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, info_span, warn, Instrument};

/// Settings shared by both protocol handlers.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Upper bound for any single read.
    pub read_timeout: Duration,
    /// Capacity of the http request buffer.
    pub max_request_size: usize,
    pub identity: IdentityConfig,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            read_timeout: config.read_timeout,
            max_request_size: config.max_request_size,
            identity: config.identity.clone(),
        }
    }
}

/// Await `op`, failing with `TimedOut` if it takes longer than `limit`.
pub async fn timed<T, F>(limit: Duration, op: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match tokio::time::timeout(limit, op).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("read timed out after {}s", limit.as_secs_f64()),
        )),
    }
}

/// Write a complete response and flush it.
pub async fn write_response<W>(writer: &mut W, response: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(response).await?;
    writer.flush().await
}

/// The socket underlying a connection, closed after both streams.
pub trait SocketHandle {
    fn close(&mut self) -> io::Result<()>;
}

impl SocketHandle for socket2::Socket {
    fn close(&mut self) -> io::Result<()> {
        match self.shutdown(Shutdown::Both) {
            // peer already went away
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            result => result,
        }
    }
}

/// Resources owned by one request/response cycle.
pub struct ConnectionContext<R, W, S> {
    peer: String,
    reader: Option<R>,
    writer: Option<W>,
    socket: Option<S>,
}

impl<R, W, S> ConnectionContext<R, W, S>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    S: SocketHandle,
{
    pub fn new(peer: impl Into<String>, reader: R, writer: W, socket: S) -> Self {
        Self {
            peer: peer.into(),
            reader: Some(reader),
            writer: Some(writer),
            socket: Some(socket),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Both streams, or `None` once the context has been closed.
    pub fn streams(&mut self) -> Option<(&mut R, &mut W)> {
        match (self.reader.as_mut(), self.writer.as_mut()) {
            (Some(reader), Some(writer)) => Some((reader, writer)),
            _ => None,
        }
    }

    /// Release input, output and socket in that order.
    ///
    /// Every step runs even when an earlier one failed. Failures are logged
    /// and swallowed. Each resource is released at most once, so calling this
    /// again is a no-op.
    pub async fn close(&mut self) {
        let mut released = false;

        if let Some(reader) = self.reader.take() {
            drop(reader);
            released = true;
            debug!("Input stream closed");
        }

        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush().await {
                warn!(resource = "output", error = %e, "Error flushing output stream");
            }
            if let Err(e) = writer.shutdown().await {
                warn!(resource = "output", error = %e, "Error closing output stream");
            }
            released = true;
            debug!("Output stream closed");
        }

        if let Some(mut socket) = self.socket.take() {
            if let Err(e) = socket.close() {
                warn!(resource = "socket", error = %e, "Error closing socket");
            }
            released = true;
        }

        if released {
            info!("Connection closed");
        }
    }
}

/// Run `protocol` over the connection, then release it.
pub async fn serve<R, W, S>(
    mut context: ConnectionContext<R, W, S>,
    protocol: Protocol,
    settings: &SessionSettings,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    S: SocketHandle,
{
    let span = info_span!("connection", peer = %context.peer());

    async {
        let result = match context.streams() {
            Some((reader, writer)) => run_protocol(reader, writer, protocol, settings).await,
            None => Ok(()),
        };

        if let Err(e) = result {
            warn!(error = %e, "Error handling client, abandoning connection");
        }

        context.close().await;
    }
    .instrument(span)
    .await
}

async fn run_protocol<R, W>(
    reader: &mut R,
    writer: &mut W,
    protocol: Protocol,
    settings: &SessionSettings,
) -> Result<(), ServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match protocol {
        Protocol::Http => http::handle_connection(reader, writer, settings).await,
        Protocol::Sum => sum::handle_connection(reader, writer, settings).await,
    }
}
