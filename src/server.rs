//! TCP server accepting one connection at a time.
//!
//! Binds the listener, then serves each accepted client to completion
//! (including cleanup) before accepting the next one.

use crate::config::{Config, Protocol};
use crate::connection::{serve, ConnectionContext, SessionSettings};
use std::io;
use std::net::SocketAddr;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

/// Pending connection queue length.
const LISTEN_BACKLOG: i32 = 128;

/// Server instance
pub struct Server {
    addr: String,
    protocol: Protocol,
    settings: SessionSettings,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: &Config) -> Self {
        Server {
            addr: config.listen_addr(),
            protocol: config.protocol,
            settings: SessionSettings::from_config(config),
        }
    }

    /// Run the accept loop on a current-thread runtime.
    ///
    /// Only returns if the listener cannot be created.
    pub fn run(&self) -> io::Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(async {
            let listener = self.bind()?;
            self.accept_loop(listener).await
        })
    }

    fn bind(&self) -> io::Result<TcpListener> {
        let addr: SocketAddr = self
            .addr
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let listener = TcpListener::from_std(create_listener(addr)?)?;
        info!(address = %addr, protocol = ?self.protocol, "Server listening");
        Ok(listener)
    }

    async fn accept_loop(&self, listener: TcpListener) -> io::Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    info!(peer = %peer, "Connected to client");

                    match open_context(stream, peer) {
                        Ok(context) => serve(context, self.protocol, &self.settings).await,
                        Err(e) => {
                            warn!(peer = %peer, error = %e, "Failed to open connection streams")
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

type TcpContext = ConnectionContext<OwnedReadHalf, OwnedWriteHalf, socket2::Socket>;

/// Split an accepted stream into input, output and a socket handle.
fn open_context(stream: TcpStream, peer: SocketAddr) -> io::Result<TcpContext> {
    let std_stream = stream.into_std()?;
    let socket = socket2::Socket::from(std_stream.try_clone()?);
    let stream = TcpStream::from_std(std_stream)?;
    let (reader, writer) = stream.into_split();

    Ok(ConnectionContext::new(peer.to_string(), reader, writer, socket))
}

/// Create a non-blocking TCP listener with SO_REUSEADDR.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdentityConfig;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn settings() -> SessionSettings {
        SessionSettings {
            read_timeout: Duration::from_secs(5),
            max_request_size: 1024,
            identity: IdentityConfig::default(),
        }
    }

    async fn local_listener() -> TcpListener {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        TcpListener::from_std(create_listener(addr).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_http_round_trip_over_tcp() {
        let listener = local_listener().await;
        let addr = listener.local_addr().unwrap();

        let server = async {
            let (stream, peer) = listener.accept().await.unwrap();
            let context = open_context(stream, peer).unwrap();
            serve(context, Protocol::Http, &settings()).await;
        };

        let client = async {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream
                .write_all(b"POST /x HTTP/1.1\r\nHost: t\r\n\r\n")
                .await
                .unwrap();
            let mut response = Vec::new();
            stream.read_to_end(&mut response).await.unwrap();
            response
        };

        let ((), response) = tokio::join!(server, client);
        assert_eq!(
            response,
            b"HTTP/1.1 200 OK\r\nContent-type: text/plain\r\n\r\nPOST"
        );
    }

    #[tokio::test]
    async fn test_sum_round_trip_over_tcp() {
        let listener = local_listener().await;
        let addr = listener.local_addr().unwrap();

        let server = async {
            let (stream, peer) = listener.accept().await.unwrap();
            let context = open_context(stream, peer).unwrap();
            serve(context, Protocol::Sum, &settings()).await;
        };

        let client = async {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            let len = stream.read_u16().await.unwrap() as usize;
            let mut greeting = vec![0u8; len];
            stream.read_exact(&mut greeting).await.unwrap();

            for value in [1, 2, 3] {
                stream.write_i32(1).await.unwrap();
                stream.write_i32(value).await.unwrap();
            }
            stream.write_i32(0).await.unwrap();

            let mut response = Vec::new();
            stream.read_to_end(&mut response).await.unwrap();
            (greeting, response)
        };

        let ((), (greeting, response)) = tokio::join!(server, client);
        assert_eq!(greeting, b"danzicr");
        assert_eq!(&response[..5], b"\x00\x03OK ");
        assert_eq!(f64::from_be_bytes(response[5..].try_into().unwrap()), 6.0);
    }

    #[tokio::test]
    async fn test_accept_loop_serves_clients_in_turn() {
        let listener = local_listener().await;
        let addr = listener.local_addr().unwrap();
        let server = Server {
            addr: addr.to_string(),
            protocol: Protocol::Http,
            settings: settings(),
        };

        let clients = async {
            let mut first = TcpStream::connect(addr).await.unwrap();
            first.write_all(b"GET /partial").await.unwrap();

            let mut second = TcpStream::connect(addr).await.unwrap();
            second
                .write_all(b"POST /x HTTP/1.1\r\nHost: t\r\n\r\n")
                .await
                .unwrap();

            // the server is still waiting on the first client
            let mut byte = [0u8; 1];
            let early = tokio::time::timeout(Duration::from_millis(100), second.read(&mut byte)).await;
            assert!(early.is_err());

            first.shutdown().await.unwrap();
            let mut first_response = Vec::new();
            first.read_to_end(&mut first_response).await.unwrap();

            let mut second_response = Vec::new();
            second.read_to_end(&mut second_response).await.unwrap();
            (first_response, second_response)
        };

        let (first_response, second_response) = tokio::select! {
            result = server.accept_loop(listener) => panic!("accept loop returned: {:?}", result),
            responses = clients => responses,
        };
        assert_eq!(
            first_response,
            b"HTTP/1.1 500 Internal Server Error\nconnection closed before end of request headers"
        );
        assert_eq!(
            second_response,
            b"HTTP/1.1 200 OK\r\nContent-type: text/plain\r\n\r\nPOST"
        );
    }

    #[tokio::test]
    async fn test_accept_loop_survives_client_reset() {
        let listener = local_listener().await;
        let addr = listener.local_addr().unwrap();
        let server = Server {
            addr: addr.to_string(),
            protocol: Protocol::Http,
            settings: settings(),
        };

        let clients = async {
            let first = TcpStream::connect(addr).await.unwrap();
            // RST instead of FIN on drop
            socket2::SockRef::from(&first)
                .set_linger(Some(Duration::ZERO))
                .unwrap();
            drop(first);

            let mut second = TcpStream::connect(addr).await.unwrap();
            second.write_all(b"POST / HTTP/1.1\r\n\r\n").await.unwrap();
            let mut response = Vec::new();
            second.read_to_end(&mut response).await.unwrap();
            response
        };

        let response = tokio::select! {
            result = server.accept_loop(listener) => panic!("accept loop returned: {:?}", result),
            response = clients => response,
        };
        assert_eq!(
            response,
            b"HTTP/1.1 200 OK\r\nContent-type: text/plain\r\n\r\nPOST"
        );
    }

    #[test]
    fn test_bind_rejects_bad_address() {
        let server = Server {
            addr: "not an address".to_string(),
            protocol: Protocol::Http,
            settings: settings(),
        };
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let err = runtime.block_on(async { server.bind() }).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
