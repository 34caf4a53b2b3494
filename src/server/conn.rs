//! Incoming connections
//!
//! One accept loop feeds both plaintext and AutoMTLS connections to the gRPC
//! server. TLS handshakes run in their own tasks so a stalled client cannot
//! block accepting the next one.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::server::{Connected, TcpConnectInfo};
use tracing::{debug, warn};

const ACCEPT_BACKLOG: usize = 16;

/// Pause after a failed `accept` before trying again
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

pub enum PluginConn {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for PluginConn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            PluginConn::Plain(s) => Pin::new(s).poll_read(cx, buf),
            PluginConn::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for PluginConn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            PluginConn::Plain(s) => Pin::new(s).poll_write(cx, buf),
            PluginConn::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            PluginConn::Plain(s) => Pin::new(s).poll_flush(cx),
            PluginConn::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            PluginConn::Plain(s) => Pin::new(s).poll_shutdown(cx),
            PluginConn::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

impl Connected for PluginConn {
    type ConnectInfo = TcpConnectInfo;

    fn connect_info(&self) -> Self::ConnectInfo {
        match self {
            PluginConn::Plain(s) => s.connect_info(),
            PluginConn::Tls(s) => s.get_ref().0.connect_info(),
        }
    }
}

/// Bind the first free loopback port among `ports`
pub async fn bind_loopback(ports: &[u16]) -> io::Result<TcpListener> {
    let mut last_err = None;
    for port in ports {
        match TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], *port))).await {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                debug!("Port {} unavailable: {}", port, e);
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, "no port to bind")
    }))
}

/// Accept connections until `shutdown` is cancelled
pub fn accept_loop(
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    shutdown: CancellationToken,
) -> ReceiverStream<io::Result<PluginConn>> {
    let (tx, rx) = mpsc::channel(ACCEPT_BACKLOG);

    tokio::spawn(async move {
        loop {
            let (stream, peer) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        if backoff(&shutdown).await {
                            continue;
                        }
                        break;
                    }
                },
            };
            debug!("Accepted connection from {}", peer);

            match &tls {
                None => {
                    if tx.send(Ok(PluginConn::Plain(stream))).await.is_err() {
                        break;
                    }
                }
                Some(acceptor) => {
                    let acceptor = acceptor.clone();
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        match acceptor.accept(stream).await {
                            Ok(tls_stream) => {
                                let _ = tx.send(Ok(PluginConn::Tls(Box::new(tls_stream)))).await;
                            }
                            Err(e) => warn!("TLS handshake with {} failed: {}", peer, e),
                        }
                    });
                }
            }
        }
        debug!("Accept loop stopped");
    });

    ReceiverStream::new(rx)
}

/// Wait before the next `accept`; errors like EMFILE persist until a
/// descriptor frees up. Returns `false` when shut down meanwhile.
async fn backoff(shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(ACCEPT_RETRY_DELAY) => true,
    }
}
