//! Transport module - listener/dialer selection by protocol name.
//!
//! A thin factory keyed by protocol name, used by servers to bind and by
//! clients to dial:
//!
//! - `"tcp"` - TCP sockets
//! - `"unix"` - Unix domain sockets (Unix platforms only)
//!
//! Unknown names fail with [`WirecallError::UnsupportedProtocol`].
//! Addresses travel through the rest of the system as strings (registry
//! entries, discovery caches), so listeners and connections report their
//! addresses as strings too.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

use crate::error::{Result, WirecallError};

/// Protocol name of the TCP transport.
pub const TCP: &str = "tcp";

/// Protocol name of the Unix domain socket transport.
pub const UNIX: &str = "unix";

/// Bind a listener for the named protocol.
///
/// For Unix sockets, a stale socket file left behind by a previous
/// process is removed before binding.
pub async fn bind(protocol: &str, addr: &str) -> Result<Listener> {
    match protocol {
        TCP => Ok(Listener::Tcp(TcpListener::bind(addr).await?)),
        #[cfg(unix)]
        UNIX => {
            if std::path::Path::new(addr).exists() {
                std::fs::remove_file(addr)?;
            }
            Ok(Listener::Unix {
                listener: UnixListener::bind(addr)?,
                path: addr.to_string(),
            })
        }
        other => Err(WirecallError::UnsupportedProtocol(other.to_string())),
    }
}

/// Dial a connection for the named protocol, with an optional timeout.
pub async fn connect(protocol: &str, addr: &str, timeout: Option<Duration>) -> Result<Connection> {
    let dial = async {
        match protocol {
            TCP => Ok(Connection::Tcp(TcpStream::connect(addr).await?)),
            #[cfg(unix)]
            UNIX => Ok(Connection::Unix(UnixStream::connect(addr).await?)),
            other => Err(WirecallError::UnsupportedProtocol(other.to_string())),
        }
    };
    match timeout {
        Some(limit) => tokio::time::timeout(limit, dial)
            .await
            .map_err(|_| WirecallError::Timeout)?,
        None => dial.await,
    }
}

/// A bound listener for one of the supported protocols.
pub enum Listener {
    /// TCP listener.
    Tcp(TcpListener),
    /// Unix domain socket listener; the socket file is removed on drop.
    #[cfg(unix)]
    Unix {
        listener: UnixListener,
        path: String,
    },
}

impl Listener {
    /// Accept one connection.
    pub async fn accept(&self) -> Result<Connection> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, _) = listener.accept().await?;
                Ok(Connection::Tcp(stream))
            }
            #[cfg(unix)]
            Listener::Unix { listener, .. } => {
                let (stream, _) = listener.accept().await?;
                Ok(Connection::Unix(stream))
            }
        }
    }

    /// The bound address: `host:port` for TCP, the socket path for Unix.
    ///
    /// Binding TCP to port 0 and reading the address back is the standard
    /// way to get a free port in tests.
    pub fn local_addr(&self) -> Result<String> {
        match self {
            Listener::Tcp(listener) => Ok(listener.local_addr()?.to_string()),
            #[cfg(unix)]
            Listener::Unix { path, .. } => Ok(path.clone()),
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Listener::Unix { path, .. } = self {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// A connected stream for one of the supported protocols.
pub enum Connection {
    /// TCP stream.
    Tcp(TcpStream),
    /// Unix domain socket stream.
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Connection {
    /// Split into read and write halves owned by separate tasks.
    pub fn into_split(
        self,
    ) -> (
        tokio::io::ReadHalf<Connection>,
        tokio::io::WriteHalf<Connection>,
    ) {
        tokio::io::split(self)
    }

    /// Peer address for logging, when the transport can report one.
    pub fn peer_addr(&self) -> Option<String> {
        match self {
            Connection::Tcp(stream) => stream.peer_addr().ok().map(|a| a.to_string()),
            #[cfg(unix)]
            Connection::Unix(stream) => stream
                .peer_addr()
                .ok()
                .and_then(|a| a.as_pathname().map(|p| p.display().to_string())),
        }
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match &mut *self {
            Connection::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(unix)]
            Connection::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match &mut *self {
            Connection::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(unix)]
            Connection::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match &mut *self {
            Connection::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(unix)]
            Connection::Unix(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match &mut *self {
            Connection::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(unix)]
            Connection::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_tcp_bind_connect_accept() {
        let listener = bind(TCP, "127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (client, served) = tokio::join!(connect(TCP, &addr, None), listener.accept());
        let mut client = client.unwrap();
        let mut served = served.unwrap();

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        served.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn test_tcp_connect_with_timeout() {
        let listener = bind(TCP, "127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (client, served) = tokio::join!(
            connect(TCP, &addr, Some(Duration::from_secs(5))),
            listener.accept()
        );
        assert!(client.is_ok());
        assert!(served.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_bind_connect_accept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transport.sock");
        let path = path.to_str().unwrap();

        let listener = bind(UNIX, path).await.unwrap();
        assert_eq!(listener.local_addr().unwrap(), path);

        let (client, served) = tokio::join!(connect(UNIX, path, None), listener.accept());
        let mut client = client.unwrap();
        let mut served = served.unwrap();

        client.write_all(b"unix").await.unwrap();
        let mut buf = [0u8; 4];
        served.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"unix");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_bind_removes_stale_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.sock");
        std::fs::write(&path, b"").unwrap();

        let path = path.to_str().unwrap();
        let listener = bind(UNIX, path).await.unwrap();
        drop(listener);
        assert!(!std::path::Path::new(path).exists());
    }

    #[tokio::test]
    async fn test_unknown_protocol_rejected() {
        let err = bind("quic", "127.0.0.1:0").await.unwrap_err();
        assert!(matches!(err, WirecallError::UnsupportedProtocol(name) if name == "quic"));

        let err = connect("carrier-pigeon", "nowhere", None).await.unwrap_err();
        assert!(matches!(err, WirecallError::UnsupportedProtocol(_)));
    }
}
