use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpStream, UdpSocket};

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// TCP device link.
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    remote: String,
}

impl TcpTransport {
    /// Connect to a device endpoint such as `"192.168.1.10:6668"`.
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| TransportError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        tracing::debug!(addr, "tcp transport connected");
        Self::from_stream(stream)
    }

    /// Wrap an already-connected stream (e.g. from an acceptor).
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        let remote = stream.peer_addr()?.to_string();
        Ok(Self { stream, remote })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.read(buf).await
    }

    fn remote_addr(&self) -> String {
        self.remote.clone()
    }
}

/// Connected-UDP device link.
///
/// The socket is `connect`ed to a single remote, so `recv` only yields
/// datagrams from that device. UDP has no end-of-stream; `read` never
/// returns `Ok(0)` unless the device sends an empty datagram.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    remote: String,
}

impl UdpTransport {
    /// Bind an ephemeral local socket and connect it to the device endpoint.
    pub async fn connect(addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket
            .connect(addr)
            .await
            .map_err(|source| TransportError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        let remote = socket.peer_addr()?.to_string();
        tracing::debug!(addr = %remote, "udp transport connected");
        Ok(Self { socket, remote })
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.socket.recv(buf).await
    }

    fn remote_addr(&self) -> String {
        self.remote.clone()
    }
}
