//! # TCP Transport
//!
//! Frames are written as a little-endian `u32` length followed by the frame
//! bytes. Only `tcp` endpoints are handled; secure and datagram endpoints need
//! their own connectors.
//!
//! [`serve`] is the matching accept loop: it answers every connection from
//! one [`ObjectAdapter`].

use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::warn;

use farwire::Endpoint;
use farwire::Protocol;

use crate::adapter::ObjectAdapter;
use crate::transport;
use crate::transport::Connector;
use crate::transport::Transport;

/// Upper bound on a single frame.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Connects `tcp` endpoints with plain sockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait::async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, endpoint: &Endpoint, secure: bool) -> transport::Result<Box<dyn Transport>> {
        if endpoint.protocol != Protocol::Tcp || secure {
            return Err(transport::Error::Unsupported(endpoint.to_string()));
        }

        let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|e| transport::Error::ConnectionRefused(format!("{}: {}", endpoint, e)))?;
        stream
            .set_nodelay(true)
            .map_err(|e| transport::Error::Io(e.to_string()))?;

        Ok(Box::new(TcpTransport::new(stream)))
    }
}

/// A length-delimited frame stream over one TCP socket.
pub struct TcpTransport {
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn send(&self, payload: &[u8]) -> transport::Result<()> {
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, payload).await
    }

    async fn recv(&self) -> transport::Result<Option<Vec<u8>>> {
        let mut reader = self.reader.lock().await;
        read_frame(&mut *reader).await
    }

    async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

/// Accepts connections forever, answering each from `adapter`.
///
/// Requests on one connection are dispatched in arrival order.
pub async fn serve(listener: TcpListener, adapter: Arc<ObjectAdapter>) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        stream.set_nodelay(true)?;
        debug!(%peer, adapter = %adapter.name(), "accepted connection");

        let adapter = Arc::clone(&adapter);
        tokio::spawn(async move {
            let transport = TcpTransport::new(stream);
            loop {
                let bytes = match transport.recv().await {
                    Ok(Some(bytes)) => bytes,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(%peer, error = %e, "dropping connection");
                        break;
                    }
                };
                if let Some(reply) = adapter.serve(&bytes).await {
                    if let Err(e) = transport.send(&reply).await {
                        warn!(%peer, error = %e, "could not send reply");
                        break;
                    }
                }
            }
            debug!(%peer, "connection closed");
        });
    }
}

/// Writes one length-prefixed frame.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> transport::Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    if payload.len() > MAX_FRAME_LEN {
        return Err(transport::Error::PayloadTooLarge(payload.len()));
    }
    writer
        .write_u32_le(payload.len() as u32)
        .await
        .map_err(lost)?;
    writer.write_all(payload).await.map_err(lost)?;
    writer.flush().await.map_err(lost)
}

/// Reads one length-prefixed frame; `None` on a clean end of stream.
pub async fn read_frame<R>(reader: &mut R) -> transport::Result<Option<Vec<u8>>>
where
    R: AsyncReadExt + Unpin,
{
    let len = match reader.read_u32_le().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(lost(e)),
    };
    if len > MAX_FRAME_LEN {
        return Err(transport::Error::PayloadTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(lost)?;
    Ok(Some(payload))
}

fn lost(e: std::io::Error) -> transport::Error {
    transport::Error::ConnectionLost(e.to_string())
}
