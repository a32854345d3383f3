//! Discovery transports.
//!
//! A transport only moves text frames; encoding and decoding of discovery
//! messages stay in `protocol`. Two implementations ship:
//! - `TcpTransport`: newline-delimited JSON over TCP.
//! - `channel_transport`: in-process pair, for tests and embedded control planes.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};

use polykern_core::error::{PolykernError, Result};

use super::protocol::{self, DiscoveryRequest, DiscoveryResponse};

#[async_trait]
pub trait DiscoveryTransport: Send + Sync {
    /// Human-readable endpoint for logs.
    fn endpoint(&self) -> String;

    async fn connect(&self) -> Result<Box<dyn DiscoveryStream>>;
}

/// One established bidirectional stream.
#[async_trait]
pub trait DiscoveryStream: Send {
    async fn send(&mut self, frame: String) -> Result<()>;

    /// `Ok(None)` when the peer closed the stream. `Decode` errors are
    /// recoverable (bad frame); `Transport` errors end the stream and the
    /// caller must reconnect.
    async fn recv(&mut self) -> Result<Option<String>>;
}

// --------------------
// TCP
// --------------------

pub struct TcpTransport {
    address: String,
    max_frame_bytes: usize,
}

impl TcpTransport {
    pub fn new(address: impl Into<String>, max_frame_bytes: usize) -> Self {
        Self {
            address: address.into(),
            max_frame_bytes,
        }
    }
}

#[async_trait]
impl DiscoveryTransport for TcpTransport {
    fn endpoint(&self) -> String {
        format!("tcp://{}", self.address)
    }

    async fn connect(&self) -> Result<Box<dyn DiscoveryStream>> {
        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(|e| PolykernError::Transport(format!("connect {}: {e}", self.address)))?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(address = %self.address, error = %e, "set_nodelay failed");
        }
        let framed = Framed::new(stream, LinesCodec::new_with_max_length(self.max_frame_bytes));
        Ok(Box::new(TcpDiscoveryStream { framed }))
    }
}

struct TcpDiscoveryStream {
    framed: Framed<TcpStream, LinesCodec>,
}

#[async_trait]
impl DiscoveryStream for TcpDiscoveryStream {
    async fn send(&mut self, frame: String) -> Result<()> {
        self.framed
            .send(frame)
            .await
            .map_err(|e| PolykernError::Transport(format!("send failed: {e}")))
    }

    async fn recv(&mut self) -> Result<Option<String>> {
        match self.framed.next().await {
            None => Ok(None),
            Some(Ok(line)) => Ok(Some(line)),
            // Framed yields nothing more after a codec error.
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => Err(PolykernError::Transport(
                "frame exceeds max_frame_bytes".into(),
            )),
            Some(Err(LinesCodecError::Io(e))) => {
                Err(PolykernError::Transport(format!("read failed: {e}")))
            }
        }
    }
}

// --------------------
// In-process channel
// --------------------

/// Client side of an in-process control plane.
pub struct ChannelTransport {
    accept_tx: mpsc::Sender<ServerConnection>,
    buffer: usize,
}

/// Control-plane side: yields one `ServerConnection` per client connect.
pub struct ControlPlaneHandle {
    accept_rx: Mutex<mpsc::Receiver<ServerConnection>>,
}

/// Build a connected transport / control-plane pair. Dropping the handle
/// makes further connects fail like a refused connection.
pub fn channel_transport(buffer: usize) -> (ChannelTransport, ControlPlaneHandle) {
    let (accept_tx, accept_rx) = mpsc::channel(4);
    (
        ChannelTransport {
            accept_tx,
            buffer: buffer.max(1),
        },
        ControlPlaneHandle {
            accept_rx: Mutex::new(accept_rx),
        },
    )
}

#[async_trait]
impl DiscoveryTransport for ChannelTransport {
    fn endpoint(&self) -> String {
        "channel://in-process".into()
    }

    async fn connect(&self) -> Result<Box<dyn DiscoveryStream>> {
        let (req_tx, req_rx) = mpsc::channel(self.buffer);
        let (resp_tx, resp_rx) = mpsc::channel(self.buffer);
        self.accept_tx
            .send(ServerConnection {
                requests: req_rx,
                responses: resp_tx,
            })
            .await
            .map_err(|_| PolykernError::Transport("control plane unavailable".into()))?;
        Ok(Box::new(ChannelStream {
            requests: req_tx,
            responses: resp_rx,
        }))
    }
}

struct ChannelStream {
    requests: mpsc::Sender<String>,
    responses: mpsc::Receiver<String>,
}

#[async_trait]
impl DiscoveryStream for ChannelStream {
    async fn send(&mut self, frame: String) -> Result<()> {
        self.requests
            .send(frame)
            .await
            .map_err(|_| PolykernError::Transport("stream closed".into()))
    }

    async fn recv(&mut self) -> Result<Option<String>> {
        Ok(self.responses.recv().await)
    }
}

impl ControlPlaneHandle {
    /// Wait for the next client connection.
    pub async fn accept(&self) -> Option<ServerConnection> {
        self.accept_rx.lock().await.recv().await
    }
}

/// Control-plane end of one stream. Dropping it closes the stream.
pub struct ServerConnection {
    requests: mpsc::Receiver<String>,
    responses: mpsc::Sender<String>,
}

impl ServerConnection {
    /// Next request from the client; `None` once the client hung up.
    pub async fn recv_request(&mut self) -> Option<Result<DiscoveryRequest>> {
        let frame = self.requests.recv().await?;
        Some(protocol::decode_request(&frame))
    }

    pub async fn push(&self, resp: &DiscoveryResponse) -> Result<()> {
        self.push_raw(protocol::encode_response(resp)?).await
    }

    /// Send an arbitrary frame, malformed or not.
    pub async fn push_raw(&self, frame: String) -> Result<()> {
        self.responses
            .send(frame)
            .await
            .map_err(|_| PolykernError::Transport("client gone".into()))
    }
}
