//! Transport trait abstraction for pluggable RPC backends

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};

use super::error::TransportError;

/// A byte stream a framed RPC session can run over (plain TCP or TLS)
pub trait TransportStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> TransportStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Everything needed to open one connection to the desktop
#[derive(Clone)]
pub struct ConnectRequest {
    pub host: String,
    pub port: u16,
    /// JSON setup payload, sent as the first frame
    pub setup: Bytes,
    /// TLS client configuration, `None` for the plain bootstrap channel
    pub tls: Option<Arc<rustls::ClientConfig>>,
    pub keepalive: Duration,
}

impl std::fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls.is_some())
            .field("keepalive", &self.keepalive)
            .finish()
    }
}

/// Lifecycle and inbound signals raised by a live connection
///
/// Implementations must be cheap and must not block; they are called from the
/// transport's own tasks.
pub trait TransportEvents: Send + Sync + 'static {
    fn on_connected(&self);

    fn on_disconnected(&self, reason: String);

    fn on_closed(&self, reason: String);

    /// Inbound fire-and-forget message from the desktop
    fn on_fire_and_forget(&self, payload: Bytes);
}

/// A connected RPC client. Dropping it closes the connection.
pub trait TransportClient: Send + Sync {
    /// Queue a one-way message
    fn fire_and_forget(&self, payload: Bytes) -> Result<(), TransportError>;

    /// Send a request and resolve with the correlated response or error
    fn request_response(&self, payload: Bytes) -> BoxFuture<'static, Result<Bytes, TransportError>>;

    /// Close the connection after already queued frames are written
    fn disconnect(&self);
}

/// Factory for creating transport connections
#[async_trait]
pub trait TransportConnector: Send + Sync + 'static {
    /// Attempt to connect, returning a client once the setup frame is out
    async fn connect(
        &self,
        request: ConnectRequest,
        events: Arc<dyn TransportEvents>,
    ) -> Result<Box<dyn TransportClient>, TransportError>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
