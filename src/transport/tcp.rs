//! TCP transport, plain for certificate bootstrap and TLS for the trusted channel

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::debug;

use super::error::TransportError;
use super::rpc::RpcClient;
use super::traits::{ConnectRequest, TransportClient, TransportConnector, TransportEvents};

/// Opens framed RPC connections over TCP, wrapping them in TLS when asked to
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl TransportConnector for TcpConnector {
    async fn connect(
        &self,
        request: ConnectRequest,
        events: Arc<dyn TransportEvents>,
    ) -> Result<Box<dyn TransportClient>, TransportError> {
        let address = (request.host.as_str(), request.port);
        let stream = timeout(self.connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| {
                TransportError::Network(format!(
                    "Timed out connecting to {}:{}",
                    request.host, request.port
                ))
            })??;
        stream.set_nodelay(true)?;

        let client = match request.tls {
            Some(tls_config) => {
                let server_name = ServerName::try_from(request.host.as_str())
                    .map_err(|e| TransportError::Unknown(format!("Invalid host name: {}", e)))?
                    .to_owned();
                let tls_stream = timeout(
                    self.connect_timeout,
                    TlsConnector::from(tls_config).connect(server_name, stream),
                )
                .await
                .map_err(|_| TransportError::Network("TLS handshake timed out".into()))?
                .map_err(|e| TransportError::Network(format!("TLS handshake failed: {}", e)))?;

                debug!("TLS established with {}:{}", request.host, request.port);
                RpcClient::start(tls_stream, request.setup, request.keepalive, events).await?
            }
            None => RpcClient::start(stream, request.setup, request.keepalive, events).await?,
        };

        Ok(Box::new(client))
    }

    fn name(&self) -> &'static str {
        "TCP"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use link_shared::codec::FrameDecoder;
    use link_shared::FrameKind;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    struct NoopEvents;

    impl TransportEvents for NoopEvents {
        fn on_connected(&self) {}
        fn on_disconnected(&self, _reason: String) {}
        fn on_closed(&self, _reason: String) {}
        fn on_fire_and_forget(&self, _payload: Bytes) {}
    }

    fn plain_request(port: u16) -> ConnectRequest {
        ConnectRequest {
            host: "127.0.0.1".into(),
            port,
            setup: Bytes::from_static(br#"{"os":"Linux","device":"test","app":"app"}"#),
            tls: None,
            keepalive: Duration::from_secs(10),
        }
    }

    #[tokio::test]
    async fn test_closed_port_is_unreachable() {
        // Grab a free port, then release it
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connector = TcpConnector::new(Duration::from_secs(2));
        let result = connector
            .connect(plain_request(port), Arc::new(NoopEvents))
            .await;
        assert!(matches!(result, Err(TransportError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_plain_connect_sends_setup() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let connector = TcpConnector::new(Duration::from_secs(2));
        let _client = connector
            .connect(plain_request(port), Arc::new(NoopEvents))
            .await
            .expect("connect failed");

        let (mut socket, _) = listener.accept().await.unwrap();
        let mut decoder = FrameDecoder::new();
        let mut buf = vec![0u8; 1024];
        let frame = loop {
            if let Some(frame) = decoder.decode_next().unwrap() {
                break frame;
            }
            let n = socket.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed before setup");
            decoder.extend(&buf[..n]);
        };

        assert_eq!(frame.frame_kind(), Some(FrameKind::Setup));
        let setup: serde_json::Value = serde_json::from_slice(&frame.data).unwrap();
        assert_eq!(setup["device"], "test");
    }

    #[test]
    fn test_connector_name() {
        assert_eq!(TcpConnector::new(Duration::from_secs(1)).name(), "TCP");
    }
}
