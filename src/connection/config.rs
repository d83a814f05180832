use std::time::Duration;

use link_shared::link;

/// Identity the device presents to the desktop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub os: String,
    /// Device model
    pub device: String,
    /// Application id
    pub app: String,
    /// Desktop host to connect to
    pub host: String,
}

/// Configuration for connection manager
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// TLS port on the desktop
    pub secure_port: u16,
    /// Plain port used only to obtain a certificate
    pub insecure_port: u16,
    /// Fixed delay before every reconnect
    pub reconnect_delay: Duration,
    /// Keepalive interval handed to the transport
    pub keepalive_interval: Duration,
    /// Connect and TLS handshake timeout
    pub connect_timeout: Duration,
    /// Consecutive secure-connect failures that force a new certificate exchange
    pub failed_attempt_threshold: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            secure_port: link::SECURE_PORT,
            insecure_port: link::INSECURE_PORT,
            reconnect_delay: Duration::from_millis(link::RECONNECT_INTERVAL_MS),
            keepalive_interval: Duration::from_millis(link::KEEPALIVE_INTERVAL_MS),
            connect_timeout: Duration::from_secs(5),
            failed_attempt_threshold: link::FAILED_ATTEMPT_THRESHOLD,
        }
    }
}
