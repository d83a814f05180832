//! Desktop Link Shared Protocol Types
//!
//! This crate provides the wire frames, frame codec, handshake payloads and
//! lifecycle state machine shared by everything that speaks the desktop link.

pub mod codec;
pub mod frame;
pub mod state_machine;

use serde::{Deserialize, Serialize};

pub use frame::{Frame, FrameKind};

/// Fixed parameters of the link
pub mod link {
    /// TLS port of the desktop host
    pub const SECURE_PORT: u16 = 8088;

    /// Plain port used only for certificate bootstrap
    pub const INSECURE_PORT: u16 = 8089;

    /// Delay before a failed or lost connection is retried
    pub const RECONNECT_INTERVAL_MS: u64 = 2000;

    /// Keepalive ping interval on every connection
    pub const KEEPALIVE_INTERVAL_MS: u64 = 10_000;

    /// Consecutive secure-connect failures after which certificates are re-requested
    pub const FAILED_ATTEMPT_THRESHOLD: u32 = 2;

    /// Device id reported when none has been issued yet
    pub const UNKNOWN_DEVICE_ID: &str = "unknown";

    /// Method name of the certificate signing RPC
    pub const SIGN_CERTIFICATE_METHOD: &str = "signCertificate";

    /// Error message an older desktop answers the certificate request with
    pub const NOT_IMPLEMENTED: &str = "not implemented";
}

/// Payload of the setup frame sent when a connection is established
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupPayload {
    pub os: String,
    pub device: String,
    pub app: String,
    /// Only present on the secure channel
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl SetupPayload {
    /// Setup for the untrusted bootstrap channel
    pub fn insecure(os: impl Into<String>, device: impl Into<String>, app: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            device: device.into(),
            app: app.into(),
            device_id: None,
        }
    }

    /// Setup for the TLS channel
    pub fn secure(
        os: impl Into<String>,
        device: impl Into<String>,
        app: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            device_id: Some(device_id.into()),
            ..Self::insecure(os, device, app)
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Request asking the desktop to sign a device certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRequest {
    pub method: String,
    pub csr: String,
    /// Directory on the device where the desktop should place the certificates
    pub destination: String,
}

impl CertificateRequest {
    pub fn new(csr: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            method: link::SIGN_CERTIFICATE_METHOD.into(),
            csr: csr.into(),
            destination: destination.into(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
