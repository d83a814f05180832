//! Device credentials used to authenticate the secure channel
//!
//! The connection core only sees the [`CredentialProvider`] capability;
//! [`FileCredentialStore`] is the on-disk implementation used by the binary.

mod store;

use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;

pub use store::FileCredentialStore;

/// Source of certificate material and device identity
pub trait CredentialProvider: Send + Sync + 'static {
    /// Device id issued by the desktop, `"unknown"` until one is stored
    fn device_id(&self) -> String;

    /// Whether all certificate material needed for TLS is present
    fn has_required_files(&self) -> bool;

    /// Generate a fresh key pair and return a PEM certificate signing request
    fn create_certificate_signing_request(&self) -> Result<String>;

    /// Where the desktop should place signed certificates
    fn certificate_directory_path(&self) -> String;

    /// TLS client configuration presenting the device certificate
    fn tls_context(&self) -> Result<Arc<rustls::ClientConfig>>;

    /// Persist configuration returned by the desktop after signing
    fn store_connection_config(&self, config: &Value) -> Result<()>;
}
