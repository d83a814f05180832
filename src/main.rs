use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use desktop_link::{
    Callbacks, ConnectionConfig, ConnectionManager, DeviceIdentity, FileCredentialStore,
    TcpConnector,
};
use serde_json::{json, Value};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Logs link events and inbound messages
struct LoggingCallbacks;

impl Callbacks for LoggingCallbacks {
    fn on_connected(&self) {
        info!("Connected to desktop");
    }

    fn on_disconnected(&self) {
        warn!("Disconnected from desktop");
    }

    fn on_message_received(&self, message: Value) {
        info!("Received from desktop: {}", message);
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let identity = DeviceIdentity {
        os: std::env::consts::OS.into(),
        device: env_or("DESKTOP_LINK_DEVICE", "desktop-link-demo"),
        app: env_or("DESKTOP_LINK_APP", "com.example.desktoplink"),
        host: env_or("DESKTOP_LINK_HOST", "localhost"),
    };
    let config = ConnectionConfig::default();
    let cert_dir = env_or("DESKTOP_LINK_CERT_DIR", "./desktop-link-certs");

    info!("Device link starting: {} ({})", identity.app, identity.device);
    info!("  Desktop: {} (secure {}, bootstrap {})", identity.host, config.secure_port, config.insecure_port);
    info!("  Certificates: {}", cert_dir);

    let credentials = Arc::new(FileCredentialStore::new(&cert_dir, identity.app.clone())?);
    let connector = Arc::new(TcpConnector::new(config.connect_timeout));
    let manager = ConnectionManager::new(
        identity,
        config,
        connector,
        credentials,
        Arc::new(LoggingCallbacks),
    );
    let mut status = manager.subscribe();
    manager.start();

    // Periodic status beacon while the link is up
    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                info!(
                    state = ?current.state,
                    open = current.open,
                    failed_attempts = current.failed_attempts,
                    "Link status changed"
                );
            }
            _ = ticker.tick() => {
                if manager.is_open() {
                    manager.send_message(json!({"method": "status", "params": {"uptime": true}}));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                manager.stop();
                break;
            }
        }
    }

    Ok(())
}
