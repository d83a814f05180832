//! Connection manager handle

use std::sync::Arc;

use link_shared::state_machine::LinkState;
use serde_json::Value;
use tokio::sync::{mpsc, watch};

use super::callbacks::{CallbackContext, Callbacks};
use super::config::{ConnectionConfig, DeviceIdentity};
use super::worker::{Command, LinkStatus, LinkWorker};
use crate::credentials::CredentialProvider;
use crate::transport::TransportConnector;

/// Keeps a trusted link to the desktop up, bootstrapping certificates when needed
///
/// All work is posted to the connection context; none of these methods touch
/// the network on the caller's task. Dropping the manager stops the link.
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<LinkStatus>,
}

impl ConnectionManager {
    /// Create a new connection manager and spawn its connection and callback contexts
    ///
    /// Must be called from within a tokio runtime. Nothing connects until [`start`](Self::start).
    pub fn new(
        identity: DeviceIdentity,
        config: ConnectionConfig,
        connector: Arc<dyn TransportConnector>,
        credentials: Arc<dyn CredentialProvider>,
        callbacks: Arc<dyn Callbacks>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(LinkStatus::default());

        let worker = LinkWorker::new(
            identity,
            config,
            connector,
            credentials,
            CallbackContext::spawn(callbacks),
            commands_tx.downgrade(),
            status_tx,
        );
        tokio::spawn(worker.run(commands_rx));

        Self {
            commands: commands_tx,
            status: status_rx,
        }
    }

    /// Begin connecting; retries continue in the background until stopped
    pub fn start(&self) {
        let _ = self.commands.send(Command::Start);
    }

    /// Tear down the current connection and cancel pending retries
    pub fn stop(&self) {
        let _ = self.commands.send(Command::Stop);
    }

    /// Trusted channel open
    pub fn is_open(&self) -> bool {
        self.status.borrow().open
    }

    pub fn state(&self) -> LinkState {
        self.status.borrow().state
    }

    pub fn status(&self) -> LinkStatus {
        *self.status.borrow()
    }

    /// Send a message to the desktop; silently dropped when not connected
    pub fn send_message(&self, message: Value) {
        let _ = self.commands.send(Command::Send(message));
    }

    /// Get a receiver that observes every published status change
    pub fn subscribe(&self) -> watch::Receiver<LinkStatus> {
        self.status.clone()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.stop();
    }
}
