//! Connection context
//!
//! A single task owns every piece of link state: the transport client, the
//! open and trusted flags, the failure counter and the lifecycle state
//! machine. Everything else talks to it by posting [`Command`]s, so state is
//! only ever mutated here and no locks are needed.

use std::sync::Arc;

use bytes::Bytes;
use link_shared::state_machine::{LinkEvent, LinkState, LinkStateMachine, TransitionResult};
use link_shared::SetupPayload;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::callbacks::CallbackContext;
use super::config::{ConnectionConfig, DeviceIdentity};
use super::events::{EventsAdapter, LinkSignal};
use super::reconnect::ReconnectScheduler;
use crate::credentials::CredentialProvider;
use crate::transport::{ConnectRequest, TransportClient, TransportConnector, TransportError};

const WRONG_CONTEXT_MSG: &str =
    "Aborting connection start because it is not running on the connection context";

tokio::task_local! {
    static CONNECTION_CONTEXT: ();
}

/// True when called from inside the connection context task
pub(crate) fn on_connection_context() -> bool {
    CONNECTION_CONTEXT.try_with(|_| ()).is_ok()
}

/// Work posted onto the connection context
pub(crate) enum Command {
    Start,
    Stop,
    Send(Value),
    Reconnect {
        epoch: u64,
    },
    Transport {
        generation: u64,
        signal: LinkSignal,
    },
    ConnectOutcome {
        generation: u64,
        secure: bool,
        result: Result<Box<dyn TransportClient>, TransportError>,
    },
    CertificateResponse {
        generation: u64,
        request: Bytes,
        result: Result<Bytes, TransportError>,
    },
}

/// Snapshot of the link published after every command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkStatus {
    pub state: LinkState,
    /// Trusted channel open
    pub open: bool,
    pub failed_attempts: u32,
}

pub(crate) struct LinkWorker {
    pub(super) identity: DeviceIdentity,
    pub(super) config: ConnectionConfig,
    pub(super) connector: Arc<dyn TransportConnector>,
    pub(super) credentials: Arc<dyn CredentialProvider>,
    pub(super) callbacks: CallbackContext,
    pub(super) commands: mpsc::WeakUnboundedSender<Command>,
    pub(super) reconnect: ReconnectScheduler,
    status: watch::Sender<LinkStatus>,
    pub(super) fsm: LinkStateMachine,
    /// The only live transport, if any
    pub(super) client: Option<Box<dyn TransportClient>>,
    /// Between the transport's connected and disconnected/closed signals
    pub(super) is_open: bool,
    /// Current transport was opened over TLS
    pub(super) trusted: bool,
    pub(super) failed_attempts: u32,
    /// Bumped for every connection attempt and on stop; tags transport callbacks
    pub(super) generation: u64,
    /// Bumped on stop and on every new attempt; tags reconnect timers
    pub(super) epoch: u64,
    /// A connect is in flight
    pub(super) connecting: bool,
    pub(super) stopped: bool,
}

impl LinkWorker {
    pub(crate) fn new(
        identity: DeviceIdentity,
        config: ConnectionConfig,
        connector: Arc<dyn TransportConnector>,
        credentials: Arc<dyn CredentialProvider>,
        callbacks: CallbackContext,
        commands: mpsc::WeakUnboundedSender<Command>,
        status: watch::Sender<LinkStatus>,
    ) -> Self {
        let reconnect = ReconnectScheduler::new(config.reconnect_delay, commands.clone());
        Self {
            identity,
            config,
            connector,
            credentials,
            callbacks,
            commands,
            reconnect,
            status,
            fsm: LinkStateMachine::new(),
            client: None,
            is_open: false,
            trusted: false,
            failed_attempts: 0,
            generation: 0,
            epoch: 0,
            connecting: false,
            stopped: false,
        }
    }

    /// Drain commands until every manager handle is gone
    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        CONNECTION_CONTEXT
            .scope((), async move {
                while let Some(command) = commands.recv().await {
                    self.handle(command);
                    self.publish();
                }
                self.stop();
                debug!("Connection context finished");
            })
            .await;
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Start => {
                self.stopped = false;
                info!(step = "Start connection thread", "Starting connection");
                self.start_sync();
            }
            Command::Stop => self.stop(),
            Command::Send(message) => self.send_message(message),
            Command::Reconnect { epoch } => {
                if self.stopped || epoch != self.epoch {
                    debug!("Ignoring superseded reconnect");
                    return;
                }
                if self.fsm.state() == LinkState::Disconnected {
                    self.transition(LinkEvent::ReconnectDue);
                }
                self.start_sync();
            }
            Command::Transport { generation, signal } => {
                if generation != self.generation {
                    debug!("Ignoring {:?} from a replaced connection", signal);
                    return;
                }
                match signal {
                    LinkSignal::Connected => self.on_transport_connected(),
                    LinkSignal::Disconnected(reason) | LinkSignal::Closed(reason) => {
                        self.on_transport_disconnected(&reason)
                    }
                    LinkSignal::Message(payload) => self.on_message(&payload),
                }
            }
            Command::ConnectOutcome {
                generation,
                secure,
                result,
            } => {
                if generation != self.generation {
                    if let Ok(client) = result {
                        debug!("Dropping connection that finished after stop");
                        client.disconnect();
                    }
                    return;
                }
                self.connecting = false;
                self.on_connect_outcome(secure, result);
            }
            Command::CertificateResponse {
                generation,
                request,
                result,
            } => {
                if generation != self.generation {
                    debug!("Ignoring certificate response from a replaced connection");
                    return;
                }
                self.on_certificate_response(request, result);
            }
        }
    }

    /// Decide between certificate bootstrap and a secure connect
    pub(crate) fn start_sync(&mut self) {
        if !on_connection_context() {
            error!("{}", WRONG_CONTEXT_MSG);
            return;
        }
        if self.is_open() {
            info!("Already connected");
            return;
        }
        if self.connecting {
            debug!("Connection attempt already in flight");
            return;
        }

        info!(step = "Connect to desktop", "Connecting");
        if self.needs_certificate_exchange() {
            self.do_certificate_exchange();
            return;
        }
        self.connect_securely();
    }

    pub(crate) fn is_open(&self) -> bool {
        self.is_open && self.trusted
    }

    pub(super) fn needs_certificate_exchange(&self) -> bool {
        if self.failed_attempts >= self.config.failed_attempt_threshold {
            return true;
        }

        let has_required_files = self.credentials.has_required_files();
        if has_required_files {
            debug!(step = "Check required certificates are present", "Certificates present");
        }
        !has_required_files
    }

    fn connect_securely(&mut self) {
        let device_id = self.credentials.device_id();
        if device_id == link_shared::link::UNKNOWN_DEVICE_ID {
            warn!(step = "Load Device Id", "No device id issued yet");
        }

        let setup = SetupPayload::secure(
            &self.identity.os,
            &self.identity.device,
            &self.identity.app,
            device_id,
        );
        let tls = match self.credentials.tls_context() {
            Ok(tls) => tls,
            Err(e) => {
                self.on_connect_error(TransportError::Unknown(format!(
                    "Failed to build TLS context: {:#}",
                    e
                )));
                return;
            }
        };

        info!(step = "Connect securely", "Opening secure channel");
        self.trusted = true;
        self.open_transport(self.config.secure_port, &setup, Some(tls), true);
    }

    /// Replace the current transport with a new connection attempt
    pub(super) fn open_transport(
        &mut self,
        port: u16,
        setup: &SetupPayload,
        tls: Option<Arc<rustls::ClientConfig>>,
        secure: bool,
    ) {
        let setup = match setup.to_json() {
            Ok(setup) => Bytes::from(setup),
            Err(e) => {
                self.on_connect_error(TransportError::Unknown(format!(
                    "Failed to encode setup payload: {}",
                    e
                )));
                return;
            }
        };

        if let Some(old) = self.client.take() {
            old.disconnect();
        }
        self.is_open = false;
        self.transition(if secure {
            LinkEvent::SecureConnectStarted
        } else {
            LinkEvent::BootstrapStarted
        });

        self.generation += 1;
        // Any pending retry is superseded by this attempt
        self.epoch += 1;
        self.connecting = true;
        let generation = self.generation;
        debug!(
            transport = self.connector.name(),
            port, "Connecting to {}", self.identity.host
        );

        let request = ConnectRequest {
            host: self.identity.host.clone(),
            port,
            setup,
            tls,
            keepalive: self.config.keepalive_interval,
        };
        let events = Arc::new(EventsAdapter::new(self.commands.clone(), generation));
        let connector = self.connector.clone();
        let commands = self.commands.clone();

        tokio::spawn(async move {
            let result = connector.connect(request, events).await;
            // A gone manager drops the client, which closes it
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(Command::ConnectOutcome {
                    generation,
                    secure,
                    result,
                });
            }
        });
    }

    fn on_connect_outcome(
        &mut self,
        secure: bool,
        result: Result<Box<dyn TransportClient>, TransportError>,
    ) {
        match result {
            Ok(client) => {
                self.client = Some(client);
                if secure {
                    info!("Secure channel established");
                    self.failed_attempts = 0;
                } else {
                    info!(step = "Connect insecurely", "Bootstrap channel established");
                    self.transition(LinkEvent::InsecureOpened);
                    self.request_signed_certificate();
                }
            }
            Err(e) => self.on_connect_error(e),
        }
    }

    pub(super) fn on_connect_error(&mut self, error: TransportError) {
        self.connecting = false;
        self.trusted = false;
        match &error {
            TransportError::Unreachable(_) => {
                // Desktop not running, not a failed attempt
                info!(step = "Connect to desktop", "Port not open");
            }
            _ => {
                self.failed_attempts += 1;
                warn!(
                    step = "Connect to desktop",
                    failed_attempts = self.failed_attempts,
                    "Connection failed: {}",
                    error
                );
            }
        }
        self.transition(LinkEvent::ConnectFailed);
        self.schedule_reconnect();
    }

    pub(super) fn schedule_reconnect(&mut self) {
        if self.stopped {
            return;
        }
        self.reconnect.schedule(self.epoch);
    }

    /// Fire-and-forget to the desktop, dropped when there is no trusted channel
    fn send_message(&mut self, message: Value) {
        let client = match &self.client {
            Some(client) if self.trusted => client,
            _ => {
                debug!("Not connected, dropping outbound message");
                return;
            }
        };
        match serde_json::to_vec(&message) {
            Ok(payload) => {
                if let Err(e) = client.fire_and_forget(Bytes::from(payload)) {
                    debug!("Outbound message dropped: {}", e);
                }
            }
            Err(e) => warn!("Failed to encode outbound message: {}", e),
        }
    }

    /// Inbound fire-and-forget from the desktop
    fn on_message(&mut self, payload: &[u8]) {
        if !self.trusted {
            debug!("Ignoring message on the bootstrap channel");
            return;
        }
        match serde_json::from_slice::<Map<String, Value>>(payload) {
            Ok(message) => self.callbacks.message(Value::Object(message)),
            Err(e) => warn!("Dropping malformed message from desktop: {}", e),
        }
    }

    pub(super) fn stop(&mut self) {
        self.stopped = true;
        self.epoch += 1;
        self.generation += 1;
        self.connecting = false;

        if let Some(client) = self.client.take() {
            client.disconnect();
        }
        if self.is_open() {
            self.callbacks.disconnected();
        }
        self.is_open = false;
        self.trusted = false;
        self.transition(LinkEvent::Stopped);
    }

    pub(super) fn transition(&mut self, event: LinkEvent) {
        let from = self.fsm.state();
        match self.fsm.process_event(event) {
            TransitionResult::Success(to) if to != from => debug!("Link {:?} -> {:?}", from, to),
            TransitionResult::Success(_) => {}
            TransitionResult::Invalid { from, event } => {
                debug!("No transition from {:?} on {:?}", from, event)
            }
        }
    }

    pub(crate) fn status(&self) -> LinkStatus {
        LinkStatus {
            state: self.fsm.state(),
            open: self.is_open(),
            failed_attempts: self.failed_attempts,
        }
    }

    fn publish(&self) {
        let status = self.status();
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }
}
