//! Transport lifecycle signals and how the link reacts to them

use bytes::Bytes;
use link_shared::state_machine::LinkEvent;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::worker::{Command, LinkWorker};
use crate::transport::TransportEvents;

/// A transport signal as posted onto the connection context
#[derive(Debug)]
pub(crate) enum LinkSignal {
    Connected,
    Disconnected(String),
    Closed(String),
    Message(Bytes),
}

/// Events sink handed to one connection
///
/// Holds only a weak sender, so a live transport never keeps the manager
/// alive. Every signal is tagged with the generation of the connection it
/// belongs to.
pub(crate) struct EventsAdapter {
    commands: mpsc::WeakUnboundedSender<Command>,
    generation: u64,
}

impl EventsAdapter {
    pub(crate) fn new(commands: mpsc::WeakUnboundedSender<Command>, generation: u64) -> Self {
        Self {
            commands,
            generation,
        }
    }

    fn post(&self, signal: LinkSignal) {
        if let Some(commands) = self.commands.upgrade() {
            let _ = commands.send(Command::Transport {
                generation: self.generation,
                signal,
            });
        }
    }
}

impl TransportEvents for EventsAdapter {
    fn on_connected(&self) {
        self.post(LinkSignal::Connected);
    }

    fn on_disconnected(&self, reason: String) {
        self.post(LinkSignal::Disconnected(reason));
    }

    fn on_closed(&self, reason: String) {
        self.post(LinkSignal::Closed(reason));
    }

    fn on_fire_and_forget(&self, payload: Bytes) {
        self.post(LinkSignal::Message(payload));
    }
}

impl LinkWorker {
    pub(super) fn on_transport_connected(&mut self) {
        self.is_open = true;
        if self.trusted {
            self.transition(LinkEvent::SecureOpened);
            self.callbacks.connected();
        }
    }

    /// Shared by the disconnected and closed signals, which may both fire for one session
    pub(super) fn on_transport_disconnected(&mut self, reason: &str) {
        if !self.is_open {
            return;
        }
        self.is_open = false;
        self.client = None;

        if self.trusted {
            self.trusted = false;
            info!("Disconnected from desktop: {}", reason);
            self.callbacks.disconnected();
        } else {
            debug!("Bootstrap channel closed: {}", reason);
        }

        self.transition(LinkEvent::ConnectionLost);
        self.schedule_reconnect();
    }
}
