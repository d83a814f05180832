//! Link State Machine
//!
//! Defines the valid lifecycle transitions of the device-to-desktop link.

/// Lifecycle state of the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    /// Nothing in flight, waiting for a start
    #[default]
    Idle,
    /// Opening the untrusted bootstrap channel
    BootstrapInsecure,
    /// Bootstrap channel open, waiting for the signed certificate
    CertExchangePending,
    /// Opening the TLS channel
    ConnectSecure,
    /// Trusted channel open
    Connected,
    /// Channel gone or attempt failed, reconnect scheduled
    Disconnected,
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// Start chose the certificate bootstrap path
    BootstrapStarted,
    /// Start chose the secure path
    SecureConnectStarted,
    /// Bootstrap channel established, certificate request sent
    InsecureOpened,
    /// TLS channel established
    SecureOpened,
    /// Connection attempt failed before a channel was open
    ConnectFailed,
    /// An open channel went away (including intentional teardown)
    ConnectionLost,
    /// Reconnect delay elapsed
    ReconnectDue,
    /// Owner stopped the link
    Stopped,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionResult {
    /// Transition was valid and state changed
    Success(LinkState),
    /// Transition was invalid from current state
    Invalid { from: LinkState, event: LinkEvent },
}

/// The lifecycle state machine for one link
#[derive(Debug, Default)]
pub struct LinkStateMachine {
    current_state: LinkState,
}

impl LinkStateMachine {
    pub fn new() -> Self {
        Self {
            current_state: LinkState::Idle,
        }
    }

    pub fn state(&self) -> LinkState {
        self.current_state
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: LinkEvent) -> TransitionResult {
        // Stop always wins
        if event == LinkEvent::Stopped {
            self.current_state = LinkState::Idle;
            return TransitionResult::Success(LinkState::Idle);
        }

        match self.next_state(event) {
            Some(state) => {
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    fn next_state(&self, event: LinkEvent) -> Option<LinkState> {
        use LinkEvent::*;
        use LinkState::*;

        match (self.current_state, event) {
            // A start may preempt a pending reconnect
            (Idle | Disconnected, BootstrapStarted) => Some(BootstrapInsecure),
            (Idle | Disconnected, SecureConnectStarted) => Some(ConnectSecure),

            (BootstrapInsecure, InsecureOpened) => Some(CertExchangePending),
            (ConnectSecure, SecureOpened) => Some(Connected),

            // Idle covers failures before any transport was opened
            (Idle | BootstrapInsecure | ConnectSecure, ConnectFailed) => Some(Disconnected),

            (BootstrapInsecure | CertExchangePending | ConnectSecure | Connected, ConnectionLost) => {
                Some(Disconnected)
            }

            (Disconnected, ReconnectDue) => Some(Idle),

            _ => None,
        }
    }
}
