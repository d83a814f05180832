//! Device-side link to a desktop debugging host
//!
//! [`ConnectionManager`] keeps a TLS-authenticated RPC channel to the desktop
//! open. When the device has no client certificate yet it first connects over
//! a plain bootstrap channel, has the desktop sign one, then reconnects
//! securely.

pub mod connection;
pub mod credentials;
pub mod transport;

pub use connection::{Callbacks, ConnectionConfig, ConnectionManager, DeviceIdentity, LinkStatus};
pub use credentials::{CredentialProvider, FileCredentialStore};
pub use link_shared::state_machine::LinkState;
pub use transport::{TcpConnector, TransportError};
