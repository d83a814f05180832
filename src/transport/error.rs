//! Tagged errors raised by transports

use std::io;

use bytes::Bytes;
use link_shared::codec::CodecError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Nothing is listening on the port, usually the desktop is not running
    #[error("Port not reachable: {0}")]
    Unreachable(String),

    #[error("Network failure: {0}")]
    Network(String),

    /// Error reply carrying a payload from the remote side
    #[error("Error response: {}", String::from_utf8_lossy(.0))]
    Protocol(Bytes),

    #[error("{0}")]
    Unknown(String),
}

impl TransportError {
    /// Payload of an error reply as text, if this is one
    pub fn payload_message(&self) -> Option<String> {
        match self {
            TransportError::Protocol(payload) => Some(String::from_utf8_lossy(payload).into_owned()),
            _ => None,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::ConnectionRefused => TransportError::Unreachable(e.to_string()),
            _ => TransportError::Network(e.to_string()),
        }
    }
}

impl From<CodecError> for TransportError {
    fn from(e: CodecError) -> Self {
        TransportError::Unknown(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refused_is_unreachable() {
        let err: TransportError = io::Error::new(io::ErrorKind::ConnectionRefused, "refused").into();
        assert!(matches!(err, TransportError::Unreachable(_)));

        let err: TransportError = io::Error::new(io::ErrorKind::ConnectionReset, "reset").into();
        assert!(matches!(err, TransportError::Network(_)));
    }

    #[test]
    fn test_payload_message() {
        let err = TransportError::Protocol(Bytes::from_static(b"not implemented"));
        assert_eq!(err.payload_message().as_deref(), Some("not implemented"));
        assert_eq!(TransportError::Network("x".into()).payload_message(), None);
    }
}
