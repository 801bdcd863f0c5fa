use std::fmt;

use crate::transport::acl::AclError;

#[derive(Debug)]
pub enum TransportError {
    Disconnected,
    InvalidConfig(String),
    Protocol(String),
    Io(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Disconnected => write!(f, "transport disconnected"),
            TransportError::InvalidConfig(message) => write!(f, "invalid config: {message}"),
            TransportError::Protocol(message) => write!(f, "protocol error: {message}"),
            TransportError::Io(message) => write!(f, "io error: {message}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> Self {
        TransportError::Io(error.to_string())
    }
}

impl From<AclError> for TransportError {
    fn from(error: AclError) -> Self {
        TransportError::Protocol(error.to_string())
    }
}
