use std::time::Duration;

use objhost_wire::RemoteErrorKind;

/// Errors surfaced by owners, proxies, and lifecycle calls.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(objhost_transport::TransportError),

    /// Framing or message decoding error.
    #[error("wire error: {0}")]
    Wire(objhost_wire::WireError),

    /// Registry storage error other than the mapped name conditions.
    #[error("registry error: {0}")]
    Registry(objhost_registry::RegistryError),

    /// No live owner exists for the name, or the remote target is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// The name already has a live owner.
    #[error("'{0}' already has a live owner")]
    AlreadyRegistered(String),

    /// The hello/welcome exchange failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// No response arrived within the per-call deadline. The owner-side
    /// execution is not cancelled; a late response is dropped by id.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// A spawned owner did not register within the deadline.
    #[error("owner failed to register within {0:?}")]
    RegistrationTimeout(Duration),

    /// The connection to the owner closed unexpectedly.
    #[error("owner disconnected: {0}")]
    Disconnected(String),

    /// The operation failed inside the owner (other than a missing target).
    #[error("remote operation failed ({kind}): {message}")]
    Remote {
        kind: RemoteErrorKind,
        message: String,
    },

    /// The owner process could not be spawned.
    #[error("failed to spawn owner process: {0}")]
    Spawn(String),
}

impl From<objhost_transport::TransportError> for RuntimeError {
    fn from(err: objhost_transport::TransportError) -> Self {
        RuntimeError::Transport(err)
    }
}

impl From<objhost_wire::WireError> for RuntimeError {
    fn from(err: objhost_wire::WireError) -> Self {
        match err {
            objhost_wire::WireError::ConnectionClosed => {
                RuntimeError::Disconnected("connection closed".to_string())
            }
            other => RuntimeError::Wire(other),
        }
    }
}

impl From<objhost_registry::RegistryError> for RuntimeError {
    fn from(err: objhost_registry::RegistryError) -> Self {
        match err {
            objhost_registry::RegistryError::NotFound(name) => RuntimeError::NotFound(name),
            objhost_registry::RegistryError::AlreadyRegistered(name) => {
                RuntimeError::AlreadyRegistered(name)
            }
            other => RuntimeError::Registry(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
