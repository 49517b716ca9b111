use std::fmt;
use std::io;

use objhost_runtime::RuntimeError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn registry_error(context: &str, err: objhost_registry::RegistryError) -> CliError {
    use objhost_registry::RegistryError;
    match err {
        RegistryError::NotFound(_) | RegistryError::AlreadyRegistered(_) => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        RegistryError::InvalidName { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        RegistryError::Corrupt { .. } => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        RegistryError::Io(source) => io_error(context, source),
    }
}

pub fn runtime_error(context: &str, err: RuntimeError) -> CliError {
    match err {
        RuntimeError::Transport(objhost_transport::TransportError::Bind { source, .. })
        | RuntimeError::Transport(objhost_transport::TransportError::Connect { source, .. })
        | RuntimeError::Transport(objhost_transport::TransportError::Accept(source))
        | RuntimeError::Transport(objhost_transport::TransportError::Io(source)) => {
            io_error(context, source)
        }
        RuntimeError::Transport(other) => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {other}"))
        }
        RuntimeError::Wire(objhost_wire::WireError::Decode(err)) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        RuntimeError::Wire(other) => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
        RuntimeError::Registry(err) => registry_error(context, err),
        RuntimeError::Timeout(_) | RuntimeError::RegistrationTimeout(_) => {
            CliError::new(TIMEOUT, format!("{context}: {err}"))
        }
        RuntimeError::NotFound(_)
        | RuntimeError::AlreadyRegistered(_)
        | RuntimeError::Disconnected(_)
        | RuntimeError::Remote { .. } => CliError::new(FAILURE, format!("{context}: {err}")),
        RuntimeError::HandshakeFailed(_) | RuntimeError::Spawn(_) => {
            CliError::new(INTERNAL, format!("{context}: {err}"))
        }
    }
}
