/// Errors that can occur in registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The name already has a live entry.
    #[error("name '{0}' is already registered")]
    AlreadyRegistered(String),

    /// No live entry exists for the name.
    #[error("name '{0}' is not registered")]
    NotFound(String),

    /// The name is not usable as a registry key.
    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// An entry file exists but cannot be parsed.
    #[error("corrupt entry for '{name}': {source}")]
    Corrupt {
        name: String,
        source: serde_json::Error,
    },

    /// An I/O error occurred against the registry storage.
    #[error("registry I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
