use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};

/// Longest accepted object name. Names become file and socket path
/// components, which bounds them well below `sockaddr_un` limits.
pub const MAX_NAME_LEN: usize = 64;

/// One live owner registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryEntry {
    /// The machine-unique object name.
    pub name: String,
    /// Socket path proxies connect to.
    pub endpoint: PathBuf,
    /// Pid of the owner process, used for liveness checks.
    pub owner_pid: u32,
    /// Unix seconds at registration time.
    pub created_at: u64,
}

impl RegistryEntry {
    /// Build an entry stamped with the current time.
    pub fn new(name: impl Into<String>, endpoint: impl Into<PathBuf>, owner_pid: u32) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            owner_pid,
            created_at: unix_now(),
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Validate an object name for use as a registry key.
///
/// Names are path components on disk, so only `[A-Za-z0-9._-]` is accepted
/// and the first character must be alphanumeric.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(RegistryError::InvalidName {
            name: name.to_string(),
            reason: "empty",
        });
    }
    if name.len() > MAX_NAME_LEN {
        return Err(RegistryError::InvalidName {
            name: name.to_string(),
            reason: "longer than 64 bytes",
        });
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap_or('.');
    if !first.is_ascii_alphanumeric() {
        return Err(RegistryError::InvalidName {
            name: name.to_string(),
            reason: "must start with an ASCII letter or digit",
        });
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(RegistryError::InvalidName {
            name: name.to_string(),
            reason: "contains characters outside [A-Za-z0-9._-]",
        });
    }
    Ok(())
}

/// Whether a process with the given pid is currently alive.
///
/// Uses `kill(pid, 0)`: delivery permission errors still mean the process
/// exists.
pub fn pid_alive(pid: u32) -> bool {
    // SAFETY: kill with signal 0 performs no delivery, only an existence and
    // permission check on the target pid.
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    if rc == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}
