//! Machine-local name→endpoint directory for objhost owners.
//!
//! Owners register `(name, socket path, pid)` tuples; any process resolves a
//! name to connect a proxy. Registration is atomic (at most one live entry
//! per name) and resolution checks owner liveness so proxies are never
//! pointed at dead endpoints: a crashed owner's entry is removed on first
//! contact and surfaces as `NotFound`, the same as a never-registered name.

pub mod entry;
pub mod error;
pub mod file;
pub mod memory;

pub use entry::{pid_alive, validate_name, RegistryEntry, MAX_NAME_LEN};
pub use error::{RegistryError, Result};
pub use file::FileRegistry;
pub use memory::MemoryRegistry;

/// A name→endpoint directory.
///
/// Injected into owners and lifecycle calls so tests can substitute
/// [`MemoryRegistry`] for the shared filesystem-backed one.
pub trait Registry: Send + Sync {
    /// Claim `entry.name`. Fails with `AlreadyRegistered` while a live owner
    /// holds the name; stale holders are evicted.
    fn register(&self, entry: RegistryEntry) -> Result<()>;

    /// Look up a name. Fails with `NotFound` if absent or the registered
    /// owner is dead (the stale entry is removed first).
    fn resolve(&self, name: &str) -> Result<RegistryEntry>;

    /// Remove a name. Fails with `NotFound` if already absent; callers treat
    /// that as harmless.
    fn deregister(&self, name: &str) -> Result<()>;

    /// All current entries, sorted by name. Liveness is not checked here.
    fn list(&self) -> Result<Vec<RegistryEntry>>;
}
