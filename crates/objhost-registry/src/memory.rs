use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tracing::warn;

use crate::entry::{pid_alive, validate_name, RegistryEntry};
use crate::error::{RegistryError, Result};
use crate::Registry;

/// In-process registry for tests and single-process setups.
///
/// Mirrors [`FileRegistry`](crate::FileRegistry) semantics — atomic claims,
/// liveness-checked resolution — without touching the filesystem.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    entries: Mutex<HashMap<String, RegistryEntry>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Registry for MemoryRegistry {
    fn register(&self, entry: RegistryEntry) -> Result<()> {
        validate_name(&entry.name)?;
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = entries.get(&entry.name) {
            if pid_alive(existing.owner_pid) {
                return Err(RegistryError::AlreadyRegistered(entry.name));
            }
            warn!(name = %entry.name, "evicting stale registry entry");
        }
        entries.insert(entry.name.clone(), entry);
        Ok(())
    }

    fn resolve(&self, name: &str) -> Result<RegistryEntry> {
        validate_name(name)?;
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        if !pid_alive(entry.owner_pid) {
            warn!(name, pid = entry.owner_pid, "registered owner is dead; removing entry");
            entries.remove(name);
            return Err(RegistryError::NotFound(name.to_string()));
        }
        Ok(entry)
    }

    fn deregister(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    fn list(&self) -> Result<Vec<RegistryEntry>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<RegistryEntry> = entries.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_entry(name: &str) -> RegistryEntry {
        RegistryEntry::new(name, format!("/tmp/{name}.sock"), std::process::id())
    }

    #[test]
    fn register_resolve_deregister() {
        let registry = MemoryRegistry::new();
        registry.register(live_entry("mem")).unwrap();
        assert_eq!(registry.resolve("mem").unwrap().name, "mem");

        registry.deregister("mem").unwrap();
        assert!(matches!(
            registry.resolve("mem"),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn duplicate_rejected() {
        let registry = MemoryRegistry::new();
        registry.register(live_entry("dup")).unwrap();
        assert!(matches!(
            registry.register(live_entry("dup")),
            Err(RegistryError::AlreadyRegistered(_))
        ));
    }

    #[test]
    fn stale_owner_resolves_as_notfound() {
        let mut child = std::process::Command::new("true")
            .spawn()
            .expect("spawning /bin/true should work");
        let dead_pid = child.id();
        child.wait().expect("child should be waitable");

        let registry = MemoryRegistry::new();
        let mut entry = live_entry("ghost");
        entry.owner_pid = dead_pid;
        registry.register(entry).unwrap();

        assert!(matches!(
            registry.resolve("ghost"),
            Err(RegistryError::NotFound(_))
        ));
        registry.register(live_entry("ghost")).unwrap();
    }
}
