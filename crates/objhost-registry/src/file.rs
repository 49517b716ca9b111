use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::entry::{pid_alive, validate_name, RegistryEntry};
use crate::error::{RegistryError, Result};
use crate::Registry;

const ENTRY_SUFFIX: &str = ".json";
const DIR_MODE: u32 = 0o700;

/// Filesystem-backed registry: one JSON entry file per name in a shared
/// directory.
///
/// Registration claims a name by hard-linking a fully written temp file into
/// place, so a claim is atomic and readers never observe a partial entry.
/// `resolve` verifies the registered owner pid is still alive and removes
/// stale entries left by crashed owners, surfacing them as `NotFound`.
#[derive(Debug, Clone)]
pub struct FileRegistry {
    dir: PathBuf,
}

impl FileRegistry {
    /// Open (creating if needed) a registry rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(DIR_MODE))?;
        Ok(Self { dir })
    }

    /// Open the per-user default registry.
    ///
    /// `OBJHOST_REGISTRY_DIR` overrides the location; otherwise a per-uid
    /// directory under the system temp dir is used.
    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_dir())
    }

    /// The per-user default registry directory.
    pub fn default_dir() -> PathBuf {
        if let Some(dir) = std::env::var_os("OBJHOST_REGISTRY_DIR") {
            return PathBuf::from(dir);
        }
        // SAFETY: getuid has no preconditions and cannot fail.
        let uid = unsafe { libc::getuid() };
        std::env::temp_dir().join(format!("objhost-{uid}"))
    }

    /// The directory backing this registry.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Remove every entry whose owner process is no longer alive.
    ///
    /// Returns the names that were removed.
    pub fn sweep(&self) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for entry in self.list()? {
            if !pid_alive(entry.owner_pid) {
                warn!(name = %entry.name, pid = entry.owner_pid, "sweeping stale registry entry");
                let _ = std::fs::remove_file(self.entry_path(&entry.name));
                removed.push(entry.name);
            }
        }
        Ok(removed)
    }

    fn entry_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}{ENTRY_SUFFIX}"))
    }

    fn read_entry(&self, name: &str) -> Result<RegistryEntry> {
        let path = self.entry_path(name);
        let bytes = std::fs::read(&path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                RegistryError::NotFound(name.to_string())
            } else {
                RegistryError::Io(err)
            }
        })?;
        serde_json::from_slice(&bytes).map_err(|source| RegistryError::Corrupt {
            name: name.to_string(),
            source,
        })
    }

    fn try_claim(&self, tmp: &Path, name: &str) -> Result<bool> {
        match std::fs::hard_link(tmp, self.entry_path(name)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(err) => Err(RegistryError::Io(err)),
        }
    }
}

impl Registry for FileRegistry {
    fn register(&self, entry: RegistryEntry) -> Result<()> {
        validate_name(&entry.name)?;

        // Unique per attempt so concurrent registrars never share a temp file.
        static CLAIM_SEQ: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
        let seq = CLAIM_SEQ.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let tmp = self
            .dir
            .join(format!(".{}.{}.{seq}.tmp", entry.name, std::process::id()));
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(&serde_json::to_vec_pretty(&entry).map_err(std::io::Error::other)?)?;
        file.sync_all()?;
        drop(file);

        // Claim, once more after evicting a stale or corrupt holder.
        let mut result = Err(RegistryError::AlreadyRegistered(entry.name.clone()));
        for _ in 0..2 {
            if self.try_claim(&tmp, &entry.name)? {
                info!(name = %entry.name, endpoint = %entry.endpoint.display(), "registered owner");
                result = Ok(());
                break;
            }

            let evict = match self.read_entry(&entry.name) {
                Ok(existing) => !pid_alive(existing.owner_pid),
                Err(RegistryError::Corrupt { .. }) => true,
                // Holder deregistered between claim and read; claim again.
                Err(RegistryError::NotFound(_)) => false,
                Err(err) => {
                    result = Err(err);
                    break;
                }
            };
            if evict {
                warn!(name = %entry.name, "evicting stale registry entry");
                let _ = std::fs::remove_file(self.entry_path(&entry.name));
            }
        }

        let _ = std::fs::remove_file(&tmp);
        result
    }

    fn resolve(&self, name: &str) -> Result<RegistryEntry> {
        validate_name(name)?;
        let entry = self.read_entry(name)?;
        if !pid_alive(entry.owner_pid) {
            warn!(name, pid = entry.owner_pid, "registered owner is dead; removing entry");
            let _ = std::fs::remove_file(self.entry_path(name));
            return Err(RegistryError::NotFound(name.to_string()));
        }
        Ok(entry)
    }

    fn deregister(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        match std::fs::remove_file(self.entry_path(name)) {
            Ok(()) => {
                debug!(name, "deregistered owner");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(RegistryError::NotFound(name.to_string()))
            }
            Err(err) => Err(RegistryError::Io(err)),
        }
    }

    fn list(&self) -> Result<Vec<RegistryEntry>> {
        let mut entries = Vec::new();
        for dirent in std::fs::read_dir(&self.dir)? {
            let dirent = dirent?;
            let file_name = dirent.file_name();
            let file_name = file_name.to_string_lossy();
            let Some(name) = file_name.strip_suffix(ENTRY_SUFFIX) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            match self.read_entry(name) {
                Ok(entry) => entries.push(entry),
                Err(err) => debug!(name, %err, "skipping unreadable registry entry"),
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
