use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use objhost_registry::{FileRegistry, Registry};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Result, RuntimeError};
use crate::object::{JsonObject, SharedObject};
use crate::owner::{ObjectOwner, OwnerConfig, OwnerPolicy};
use crate::proxy::{ObjectProxy, ProxyConfig};

/// Where the owner runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OwnerMode {
    /// A dedicated owner process, forked from the caller. The object is
    /// handed over through fork-inherited memory.
    #[default]
    Remote,
    /// A background thread of the calling process. Useful for tests and for
    /// serving an object to other processes from a long-lived program.
    Local,
}

/// Whether the owner should outlive the process that transcended the object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CreatorPolicy {
    /// The owner keeps serving after its creator exits (matching release or
    /// termination only).
    #[default]
    Detached,
    /// The owner shuts down once its creator exits.
    ExitWithCreator,
}

/// Options for [`transcend_with`] and [`transcend_object`].
#[derive(Debug, Clone, Default)]
pub struct TranscendOptions {
    pub mode: OwnerMode,
    pub creator_policy: CreatorPolicy,
    /// Registry directory override. `None` uses the per-user default.
    pub registry_dir: Option<PathBuf>,
    /// How long to wait for the spawned owner to register.
    /// `None` uses the 5 second default.
    pub register_timeout: Option<Duration>,
    pub owner: OwnerConfig,
    pub proxy: ProxyConfig,
}

const DEFAULT_REGISTER_TIMEOUT: Duration = Duration::from_secs(5);
const REGISTRATION_POLL: Duration = Duration::from_millis(10);
const CONNECT_GRACE: Duration = Duration::from_millis(250);

/// Move a JSON value into its own owner process and return a proxy to it.
pub fn transcend(value: Value, name: &str) -> Result<ObjectProxy> {
    transcend_with(value, name, TranscendOptions::default())
}

/// [`transcend`] with explicit options, using the filesystem registry.
pub fn transcend_with(value: Value, name: &str, options: TranscendOptions) -> Result<ObjectProxy> {
    let registry_dir = options
        .registry_dir
        .clone()
        .unwrap_or_else(FileRegistry::default_dir);
    let registry = Arc::new(FileRegistry::open(&registry_dir)?);

    let mut options = options;
    if options.owner.socket_dir.is_none() {
        // Sockets live next to the registry entries by default.
        options.owner.socket_dir = Some(registry_dir);
    }

    transcend_object(Box::new(JsonObject::new(value)), name, registry, options)
}

/// Transcend an arbitrary [`SharedObject`] using an injected registry.
///
/// With [`OwnerMode::Remote`] the registry must be visible across processes
/// (the filesystem registry is; an in-memory one is not).
pub fn transcend_object(
    object: Box<dyn SharedObject>,
    name: &str,
    registry: Arc<dyn Registry>,
    options: TranscendOptions,
) -> Result<ObjectProxy> {
    objhost_registry::validate_name(name)?;

    // Fail fast on a live duplicate; the spawned owner's claim stays the
    // authoritative check for races.
    if registry.resolve(name).is_ok() {
        return Err(RuntimeError::AlreadyRegistered(name.to_string()));
    }

    let mut owner_config = options.owner.clone();
    if options.creator_policy == CreatorPolicy::ExitWithCreator {
        owner_config.policy = OwnerPolicy::ExitWithCreator(std::process::id());
    }

    match options.mode {
        OwnerMode::Local => {
            let owner = ObjectOwner::bind(name, object, registry.clone(), owner_config)?;
            let thread_name = format!("objhost-owner-{name}");
            thread::Builder::new()
                .name(thread_name)
                .spawn(move || {
                    if let Err(err) = owner.serve() {
                        warn!(%err, "owner loop failed");
                    }
                })
                .map_err(|err| RuntimeError::Spawn(err.to_string()))?;
        }
        OwnerMode::Remote => {
            spawn_owner_process(name, object, registry.clone(), owner_config)?;
        }
    }

    let register_timeout = options
        .register_timeout
        .unwrap_or(DEFAULT_REGISTER_TIMEOUT);
    let deadline = Instant::now() + register_timeout;
    let entry = loop {
        match registry.resolve(name) {
            Ok(entry) => break entry,
            Err(_) if Instant::now() < deadline => thread::sleep(REGISTRATION_POLL),
            Err(_) => return Err(RuntimeError::RegistrationTimeout(register_timeout)),
        }
    };
    info!(name, owner_pid = entry.owner_pid, "owner registered");

    connect_with_retry(&entry.endpoint, name, &options.proxy, deadline)
}

/// Resolve `name` and return a proxy bound to its owner.
pub fn get_proxy(name: &str) -> Result<ObjectProxy> {
    let registry = FileRegistry::open_default()?;
    get_proxy_with(name, &registry, &ProxyConfig::default())
}

/// [`get_proxy`] against an injected registry and proxy configuration.
pub fn get_proxy_with(
    name: &str,
    registry: &dyn Registry,
    config: &ProxyConfig,
) -> Result<ObjectProxy> {
    let entry = registry.resolve(name)?;
    // A freshly registered owner may not be accepting yet; give it a beat.
    connect_with_retry(&entry.endpoint, name, config, Instant::now() + CONNECT_GRACE).map_err(
        |err| match err {
            RuntimeError::Transport(objhost_transport::TransportError::Connect { .. }) => {
                RuntimeError::Disconnected(format!(
                    "owner of '{name}' is not accepting connections"
                ))
            }
            other => other,
        },
    )
}

/// Ask the owner of `name` to shut down gracefully, waiting for its
/// acknowledgement. The name is deregistered before the call returns.
pub fn release(name: &str) -> Result<()> {
    let registry = FileRegistry::open_default()?;
    release_with(name, &registry, &ProxyConfig::default())
}

/// [`release`] against an injected registry and proxy configuration.
pub fn release_with(name: &str, registry: &dyn Registry, config: &ProxyConfig) -> Result<()> {
    let proxy = get_proxy_with(name, registry, config)?;
    proxy.release()
}

/// Kill the owner of `name` with SIGTERM and drop its registration.
///
/// The blunt fallback for owners that no longer answer [`release`].
pub fn terminate(name: &str) -> Result<()> {
    let registry = FileRegistry::open_default()?;
    terminate_with(name, &registry)
}

/// [`terminate`] against an injected registry.
pub fn terminate_with(name: &str, registry: &dyn Registry) -> Result<()> {
    let entry = registry.resolve(name)?;
    info!(name, pid = entry.owner_pid, "terminating owner");
    // SAFETY: plain signal send; the worst a stale pid gets is a spurious
    // SIGTERM to a process we just confirmed exists.
    let rc = unsafe { libc::kill(entry.owner_pid as libc::pid_t, libc::SIGTERM) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        debug!(name, pid = entry.owner_pid, %err, "kill failed");
    }
    match registry.deregister(name) {
        Ok(()) | Err(objhost_registry::RegistryError::NotFound(_)) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Terminate every registered owner. Returns the names that were torn down.
pub fn terminate_all(registry: &dyn Registry) -> Result<Vec<String>> {
    let mut terminated = Vec::new();
    for entry in registry.list()? {
        match terminate_with(&entry.name, registry) {
            Ok(()) => terminated.push(entry.name),
            Err(err) => debug!(name = %entry.name, %err, "skipping owner during terminate_all"),
        }
    }
    Ok(terminated)
}

fn connect_with_retry(
    endpoint: &std::path::Path,
    name: &str,
    config: &ProxyConfig,
    deadline: Instant,
) -> Result<ObjectProxy> {
    loop {
        match ObjectProxy::connect(endpoint, name, config) {
            Ok(proxy) => return Ok(proxy),
            Err(RuntimeError::Transport(objhost_transport::TransportError::Connect { .. }))
                if Instant::now() < deadline =>
            {
                thread::sleep(REGISTRATION_POLL);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Fork the owner into its own process.
///
/// Double fork: the intermediate child exits immediately and is reaped here,
/// so the owner is reparented to init and the caller never accumulates
/// zombies. The object value crosses into the owner through fork-inherited
/// memory; the parent's copy is simply dropped.
fn spawn_owner_process(
    name: &str,
    object: Box<dyn SharedObject>,
    registry: Arc<dyn Registry>,
    config: OwnerConfig,
) -> Result<()> {
    // SAFETY: fork is called from library code that holds no locks; the
    // child immediately either forks again and _exits or runs the owner
    // loop and _exits, never returning into the caller.
    let pid = unsafe { libc::fork() };
    match pid {
        -1 => Err(RuntimeError::Spawn(
            std::io::Error::last_os_error().to_string(),
        )),
        0 => {
            // SAFETY: same constraints as above.
            let grandchild = unsafe { libc::fork() };
            match grandchild {
                -1 => {
                    // SAFETY: terminating the intermediate child without
                    // running shared atexit handlers.
                    unsafe { libc::_exit(1) }
                }
                0 => {
                    let code = match ObjectOwner::bind(name, object, registry, config)
                        .and_then(|owner| owner.serve())
                    {
                        Ok(()) => 0,
                        Err(err) => {
                            warn!(name, %err, "owner process failed");
                            1
                        }
                    };
                    // SAFETY: as above.
                    unsafe { libc::_exit(code) }
                }
                _ => {
                    // SAFETY: as above.
                    unsafe { libc::_exit(0) }
                }
            }
        }
        child => {
            let mut status = 0;
            // SAFETY: waiting on our own direct child, which exits at once.
            unsafe { libc::waitpid(child, &mut status, 0) };
            Ok(())
        }
    }
}
