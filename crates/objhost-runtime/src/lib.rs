//! Object ownership and proxy forwarding for objhost.
//!
//! One process holds a shared value and serializes every operation against
//! it; any process on the machine can resolve the owner by name and operate
//! on the value through a synchronous proxy.
//!
//! - [`transcend`] moves a value into a dedicated owner process and returns
//!   a proxy to it
//! - [`get_proxy`] binds a new proxy to an already transcended object
//! - [`release`] asks an owner to deregister and exit
//!
//! The [`SharedObject`] trait is the seam for hosting custom value types;
//! [`JsonObject`] is the provided JSON document implementation.

pub mod error;
pub mod handshake;
pub mod lifecycle;
pub mod object;
pub mod owner;
pub mod proxy;

pub use error::{Result, RuntimeError};
pub use handshake::{handshake_client, handshake_server, HandshakeConfig};
pub use lifecycle::{
    get_proxy, get_proxy_with, release, release_with, terminate, terminate_all, terminate_with,
    transcend, transcend_object, transcend_with, CreatorPolicy, OwnerMode, TranscendOptions,
};
pub use object::{JsonObject, OpError, OpResult, SharedObject};
pub use owner::{ObjectOwner, OwnerConfig, OwnerPolicy};
pub use proxy::{ObjectProxy, ProxyConfig};
