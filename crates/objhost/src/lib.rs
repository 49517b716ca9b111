//! Share one mutable object between processes through a dedicated owner.
//!
//! objhost moves a value into its own owner process ("transcending" it) and
//! hands out synchronous proxies. Every proxy operation is forwarded over a
//! Unix domain socket and executed by the owner one at a time, which turns
//! concurrent cross-process mutation into serialized access at one point.
//!
//! ```no_run
//! use serde_json::json;
//!
//! let proxy = objhost::transcend(json!({"shared": 2}), "demo")?;
//! assert_eq!(proxy.get_item("shared")?, json!(2));
//!
//! // Any other process on the machine can now do the same:
//! let other = objhost::get_proxy("demo")?;
//! other.set_item("another_attr", json!(3))?;
//!
//! objhost::release("demo")?;
//! # Ok::<(), objhost::runtime::RuntimeError>(())
//! ```
//!
//! # Crate Structure
//!
//! - [`transport`] — Unix domain socket transport
//! - [`wire`] — frame codec and protocol messages
//! - [`registry`] — machine-local name→endpoint directory
//! - [`runtime`] — object owner, proxy, and lifecycle management

/// Re-export transport types.
pub mod transport {
    pub use objhost_transport::*;
}

/// Re-export wire types.
pub mod wire {
    pub use objhost_wire::*;
}

/// Re-export registry types.
pub mod registry {
    pub use objhost_registry::*;
}

/// Re-export runtime types.
pub mod runtime {
    pub use objhost_runtime::*;
}

pub use objhost_runtime::{
    get_proxy, release, terminate, transcend, transcend_with, JsonObject, ObjectProxy,
    SharedObject, TranscendOptions,
};
