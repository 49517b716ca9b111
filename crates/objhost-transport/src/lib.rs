//! Local transport layer for objhost.
//!
//! An owner process listens on a Unix domain socket; every proxy holds one
//! connected [`LocalStream`] to it. This is the lowest layer of objhost —
//! everything else builds on the stream type provided here.

pub mod error;
pub mod stream;
pub mod uds;

pub use error::{Result, TransportError};
pub use stream::LocalStream;
pub use uds::{connect, UdsListener};
