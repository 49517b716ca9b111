//! Wire protocol for objhost: framing plus the messages that ride it.
//!
//! Every message between a proxy and an owner is one frame:
//! - A 2-byte magic number ("OH") for stream synchronization
//! - A 4-byte little-endian payload length
//! - A 1-byte frame kind (hello, welcome, request, response, control)
//!
//! Payloads are JSON-encoded protocol messages. The codec layer itself only
//! sees bytes; [`message`] defines the shapes and their encoding helpers.

pub mod codec;
pub mod error;
pub mod message;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, Frame, FrameKind, WireConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use error::{Result, WireError};
pub use message::{
    decode_payload, encode_message, ControlMessage, Hello, OpKind, Operation, Outcome,
    RemoteErrorKind, Request, Response, Segment, TargetPath, Welcome, CONTROL_PING, CONTROL_PONG,
    CONTROL_RELEASE, CONTROL_RELEASE_ACK, PROTOCOL_NAME, PROTOCOL_VERSION,
};
pub use reader::FrameReader;
pub use writer::FrameWriter;
