use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use objhost_wire::{
    decode_payload, encode_message, Frame, FrameKind, FrameReader, FrameWriter, Hello, Welcome,
    WireError, PROTOCOL_NAME, PROTOCOL_VERSION,
};

use crate::error::{Result, RuntimeError};

/// Configuration for the hello/welcome exchange.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Timeout for each blocking handshake operation.
    pub timeout: Duration,
    /// Maximum handshake frame payload size in bytes. Much tighter than the
    /// runtime payload budget since handshakes are tiny.
    pub max_handshake_payload: usize,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_handshake_payload: 16 * 1024,
        }
    }
}

/// Client side: send a hello, await the owner's welcome.
///
/// Verifies protocol name, version compatibility, and that the owner holds
/// the object the caller asked for.
pub fn handshake_client<R: Read, W: Write>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    object: &str,
    config: &HandshakeConfig,
) -> Result<Welcome> {
    let hello = Hello::new(object);
    writer.send(FrameKind::Hello, &encode_message(&hello)?)?;

    let frame = recv_handshake_frame(reader, FrameKind::Welcome, config)?;
    let welcome: Welcome = decode_payload(&frame.payload)?;

    if welcome.protocol != PROTOCOL_NAME {
        return Err(RuntimeError::HandshakeFailed(format!(
            "unknown protocol '{}' (expected '{PROTOCOL_NAME}')",
            welcome.protocol
        )));
    }
    if !is_version_compatible(PROTOCOL_VERSION, &welcome.version)? {
        return Err(RuntimeError::HandshakeFailed(format!(
            "incompatible version '{}' (local '{PROTOCOL_VERSION}')",
            welcome.version
        )));
    }
    if welcome.object != object {
        return Err(RuntimeError::HandshakeFailed(format!(
            "owner holds '{}', not '{object}'",
            welcome.object
        )));
    }

    Ok(welcome)
}

/// Owner side: await a hello, answer with a welcome.
///
/// A hello for the wrong protocol or object name fails the handshake; the
/// connection is dropped without a reply and the client observes a
/// disconnect.
pub fn handshake_server<R: Read, W: Write>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    object: &str,
    config: &HandshakeConfig,
) -> Result<Hello> {
    let frame = recv_handshake_frame(reader, FrameKind::Hello, config)?;
    let hello: Hello = decode_payload(&frame.payload)?;

    if hello.protocol != PROTOCOL_NAME {
        return Err(RuntimeError::HandshakeFailed(format!(
            "unknown protocol '{}' (expected '{PROTOCOL_NAME}')",
            hello.protocol
        )));
    }
    if !is_version_compatible(&hello.version, PROTOCOL_VERSION)? {
        return Err(RuntimeError::HandshakeFailed(format!(
            "incompatible version '{}' (owner '{PROTOCOL_VERSION}')",
            hello.version
        )));
    }
    if hello.object != object {
        return Err(RuntimeError::HandshakeFailed(format!(
            "client asked for '{}', this owner holds '{object}'",
            hello.object
        )));
    }

    let welcome = Welcome {
        protocol: PROTOCOL_NAME.to_string(),
        version: PROTOCOL_VERSION.to_string(),
        object: object.to_string(),
        owner_pid: std::process::id(),
    };
    writer.send(FrameKind::Welcome, &encode_message(&welcome)?)?;

    Ok(hello)
}

fn recv_handshake_frame<R: Read>(
    reader: &mut FrameReader<R>,
    expected: FrameKind,
    config: &HandshakeConfig,
) -> Result<Frame> {
    let deadline = Instant::now() + config.timeout;
    loop {
        if Instant::now() >= deadline {
            return Err(RuntimeError::Timeout(config.timeout));
        }

        match reader.read_frame() {
            Ok(frame) => {
                if frame.kind != expected {
                    return Err(RuntimeError::HandshakeFailed(format!(
                        "expected {expected:?} frame, got {:?}",
                        frame.kind
                    )));
                }
                if frame.payload.len() > config.max_handshake_payload {
                    return Err(RuntimeError::HandshakeFailed(format!(
                        "handshake payload too large: {} (max {})",
                        frame.payload.len(),
                        config.max_handshake_payload
                    )));
                }
                return Ok(frame);
            }
            Err(WireError::Io(err))
                if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(WireError::ConnectionClosed) => {
                return Err(RuntimeError::Disconnected(
                    "connection closed during handshake".to_string(),
                ));
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn is_version_compatible(client_version: &str, server_version: &str) -> Result<bool> {
    let (client_major, client_minor) = parse_version(client_version)?;
    let (server_major, server_minor) = parse_version(server_version)?;

    Ok(client_major == server_major && client_minor >= server_minor)
}

fn parse_version(version: &str) -> Result<(u16, u16)> {
    let invalid = || {
        RuntimeError::HandshakeFailed(format!(
            "invalid version '{version}': expected '<major>.<minor>'"
        ))
    };

    let (major, minor) = version.split_once('.').ok_or_else(invalid)?;
    if minor.contains('.') {
        return Err(invalid());
    }
    let major = major.parse::<u16>().map_err(|_| invalid())?;
    let minor = minor.parse::<u16>().map_err(|_| invalid())?;
    Ok((major, minor))
}
