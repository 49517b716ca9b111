use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use objhost_transport::LocalStream;
use objhost_wire::{
    decode_payload, encode_message, ControlMessage, FrameKind, FrameReader, FrameWriter, OpKind,
    Operation, Outcome, RemoteErrorKind, Request, Response, Segment, TargetPath, WireConfig,
    WireError, CONTROL_RELEASE_ACK,
};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Result, RuntimeError};
use crate::handshake::{handshake_client, HandshakeConfig};

/// Configuration for a proxy connection.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// How long each call waits for its response before failing with
    /// `Timeout`. The owner-side execution is not cancelled.
    pub call_timeout: Duration,
    /// Runtime frame budget.
    pub wire: WireConfig,
    /// Handshake negotiation parameters.
    pub handshake: HandshakeConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(5),
            wire: WireConfig::default(),
            handshake: HandshakeConfig::default(),
        }
    }
}

struct ProxyConn {
    reader: FrameReader<LocalStream>,
    writer: FrameWriter<LocalStream>,
}

/// Local stand-in for an object owned by another process.
///
/// Every operation is one synchronous round trip: encode, send, block for
/// the response with the matching id, decode, return or fail. Safe to share
/// across threads; calls on one proxy serialize on its single connection.
pub struct ObjectProxy {
    name: String,
    endpoint: PathBuf,
    conn: Mutex<ProxyConn>,
    next_id: AtomicU64,
    call_timeout: Duration,
}

impl ObjectProxy {
    /// Connect to an owner socket and perform the handshake.
    pub fn connect(
        endpoint: impl AsRef<Path>,
        name: impl Into<String>,
        config: &ProxyConfig,
    ) -> Result<Self> {
        let name = name.into();
        let endpoint = endpoint.as_ref().to_path_buf();

        let stream = objhost_transport::connect(&endpoint)?;
        let reader_stream = stream.try_clone()?;

        let hs_wire = WireConfig {
            max_payload_size: config.handshake.max_handshake_payload,
            read_timeout: Some(config.handshake.timeout),
            write_timeout: Some(config.handshake.timeout),
        };
        let mut reader = FrameReader::with_config_local(reader_stream, hs_wire.clone())?;
        let mut writer = FrameWriter::with_config_local(stream, hs_wire)?;

        let welcome = handshake_client(&mut reader, &mut writer, &name, &config.handshake)?;
        debug!(name = %name, owner_pid = welcome.owner_pid, "proxy connected");

        reader.set_max_payload_size(config.wire.max_payload_size);
        writer.set_max_payload_size(config.wire.max_payload_size);
        reader.get_ref().set_read_timeout(Some(config.call_timeout))?;
        writer.get_ref().set_write_timeout(Some(config.call_timeout))?;

        Ok(Self {
            name,
            endpoint,
            conn: Mutex::new(ProxyConn { reader, writer }),
            next_id: AtomicU64::new(1),
            call_timeout: config.call_timeout,
        })
    }

    /// The object name this proxy resolves to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The owner socket this proxy is bound to.
    pub fn endpoint(&self) -> &Path {
        &self.endpoint
    }

    /// Read an attribute of the root object.
    pub fn get_attr(&self, name: &str) -> Result<Value> {
        self.get_at(TargetPath::root().attr(name))
    }

    /// Write an attribute of the root object, creating it if absent.
    pub fn set_attr(&self, name: &str, value: Value) -> Result<()> {
        self.execute(Operation::with_args(
            OpKind::SetAttr,
            TargetPath::root().attr(name),
            vec![value],
        ))
        .map(|_| ())
    }

    /// Delete an attribute of the root object.
    pub fn del_attr(&self, name: &str) -> Result<()> {
        self.execute(Operation::new(OpKind::DelAttr, TargetPath::root().attr(name)))
            .map(|_| ())
    }

    /// Read an item of the root object by key or index.
    pub fn get_item(&self, key: impl Into<Value>) -> Result<Value> {
        self.get_at(TargetPath::root().item(key))
    }

    /// Write an item of the root object, creating it if absent.
    pub fn set_item(&self, key: impl Into<Value>, value: Value) -> Result<()> {
        self.execute(Operation::with_args(
            OpKind::SetItem,
            TargetPath::root().item(key),
            vec![value],
        ))
        .map(|_| ())
    }

    /// Delete an item of the root object.
    pub fn del_item(&self, key: impl Into<Value>) -> Result<()> {
        self.execute(Operation::new(OpKind::DelItem, TargetPath::root().item(key)))
            .map(|_| ())
    }

    /// Read the value at an arbitrary path as an eager snapshot.
    ///
    /// An empty path snapshots the whole object.
    pub fn get_at(&self, path: TargetPath) -> Result<Value> {
        let op = match path.segments().last() {
            Some(Segment::Attr(_)) => OpKind::GetAttr,
            _ => OpKind::GetItem,
        };
        let value = self.execute(Operation::new(op, path))?;
        Ok(value.unwrap_or(Value::Null))
    }

    /// Snapshot the whole shared object.
    pub fn snapshot(&self) -> Result<Value> {
        self.get_at(TargetPath::root())
    }

    /// Call a method on the root object.
    pub fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.call_at(TargetPath::root(), method, args, Map::new())
    }

    /// Call a method on the value at `path`.
    pub fn call_at(
        &self,
        path: TargetPath,
        method: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value> {
        let value = self.execute(Operation {
            op: OpKind::Call,
            target: path.attr(method),
            args,
            kwargs,
        })?;
        Ok(value.unwrap_or(Value::Null))
    }

    /// Round-trip a ping to check the owner is responsive.
    pub fn ping(&self) -> Result<()> {
        let mut conn = lock(&self.conn);
        send_control(&mut conn.writer, &ControlMessage::ping())?;
        let deadline = Instant::now() + self.call_timeout;
        loop {
            let frame = self.read_frame(&mut conn, deadline)?;
            if frame.kind == FrameKind::Control {
                return Ok(());
            }
            debug!(kind = ?frame.kind, "dropping frame while awaiting pong");
        }
    }

    /// Ask the owner to deregister and exit, waiting for its acknowledgement.
    pub fn release(&self) -> Result<()> {
        let mut conn = lock(&self.conn);
        send_control(&mut conn.writer, &ControlMessage::release(None))?;
        let deadline = Instant::now() + self.call_timeout;
        loop {
            let frame = self.read_frame(&mut conn, deadline)?;
            if frame.kind == FrameKind::Control {
                let message: ControlMessage = decode_payload(&frame.payload)?;
                if message.msg_type == CONTROL_RELEASE_ACK {
                    return Ok(());
                }
            }
            debug!(kind = ?frame.kind, "dropping frame while awaiting release ack");
        }
    }

    /// Send one operation and block for its result.
    pub fn execute(&self, operation: Operation) -> Result<Option<Value>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = Request { id, operation };

        let mut conn = lock(&self.conn);
        let payload = encode_message(&request)?;
        conn.writer
            .send(FrameKind::Request, &payload)
            .map_err(classify_send_error)?;

        let deadline = Instant::now() + self.call_timeout;
        loop {
            let frame = self.read_frame(&mut conn, deadline)?;
            match frame.kind {
                FrameKind::Response => {
                    let response: Response = decode_payload(&frame.payload)?;
                    if response.id != id {
                        // A response for a call that already timed out.
                        debug!(got = response.id, awaiting = id, "dropping stale response");
                        continue;
                    }
                    return match response.outcome {
                        Outcome::Ok { value } => Ok(value),
                        Outcome::Err {
                            kind: RemoteErrorKind::NotFound,
                            message,
                        } => Err(RuntimeError::NotFound(message)),
                        Outcome::Err { kind, message } => {
                            Err(RuntimeError::Remote { kind, message })
                        }
                    };
                }
                other => {
                    debug!(kind = ?other, "dropping non-response frame");
                }
            }
        }
    }

    fn read_frame(
        &self,
        conn: &mut ProxyConn,
        deadline: Instant,
    ) -> Result<objhost_wire::Frame> {
        loop {
            match conn.reader.read_frame() {
                Ok(frame) => return Ok(frame),
                Err(WireError::Io(err))
                    if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
                {
                    if Instant::now() >= deadline {
                        warn!(name = %self.name, "call timed out");
                        return Err(RuntimeError::Timeout(self.call_timeout));
                    }
                }
                Err(WireError::ConnectionClosed) => {
                    return Err(RuntimeError::Disconnected(format!(
                        "owner of '{}' closed the connection",
                        self.name
                    )));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

impl std::fmt::Debug for ObjectProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectProxy")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

fn send_control(
    writer: &mut FrameWriter<LocalStream>,
    message: &ControlMessage,
) -> Result<()> {
    let payload = encode_message(message)?;
    writer
        .send(FrameKind::Control, &payload)
        .map_err(classify_send_error)
}

fn classify_send_error(err: WireError) -> RuntimeError {
    match err {
        WireError::ConnectionClosed => {
            RuntimeError::Disconnected("owner closed the connection".to_string())
        }
        WireError::Io(io)
            if matches!(
                io.kind(),
                ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::NotConnected
            ) =>
        {
            RuntimeError::Disconnected(format!("owner connection lost: {io}"))
        }
        other => other.into(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
