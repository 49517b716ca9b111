use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use objhost_registry::{pid_alive, FileRegistry, Registry, RegistryEntry, RegistryError};
use objhost_transport::{LocalStream, UdsListener};
use objhost_wire::{
    decode_payload, encode_message, ControlMessage, FrameKind, FrameReader, FrameWriter,
    RemoteErrorKind, Request, Response, WireConfig, WireError, CONTROL_PING, CONTROL_RELEASE,
};
use tracing::{debug, info, warn};

use crate::error::{Result, RuntimeError};
use crate::handshake::{handshake_server, HandshakeConfig};
use crate::object::SharedObject;

/// What the owner does when the process that transcended the object exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OwnerPolicy {
    /// Keep serving until released or terminated.
    #[default]
    Detached,
    /// Watch the creator pid and shut down once it is gone.
    ExitWithCreator(u32),
}

/// Configuration for an owner process.
#[derive(Debug, Clone, Default)]
pub struct OwnerConfig {
    /// Directory for the owner socket. Defaults to the registry's default
    /// directory.
    pub socket_dir: Option<PathBuf>,
    /// Runtime frame budget and owner-side write timeout.
    pub wire: WireConfig,
    /// Handshake negotiation parameters.
    pub handshake: HandshakeConfig,
    /// How often the serving loop wakes to check shutdown conditions.
    /// `None` uses the 200ms default.
    pub tick: Option<Duration>,
    /// Creator-exit behavior.
    pub policy: OwnerPolicy,
}

const DEFAULT_TICK: Duration = Duration::from_millis(200);

type SharedWriter = Arc<Mutex<FrameWriter<LocalStream>>>;

enum Job {
    Request {
        conn_id: u64,
        request: Request,
        writer: SharedWriter,
    },
    Release {
        conn_id: u64,
        writer: SharedWriter,
    },
}

struct ConnContext {
    name: String,
    wire: WireConfig,
    handshake: HandshakeConfig,
    connections: Arc<Mutex<Vec<LocalStream>>>,
}

/// A bound, registered owner ready to serve its shared object.
///
/// Connection threads only decode frames; every operation funnels into the
/// single serving loop, which applies them strictly in receipt order and
/// writes each response before executing the next. That loop is the whole
/// concurrency story: no two operations ever interleave their effects.
pub struct ObjectOwner {
    name: String,
    listener: UdsListener,
    registry: Arc<dyn Registry>,
    object: Box<dyn SharedObject>,
    config: OwnerConfig,
    shutdown: Arc<AtomicBool>,
}

impl ObjectOwner {
    /// Register `name` and bind the owner socket.
    ///
    /// The registry claim happens first, so of two racing owners only one
    /// proceeds to bind. On bind failure the claim is rolled back.
    pub fn bind(
        name: impl Into<String>,
        object: Box<dyn SharedObject>,
        registry: Arc<dyn Registry>,
        config: OwnerConfig,
    ) -> Result<Self> {
        let name = name.into();
        objhost_registry::validate_name(&name)?;

        let socket_dir = config
            .socket_dir
            .clone()
            .unwrap_or_else(FileRegistry::default_dir);
        std::fs::create_dir_all(&socket_dir)
            .map_err(|err| RuntimeError::Transport(err.into()))?;
        let endpoint = socket_dir.join(format!("{name}.sock"));

        registry.register(RegistryEntry::new(
            &name,
            &endpoint,
            std::process::id(),
        ))?;

        let listener = match UdsListener::bind(&endpoint) {
            Ok(listener) => listener,
            Err(err) => {
                let _ = registry.deregister(&name);
                return Err(err.into());
            }
        };

        Ok(Self {
            name,
            listener,
            registry,
            object,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The registered object name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The socket path proxies connect to.
    pub fn endpoint(&self) -> &Path {
        self.listener.path()
    }

    /// Flag that stops the serving loop when set (e.g. from a signal
    /// handler). The loop notices within one tick.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Serve until released, externally shut down, or (under
    /// [`OwnerPolicy::ExitWithCreator`]) the creator exits.
    ///
    /// Deregisters and removes the socket before returning.
    pub fn serve(self) -> Result<()> {
        let ObjectOwner {
            name,
            listener,
            registry,
            mut object,
            config,
            shutdown,
        } = self;

        let endpoint = listener.path().to_path_buf();
        let tick = config.tick.unwrap_or(DEFAULT_TICK);
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let connections: Arc<Mutex<Vec<LocalStream>>> = Arc::new(Mutex::new(Vec::new()));

        let ctx = Arc::new(ConnContext {
            name: name.clone(),
            wire: config.wire.clone(),
            handshake: config.handshake.clone(),
            connections: connections.clone(),
        });

        let accept_handle = {
            let job_tx = job_tx.clone();
            let ctx = ctx.clone();
            let accept_shutdown = shutdown.clone();
            thread::spawn(move || accept_loop(listener, job_tx, ctx, accept_shutdown))
        };
        drop(job_tx);

        info!(name = %name, endpoint = %endpoint.display(), "serving shared object");

        let mut released = false;
        loop {
            if shutdown.load(Ordering::SeqCst) {
                info!(name = %name, "shutdown requested; stopping");
                break;
            }

            match job_rx.recv_timeout(tick) {
                Ok(Job::Request {
                    conn_id,
                    request,
                    writer,
                }) => {
                    let id = request.id;
                    let response = match object.apply(&request.operation) {
                        Ok(value) => Response::ok(id, value),
                        Err(err) => {
                            debug!(
                                conn_id,
                                id,
                                op = request.operation.op.as_str(),
                                target = %request.operation.target,
                                %err,
                                "operation failed"
                            );
                            Response::err(id, err.kind, err.message)
                        }
                    };
                    if let Err(err) = write_response(&writer, &response) {
                        debug!(conn_id, id, %err, "client gone before response; dropping");
                    }
                }
                Ok(Job::Release { conn_id, writer }) => {
                    info!(name = %name, conn_id, "release requested; shutting down");
                    deregister_quietly(registry.as_ref(), &name);
                    released = true;
                    if let Err(err) = write_control(&writer, &ControlMessage::release_ack()) {
                        debug!(conn_id, %err, "release ack not delivered");
                    }
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {
                    if let OwnerPolicy::ExitWithCreator(creator) = config.policy {
                        if !pid_alive(creator) {
                            info!(name = %name, creator, "creator exited; shutting down");
                            break;
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        shutdown.store(true, Ordering::SeqCst);
        if !released {
            deregister_quietly(registry.as_ref(), &name);
        }

        // Unblock the accept loop, then sever every live connection so
        // reader threads observe EOF and exit.
        let _ = objhost_transport::connect(&endpoint);
        for stream in lock(&connections).iter() {
            let _ = stream.shutdown();
        }
        let _ = accept_handle.join();

        info!(name = %name, "owner stopped");
        Ok(())
    }
}

fn accept_loop(
    listener: UdsListener,
    job_tx: Sender<Job>,
    ctx: Arc<ConnContext>,
    shutdown: Arc<AtomicBool>,
) {
    let mut next_conn_id: u64 = 0;
    loop {
        match listener.accept() {
            Ok(stream) => {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                next_conn_id += 1;
                let conn_id = next_conn_id;
                let job_tx = job_tx.clone();
                let ctx = ctx.clone();
                thread::spawn(move || {
                    if let Err(err) = handle_connection(conn_id, stream, job_tx, ctx) {
                        debug!(conn_id, %err, "connection ended with error");
                    }
                });
            }
            Err(err) => {
                if !shutdown.load(Ordering::SeqCst) {
                    warn!(%err, "accept failed; stopping listener");
                }
                break;
            }
        }
    }
    // The listener drops here, removing the socket file.
}

fn handle_connection(
    conn_id: u64,
    stream: LocalStream,
    job_tx: Sender<Job>,
    ctx: Arc<ConnContext>,
) -> Result<()> {
    let reader_stream = stream.try_clone()?;
    lock(&ctx.connections).push(stream.try_clone()?);

    // Handshake under a tight pre-auth payload budget, then restore the
    // runtime defaults.
    let hs_wire = WireConfig {
        max_payload_size: ctx.handshake.max_handshake_payload,
        read_timeout: Some(ctx.handshake.timeout),
        write_timeout: Some(ctx.handshake.timeout),
    };
    let mut reader = FrameReader::with_config_local(reader_stream, hs_wire.clone())?;
    let mut writer = FrameWriter::with_config_local(stream, hs_wire)?;
    handshake_server(&mut reader, &mut writer, &ctx.name, &ctx.handshake)?;
    reader.set_max_payload_size(ctx.wire.max_payload_size);
    writer.set_max_payload_size(ctx.wire.max_payload_size);
    reader.get_ref().set_read_timeout(None)?;
    writer.get_ref().set_write_timeout(ctx.wire.write_timeout)?;
    debug!(conn_id, "proxy connected");

    let writer: SharedWriter = Arc::new(Mutex::new(writer));
    loop {
        let frame = match reader.read_frame() {
            Ok(frame) => frame,
            Err(WireError::ConnectionClosed) => break,
            Err(err) => {
                debug!(conn_id, %err, "read failed; closing connection");
                break;
            }
        };

        match frame.kind {
            FrameKind::Request => match decode_payload::<Request>(&frame.payload) {
                Ok(request) => {
                    if job_tx
                        .send(Job::Request {
                            conn_id,
                            request,
                            writer: writer.clone(),
                        })
                        .is_err()
                    {
                        break;
                    }
                }
                Err(err) => {
                    warn!(conn_id, %err, "undecodable request");
                    let id = recover_request_id(&frame.payload);
                    let response = Response::err(
                        id,
                        RemoteErrorKind::BadArgument,
                        format!("undecodable request: {err}"),
                    );
                    if write_response(&writer, &response).is_err() {
                        break;
                    }
                }
            },
            FrameKind::Control => match decode_payload::<ControlMessage>(&frame.payload) {
                Ok(msg) if msg.msg_type == CONTROL_PING => {
                    if write_control(&writer, &ControlMessage::pong()).is_err() {
                        break;
                    }
                }
                Ok(msg) if msg.msg_type == CONTROL_RELEASE => {
                    if job_tx
                        .send(Job::Release {
                            conn_id,
                            writer: writer.clone(),
                        })
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(msg) => debug!(conn_id, msg_type = %msg.msg_type, "ignoring control message"),
                Err(err) => debug!(conn_id, %err, "undecodable control message"),
            },
            other => debug!(conn_id, kind = ?other, "ignoring unexpected frame"),
        }
    }

    debug!(conn_id, "proxy disconnected");
    Ok(())
}

/// Best-effort id recovery from a request that failed to decode, so the
/// client gets an error response instead of a timeout.
fn recover_request_id(payload: &[u8]) -> u64 {
    serde_json::from_slice::<serde_json::Value>(payload)
        .ok()
        .and_then(|value| value.get("id").and_then(|id| id.as_u64()))
        .unwrap_or(0)
}

fn write_response(writer: &SharedWriter, response: &Response) -> Result<()> {
    let payload = encode_message(response)?;
    lock(writer).send(FrameKind::Response, &payload)?;
    Ok(())
}

fn write_control(writer: &SharedWriter, message: &ControlMessage) -> Result<()> {
    let payload = encode_message(message)?;
    lock(writer).send(FrameKind::Control, &payload)?;
    Ok(())
}

fn deregister_quietly(registry: &dyn Registry, name: &str) {
    match registry.deregister(name) {
        Ok(()) | Err(RegistryError::NotFound(_)) => {}
        Err(err) => warn!(name, %err, "deregistration failed"),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use objhost_registry::MemoryRegistry;
    use objhost_wire::{Hello, OpKind, Operation, Outcome, TargetPath, Welcome};
    use serde_json::json;

    use super::*;
    use crate::object::JsonObject;

    fn test_config(tag: &str) -> OwnerConfig {
        let dir = std::env::temp_dir().join(format!(
            "objhost-owner-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        OwnerConfig {
            socket_dir: Some(dir),
            tick: Some(Duration::from_millis(25)),
            ..OwnerConfig::default()
        }
    }

    fn bind_owner(tag: &str, name: &str, value: serde_json::Value) -> (ObjectOwner, Arc<MemoryRegistry>) {
        let registry = Arc::new(MemoryRegistry::new());
        let owner = ObjectOwner::bind(
            name,
            Box::new(JsonObject::new(value)),
            registry.clone(),
            test_config(tag),
        )
        .expect("owner should bind");
        (owner, registry)
    }

    #[test]
    fn bind_registers_and_rolls_back_on_conflict() {
        let (owner, registry) = bind_owner("bind", "first", json!({}));
        let entry = registry.resolve("first").expect("entry should resolve");
        assert_eq!(entry.owner_pid, std::process::id());
        assert_eq!(entry.endpoint, owner.endpoint());

        let second = ObjectOwner::bind(
            "first",
            Box::new(JsonObject::new(json!({}))),
            registry.clone(),
            test_config("bind2"),
        );
        assert!(matches!(second, Err(RuntimeError::AlreadyRegistered(_))));
    }

    #[test]
    fn serves_raw_requests_in_order() {
        let (owner, registry) = bind_owner("raw", "rawobj", json!({"n": 0}));
        let endpoint = owner.endpoint().to_path_buf();
        let server = thread::spawn(move || owner.serve());

        let stream = objhost_transport::connect(&endpoint).expect("connect should succeed");
        let mut reader = FrameReader::new(stream.try_clone().expect("clone should succeed"));
        let mut writer = FrameWriter::new(stream);

        writer
            .send(
                FrameKind::Hello,
                &encode_message(&Hello::new("rawobj")).unwrap(),
            )
            .unwrap();
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.kind, FrameKind::Welcome);
        let welcome: Welcome = decode_payload(&frame.payload).unwrap();
        assert_eq!(welcome.object, "rawobj");

        for id in 1..=10u64 {
            let request = Request {
                id,
                operation: Operation::with_args(
                    OpKind::Call,
                    TargetPath::root().item("n").attr("incr"),
                    vec![json!(1)],
                ),
            };
            writer
                .send(FrameKind::Request, &encode_message(&request).unwrap())
                .unwrap();
        }

        for id in 1..=10u64 {
            let frame = reader.read_frame().unwrap();
            assert_eq!(frame.kind, FrameKind::Response);
            let response: Response = decode_payload(&frame.payload).unwrap();
            assert_eq!(response.id, id, "responses must arrive in request order");
            assert_eq!(
                response.outcome,
                Outcome::Ok {
                    value: Some(json!(id))
                }
            );
        }

        // Release shuts the owner down and deregisters it.
        writer
            .send(
                FrameKind::Control,
                &encode_message(&ControlMessage::release(None)).unwrap(),
            )
            .unwrap();
        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.kind, FrameKind::Control);
        let ack: ControlMessage = decode_payload(&frame.payload).unwrap();
        assert_eq!(ack.msg_type, objhost_wire::CONTROL_RELEASE_ACK);

        server.join().unwrap().unwrap();
        assert!(registry.resolve("rawobj").is_err());
    }

    #[test]
    fn failing_operation_does_not_stop_the_loop() {
        let (owner, _registry) = bind_owner("resilient", "sturdy", json!({"x": 1}));
        let endpoint = owner.endpoint().to_path_buf();
        let shutdown = owner.shutdown_handle();
        let server = thread::spawn(move || owner.serve());

        let stream = objhost_transport::connect(&endpoint).unwrap();
        let mut reader = FrameReader::new(stream.try_clone().unwrap());
        let mut writer = FrameWriter::new(stream);
        writer
            .send(FrameKind::Hello, &encode_message(&Hello::new("sturdy")).unwrap())
            .unwrap();
        reader.read_frame().unwrap();

        let bad = Request {
            id: 1,
            operation: Operation::new(OpKind::GetItem, TargetPath::root().item("missing")),
        };
        writer
            .send(FrameKind::Request, &encode_message(&bad).unwrap())
            .unwrap();
        let response: Response = decode_payload(&reader.read_frame().unwrap().payload).unwrap();
        assert!(matches!(
            response.outcome,
            Outcome::Err {
                kind: RemoteErrorKind::NotFound,
                ..
            }
        ));

        // A garbled request also gets an error response, on its own id.
        writer
            .send(FrameKind::Request, br#"{"id": 9, "op": "launch"}"#)
            .unwrap();
        let response: Response = decode_payload(&reader.read_frame().unwrap().payload).unwrap();
        assert_eq!(response.id, 9);
        assert!(matches!(
            response.outcome,
            Outcome::Err {
                kind: RemoteErrorKind::BadArgument,
                ..
            }
        ));

        // And the owner still answers good requests afterwards.
        let good = Request {
            id: 2,
            operation: Operation::new(OpKind::GetItem, TargetPath::root().item("x")),
        };
        writer
            .send(FrameKind::Request, &encode_message(&good).unwrap())
            .unwrap();
        let response: Response = decode_payload(&reader.read_frame().unwrap().payload).unwrap();
        assert_eq!(response.outcome, Outcome::Ok { value: Some(json!(1)) });

        shutdown.store(true, Ordering::SeqCst);
        server.join().unwrap().unwrap();
    }

    #[test]
    fn external_shutdown_deregisters() {
        let (owner, registry) = bind_owner("extshut", "flagged", json!({}));
        let shutdown = owner.shutdown_handle();
        let server = thread::spawn(move || owner.serve());

        shutdown.store(true, Ordering::SeqCst);
        server.join().unwrap().unwrap();
        assert!(registry.resolve("flagged").is_err());
    }

    #[test]
    fn ping_pong_without_touching_the_object() {
        let (owner, _registry) = bind_owner("ping", "pingable", json!({}));
        let endpoint = owner.endpoint().to_path_buf();
        let shutdown = owner.shutdown_handle();
        let server = thread::spawn(move || owner.serve());

        let stream = objhost_transport::connect(&endpoint).unwrap();
        let mut reader = FrameReader::new(stream.try_clone().unwrap());
        let mut writer = FrameWriter::new(stream);
        writer
            .send(
                FrameKind::Hello,
                &encode_message(&Hello::new("pingable")).unwrap(),
            )
            .unwrap();
        reader.read_frame().unwrap();

        writer
            .send(
                FrameKind::Control,
                &encode_message(&ControlMessage::ping()).unwrap(),
            )
            .unwrap();
        let pong: ControlMessage = decode_payload(&reader.read_frame().unwrap().payload).unwrap();
        assert_eq!(pong.msg_type, objhost_wire::CONTROL_PONG);

        shutdown.store(true, Ordering::SeqCst);
        server.join().unwrap().unwrap();
    }
}
