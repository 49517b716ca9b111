use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Protocol name carried in every hello/welcome exchange.
pub const PROTOCOL_NAME: &str = "objhost";

/// Protocol version, `<major>.<minor>`. Peers must agree on major.
pub const PROTOCOL_VERSION: &str = "1.0";

/// CONTROL message type: ping request.
pub const CONTROL_PING: &str = "ping";
/// CONTROL message type: ping response.
pub const CONTROL_PONG: &str = "pong";
/// CONTROL message type: ask the owner to deregister and exit.
pub const CONTROL_RELEASE: &str = "release";
/// CONTROL message type: release acknowledgement, last frame the owner sends.
pub const CONTROL_RELEASE_ACK: &str = "release_ack";

/// Client greeting, the first frame on every connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Hello {
    /// Protocol name. Must be `objhost`.
    pub protocol: String,
    /// Client protocol version.
    pub version: String,
    /// Name of the object the client expects this owner to hold.
    pub object: String,
}

impl Hello {
    /// Hello for the given object name at the current protocol version.
    pub fn new(object: impl Into<String>) -> Self {
        Self {
            protocol: PROTOCOL_NAME.to_string(),
            version: PROTOCOL_VERSION.to_string(),
            object: object.into(),
        }
    }
}

/// Owner reply to a [`Hello`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Welcome {
    /// Protocol name. Must match the hello.
    pub protocol: String,
    /// Owner protocol version.
    pub version: String,
    /// Name of the object this owner actually holds.
    pub object: String,
    /// Pid of the owner process, for diagnostics.
    pub owner_pid: u32,
}

/// One step into the shared object: a named attribute or a keyed item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    /// A named field of an object value.
    Attr(String),
    /// A key into a map (string) or an index into an array (integer).
    Item(Value),
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Segment::Attr(name) => write!(f, ".{name}"),
            Segment::Item(key) => write!(f, "[{key}]"),
        }
    }
}

/// Path from the root of the shared object to the operation's target.
///
/// An empty path targets the root itself. For `call` operations the final
/// segment names the method and the prefix selects the receiver.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct TargetPath(pub Vec<Segment>);

impl TargetPath {
    /// The root of the shared object.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Extend the path with an attribute segment.
    pub fn attr(mut self, name: impl Into<String>) -> Self {
        self.0.push(Segment::Attr(name.into()));
        self
    }

    /// Extend the path with an item segment.
    pub fn item(mut self, key: impl Into<Value>) -> Self {
        self.0.push(Segment::Item(key.into()));
        self
    }

    /// The path's segments, root first.
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Split a call target into `(receiver prefix, method name)`.
    ///
    /// Returns `None` when the path is empty or its final segment is not an
    /// attribute.
    pub fn split_method(&self) -> Option<(&[Segment], &str)> {
        match self.0.split_last() {
            Some((Segment::Attr(name), prefix)) => Some((prefix, name)),
            _ => None,
        }
    }
}

impl std::fmt::Display for TargetPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<root>");
        }
        for segment in &self.0 {
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

/// The closed set of operations a proxy may forward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    GetAttr,
    SetAttr,
    DelAttr,
    GetItem,
    SetItem,
    DelItem,
    Call,
}

impl OpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OpKind::GetAttr => "get_attr",
            OpKind::SetAttr => "set_attr",
            OpKind::DelAttr => "del_attr",
            OpKind::GetItem => "get_item",
            OpKind::SetItem => "set_item",
            OpKind::DelItem => "del_item",
            OpKind::Call => "call",
        }
    }
}

/// One operation against the shared object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Operation {
    pub op: OpKind,
    pub target: TargetPath,
    /// Positional arguments: the new value for set operations, the method
    /// arguments for calls.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
    /// Named arguments for calls.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub kwargs: Map<String, Value>,
}

impl Operation {
    /// Operation with no arguments.
    pub fn new(op: OpKind, target: TargetPath) -> Self {
        Self {
            op,
            target,
            args: Vec::new(),
            kwargs: Map::new(),
        }
    }

    /// Operation with positional arguments.
    pub fn with_args(op: OpKind, target: TargetPath, args: Vec<Value>) -> Self {
        Self {
            op,
            target,
            args,
            kwargs: Map::new(),
        }
    }
}

/// A framed request: one operation plus its per-connection correlation id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub id: u64,
    #[serde(flatten)]
    pub operation: Operation,
}

/// What went wrong inside the owner, in wire-stable form.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// The target attribute, item, or method does not exist.
    NotFound,
    /// The target exists but has the wrong shape for the operation.
    WrongType,
    /// An argument was missing or malformed.
    BadArgument,
    /// The operation itself failed while executing.
    Failed,
}

impl std::fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RemoteErrorKind::NotFound => "not_found",
            RemoteErrorKind::WrongType => "wrong_type",
            RemoteErrorKind::BadArgument => "bad_argument",
            RemoteErrorKind::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of one request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The operation succeeded. Set and delete operations carry no value.
    Ok {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
    /// The operation failed inside the owner. The owner keeps serving.
    Err {
        kind: RemoteErrorKind,
        message: String,
    },
}

/// A framed response, correlated to its request by id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub id: u64,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl Response {
    pub fn ok(id: u64, value: Option<Value>) -> Self {
        Self {
            id,
            outcome: Outcome::Ok { value },
        }
    }

    pub fn err(id: u64, kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            id,
            outcome: Outcome::Err {
                kind,
                message: message.into(),
            },
        }
    }
}

/// CONTROL frame payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl ControlMessage {
    /// Create a ping message.
    pub fn ping() -> Self {
        Self {
            msg_type: CONTROL_PING.to_string(),
            payload: None,
        }
    }

    /// Create a pong message.
    pub fn pong() -> Self {
        Self {
            msg_type: CONTROL_PONG.to_string(),
            payload: None,
        }
    }

    /// Create a release request.
    pub fn release(reason: Option<&str>) -> Self {
        let payload = reason.map(|reason| serde_json::json!({ "reason": reason }));
        Self {
            msg_type: CONTROL_RELEASE.to_string(),
            payload,
        }
    }

    /// Create a release acknowledgement.
    pub fn release_ack() -> Self {
        Self {
            msg_type: CONTROL_RELEASE_ACK.to_string(),
            payload: None,
        }
    }
}

/// Encode a protocol message as a frame payload.
pub fn encode_message<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Decode a frame payload as a protocol message.
pub fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(payload)?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_wire_shape() {
        let request = Request {
            id: 7,
            operation: Operation::with_args(
                OpKind::SetItem,
                TargetPath::root().item("counter"),
                vec![json!(42)],
            ),
        };

        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(
            encoded,
            json!({
                "id": 7,
                "op": "set_item",
                "target": [{"item": "counter"}],
                "args": [42],
            })
        );

        let decoded: Request = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn request_defaults_omitted_fields() {
        let decoded: Request = serde_json::from_value(json!({
            "id": 1,
            "op": "get_attr",
            "target": [{"attr": "shared"}],
        }))
        .unwrap();

        assert!(decoded.operation.args.is_empty());
        assert!(decoded.operation.kwargs.is_empty());
    }

    #[test]
    fn response_ok_wire_shape() {
        let response = Response::ok(3, Some(json!([1, 2])));
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(encoded, json!({"id": 3, "ok": {"value": [1, 2]}}));

        let empty = Response::ok(4, None);
        let encoded = serde_json::to_value(&empty).unwrap();
        assert_eq!(encoded, json!({"id": 4, "ok": {}}));
    }

    #[test]
    fn response_err_wire_shape() {
        let response = Response::err(9, RemoteErrorKind::NotFound, "no such key 'x'");
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(
            encoded,
            json!({
                "id": 9,
                "err": {"kind": "not_found", "message": "no such key 'x'"},
            })
        );

        let decoded: Response = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn target_path_split_method() {
        let path = TargetPath::root().item("counter").attr("incr");
        let (receiver, method) = path.split_method().unwrap();
        assert_eq!(receiver, &[Segment::Item(json!("counter"))]);
        assert_eq!(method, "incr");

        assert!(TargetPath::root().split_method().is_none());
        assert!(TargetPath::root().item(0).split_method().is_none());
    }

    #[test]
    fn target_path_display() {
        let path = TargetPath::root().attr("inner").item(2).attr("len");
        assert_eq!(path.to_string(), ".inner[2].len");
        assert_eq!(TargetPath::root().to_string(), "<root>");
    }

    #[test]
    fn control_message_constructors() {
        assert_eq!(ControlMessage::ping().msg_type, CONTROL_PING);
        assert_eq!(ControlMessage::pong().msg_type, CONTROL_PONG);
        assert_eq!(ControlMessage::release_ack().msg_type, CONTROL_RELEASE_ACK);

        let release = ControlMessage::release(Some("shutdown requested"));
        assert_eq!(release.msg_type, CONTROL_RELEASE);
        assert_eq!(
            release.payload,
            Some(json!({"reason": "shutdown requested"}))
        );

        let encoded = serde_json::to_value(&release).unwrap();
        assert_eq!(
            encoded,
            json!({"type": "release", "payload": {"reason": "shutdown requested"}})
        );
    }

    #[test]
    fn hello_welcome_roundtrip() {
        let hello = Hello::new("shared_dict");
        assert_eq!(hello.protocol, PROTOCOL_NAME);
        assert_eq!(hello.version, PROTOCOL_VERSION);

        let bytes = encode_message(&hello).unwrap();
        let decoded: Hello = decode_payload(&bytes).unwrap();
        assert_eq!(decoded, hello);

        let welcome = Welcome {
            protocol: PROTOCOL_NAME.to_string(),
            version: PROTOCOL_VERSION.to_string(),
            object: "shared_dict".to_string(),
            owner_pid: 4242,
        };
        let bytes = encode_message(&welcome).unwrap();
        let decoded: Welcome = decode_payload(&bytes).unwrap();
        assert_eq!(decoded, welcome);
    }

    #[test]
    fn op_kind_names() {
        let kinds = [
            (OpKind::GetAttr, "get_attr"),
            (OpKind::SetAttr, "set_attr"),
            (OpKind::DelAttr, "del_attr"),
            (OpKind::GetItem, "get_item"),
            (OpKind::SetItem, "set_item"),
            (OpKind::DelItem, "del_item"),
            (OpKind::Call, "call"),
        ];
        for (kind, name) in kinds {
            assert_eq!(kind.as_str(), name);
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(name));
        }
    }
}
