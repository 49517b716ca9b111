use objhost_wire::{OpKind, Operation, RemoteErrorKind, Segment};
use serde_json::{Map, Value};

/// Failure of a single operation inside the owner.
///
/// Converted to an error response; the owner keeps serving afterwards.
#[derive(Debug, Clone)]
pub struct OpError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl OpError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::NotFound,
            message: message.into(),
        }
    }

    pub fn wrong_type(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::WrongType,
            message: message.into(),
        }
    }

    pub fn bad_argument(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::BadArgument,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::Failed,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for OpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for OpError {}

pub type OpResult = std::result::Result<Option<Value>, OpError>;

/// The value an owner process holds and serializes access to.
///
/// The owner invokes exactly one `apply` at a time, each running to
/// completion before the next, which is what makes the shared value safe
/// against cross-process races.
pub trait SharedObject: Send {
    /// Execute one operation and return its result value, if any.
    fn apply(&mut self, operation: &Operation) -> OpResult;
}

/// A JSON document as a shared object.
///
/// Attributes are fields of JSON objects; items are object keys or array
/// indices. Call targets name one of the built-in methods (`len`, `keys`,
/// `values`, `contains`, `get`, `push`, `pop`, `remove`, `clear`, `incr`,
/// `update`, `snapshot`) on the value the path prefix selects.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonObject {
    root: Value,
}

impl JsonObject {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    /// The current document.
    pub fn value(&self) -> &Value {
        &self.root
    }

    pub fn into_inner(self) -> Value {
        self.root
    }

    fn get(&self, operation: &Operation) -> OpResult {
        check_no_kwargs(operation)?;
        check_final_segment(operation)?;
        let value = locate(&self.root, operation.target.segments())?;
        Ok(Some(value.clone()))
    }

    fn set(&mut self, operation: &Operation) -> OpResult {
        check_no_kwargs(operation)?;
        check_final_segment(operation)?;
        let [new_value] = operation.args.as_slice() else {
            return Err(OpError::bad_argument(format!(
                "{} takes exactly one argument",
                operation.op.as_str()
            )));
        };
        let Some((last, prefix)) = operation.target.segments().split_last() else {
            return Err(OpError::bad_argument(
                "set requires a target below the root",
            ));
        };

        let parent = locate_mut(&mut self.root, prefix)?;
        match last {
            Segment::Attr(name) => {
                let map = as_object_mut(parent, "attribute assignment")?;
                map.insert(name.clone(), new_value.clone());
            }
            Segment::Item(key) => set_item(parent, key, new_value.clone())?,
        }
        Ok(None)
    }

    fn del(&mut self, operation: &Operation) -> OpResult {
        check_no_kwargs(operation)?;
        check_final_segment(operation)?;
        if !operation.args.is_empty() {
            return Err(OpError::bad_argument(format!(
                "{} takes no arguments",
                operation.op.as_str()
            )));
        }
        let Some((last, prefix)) = operation.target.segments().split_last() else {
            return Err(OpError::bad_argument(
                "delete requires a target below the root",
            ));
        };

        let parent = locate_mut(&mut self.root, prefix)?;
        match last {
            Segment::Attr(name) => {
                let map = as_object_mut(parent, "attribute deletion")?;
                map.remove(name)
                    .ok_or_else(|| OpError::not_found(format!("no attribute '{name}'")))?;
            }
            Segment::Item(key) => del_item(parent, key)?,
        }
        Ok(None)
    }

    fn call(&mut self, operation: &Operation) -> OpResult {
        let Some((prefix, method)) = operation.target.split_method() else {
            return Err(OpError::bad_argument(
                "call target must end in a method name",
            ));
        };
        let receiver = locate_mut(&mut self.root, prefix)?;
        dispatch_method(receiver, method, &operation.args, &operation.kwargs)
    }
}

impl From<Value> for JsonObject {
    fn from(root: Value) -> Self {
        Self::new(root)
    }
}

impl SharedObject for JsonObject {
    fn apply(&mut self, operation: &Operation) -> OpResult {
        match operation.op {
            OpKind::GetAttr | OpKind::GetItem => self.get(operation),
            OpKind::SetAttr | OpKind::SetItem => self.set(operation),
            OpKind::DelAttr | OpKind::DelItem => self.del(operation),
            OpKind::Call => self.call(operation),
        }
    }
}

/// Walk a path down a value, immutably.
fn locate<'a>(mut value: &'a Value, segments: &[Segment]) -> Result<&'a Value, OpError> {
    for segment in segments {
        value = step(value, segment)?;
    }
    Ok(value)
}

/// Walk a path down a value, mutably.
fn locate_mut<'a>(mut value: &'a mut Value, segments: &[Segment]) -> Result<&'a mut Value, OpError> {
    for segment in segments {
        value = step_mut(value, segment)?;
    }
    Ok(value)
}

fn step<'a>(value: &'a Value, segment: &Segment) -> Result<&'a Value, OpError> {
    match segment {
        Segment::Attr(name) => match value {
            Value::Object(map) => map
                .get(name)
                .ok_or_else(|| OpError::not_found(format!("no attribute '{name}'"))),
            other => Err(OpError::wrong_type(format!(
                "cannot read attribute '{name}' of {}",
                type_name(other)
            ))),
        },
        Segment::Item(key) => match value {
            Value::Object(map) => {
                let key = item_key(key)?;
                map.get(key)
                    .ok_or_else(|| OpError::not_found(format!("no item '{key}'")))
            }
            Value::Array(items) => {
                let index = item_index(key, items.len())?;
                Ok(&items[index])
            }
            other => Err(OpError::wrong_type(format!(
                "cannot index into {}",
                type_name(other)
            ))),
        },
    }
}

fn step_mut<'a>(value: &'a mut Value, segment: &Segment) -> Result<&'a mut Value, OpError> {
    match segment {
        Segment::Attr(name) => match value {
            Value::Object(map) => map
                .get_mut(name)
                .ok_or_else(|| OpError::not_found(format!("no attribute '{name}'"))),
            other => Err(OpError::wrong_type(format!(
                "cannot read attribute '{name}' of {}",
                type_name(other)
            ))),
        },
        Segment::Item(key) => match value {
            Value::Object(map) => {
                let key = item_key(key)?.to_string();
                map.get_mut(&key)
                    .ok_or_else(|| OpError::not_found(format!("no item '{key}'")))
            }
            Value::Array(items) => {
                let index = item_index(key, items.len())?;
                Ok(&mut items[index])
            }
            other => Err(OpError::wrong_type(format!(
                "cannot index into {}",
                type_name(other)
            ))),
        },
    }
}

fn set_item(parent: &mut Value, key: &Value, new_value: Value) -> Result<(), OpError> {
    match parent {
        Value::Object(map) => {
            let key = item_key(key)?.to_string();
            map.insert(key, new_value);
            Ok(())
        }
        Value::Array(items) => {
            let index = item_index(key, items.len())?;
            items[index] = new_value;
            Ok(())
        }
        other => Err(OpError::wrong_type(format!(
            "cannot assign item on {}",
            type_name(other)
        ))),
    }
}

fn del_item(parent: &mut Value, key: &Value) -> Result<(), OpError> {
    match parent {
        Value::Object(map) => {
            let key = item_key(key)?.to_string();
            map.remove(&key)
                .map(|_| ())
                .ok_or_else(|| OpError::not_found(format!("no item '{key}'")))
        }
        Value::Array(items) => {
            let index = item_index(key, items.len())?;
            items.remove(index);
            Ok(())
        }
        other => Err(OpError::wrong_type(format!(
            "cannot delete item on {}",
            type_name(other)
        ))),
    }
}

fn dispatch_method(
    receiver: &mut Value,
    method: &str,
    args: &[Value],
    kwargs: &Map<String, Value>,
) -> OpResult {
    if method != "update" && !kwargs.is_empty() {
        return Err(OpError::bad_argument(format!(
            "method '{method}' takes no named arguments"
        )));
    }

    match method {
        "len" => {
            expect_args(method, args, 0)?;
            let len = match receiver {
                Value::Object(map) => map.len(),
                Value::Array(items) => items.len(),
                Value::String(s) => s.chars().count(),
                other => {
                    return Err(OpError::wrong_type(format!(
                        "{} has no length",
                        type_name(other)
                    )))
                }
            };
            Ok(Some(Value::from(len)))
        }
        "keys" => {
            expect_args(method, args, 0)?;
            let map = as_object(receiver, "keys")?;
            Ok(Some(Value::Array(
                map.keys().map(|k| Value::String(k.clone())).collect(),
            )))
        }
        "values" => {
            expect_args(method, args, 0)?;
            let map = as_object(receiver, "values")?;
            Ok(Some(Value::Array(map.values().cloned().collect())))
        }
        "contains" => {
            expect_args(method, args, 1)?;
            let needle = &args[0];
            let found = match receiver {
                Value::Object(map) => map.contains_key(item_key(needle)?),
                Value::Array(items) => items.contains(needle),
                Value::String(s) => match needle.as_str() {
                    Some(sub) => s.contains(sub),
                    None => {
                        return Err(OpError::bad_argument(
                            "contains on a string takes a string argument",
                        ))
                    }
                },
                other => {
                    return Err(OpError::wrong_type(format!(
                        "{} does not support contains",
                        type_name(other)
                    )))
                }
            };
            Ok(Some(Value::Bool(found)))
        }
        "get" => {
            if args.is_empty() || args.len() > 2 {
                return Err(OpError::bad_argument("get takes a key and optional default"));
            }
            let map = as_object(receiver, "get")?;
            let key = item_key(&args[0])?;
            let value = map
                .get(key)
                .cloned()
                .or_else(|| args.get(1).cloned())
                .unwrap_or(Value::Null);
            Ok(Some(value))
        }
        "push" => {
            expect_args(method, args, 1)?;
            let items = as_array_mut(receiver, "push")?;
            items.push(args[0].clone());
            Ok(None)
        }
        "pop" => match receiver {
            Value::Array(items) => {
                expect_args(method, args, 0)?;
                items
                    .pop()
                    .map(Some)
                    .ok_or_else(|| OpError::not_found("pop from empty array"))
            }
            Value::Object(map) => {
                if args.is_empty() || args.len() > 2 {
                    return Err(OpError::bad_argument(
                        "pop on an object takes a key and optional default",
                    ));
                }
                let key = item_key(&args[0])?.to_string();
                match map.remove(&key) {
                    Some(value) => Ok(Some(value)),
                    None => match args.get(1) {
                        Some(default) => Ok(Some(default.clone())),
                        None => Err(OpError::not_found(format!("no item '{key}'"))),
                    },
                }
            }
            other => Err(OpError::wrong_type(format!(
                "{} does not support pop",
                type_name(other)
            ))),
        },
        "remove" => {
            expect_args(method, args, 1)?;
            match receiver {
                Value::Object(map) => {
                    let key = item_key(&args[0])?.to_string();
                    map.remove(&key)
                        .map(Some)
                        .ok_or_else(|| OpError::not_found(format!("no item '{key}'")))
                }
                Value::Array(items) => {
                    let position = items
                        .iter()
                        .position(|item| item == &args[0])
                        .ok_or_else(|| OpError::not_found("value not in array"))?;
                    items.remove(position);
                    Ok(None)
                }
                other => Err(OpError::wrong_type(format!(
                    "{} does not support remove",
                    type_name(other)
                ))),
            }
        }
        "clear" => {
            expect_args(method, args, 0)?;
            match receiver {
                Value::Object(map) => map.clear(),
                Value::Array(items) => items.clear(),
                other => {
                    return Err(OpError::wrong_type(format!(
                        "{} does not support clear",
                        type_name(other)
                    )))
                }
            }
            Ok(None)
        }
        "incr" => {
            if args.len() > 1 {
                return Err(OpError::bad_argument("incr takes an optional delta"));
            }
            let delta = args.first().cloned().unwrap_or_else(|| Value::from(1));
            let updated = increment(receiver, &delta)?;
            *receiver = updated.clone();
            Ok(Some(updated))
        }
        "update" => {
            if args.len() > 1 {
                return Err(OpError::bad_argument(
                    "update takes an optional object argument",
                ));
            }
            let map = as_object_mut(receiver, "update")?;
            if let Some(arg) = args.first() {
                let Value::Object(other) = arg else {
                    return Err(OpError::bad_argument("update argument must be an object"));
                };
                for (key, value) in other {
                    map.insert(key.clone(), value.clone());
                }
            }
            for (key, value) in kwargs {
                map.insert(key.clone(), value.clone());
            }
            Ok(None)
        }
        "snapshot" => {
            expect_args(method, args, 0)?;
            Ok(Some(receiver.clone()))
        }
        other => Err(OpError::not_found(format!("no method '{other}'"))),
    }
}

fn increment(receiver: &Value, delta: &Value) -> Result<Value, OpError> {
    let Value::Number(current) = receiver else {
        return Err(OpError::wrong_type(format!(
            "cannot increment {}",
            type_name(receiver)
        )));
    };
    let Value::Number(delta) = delta else {
        return Err(OpError::bad_argument("incr delta must be a number"));
    };

    if let (Some(a), Some(b)) = (current.as_i64(), delta.as_i64()) {
        let sum = a
            .checked_add(b)
            .ok_or_else(|| OpError::failed("integer overflow in incr"))?;
        return Ok(Value::from(sum));
    }
    match (current.as_f64(), delta.as_f64()) {
        (Some(a), Some(b)) => Ok(Value::from(a + b)),
        _ => Err(OpError::failed("non-finite result in incr")),
    }
}

fn check_final_segment(operation: &Operation) -> Result<(), OpError> {
    let expect_attr = matches!(
        operation.op,
        OpKind::GetAttr | OpKind::SetAttr | OpKind::DelAttr
    );
    match operation.target.segments().last() {
        None => Ok(()), // empty path targets the root
        Some(Segment::Attr(_)) if expect_attr => Ok(()),
        Some(Segment::Item(_)) if !expect_attr => Ok(()),
        Some(_) => Err(OpError::bad_argument(format!(
            "{} target must end in an {} segment",
            operation.op.as_str(),
            if expect_attr { "attribute" } else { "item" }
        ))),
    }
}

fn check_no_kwargs(operation: &Operation) -> Result<(), OpError> {
    if operation.kwargs.is_empty() {
        Ok(())
    } else {
        Err(OpError::bad_argument(format!(
            "{} takes no named arguments",
            operation.op.as_str()
        )))
    }
}

fn expect_args(method: &str, args: &[Value], count: usize) -> Result<(), OpError> {
    if args.len() == count {
        Ok(())
    } else {
        Err(OpError::bad_argument(format!(
            "method '{method}' takes {count} argument(s), got {}",
            args.len()
        )))
    }
}

fn item_key(key: &Value) -> Result<&str, OpError> {
    key.as_str()
        .ok_or_else(|| OpError::bad_argument("object keys must be strings"))
}

fn item_index(key: &Value, len: usize) -> Result<usize, OpError> {
    let index = key
        .as_u64()
        .ok_or_else(|| OpError::bad_argument("array indices must be non-negative integers"))?
        as usize;
    if index >= len {
        return Err(OpError::not_found(format!(
            "index {index} out of range (len {len})"
        )));
    }
    Ok(index)
}

fn as_object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>, OpError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(OpError::wrong_type(format!(
            "{what} requires an object, got {}",
            type_name(other)
        ))),
    }
}

fn as_object_mut<'a>(value: &'a mut Value, what: &str) -> Result<&'a mut Map<String, Value>, OpError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(OpError::wrong_type(format!(
            "{what} requires an object, got {}",
            type_name(other)
        ))),
    }
}

fn as_array_mut<'a>(value: &'a mut Value, what: &str) -> Result<&'a mut Vec<Value>, OpError> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(OpError::wrong_type(format!(
            "{what} requires an array, got {}",
            type_name(other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use objhost_wire::TargetPath;
    use serde_json::json;

    use super::*;

    fn doc() -> JsonObject {
        JsonObject::new(json!({
            "shared": 2,
            "inner": {"deep": [10, 20, 30]},
            "tags": ["a", "b"],
            "label": "hello",
        }))
    }

    fn get_item(obj: &mut JsonObject, path: TargetPath) -> OpResult {
        obj.apply(&Operation::new(OpKind::GetItem, path))
    }

    #[test]
    fn get_item_and_attr() {
        let mut obj = doc();
        let value = get_item(&mut obj, TargetPath::root().item("shared")).unwrap();
        assert_eq!(value, Some(json!(2)));

        let value = obj
            .apply(&Operation::new(
                OpKind::GetAttr,
                TargetPath::root().attr("label"),
            ))
            .unwrap();
        assert_eq!(value, Some(json!("hello")));
    }

    #[test]
    fn nested_path_get() {
        let mut obj = doc();
        let value = get_item(
            &mut obj,
            TargetPath::root().attr("inner").attr("deep").item(1),
        )
        .unwrap();
        assert_eq!(value, Some(json!(20)));
    }

    #[test]
    fn empty_path_returns_root_snapshot() {
        let mut obj = doc();
        let value = get_item(&mut obj, TargetPath::root()).unwrap().unwrap();
        assert_eq!(value["shared"], json!(2));
    }

    #[test]
    fn missing_target_is_not_found() {
        let mut obj = doc();
        let err = get_item(&mut obj, TargetPath::root().item("absent")).unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::NotFound);

        let err = get_item(
            &mut obj,
            TargetPath::root().attr("inner").attr("deep").item(9),
        )
        .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::NotFound);
    }

    #[test]
    fn indexing_a_scalar_is_wrong_type() {
        let mut obj = doc();
        let err = get_item(&mut obj, TargetPath::root().item("shared").item(0)).unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::WrongType);
    }

    #[test]
    fn mismatched_final_segment_rejected() {
        let mut obj = doc();
        let err = obj
            .apply(&Operation::new(
                OpKind::GetAttr,
                TargetPath::root().item("shared"),
            ))
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::BadArgument);
    }

    #[test]
    fn set_creates_and_overwrites() {
        let mut obj = doc();
        obj.apply(&Operation::with_args(
            OpKind::SetItem,
            TargetPath::root().item("another_attr"),
            vec![json!(3)],
        ))
        .unwrap();
        assert_eq!(
            get_item(&mut obj, TargetPath::root().item("another_attr")).unwrap(),
            Some(json!(3))
        );

        obj.apply(&Operation::with_args(
            OpKind::SetItem,
            TargetPath::root().item("shared"),
            vec![json!({"replaced": true})],
        ))
        .unwrap();
        assert_eq!(
            get_item(&mut obj, TargetPath::root().item("shared").item("replaced")).unwrap(),
            Some(json!(true))
        );
    }

    #[test]
    fn set_array_index_in_bounds_only() {
        let mut obj = doc();
        obj.apply(&Operation::with_args(
            OpKind::SetItem,
            TargetPath::root().attr("tags").item(0),
            vec![json!("z")],
        ))
        .unwrap();
        assert_eq!(
            get_item(&mut obj, TargetPath::root().attr("tags")).unwrap(),
            Some(json!(["z", "b"]))
        );

        let err = obj
            .apply(&Operation::with_args(
                OpKind::SetItem,
                TargetPath::root().attr("tags").item(5),
                vec![json!("x")],
            ))
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::NotFound);
    }

    #[test]
    fn set_requires_exactly_one_argument() {
        let mut obj = doc();
        let err = obj
            .apply(&Operation::new(
                OpKind::SetItem,
                TargetPath::root().item("x"),
            ))
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::BadArgument);
    }

    #[test]
    fn set_on_root_rejected() {
        let mut obj = doc();
        let err = obj
            .apply(&Operation::with_args(
                OpKind::SetItem,
                TargetPath::root(),
                vec![json!(1)],
            ))
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::BadArgument);
    }

    #[test]
    fn delete_item_and_attr() {
        let mut obj = doc();
        obj.apply(&Operation::new(
            OpKind::DelItem,
            TargetPath::root().item("shared"),
        ))
        .unwrap();
        let err = get_item(&mut obj, TargetPath::root().item("shared")).unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::NotFound);

        let err = obj
            .apply(&Operation::new(
                OpKind::DelAttr,
                TargetPath::root().attr("shared"),
            ))
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::NotFound);
    }

    #[test]
    fn delete_array_index_shifts() {
        let mut obj = doc();
        obj.apply(&Operation::new(
            OpKind::DelItem,
            TargetPath::root().attr("tags").item(0),
        ))
        .unwrap();
        assert_eq!(
            get_item(&mut obj, TargetPath::root().attr("tags")).unwrap(),
            Some(json!(["b"]))
        );
    }

    #[test]
    fn call_len_keys_contains() {
        let mut obj = doc();
        let call = |obj: &mut JsonObject, path: TargetPath, args: Vec<Value>| {
            obj.apply(&Operation::with_args(OpKind::Call, path, args))
        };

        assert_eq!(
            call(&mut obj, TargetPath::root().attr("len"), vec![]).unwrap(),
            Some(json!(4))
        );
        assert_eq!(
            call(
                &mut obj,
                TargetPath::root().attr("tags").attr("len"),
                vec![]
            )
            .unwrap(),
            Some(json!(2))
        );
        assert_eq!(
            call(
                &mut obj,
                TargetPath::root().attr("contains"),
                vec![json!("shared")]
            )
            .unwrap(),
            Some(json!(true))
        );
        let keys = call(&mut obj, TargetPath::root().attr("keys"), vec![])
            .unwrap()
            .unwrap();
        assert!(keys.as_array().unwrap().contains(&json!("inner")));
    }

    #[test]
    fn call_push_pop_remove_clear() {
        let mut obj = doc();
        let tags = TargetPath::root().attr("tags");

        obj.apply(&Operation::with_args(
            OpKind::Call,
            tags.clone().attr("push"),
            vec![json!("c")],
        ))
        .unwrap();
        let popped = obj
            .apply(&Operation::new(OpKind::Call, tags.clone().attr("pop")))
            .unwrap();
        assert_eq!(popped, Some(json!("c")));

        let removed = obj
            .apply(&Operation::with_args(
                OpKind::Call,
                TargetPath::root().attr("remove"),
                vec![json!("label")],
            ))
            .unwrap();
        assert_eq!(removed, Some(json!("hello")));

        obj.apply(&Operation::new(OpKind::Call, tags.clone().attr("clear")))
            .unwrap();
        assert_eq!(
            get_item(&mut obj, tags).unwrap(),
            Some(json!([]))
        );
    }

    #[test]
    fn call_incr_is_read_modify_write() {
        let mut obj = JsonObject::new(json!({"counter": 0}));
        let incr = Operation::with_args(
            OpKind::Call,
            TargetPath::root().item("counter").attr("incr"),
            vec![json!(1)],
        );

        for expected in 1..=5i64 {
            let value = obj.apply(&incr).unwrap();
            assert_eq!(value, Some(json!(expected)));
        }

        let by_ten = Operation::with_args(
            OpKind::Call,
            TargetPath::root().item("counter").attr("incr"),
            vec![json!(10)],
        );
        assert_eq!(obj.apply(&by_ten).unwrap(), Some(json!(15)));
    }

    #[test]
    fn call_incr_type_errors() {
        let mut obj = doc();
        let err = obj
            .apply(&Operation::new(
                OpKind::Call,
                TargetPath::root().item("label").attr("incr"),
            ))
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::WrongType);

        let err = obj
            .apply(&Operation::with_args(
                OpKind::Call,
                TargetPath::root().item("shared").attr("incr"),
                vec![json!("nope")],
            ))
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::BadArgument);
    }

    #[test]
    fn call_update_merges_args_and_kwargs() {
        let mut obj = JsonObject::new(json!({"a": 1}));
        let mut kwargs = Map::new();
        kwargs.insert("c".to_string(), json!(3));

        obj.apply(&Operation {
            op: OpKind::Call,
            target: TargetPath::root().attr("update"),
            args: vec![json!({"b": 2})],
            kwargs,
        })
        .unwrap();

        assert_eq!(obj.value(), &json!({"a": 1, "b": 2, "c": 3}));
    }

    #[test]
    fn call_get_with_default() {
        let mut obj = doc();
        let got = obj
            .apply(&Operation::with_args(
                OpKind::Call,
                TargetPath::root().attr("get"),
                vec![json!("absent"), json!("fallback")],
            ))
            .unwrap();
        assert_eq!(got, Some(json!("fallback")));
    }

    #[test]
    fn unknown_method_is_not_found() {
        let mut obj = doc();
        let err = obj
            .apply(&Operation::new(
                OpKind::Call,
                TargetPath::root().attr("frobnicate"),
            ))
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::NotFound);
        assert!(err.message.contains("frobnicate"));
    }

    #[test]
    fn kwargs_rejected_outside_update() {
        let mut obj = doc();
        let mut kwargs = Map::new();
        kwargs.insert("x".to_string(), json!(1));

        let err = obj
            .apply(&Operation {
                op: OpKind::Call,
                target: TargetPath::root().attr("len"),
                args: vec![],
                kwargs,
            })
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::BadArgument);
    }
}
