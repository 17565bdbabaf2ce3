//! RPC message envelopes.
//!
//! Every message is a single MessagePack map:
//!
//! ```text
//! request       {id, method, params}
//! response      {id, result} | {id, error: {code, message}}
//! notification  {result}
//! ```

use crate::codec::{write_array_len, write_int, write_map_len, write_str, write_value, Decoder};
use crate::error::{DecodeError, ErrorCode, ProtocolError};
use crate::uid::Uuid;
use crate::value::{Object, Value};
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::str::FromStr;

/// RPC methods understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    // Session
    Use,
    Signin,
    Signup,
    Authenticate,
    Invalidate,
    Info,
    Version,
    Ping,
    Let,
    Unset,

    // Queries and records
    Query,
    Select,
    Create,
    Insert,
    InsertRelation,
    Update,
    Upsert,
    Merge,
    Patch,
    Delete,
    Relate,
    Run,

    // Live queries
    Live,
    Kill,
}

impl Method {
    pub const ALL: [Method; 24] = [
        Method::Use,
        Method::Signin,
        Method::Signup,
        Method::Authenticate,
        Method::Invalidate,
        Method::Info,
        Method::Version,
        Method::Ping,
        Method::Let,
        Method::Unset,
        Method::Query,
        Method::Select,
        Method::Create,
        Method::Insert,
        Method::InsertRelation,
        Method::Update,
        Method::Upsert,
        Method::Merge,
        Method::Patch,
        Method::Delete,
        Method::Relate,
        Method::Run,
        Method::Live,
        Method::Kill,
    ];

    /// The method name as sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Use => "use",
            Method::Signin => "signin",
            Method::Signup => "signup",
            Method::Authenticate => "authenticate",
            Method::Invalidate => "invalidate",
            Method::Info => "info",
            Method::Version => "version",
            Method::Ping => "ping",
            Method::Let => "let",
            Method::Unset => "unset",
            Method::Query => "query",
            Method::Select => "select",
            Method::Create => "create",
            Method::Insert => "insert",
            Method::InsertRelation => "insert_relation",
            Method::Update => "update",
            Method::Upsert => "upsert",
            Method::Merge => "merge",
            Method::Patch => "patch",
            Method::Delete => "delete",
            Method::Relate => "relate",
            Method::Run => "run",
            Method::Live => "live",
            Method::Kill => "kill",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ProtocolError::InvalidField {
                field: "method",
                reason: format!("unknown method {:?}", s),
            })
    }
}

/// An outbound call.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub id: u64,
    pub method: Method,
    pub params: Vec<Value>,
}

impl RpcRequest {
    pub fn new(id: u64, method: Method, params: Vec<Value>) -> Self {
        Self { id, method, params }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        write_map_len(&mut buf, 3);
        write_str(&mut buf, "id");
        write_int(&mut buf, wire_id(self.id));
        write_str(&mut buf, "method");
        write_str(&mut buf, self.method.as_str());
        write_str(&mut buf, "params");
        write_array_len(&mut buf, self.params.len());
        for param in &self.params {
            write_value(&mut buf, param);
        }
        buf.freeze()
    }

    /// Decodes a request, as a server would.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let mut fields = Object::new();
        for (key, value) in Decoder::decode_fields(frame)? {
            fields.insert(key, value?);
        }

        let id = match fields.get("id") {
            Some(value) => parse_id(value)?.ok_or(ProtocolError::MissingField("id"))?,
            None => return Err(ProtocolError::MissingField("id")),
        };
        let method = match fields.get("method") {
            Some(Value::String(name)) => name.parse()?,
            Some(other) => {
                return Err(invalid(
                    "method",
                    format!("expected string, found {}", other.kind()),
                ))
            }
            None => return Err(ProtocolError::MissingField("method")),
        };
        let params = match fields.remove("params") {
            Some(Value::Array(params)) => params,
            Some(Value::None | Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(invalid(
                    "params",
                    format!("expected array, found {}", other.kind()),
                ))
            }
        };
        Ok(Self { id, method, params })
    }
}

/// An error reported by the server for a single call.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcError {
    pub code: ErrorCode,
    pub message: String,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let mut object = match value {
            Value::Object(object) => object,
            other => {
                return Err(invalid(
                    "error",
                    format!("expected object, found {}", other.kind()),
                ))
            }
        };
        let code = match object.get("code") {
            Some(Value::Int(code)) => ErrorCode::from_code(*code),
            Some(other) => return Err(invalid("error", format!("code is a {}", other.kind()))),
            None => return Err(ProtocolError::MissingField("code")),
        };
        let message = match object.remove("message") {
            Some(Value::String(message)) => message,
            Some(other) => return Err(invalid("error", format!("message is a {}", other.kind()))),
            None => String::new(),
        };
        Ok(Self { code, message })
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// The body of a response or notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Result(Value),
    Error(RpcError),
}

/// A response to a single call.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    pub id: u64,
    pub payload: Payload,
}

impl RpcResponse {
    pub fn ok(id: u64, result: impl Into<Value>) -> Self {
        Self {
            id,
            payload: Payload::Result(result.into()),
        }
    }

    pub fn error(id: u64, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            id,
            payload: Payload::Error(RpcError::new(code, message)),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        write_map_len(&mut buf, 2);
        write_str(&mut buf, "id");
        write_int(&mut buf, wire_id(self.id));
        write_payload(&mut buf, &self.payload);
        buf.freeze()
    }
}

/// The action reported by a live query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Update,
    Delete,
    Killed,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "CREATE",
            Action::Update => "UPDATE",
            Action::Delete => "DELETE",
            Action::Killed => "KILLED",
        }
    }
}

impl FromStr for Action {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(Action::Create),
            "UPDATE" => Ok(Action::Update),
            "DELETE" => Ok(Action::Delete),
            "KILLED" => Ok(Action::Killed),
            other => Err(invalid("action", format!("unknown action {:?}", other))),
        }
    }
}

/// A change pushed by a live query.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveUpdate {
    pub query_id: Uuid,
    pub action: Action,
    pub result: Value,
}

/// An unsolicited message from the server.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Set when the message carried an id that matched no pending call.
    pub id: Option<u64>,
    pub payload: Value,
}

impl Notification {
    pub fn new(payload: impl Into<Value>) -> Self {
        Self {
            id: None,
            payload: payload.into(),
        }
    }

    /// Interprets the payload as a live query update.
    pub fn live_update(&self) -> Option<LiveUpdate> {
        let query_id = *self.payload.get("id")?.as_uuid()?;
        let action = self.payload.get("action")?.as_str()?.parse().ok()?;
        let result = self.payload.get("result").cloned().unwrap_or(Value::None);
        Some(LiveUpdate {
            query_id,
            action,
            result,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self.id {
            Some(id) => {
                write_map_len(&mut buf, 2);
                write_str(&mut buf, "id");
                write_int(&mut buf, wire_id(id));
            }
            None => write_map_len(&mut buf, 1),
        }
        write_str(&mut buf, "result");
        write_value(&mut buf, &self.payload);
        buf.freeze()
    }
}

/// A decoded inbound message.
///
/// `payload` is an error when the frame's envelope decoded but its body did
/// not; the id is still available so the failure can reach the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Incoming {
    pub id: Option<u64>,
    pub payload: Result<Payload, ProtocolError>,
}

impl Incoming {
    /// Decodes an inbound frame. Fails only when the envelope itself,
    /// including any id, cannot be read.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let mut id = None;
        let mut result = None;
        let mut error = None;
        for (key, value) in Decoder::decode_fields(frame)? {
            match key.as_str() {
                "id" => id = parse_id(&value?)?,
                "result" => result = Some(value),
                "error" => error = Some(value),
                _ => {}
            }
        }

        let payload = match (error, result) {
            (Some(error), _) => decode_body(error)
                .and_then(RpcError::from_value)
                .map(Payload::Error),
            (None, Some(result)) => decode_body(result).map(Payload::Result),
            (None, None) => Err(ProtocolError::MissingField("result")),
        };
        Ok(Self { id, payload })
    }
}

fn decode_body(value: Result<Value, DecodeError>) -> Result<Value, ProtocolError> {
    value.map_err(ProtocolError::Decode)
}

fn write_payload(buf: &mut BytesMut, payload: &Payload) {
    match payload {
        Payload::Result(value) => {
            write_str(buf, "result");
            write_value(buf, value);
        }
        Payload::Error(error) => {
            write_str(buf, "error");
            write_map_len(buf, 2);
            write_str(buf, "code");
            write_int(buf, error.code.code());
            write_str(buf, "message");
            write_str(buf, &error.message);
        }
    }
}

/// Ids above `i64::MAX` cannot be represented by the value model and are
/// never allocated.
fn wire_id(id: u64) -> i64 {
    i64::try_from(id).unwrap_or(i64::MAX)
}

/// Reads an id, which servers echo back as either an integer or a string.
fn parse_id(value: &Value) -> Result<Option<u64>, ProtocolError> {
    match value {
        Value::None | Value::Null => Ok(None),
        Value::Int(n) => u64::try_from(*n)
            .map(Some)
            .map_err(|_| invalid("id", format!("negative id {}", n))),
        Value::String(s) => s
            .parse()
            .map(Some)
            .map_err(|_| invalid("id", format!("non-numeric id {:?}", s))),
        other => Err(invalid("id", format!("expected integer, found {}", other.kind()))),
    }
}

fn invalid(field: &'static str, reason: String) -> ProtocolError {
    ProtocolError::InvalidField { field, reason }
}
