//! # surrealdb-rpc-protocol
//!
//! Value model and wire format for the SurrealDB RPC interface.
//!
//! This crate provides:
//! - The [`Value`] model, including record identifiers ([`Thing`])
//! - Parsing and rendering of the `table:id` text form
//! - MessagePack encoding with SurrealDB extension types
//! - Request, response and notification envelopes
//! - Error types and server error codes

pub mod codec;
pub mod decimal;
pub mod error;
pub mod geometry;
pub mod message;
mod parser;
pub mod temporal;
pub mod thing;
pub mod uid;
pub mod value;

pub use codec::{Decoder, Encoder};
pub use decimal::Decimal;
pub use error::{DecodeError, ErrorCode, ParseError, ProtocolError};
pub use geometry::{Coord, Geometry};
pub use message::{
    Action, Incoming, LiveUpdate, Method, Notification, Payload, RpcError, RpcRequest,
    RpcResponse,
};
pub use temporal::{Datetime, Duration};
pub use thing::{Id, Thing};
pub use uid::{Uuid, UuidKind};
pub use value::{Object, Value};

/// WebSocket subprotocol for MessagePack-encoded RPC.
pub const SUBPROTOCOL: &str = "msgpack";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8000;

/// Default RPC endpoint path.
pub const DEFAULT_PATH: &str = "/rpc";

/// Maximum nesting of arrays, objects and extension payloads accepted when
/// decoding or parsing.
pub const MAX_DEPTH: usize = 128;
