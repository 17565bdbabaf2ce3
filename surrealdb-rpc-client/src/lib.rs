//! # surrealdb-rpc-client
//!
//! Client library for the SurrealDB RPC interface.
//!
//! This crate provides:
//! - WebSocket transport (`ws`/`wss`) with the `msgpack` subprotocol
//! - Call multiplexing over a single connection with per-call timeouts
//! - Push notifications for live queries
//! - High-level API for every RPC method
//! - Optional TLS and mTLS support

pub mod client;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod tls;
pub mod transport;

pub use client::{Client, IntoResource, QueryResult, Resource};
pub use config::{ConnectionConfig, Credentials, Scheme, TlsOptions};
pub use connection::{Connection, ConnectionState};
pub use dispatcher::{Dispatcher, PendingCall};
pub use error::ClientError;
pub use transport::{ChannelPeer, ChannelTransport, Transport, WsTransport};
