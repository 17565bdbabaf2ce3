//! # surrealdb-rpc
//!
//! Async client for the SurrealDB RPC interface over WebSocket, with a
//! MessagePack codec for the full SurrealDB value model.
//!
//! - [`protocol`]: values, record ids, the MessagePack codec and RPC envelopes
//! - [`client`]: connection lifecycle, call multiplexing and the [`Client`] API
//!
//! ```no_run
//! use surrealdb_rpc::{Client, ConnectionConfig, Credentials, Object, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     tracing_subscriber::fmt()
//!         .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
//!         .init();
//!
//!     let config = ConnectionConfig::new("127.0.0.1", 8000)
//!         .with_credentials(Credentials::root("root", "root"))
//!         .with_namespace("test")
//!         .with_database("test");
//!     let client = Client::connect(&config).await?;
//!
//!     client.create("person:tobie", Object::from([("name", Value::from("Tobie"))])).await?;
//!     let people = client.select("person").await?;
//!     tracing::info!(%people, "selected");
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

pub use surrealdb_rpc_client as client;
pub use surrealdb_rpc_protocol as protocol;

pub use surrealdb_rpc_client::{
    Client, ClientError, Connection, ConnectionConfig, ConnectionState, Credentials, Resource,
    Scheme, TlsOptions,
};
pub use surrealdb_rpc_protocol::{Decoder, Encoder, Id, Object, Thing, Value};
