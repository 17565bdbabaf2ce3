//! Client error types.

use surrealdb_rpc_protocol::{ErrorCode, ParseError, ProtocolError};
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("{step} failed while opening connection: {source}")]
    Bootstrap {
        step: &'static str,
        source: Box<ClientError>,
    },

    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("server error: {code} - {message}")]
    Server { code: ErrorCode, message: String },

    #[error("query failed: {0}")]
    Query(String),

    #[error("invalid record id: {0}")]
    Parse(#[from] ParseError),

    #[error("connection lost")]
    ConnectionLost,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("not connected")]
    NotConnected,

    #[error("request timeout")]
    Timeout,

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl ClientError {
    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Connect(_) => true,
            ClientError::WebSocket(_) => true,
            ClientError::Timeout => true,
            ClientError::ConnectionLost => true,
            ClientError::Bootstrap { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    pub(crate) fn bootstrap(step: &'static str, source: ClientError) -> Self {
        ClientError::Bootstrap {
            step,
            source: Box::new(source),
        }
    }
}
