//! Frame transports.
//!
//! A transport moves whole binary frames in both directions. The
//! [`Connection`](crate::Connection) spawns one task that is the only caller
//! of [`Transport::recv`]; `send` may be called concurrently from any task.

use crate::error::ClientError;
use bytes::Bytes;
use std::future::Future;

mod channel;
mod ws;

pub use channel::{ChannelPeer, ChannelTransport};
pub use ws::WsTransport;

/// A bidirectional, message-oriented byte channel.
pub trait Transport: Send + Sync + 'static {
    /// Sends one frame.
    fn send(&self, frame: Bytes) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Receives the next frame, or `None` once the peer has closed.
    fn recv(&self) -> impl Future<Output = Result<Option<Bytes>, ClientError>> + Send;

    /// Closes the sending side. Idempotent.
    fn close(&self) -> impl Future<Output = Result<(), ClientError>> + Send;
}
