use super::Transport;
use crate::error::ClientError;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;

/// In-memory transport backed by a pair of channels.
///
/// Used to drive a [`Connection`](crate::Connection) against a scripted
/// server without a socket.
pub struct ChannelTransport {
    tx: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    rx: AsyncMutex<mpsc::UnboundedReceiver<Bytes>>,
}

/// The server end of a [`ChannelTransport`]. Dropping it looks like a lost
/// connection to the client.
pub struct ChannelPeer {
    tx: mpsc::UnboundedSender<Bytes>,
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl ChannelTransport {
    /// Create a connected transport/peer pair.
    pub fn pair() -> (ChannelTransport, ChannelPeer) {
        let (client_tx, peer_rx) = mpsc::unbounded_channel();
        let (peer_tx, client_rx) = mpsc::unbounded_channel();
        let transport = ChannelTransport {
            tx: Mutex::new(Some(client_tx)),
            rx: AsyncMutex::new(client_rx),
        };
        let peer = ChannelPeer {
            tx: peer_tx,
            rx: peer_rx,
        };
        (transport, peer)
    }
}

impl Transport for ChannelTransport {
    async fn send(&self, frame: Bytes) -> Result<(), ClientError> {
        let tx = self.tx.lock().clone().ok_or(ClientError::ConnectionClosed)?;
        tx.send(frame).map_err(|_| ClientError::ConnectionLost)
    }

    async fn recv(&self) -> Result<Option<Bytes>, ClientError> {
        Ok(self.rx.lock().await.recv().await)
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.tx.lock().take();
        Ok(())
    }
}

impl ChannelPeer {
    /// Next frame sent by the client, or `None` once it has closed.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Sends a frame to the client. Returns `false` if the client is gone.
    pub fn send(&self, frame: Bytes) -> bool {
        self.tx.send(frame).is_ok()
    }
}
