use super::Transport;
use crate::config::{ConnectionConfig, Scheme};
use crate::error::ClientError;
use crate::tls;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use surrealdb_rpc_protocol::SUBPROTOCOL;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

/// WebSocket transport speaking the `msgpack` subprotocol.
///
/// Works with any WebSocket stream; [`WsTransport::connect`] dials TCP or TLS.
pub struct WsTransport<S = MaybeTlsStream<TcpStream>> {
    /// Write half (async mutex for holding across awaits).
    sink: AsyncMutex<SplitSink<WebSocketStream<S>, Message>>,
    /// Read half, only used by the connection's reader task.
    stream: AsyncMutex<SplitStream<WebSocketStream<S>>>,
    closed: AtomicBool,
}

impl WsTransport {
    /// Dials the endpoint described by `config`, honouring its connect timeout.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, ClientError> {
        let url = config.url();
        let request = handshake_request(&url)?;
        let connector = match config.scheme {
            Scheme::Wss => Some(tls::connector(&config.tls)?),
            Scheme::Ws => None,
        };

        debug!(url = %url, "connecting");
        let handshake =
            tokio_tungstenite::connect_async_tls_with_config(request, None, true, connector);
        let (ws, response) = tokio::time::timeout(config.connect_timeout(), handshake)
            .await
            .map_err(|_| {
                ClientError::Connect(format!(
                    "timed out after {:?} connecting to {}",
                    config.connect_timeout(),
                    url
                ))
            })?
            .map_err(|e| ClientError::Connect(format!("{}: {}", url, e)))?;

        debug!(url = %url, status = %response.status(), "websocket established");
        Ok(Self::new(ws))
    }
}

impl<S> WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wraps an already-negotiated WebSocket stream.
    pub fn new(ws: WebSocketStream<S>) -> Self {
        let (sink, stream) = ws.split();
        Self {
            sink: AsyncMutex::new(sink),
            stream: AsyncMutex::new(stream),
            closed: AtomicBool::new(false),
        }
    }

    /// Check if the transport is closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<S> Transport for WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&self, frame: Bytes) -> Result<(), ClientError> {
        if self.is_closed() {
            return Err(ClientError::ConnectionClosed);
        }

        let mut sink = self.sink.lock().await;
        sink.send(Message::Binary(frame.to_vec()))
            .await
            .map_err(|e| match e {
                tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                    ClientError::ConnectionLost
                }
                other => ClientError::WebSocket(other),
            })
    }

    async fn recv(&self) -> Result<Option<Bytes>, ClientError> {
        let mut stream = self.stream.lock().await;

        loop {
            let msg = match stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(tungstenite::Error::ConnectionClosed))
                | Some(Err(tungstenite::Error::AlreadyClosed))
                | None => return Ok(None),
                Some(Err(e)) => return Err(ClientError::WebSocket(e)),
            };

            match msg {
                Message::Binary(data) => return Ok(Some(Bytes::from(data))),
                Message::Close(frame) => {
                    debug!(?frame, "close frame received");
                    return Ok(None);
                }
                Message::Text(text) => {
                    warn!(len = text.len(), "ignoring text frame");
                }
                // Pongs are queued by tungstenite and flushed on the next write.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&self) -> Result<(), ClientError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut sink = self.sink.lock().await;
        match sink.close().await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(ClientError::WebSocket(e)),
        }
    }
}

/// Builds the upgrade request, asking for the `msgpack` subprotocol.
fn handshake_request(url: &str) -> Result<Request, ClientError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| ClientError::Connect(format!("invalid url {}: {}", url, e)))?;
    request
        .headers_mut()
        .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::DuplexStream;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Response};

    fn negotiate(
        req: &tungstenite::handshake::server::Request,
        mut resp: Response,
    ) -> Result<Response, ErrorResponse> {
        let offered = req
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok());
        assert_eq!(offered, Some(SUBPROTOCOL));
        resp.headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));
        Ok(resp)
    }

    async fn pair() -> (WsTransport<DuplexStream>, WebSocketStream<DuplexStream>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let request = handshake_request("ws://localhost/rpc").unwrap();
        let (client, server) = tokio::join!(
            async {
                tokio_tungstenite::client_async(request, client)
                    .await
                    .expect("client handshake failed")
                    .0
            },
            async {
                tokio_tungstenite::accept_hdr_async(server, negotiate)
                    .await
                    .expect("server handshake failed")
            }
        );
        (WsTransport::new(client), server)
    }

    #[test]
    fn test_handshake_request_headers() {
        let request = handshake_request("wss://db.example.com:8000/rpc").unwrap();
        assert_eq!(request.uri().host(), Some("db.example.com"));
        assert_eq!(
            request.headers().get(SEC_WEBSOCKET_PROTOCOL).unwrap(),
            "msgpack"
        );

        let err = handshake_request("not a url").unwrap_err();
        assert!(matches!(err, ClientError::Connect(_)));
    }

    #[tokio::test]
    async fn test_binary_frames_both_ways() {
        let (transport, mut server) = pair().await;

        transport
            .send(Bytes::from_static(&[0x81, 0xa2, b'i', b'd', 0x01]))
            .await
            .unwrap();
        let received = server.next().await.unwrap().unwrap();
        assert_eq!(received, Message::Binary(vec![0x81, 0xa2, b'i', b'd', 0x01]));

        server.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
        let frame = transport.recv().await.unwrap().unwrap();
        assert_eq!(&frame[..], &[1, 2, 3]);
    }

    #[tokio::test]
    async fn test_text_and_ping_frames_skipped() {
        let (transport, mut server) = pair().await;

        server
            .send(Message::Text("{\"id\":1}".to_string()))
            .await
            .unwrap();
        server.send(Message::Ping(vec![9])).await.unwrap();
        server.send(Message::Binary(vec![0xc0])).await.unwrap();

        let frame = transport.recv().await.unwrap().unwrap();
        assert_eq!(&frame[..], &[0xc0]);
    }

    #[tokio::test]
    async fn test_peer_close_ends_stream() {
        let (transport, mut server) = pair().await;

        server.close(None).await.unwrap();
        assert!(transport.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (transport, mut server) = pair().await;

        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert!(transport.is_closed());

        let err = transport.send(Bytes::from_static(&[0xc0])).await.unwrap_err();
        assert!(matches!(err, ClientError::ConnectionClosed));

        assert!(matches!(server.next().await, Some(Ok(Message::Close(_)))));
    }
}
