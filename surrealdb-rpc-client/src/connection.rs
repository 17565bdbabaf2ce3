//! Connection lifecycle.

use crate::config::ConnectionConfig;
use crate::dispatcher::Dispatcher;
use crate::error::ClientError;
use crate::transport::{Transport, WsTransport};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use surrealdb_rpc_protocol::{Method, Notification, RpcRequest, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
    Closing,
    /// The transport failed. Terminal.
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Ready => "ready",
            ConnectionState::Closing => "closing",
            ConnectionState::Failed => "failed",
        }
    }

    /// Whether the transport is (still) up and not being closed.
    fn is_open(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Authenticating | ConnectionState::Ready
        )
    }

    /// Whether calls may be issued.
    fn accepts_calls(self) -> bool {
        matches!(
            self,
            ConnectionState::Authenticating | ConnectionState::Ready
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State shared with the reader task.
struct Shared<T> {
    transport: T,
    dispatcher: Dispatcher,
    state: Mutex<ConnectionState>,
}

impl<T> Shared<T> {
    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Moves to `to` if `allowed` accepts the current state. On refusal the
    /// current state is returned as the error.
    fn transition_if(
        &self,
        to: ConnectionState,
        allowed: impl FnOnce(ConnectionState) -> bool,
    ) -> Result<ConnectionState, ConnectionState> {
        let from = {
            let mut state = self.state.lock();
            let from = *state;
            if !allowed(from) {
                return Err(from);
            }
            *state = to;
            from
        };
        tracing::debug!(%from, %to, "connection state changed");
        Ok(from)
    }
}

/// A single multiplexed RPC connection.
///
/// One reader task owns the receive side of the transport; any number of
/// callers may issue calls concurrently.
pub struct Connection<T: Transport = WsTransport> {
    shared: Arc<Shared<T>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    request_timeout: Duration,
}

impl Connection<WsTransport> {
    /// Dials the configured endpoint and runs the sign-in sequence.
    pub async fn open(config: &ConnectionConfig) -> Result<Self, ClientError> {
        config.validate()?;
        tracing::debug!(
            url = %config.url(),
            from = %ConnectionState::Disconnected,
            to = %ConnectionState::Connecting,
            "connection state changed"
        );
        let transport = WsTransport::connect(config).await?;
        Self::establish(transport, config).await
    }
}

impl<T: Transport> Connection<T> {
    /// Starts the reader over an established transport, then signs in and
    /// selects the namespace/database named in `config`.
    ///
    /// The transport is closed if any of these calls fail.
    pub async fn establish(transport: T, config: &ConnectionConfig) -> Result<Self, ClientError> {
        let shared = Arc::new(Shared {
            transport,
            dispatcher: Dispatcher::new(config.notification_capacity),
            state: Mutex::new(ConnectionState::Connecting),
        });
        let reader = tokio::spawn(read_loop(Arc::clone(&shared)));
        let connection = Self {
            shared,
            reader: Mutex::new(Some(reader)),
            request_timeout: config.request_timeout(),
        };

        let _ = connection.shared.transition_if(ConnectionState::Authenticating, |s| {
            s == ConnectionState::Connecting
        });

        if let Err(e) = connection.bootstrap(config).await {
            tracing::debug!(error = %e, "connection setup failed");
            if let Err(close_err) = connection.close().await {
                tracing::debug!(error = %close_err, "close after failed setup");
            }
            return Err(e);
        }

        connection
            .shared
            .transition_if(ConnectionState::Ready, |s| {
                s == ConnectionState::Authenticating
            })
            .map_err(|_| ClientError::ConnectionLost)?;
        Ok(connection)
    }

    async fn bootstrap(&self, config: &ConnectionConfig) -> Result<(), ClientError> {
        if let Some(credentials) = &config.credentials {
            let method = credentials.method();
            tracing::debug!(%method, ?credentials, "signing in");
            self.call(method, vec![credentials.to_value()])
                .await
                .map_err(|e| ClientError::bootstrap(method.as_str(), e))?;
        }

        if config.namespace.is_some() || config.database.is_some() {
            tracing::debug!(
                namespace = ?config.namespace,
                database = ?config.database,
                "selecting namespace and database"
            );
            let params = vec![
                Value::from(config.namespace.clone()),
                Value::from(config.database.clone()),
            ];
            self.call(Method::Use, params)
                .await
                .map_err(|e| ClientError::bootstrap(Method::Use.as_str(), e))?;
        }

        Ok(())
    }

    /// Sends a call and waits for its result with the default request timeout.
    pub async fn call(&self, method: Method, params: Vec<Value>) -> Result<Value, ClientError> {
        self.call_with_timeout(method, params, self.request_timeout)
            .await
    }

    /// Sends a call and waits at most `timeout` for its result.
    pub async fn call_with_timeout(
        &self,
        method: Method,
        params: Vec<Value>,
        timeout: Duration,
    ) -> Result<Value, ClientError> {
        let state = self.state();
        if !state.accepts_calls() {
            tracing::debug!(%method, %state, "call rejected");
            return Err(ClientError::NotConnected);
        }

        let call = self.shared.dispatcher.register()?;
        let id = call.id();
        let frame = RpcRequest::new(id, method, params).encode();

        tracing::debug!(id, %method, bytes = frame.len(), "sending request");
        self.shared.transport.send(frame).await?;

        let result = call.wait(timeout).await;
        tracing::debug!(id, %method, ok = result.is_ok(), "request completed");
        result
    }

    /// Subscribes to server-pushed messages, including responses whose id
    /// matches no pending call.
    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.shared.dispatcher.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Returns the number of calls awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.shared.dispatcher.pending_count()
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Closes the connection. Pending calls fail with
    /// [`ClientError::ConnectionClosed`]. Calling it again is a no-op.
    pub async fn close(&self) -> Result<(), ClientError> {
        match self
            .shared
            .transition_if(ConnectionState::Closing, ConnectionState::is_open)
        {
            Ok(_) | Err(ConnectionState::Failed) => {}
            Err(_) => return Ok(()),
        }

        self.shared
            .dispatcher
            .shutdown(|| ClientError::ConnectionClosed);
        let result = self.shared.transport.close().await;
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }

        let _ = self
            .shared
            .transition_if(ConnectionState::Disconnected, |s| {
                s == ConnectionState::Closing
            });
        result
    }
}

impl<T: Transport> Drop for Connection<T> {
    fn drop(&mut self) {
        self.shared
            .dispatcher
            .shutdown(|| ClientError::ConnectionClosed);
        if let Some(reader) = self.reader.get_mut().take() {
            reader.abort();
        }
    }
}

/// Sole reader of the transport.
async fn read_loop<T: Transport>(shared: Arc<Shared<T>>) {
    tracing::debug!("read loop started");

    let failure = loop {
        match shared.transport.recv().await {
            Ok(Some(frame)) => shared.dispatcher.route(&frame),
            Ok(None) => break None,
            Err(e) => break Some(e),
        }
    };

    match shared.transition_if(ConnectionState::Failed, ConnectionState::is_open) {
        Ok(_) => {
            match failure {
                Some(e) => tracing::error!(error = %e, "transport receive failed"),
                None => tracing::error!("connection closed by server"),
            }
            shared.dispatcher.shutdown(|| ClientError::ConnectionLost);
        }
        Err(state) => tracing::debug!(%state, "read loop stopped"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::transport::{ChannelPeer, ChannelTransport};
    use bytes::Bytes;
    use rand::seq::SliceRandom;
    use surrealdb_rpc_protocol::{DecodeError, ErrorCode, ProtocolError, RpcResponse, Uuid};
    use tracing_subscriber::EnvFilter;

    const WAIT: Duration = Duration::from_secs(5);

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    async fn connect() -> (Connection<ChannelTransport>, ChannelPeer) {
        init_tracing();
        let (transport, peer) = ChannelTransport::pair();
        let config = ConnectionConfig::default();
        let conn = Connection::establish(transport, &config).await.unwrap();
        (conn, peer)
    }

    async fn next_request(peer: &mut ChannelPeer) -> RpcRequest {
        let frame = tokio::time::timeout(WAIT, peer.recv())
            .await
            .expect("no request arrived")
            .expect("client closed");
        RpcRequest::decode(&frame).unwrap()
    }

    fn reply(peer: &ChannelPeer, response: RpcResponse) {
        assert!(peer.send(response.encode()));
    }

    #[tokio::test]
    async fn test_lifecycle_states() {
        let (conn, mut peer) = connect().await;
        assert_eq!(conn.state(), ConnectionState::Ready);
        assert!(conn.is_ready());

        conn.close().await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        conn.close().await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        assert!(peer.recv().await.is_none());
        let err = conn.call(Method::Ping, vec![]).await.unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));
    }

    #[tokio::test]
    async fn test_bootstrap_signs_in_before_use() {
        init_tracing();
        let (transport, mut peer) = ChannelTransport::pair();
        let config = ConnectionConfig::default()
            .with_credentials(Credentials::root("root", "secret"))
            .with_namespace("test")
            .with_database("app");

        let (conn, _) = tokio::join!(Connection::establish(transport, &config), async {
            let signin = next_request(&mut peer).await;
            assert_eq!(signin.method, Method::Signin);
            assert_eq!(signin.params.len(), 1);
            assert_eq!(signin.params[0].get("user"), Some(&Value::from("root")));
            reply(&peer, RpcResponse::ok(signin.id, "jwt-token"));

            let use_ = next_request(&mut peer).await;
            assert_eq!(use_.method, Method::Use);
            assert_eq!(use_.params, vec![Value::from("test"), Value::from("app")]);
            assert!(use_.id > signin.id);
            reply(&peer, RpcResponse::ok(use_.id, Value::None));
        });

        let conn = conn.unwrap();
        assert_eq!(conn.state(), ConnectionState::Ready);
        assert_eq!(conn.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_use_with_only_namespace() {
        init_tracing();
        let (transport, mut peer) = ChannelTransport::pair();
        let config = ConnectionConfig::default().with_namespace("test");

        let (conn, _) = tokio::join!(Connection::establish(transport, &config), async {
            let use_ = next_request(&mut peer).await;
            assert_eq!(use_.method, Method::Use);
            assert_eq!(use_.params, vec![Value::from("test"), Value::None]);
            reply(&peer, RpcResponse::ok(use_.id, Value::None));
        });
        assert!(conn.unwrap().is_ready());
    }

    #[tokio::test]
    async fn test_signin_failure_fails_establish() {
        init_tracing();
        let (transport, mut peer) = ChannelTransport::pair();
        let config = ConnectionConfig::default()
            .with_credentials(Credentials::root("root", "wrong"))
            .with_namespace("test");

        let (result, _) = tokio::join!(Connection::establish(transport, &config), async {
            let signin = next_request(&mut peer).await;
            reply(
                &peer,
                RpcResponse::error(signin.id, ErrorCode::InvalidParams, "authentication failed"),
            );
        });

        match result {
            Err(ClientError::Bootstrap { step, source }) => {
                assert_eq!(step, "signin");
                assert!(matches!(*source, ClientError::Server { .. }));
            }
            Err(other) => panic!("unexpected error: {:?}", other),
            Ok(_) => panic!("establish succeeded"),
        }
        // No `use` was sent and the transport was closed.
        assert!(peer.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_use_failure_fails_establish() {
        init_tracing();
        let (transport, mut peer) = ChannelTransport::pair();
        let config = ConnectionConfig::default().with_database("missing");

        let (result, _) = tokio::join!(Connection::establish(transport, &config), async {
            let use_ = next_request(&mut peer).await;
            reply(
                &peer,
                RpcResponse::error(use_.id, ErrorCode::InternalError, "database not found"),
            );
        });

        assert!(matches!(
            result,
            Err(ClientError::Bootstrap { step: "use", .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_calls_answered_out_of_order() {
        let (conn, mut peer) = connect().await;
        let conn = Arc::new(conn);
        const CALLS: i64 = 64;

        let server = tokio::spawn(async move {
            let mut requests = Vec::new();
            for _ in 0..CALLS {
                requests.push(next_request(&mut peer).await);
            }
            requests.shuffle(&mut rand::thread_rng());
            for request in requests {
                let echo = request.params[0].clone();
                reply(&peer, RpcResponse::ok(request.id, echo));
            }
            peer
        });

        let mut handles = Vec::new();
        for n in 0..CALLS {
            let conn = Arc::clone(&conn);
            handles.push(tokio::spawn(async move {
                (n, conn.call(Method::Run, vec![Value::Int(n)]).await)
            }));
        }

        for handle in handles {
            let (n, result) = handle.await.unwrap();
            assert_eq!(result.unwrap(), Value::Int(n));
        }
        assert_eq!(conn.pending_count(), 0);
        let _peer = server.await.unwrap();
    }

    #[tokio::test]
    async fn test_timeout_then_next_call_succeeds() {
        let (conn, mut peer) = connect().await;

        let err = conn
            .call_with_timeout(Method::Ping, vec![], Duration::from_millis(30))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Timeout));
        assert_eq!(conn.pending_count(), 0);
        let ignored = next_request(&mut peer).await;

        let (result, _) = tokio::join!(conn.call(Method::Version, vec![]), async {
            let request = next_request(&mut peer).await;
            assert!(request.id > ignored.id);
            reply(&peer, RpcResponse::ok(request.id, "surrealdb-2.0.0"));
        });
        assert_eq!(result.unwrap(), Value::from("surrealdb-2.0.0"));
    }

    #[tokio::test]
    async fn test_dropped_server_fails_pending_calls() {
        let (conn, mut peer) = connect().await;
        let conn = Arc::new(conn);

        let mut handles = Vec::new();
        for _ in 0..5 {
            let conn = Arc::clone(&conn);
            handles.push(tokio::spawn(async move {
                conn.call(Method::Info, vec![]).await
            }));
        }
        for _ in 0..5 {
            next_request(&mut peer).await;
        }
        drop(peer);

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert!(matches!(err, ClientError::ConnectionLost), "{:?}", err);
        }
        assert_eq!(conn.state(), ConnectionState::Failed);
        assert_eq!(conn.pending_count(), 0);

        let err = conn.call(Method::Ping, vec![]).await.unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));
        conn.close().await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn test_close_cancels_pending_calls() {
        let (conn, mut peer) = connect().await;
        let conn = Arc::new(conn);

        let pending = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.call(Method::Select, vec![Value::from("person")]).await })
        };
        next_request(&mut peer).await;

        conn.close().await.unwrap();
        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, ClientError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_drop_releases_transport() {
        let (conn, mut peer) = connect().await;
        drop(conn);

        let closed = tokio::time::timeout(WAIT, peer.recv()).await.unwrap();
        assert!(closed.is_none());
    }

    #[tokio::test]
    async fn test_notifications_and_unknown_tokens() {
        let (conn, peer) = connect().await;
        let mut notifications = conn.subscribe_notifications();

        let query_id = Uuid::new_v4();
        let mut update = surrealdb_rpc_protocol::Object::new();
        update.insert("id", Value::Uuid(query_id));
        update.insert("action", Value::from("CREATE"));
        update.insert("result", Value::from("row"));
        assert!(peer.send(Notification::new(Value::Object(update)).encode()));
        assert!(peer.send(RpcResponse::ok(4242, "orphan").encode()));

        let live = tokio::time::timeout(WAIT, notifications.recv())
            .await
            .unwrap()
            .unwrap();
        let live = live.live_update().unwrap();
        assert_eq!(live.query_id, query_id);
        assert_eq!(live.result, Value::from("row"));

        let orphan = tokio::time::timeout(WAIT, notifications.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(orphan.id, Some(4242));
        assert_eq!(orphan.payload, Value::from("orphan"));
        assert!(conn.is_ready());
    }

    #[tokio::test]
    async fn test_decode_error_fails_only_its_call() {
        let (conn, mut peer) = connect().await;

        let server = async {
            let first = next_request(&mut peer).await;
            let second = next_request(&mut peer).await;

            // {id: first, result: fixext1 with unknown tag 99}
            let mut frame = vec![0x82, 0xa2, b'i', b'd', first.id as u8, 0xa6];
            frame.extend_from_slice(b"result");
            frame.extend_from_slice(&[0xd4, 99, 0x00]);
            assert!(peer.send(Bytes::from(frame)));
            reply(&peer, RpcResponse::ok(second.id, true));
        };

        let (first, second, _) = tokio::join!(
            conn.call(Method::Select, vec![Value::from("a")]),
            conn.call(Method::Select, vec![Value::from("b")]),
            server
        );

        assert!(matches!(first, Err(ClientError::Protocol(_))));
        assert_eq!(second.unwrap(), Value::Bool(true));
        assert!(conn.is_ready());
    }

    #[tokio::test]
    async fn test_truncated_response_fails_its_call() {
        let (conn, mut peer) = connect().await;

        let server = async {
            let request = next_request(&mut peer).await;

            // {id, result: str8 declaring 10 bytes with 2 present}
            let mut frame = vec![0x82, 0xa2, b'i', b'd', request.id as u8, 0xa6];
            frame.extend_from_slice(b"result");
            frame.extend_from_slice(&[0xd9, 0x0a, b'a', b'b']);
            assert!(peer.send(Bytes::from(frame)));

            let request = next_request(&mut peer).await;
            reply(&peer, RpcResponse::ok(request.id, "pong"));
        };

        let calls = async {
            let truncated = conn
                .call_with_timeout(Method::Ping, vec![], WAIT)
                .await;
            let next = conn.call(Method::Ping, vec![]).await;
            (truncated, next)
        };
        let ((truncated, next), _) = tokio::join!(calls, server);

        assert!(matches!(
            truncated,
            Err(ClientError::Protocol(ProtocolError::Decode(
                DecodeError::Truncated { .. }
            )))
        ));
        assert_eq!(next.unwrap(), Value::from("pong"));
        assert_eq!(conn.pending_count(), 0);
        assert!(conn.is_ready());
    }
}
