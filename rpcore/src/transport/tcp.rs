//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! TCP transport implementation.
//!
//! [`TcpConnection`] multiplexes calls over one stream: writes are
//! serialized behind an async mutex and a reader task routes each response to
//! its waiter by request id. [`TcpServerTransport`] runs an accept loop and
//! one task per connection; every request is dispatched concurrently, on a
//! [`WorkerPool`] when one is configured.

use crate::error::FrameworkCode;
use crate::invoke::{Request, Response};
use crate::runtime::WorkerPool;
use crate::transport::codec::{Codec, Decoded, JsonFrameCodec};
use crate::transport::pending::{PendingGuard, PendingRequests};
use crate::transport::{
    Connection, Connector, Dispatcher, Network, RemoteAddress, RequestIdGenerator,
    ServerTransport, TransportError,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::{JoinHandle, JoinSet};

#[cfg(feature = "observability")]
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 8 * 1024;

/// Dials [`TcpConnection`]s.
///
/// # Examples
///
/// ```rust,no_run
/// use rpcore::transport::{Connection, Connector, TcpConnector};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let connector = TcpConnector::new();
/// let connection = connector.connect(&"127.0.0.1:8000".parse()?).await?;
/// assert!(connection.is_healthy());
/// connection.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TcpConnector<K = JsonFrameCodec> {
    codec: Arc<K>,
    nodelay: bool,
}

impl TcpConnector<JsonFrameCodec> {
    /// Creates a connector using [`JsonFrameCodec`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_codec(JsonFrameCodec)
    }
}

impl Default for TcpConnector<JsonFrameCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> TcpConnector<K> {
    /// Creates a connector using `codec`.
    pub fn with_codec(codec: K) -> Self {
        Self {
            codec: Arc::new(codec),
            nodelay: true,
        }
    }

    /// Sets `TCP_NODELAY` on new connections. Default: `true`.
    #[must_use]
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

#[async_trait]
impl<K> Connector for TcpConnector<K>
where
    K: Codec<Request> + Codec<Response>,
{
    type Connection = TcpConnection<K>;

    async fn connect(&self, address: &RemoteAddress) -> Result<Self::Connection, TransportError> {
        if address.network() != Network::Tcp {
            return Err(TransportError::InvalidConfiguration {
                reason: format!("tcp connector cannot dial {}", address),
            });
        }

        #[cfg(feature = "observability")]
        debug!(address = %address, "Connecting");

        let stream = TcpStream::connect(address.authority())
            .await
            .map_err(|e| TransportError::connect_failed(address.to_string(), e))?;
        stream.set_nodelay(self.nodelay)?;

        Ok(TcpConnection::new(address.clone(), stream, self.codec.clone()))
    }
}

struct Shared {
    pending: PendingRequests<Response>,
    healthy: AtomicBool,
}

/// A multiplexed client connection over TCP.
pub struct TcpConnection<K = JsonFrameCodec> {
    remote: RemoteAddress,
    local_addr: Option<SocketAddr>,
    codec: Arc<K>,
    writer: AsyncMutex<OwnedWriteHalf>,
    shared: Arc<Shared>,
    ids: RequestIdGenerator,
    closed: AtomicBool,
    reader: JoinHandle<()>,
}

impl<K> TcpConnection<K>
where
    K: Codec<Request> + Codec<Response>,
{
    /// Wraps a connected stream and starts its reader task.
    pub fn new(remote: RemoteAddress, stream: TcpStream, codec: Arc<K>) -> Self {
        let local_addr = stream.local_addr().ok();
        let (read_half, write_half) = stream.into_split();
        let shared = Arc::new(Shared {
            pending: PendingRequests::new(),
            healthy: AtomicBool::new(true),
        });
        let reader = tokio::spawn(read_responses(
            read_half,
            codec.clone(),
            shared.clone(),
            remote.clone(),
        ));

        Self {
            remote,
            local_addr,
            codec,
            writer: AsyncMutex::new(write_half),
            shared,
            ids: RequestIdGenerator::new(),
            closed: AtomicBool::new(false),
            reader,
        }
    }

    /// The local end of the stream.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Calls awaiting a response.
    pub fn in_flight(&self) -> usize {
        self.shared.pending.len()
    }

    fn lost(&self, reason: &str) -> TransportError {
        TransportError::ConnectionLost {
            address: self.remote.to_string(),
            reason: reason.to_string(),
        }
    }

    async fn write(&self, request: &Request) -> Result<(), TransportError> {
        let mut frame = Vec::new();
        <K as Codec<Request>>::encode(&self.codec, request, &mut frame)?;

        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.write_all(&frame).await {
            self.shared.healthy.store(false, Ordering::Release);
            return Err(TransportError::write_failed(self.remote.to_string(), e));
        }
        Ok(())
    }
}

#[async_trait]
impl<K> Connection for TcpConnection<K>
where
    K: Codec<Request> + Codec<Response>,
{
    fn remote(&self) -> &RemoteAddress {
        &self.remote
    }

    fn is_healthy(&self) -> bool {
        self.shared.healthy.load(Ordering::Acquire) && !self.closed.load(Ordering::Acquire)
    }

    async fn call(&self, mut request: Request) -> Result<Response, TransportError> {
        if !self.is_healthy() {
            return Err(self.lost("connection is closed"));
        }

        let caller_id = request.request_id;
        let id = self.ids.next();
        request.request_id = id;

        let rx = self.shared.pending.register(id);
        let _guard = PendingGuard::new(&self.shared.pending, id);
        self.write(&request).await?;

        let mut response = rx
            .await
            .map_err(|_| self.lost("connection closed before the response arrived"))?;
        response.request_id = caller_id;
        Ok(response)
    }

    async fn send_oneway(&self, mut request: Request) -> Result<(), TransportError> {
        if !self.is_healthy() {
            return Err(self.lost("connection is closed"));
        }
        request.request_id = self.ids.next();
        self.write(&request).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.shared.healthy.store(false, Ordering::Release);

        let result = self.writer.lock().await.shutdown().await;
        self.reader.abort();
        self.shared.pending.fail_all();

        #[cfg(feature = "observability")]
        debug!(address = %self.remote, "Connection closed");

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(TransportError::write_failed(self.remote.to_string(), e)),
        }
    }
}

impl<K> Drop for TcpConnection<K> {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl<K> fmt::Debug for TcpConnection<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpConnection")
            .field("remote", &self.remote)
            .field("local_addr", &self.local_addr)
            .field("healthy", &self.shared.healthy.load(Ordering::Relaxed))
            .field("in_flight", &self.shared.pending.len())
            .finish()
    }
}

async fn read_responses<K>(
    mut reader: OwnedReadHalf,
    codec: Arc<K>,
    shared: Arc<Shared>,
    remote: RemoteAddress,
) where
    K: Codec<Response>,
{
    let mut buffer = Vec::with_capacity(READ_CHUNK);
    let mut chunk = vec![0u8; READ_CHUNK];

    'read: loop {
        loop {
            match <K as Codec<Response>>::decode(&codec, &mut buffer) {
                Ok(Decoded::Item(response)) => {
                    let _id = response.request_id;
                    if !shared.pending.complete(response.request_id, response) {
                        #[cfg(feature = "observability")]
                        debug!(address = %remote, request_id = _id, "Discarding response nobody is waiting for");
                    }
                }
                Ok(Decoded::NeedMoreData) => break,
                Err(_e) => {
                    #[cfg(feature = "observability")]
                    warn!(address = %remote, error = %_e, "Malformed response frame, dropping connection");
                    break 'read;
                }
            }
        }

        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            Err(_e) => {
                #[cfg(feature = "observability")]
                debug!(address = %remote, error = %_e, "Read failed");
                break;
            }
        }
    }

    shared.healthy.store(false, Ordering::Release);
    let _abandoned = shared.pending.fail_all();

    #[cfg(feature = "observability")]
    debug!(address = %remote, abandoned = _abandoned, "Connection reader finished");
    #[cfg(not(feature = "observability"))]
    let _ = remote;
}

struct Bound {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
}

/// A listening TCP transport.
///
/// # Examples
///
/// ```rust,no_run
/// use rpcore::invoke::{Request, Response};
/// use rpcore::transport::{Dispatcher, ServerTransport, TcpServerTransport};
/// use std::sync::Arc;
///
/// struct Echo;
///
/// #[async_trait::async_trait]
/// impl Dispatcher for Echo {
///     async fn dispatch(&self, request: Request) -> Response {
///         Response::ok(request.request_id, request.body)
///     }
/// }
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = TcpServerTransport::new("127.0.0.1:0".parse()?);
/// transport.bind(Arc::new(Echo)).await?;
/// println!("listening on {:?}", transport.local_addr());
/// transport.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct TcpServerTransport<K = JsonFrameCodec> {
    address: RemoteAddress,
    codec: Arc<K>,
    workers: Option<Arc<dyn WorkerPool>>,
    bound: Mutex<Option<Bound>>,
}

impl TcpServerTransport<JsonFrameCodec> {
    /// Creates an unbound transport for `address` using [`JsonFrameCodec`].
    pub fn new(address: RemoteAddress) -> Self {
        Self::with_codec(address, JsonFrameCodec)
    }
}

impl<K> TcpServerTransport<K> {
    /// Creates an unbound transport for `address` using `codec`.
    pub fn with_codec(address: RemoteAddress, codec: K) -> Self {
        Self {
            address,
            codec: Arc::new(codec),
            workers: None,
            bound: Mutex::new(None),
        }
    }

    /// Dispatches requests on `pool` instead of plain tasks.
    #[must_use]
    pub fn with_worker_pool(mut self, pool: Arc<dyn WorkerPool>) -> Self {
        self.workers = Some(pool);
        self
    }

    /// The configured address.
    pub fn address(&self) -> &RemoteAddress {
        &self.address
    }
}

#[async_trait]
impl<K> ServerTransport for TcpServerTransport<K>
where
    K: Codec<Request> + Codec<Response>,
{
    async fn bind(&self, dispatcher: Arc<dyn Dispatcher>) -> Result<(), TransportError> {
        if self.bound.lock().is_some() {
            return Ok(());
        }

        let listener = TcpListener::bind(self.address.authority())
            .await
            .map_err(|e| TransportError::bind_failed(self.address.to_string(), e))?;
        let local_addr = listener.local_addr()?;

        #[cfg(feature = "observability")]
        info!(address = %self.address, local_addr = %local_addr, "Listening");

        let (shutdown, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(accept_loop(
            listener,
            dispatcher,
            self.codec.clone(),
            self.workers.clone(),
            shutdown_rx,
        ));

        *self.bound.lock() = Some(Bound {
            local_addr,
            shutdown,
            accept_task,
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        let Some(bound) = self.bound.lock().take() else {
            return Ok(());
        };

        bound.shutdown.send_replace(true);
        let _ = bound.accept_task.await;

        #[cfg(feature = "observability")]
        info!(address = %self.address, "Listener closed");
        Ok(())
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.bound.lock().as_ref().map(|b| b.local_addr)
    }
}

impl<K> fmt::Debug for TcpServerTransport<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpServerTransport")
            .field("address", &self.address)
            .field("local_addr", &self.bound.lock().as_ref().map(|b| b.local_addr))
            .field("worker_pool", &self.workers.as_ref().map(|p| p.name().to_string()))
            .finish()
    }
}

async fn accept_loop<K>(
    listener: TcpListener,
    dispatcher: Arc<dyn Dispatcher>,
    codec: Arc<K>,
    workers: Option<Arc<dyn WorkerPool>>,
    mut shutdown: watch::Receiver<bool>,
) where
    K: Codec<Request> + Codec<Response>,
{
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _peer)) => {
                    #[cfg(feature = "observability")]
                    debug!(peer = %_peer, "Accepted connection");
                    let _ = stream.set_nodelay(true);
                    connections.spawn(serve_connection(
                        stream,
                        dispatcher.clone(),
                        codec.clone(),
                        workers.clone(),
                        shutdown.clone(),
                    ));
                }
                Err(_e) => {
                    #[cfg(feature = "observability")]
                    warn!(error = %_e, "Accept failed");
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    connections.shutdown().await;
}

async fn serve_connection<K>(
    stream: TcpStream,
    dispatcher: Arc<dyn Dispatcher>,
    codec: Arc<K>,
    workers: Option<Arc<dyn WorkerPool>>,
    mut shutdown: watch::Receiver<bool>,
) where
    K: Codec<Request> + Codec<Response>,
{
    let (mut reader, writer) = stream.into_split();
    let writer = Arc::new(AsyncMutex::new(writer));
    let mut buffer = Vec::with_capacity(READ_CHUNK);
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        loop {
            match <K as Codec<Request>>::decode(&codec, &mut buffer) {
                Ok(Decoded::Item(request)) => {
                    spawn_dispatch(request, &dispatcher, &codec, &writer, workers.as_ref());
                }
                Ok(Decoded::NeedMoreData) => break,
                Err(_e) => {
                    #[cfg(feature = "observability")]
                    warn!(error = %_e, "Malformed request frame, dropping connection");
                    return;
                }
            }
        }

        tokio::select! {
            _ = shutdown.changed() => return,
            read = reader.read(&mut chunk) => match read {
                Ok(0) | Err(_) => return,
                Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            },
        }
    }
}

fn spawn_dispatch<K>(
    request: Request,
    dispatcher: &Arc<dyn Dispatcher>,
    codec: &Arc<K>,
    writer: &Arc<AsyncMutex<OwnedWriteHalf>>,
    workers: Option<&Arc<dyn WorkerPool>>,
) where
    K: Codec<Request> + Codec<Response>,
{
    let oneway = request.is_oneway();
    let request_id = request.request_id;

    let task = {
        let dispatcher = dispatcher.clone();
        let codec = codec.clone();
        let writer = writer.clone();
        async move {
            let response = dispatcher.dispatch(request).await;
            if !oneway {
                write_response(&writer, &codec, &response).await;
            }
        }
    };

    match workers {
        None => {
            tokio::spawn(task);
        }
        Some(pool) => {
            if let Err(_e) = pool.submit(Box::pin(task)) {
                #[cfg(feature = "observability")]
                warn!(pool = pool.name(), error = %_e, "Worker pool rejected request");
                if !oneway {
                    let codec = codec.clone();
                    let writer = writer.clone();
                    tokio::spawn(async move {
                        let response = Response::framework_error(
                            request_id,
                            FrameworkCode::ServerOverload,
                            "server is overloaded",
                        );
                        write_response(&writer, &codec, &response).await;
                    });
                }
            }
        }
    }
}

async fn write_response<K>(writer: &AsyncMutex<OwnedWriteHalf>, codec: &Arc<K>, response: &Response)
where
    K: Codec<Response>,
{
    let mut frame = Vec::new();
    if let Err(_e) = <K as Codec<Response>>::encode(codec, response, &mut frame) {
        #[cfg(feature = "observability")]
        warn!(request_id = response.request_id, error = %_e, "Failed to encode response");
        return;
    }
    if let Err(_e) = writer.lock().await.write_all(&frame).await {
        #[cfg(feature = "observability")]
        debug!(request_id = response.request_id, error = %_e, "Failed to write response");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FrameworkCode;
    use std::time::Duration;

    struct Echo;

    #[async_trait]
    impl Dispatcher for Echo {
        async fn dispatch(&self, request: Request) -> Response {
            if request.method == "slow" {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            if request.method == "missing" {
                return Response::framework_error(
                    request.request_id,
                    FrameworkCode::ServerNoFunction,
                    "no such method",
                );
            }
            Response::ok(request.request_id, request.body)
        }
    }

    async fn bound_echo() -> (TcpServerTransport, RemoteAddress) {
        let transport = TcpServerTransport::new("127.0.0.1:0".parse().unwrap());
        transport.bind(Arc::new(Echo)).await.unwrap();
        let address = RemoteAddress::from(transport.local_addr().unwrap());
        (transport, address)
    }

    #[tokio::test]
    async fn test_call_round_trip() {
        let (server, address) = bound_echo().await;
        let connection = TcpConnector::new().connect(&address).await.unwrap();

        let mut request = Request::new("echo", "say", b"ping".to_vec());
        request.request_id = 77;
        let response = connection.call(request).await.unwrap();

        assert_eq!(response.request_id, 77);
        assert_eq!(response.body, b"ping");
        assert_eq!(connection.in_flight(), 0);

        connection.close().await.unwrap();
        server.close().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_calls_are_multiplexed() {
        let (server, address) = bound_echo().await;
        let connection = Arc::new(TcpConnector::new().connect(&address).await.unwrap());

        let slow = {
            let connection = connection.clone();
            tokio::spawn(async move { connection.call(Request::new("echo", "slow", b"slow".to_vec())).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let fast = connection
            .call(Request::new("echo", "fast", b"fast".to_vec()))
            .await
            .unwrap();
        assert_eq!(fast.body, b"fast");
        assert!(!slow.is_finished());
        assert_eq!(slow.await.unwrap().unwrap().body, b"slow");

        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_abandoned_call_leaves_no_pending_entry() {
        let (server, address) = bound_echo().await;
        let connection = TcpConnector::new().connect(&address).await.unwrap();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            connection.call(Request::new("echo", "slow", Vec::new())),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(connection.in_flight(), 0);

        // The late response is discarded and the connection stays usable.
        tokio::time::sleep(Duration::from_millis(250)).await;
        let response = connection
            .call(Request::new("echo", "say", b"again".to_vec()))
            .await
            .unwrap();
        assert_eq!(response.body, b"again");

        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_framework_status_passes_through() {
        let (server, address) = bound_echo().await;
        let connection = TcpConnector::new().connect(&address).await.unwrap();
        let response = connection
            .call(Request::new("echo", "missing", Vec::new()))
            .await
            .unwrap();
        assert_eq!(response.framework_status(), FrameworkCode::ServerNoFunction);
        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_server_close_marks_connection_unhealthy() {
        let (server, address) = bound_echo().await;
        let connection = TcpConnector::new().connect(&address).await.unwrap();
        assert!(connection.is_healthy());

        server.close().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!connection.is_healthy());
        let err = connection
            .call(Request::new("echo", "say", Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::ConnectionLost { .. }));
    }

    #[tokio::test]
    async fn test_connect_refused_names_address() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = RemoteAddress::from(listener.local_addr().unwrap());
        drop(listener);

        let err = TcpConnector::new().connect(&address).await.unwrap_err();
        assert!(err.is_connect_failure());
        assert!(err.to_string().contains(&address.to_string()));
    }

    #[tokio::test]
    async fn test_second_bind_reports_address_in_use() {
        let (server, address) = bound_echo().await;
        let contender = TcpServerTransport::new(address);
        let err = contender.bind(Arc::new(Echo)).await.unwrap_err();
        assert!(matches!(err, TransportError::AddressInUse { .. }));
        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (server, address) = bound_echo().await;
        let connection = TcpConnector::new().connect(&address).await.unwrap();
        connection.close().await.unwrap();
        connection.close().await.unwrap();
        server.close().await.unwrap();
        server.close().await.unwrap();
        assert!(server.local_addr().is_none());
    }
}
