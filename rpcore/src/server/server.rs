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

//! A listening server hosting services.

use super::registry::RegistryInner;
use super::{ProviderRegistry, ServerKey, ServiceHandler};
use crate::error::{BoxError, FrameworkCode, RpcError};
use crate::future::{CloseFuture, CloseSignal};
use crate::lifecycle::{Lifecycle, LifecycleError, LifecycleHooks, LifecycleListener, LifecycleState};
use crate::transport::{Dispatcher, ServerTransport, TransportError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

#[cfg(feature = "observability")]
use tracing::{info, warn};

/// Lifecycle hooks of an [`RpcServer`].
pub(crate) struct ServerCore {
    key: ServerKey,
    transport: Arc<dyn ServerTransport>,
    providers: Arc<ProviderRegistry>,
    registry: Option<Weak<RegistryInner>>,
    closed: RwLock<CloseSignal>,
}

#[async_trait]
impl LifecycleHooks for ServerCore {
    async fn on_start(&self) -> Result<(), BoxError> {
        if self.closed.read().is_complete() {
            *self.closed.write() = CloseSignal::new();
        }
        let dispatcher: Arc<dyn Dispatcher> = self.providers.clone();
        self.transport.bind(dispatcher).await?;

        #[cfg(feature = "observability")]
        info!(
            server = %self.key,
            local_addr = ?self.transport.local_addr(),
            services = ?self.providers.services(),
            "Server started"
        );
        Ok(())
    }

    async fn on_stop(&self) -> Result<(), BoxError> {
        let released = self.transport.close().await;
        #[cfg(feature = "observability")]
        if let Err(e) = &released {
            warn!(server = %self.key, error = %e, "Failed to release server transport");
        }

        if let Some(registry) = self.registry.as_ref().and_then(Weak::upgrade) {
            registry.remove_server(&self.key, self);
        }
        self.closed.read().complete();

        #[cfg(feature = "observability")]
        info!(server = %self.key, "Server stopped");
        released.map_err(Into::into)
    }
}

/// A server listening on one address for one protocol.
///
/// Services are added through [`register`](Self::register) before or after
/// opening. Closing releases the listener, removes the server from the
/// [`ServerRegistry`](super::ServerRegistry) that created it and settles the
/// [`close_future`](Self::close_future), in that order.
///
/// # Examples
///
/// ```rust,no_run
/// use rpcore::invoke::Request;
/// use rpcore::server::{MethodRouter, RpcServer, ServerKey};
/// use rpcore::transport::TcpServerTransport;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), rpcore::RpcError> {
/// let key = ServerKey::new("tcp://127.0.0.1:9000".parse().unwrap(), "json");
/// let server = RpcServer::new(key.clone(), Arc::new(TcpServerTransport::new(key.address.clone())));
/// server.register(Arc::new(
///     MethodRouter::new("demo.Echo").route("echo", |r: Request| async move { Ok(r.body) }),
/// ));
/// server.open().await?;
/// // ...
/// server.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RpcServer {
    lifecycle: Arc<Lifecycle<ServerCore>>,
}

impl RpcServer {
    /// Creates a standalone server.
    pub fn new(key: ServerKey, transport: Arc<dyn ServerTransport>) -> Self {
        Self::build(key, transport, Arc::new(ProviderRegistry::new()), None)
    }

    pub(crate) fn registered(
        key: ServerKey,
        transport: Arc<dyn ServerTransport>,
        providers: Arc<ProviderRegistry>,
        registry: Weak<RegistryInner>,
    ) -> Self {
        Self::build(key, transport, providers, Some(registry))
    }

    fn build(
        key: ServerKey,
        transport: Arc<dyn ServerTransport>,
        providers: Arc<ProviderRegistry>,
        registry: Option<Weak<RegistryInner>>,
    ) -> Self {
        Self {
            lifecycle: Arc::new(Lifecycle::new(
                format!("server:{}", key),
                ServerCore {
                    key,
                    transport,
                    providers,
                    registry,
                    closed: RwLock::new(CloseSignal::new()),
                },
            )),
        }
    }

    /// The server identity.
    pub fn key(&self) -> &ServerKey {
        &self.lifecycle.hooks().key
    }

    /// The services hosted here.
    pub fn providers(&self) -> &Arc<ProviderRegistry> {
        &self.lifecycle.hooks().providers
    }

    /// Hosts a service.
    pub fn register(&self, handler: Arc<dyn ServiceHandler>) {
        self.providers().register(handler);
    }

    /// Hosts a service with a per-call time limit.
    pub fn register_with_timeout(&self, handler: Arc<dyn ServiceHandler>, timeout: Option<Duration>) {
        self.providers().register_with_timeout(handler, timeout);
    }

    /// The bound address while open.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lifecycle.hooks().transport.local_addr()
    }

    /// Binds and starts serving.
    ///
    /// # Errors
    ///
    /// [`RpcError::Transport`] when the address cannot be bound,
    /// [`RpcError::Lifecycle`] for an invalid transition.
    pub async fn open(&self) -> Result<(), RpcError> {
        self.lifecycle.start().await.map_err(|e| {
            match e.cause().and_then(|cause| cause.downcast_ref::<TransportError>()) {
                Some(transport) => RpcError::Transport(transport.clone()),
                None if e.cause().is_some() => RpcError::framework(
                    FrameworkCode::ServerSystem,
                    format!("failed to open server {}: {}", self.key(), e),
                ),
                None => RpcError::Lifecycle(e),
            }
        })
    }

    /// Stops serving.
    ///
    /// # Errors
    ///
    /// [`RpcError::Lifecycle`] when releasing the transport failed; the
    /// server is still removed from its registry and its close future
    /// settles.
    pub async fn close(&self) -> Result<(), RpcError> {
        self.lifecycle.stop().await.map_err(RpcError::from)
    }

    /// Returns `true` while serving.
    pub fn is_available(&self) -> bool {
        self.lifecycle.state() == LifecycleState::Started
    }

    /// Returns `true` once the server failed or began closing.
    pub fn is_closed(&self) -> bool {
        self.lifecycle.state().is_closed()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Settles when the current close has finished.
    pub fn close_future(&self) -> CloseFuture {
        self.lifecycle.hooks().closed.read().future()
    }

    /// Observes lifecycle transitions.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::ListenerRejected`] once the server began starting.
    pub fn add_listener(&self, listener: Arc<dyn LifecycleListener>) -> Result<(), LifecycleError> {
        self.lifecycle.add_listener(listener)
    }

    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.lifecycle, &other.lifecycle)
    }

    pub(crate) fn owns(&self, core: &ServerCore) -> bool {
        std::ptr::eq(self.lifecycle.hooks(), core)
    }
}

impl fmt::Debug for RpcServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcServer")
            .field("key", self.key())
            .field("state", &self.state())
            .field("local_addr", &self.local_addr())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoke::Request;
    use crate::server::MethodRouter;
    use crate::transport::{Connection, Connector, RemoteAddress, TcpConnector, TcpServerTransport};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::net::TcpListener;

    struct FailingClose {
        inner: TcpServerTransport,
        fail: AtomicBool,
    }

    #[async_trait]
    impl ServerTransport for FailingClose {
        async fn bind(&self, dispatcher: Arc<dyn Dispatcher>) -> Result<(), TransportError> {
            self.inner.bind(dispatcher).await
        }

        async fn close(&self) -> Result<(), TransportError> {
            self.inner.close().await?;
            if self.fail.load(Ordering::SeqCst) {
                return Err(TransportError::Closed {
                    address: self.inner.address().to_string(),
                });
            }
            Ok(())
        }

        fn local_addr(&self) -> Option<SocketAddr> {
            self.inner.local_addr()
        }
    }

    fn local_key() -> ServerKey {
        ServerKey::new(RemoteAddress::new("127.0.0.1", 0), "json")
    }

    #[tokio::test]
    async fn test_serves_registered_service() {
        let key = local_key();
        let server = RpcServer::new(key.clone(), Arc::new(TcpServerTransport::new(key.address.clone())));
        server.register(Arc::new(
            MethodRouter::new("echo").route("say", |r: Request| async move { Ok(r.body) }),
        ));
        server.open().await.unwrap();
        assert!(server.is_available());

        let address = RemoteAddress::from(server.local_addr().unwrap());
        let connection = TcpConnector::new().connect(&address).await.unwrap();
        let response = connection.call(Request::new("echo", "say", b"ping".to_vec())).await.unwrap();
        assert_eq!(response.body, b"ping");

        server.close().await.unwrap();
        assert!(server.local_addr().is_none());
        assert!(server.close_future().is_done());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_transport_error() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = RemoteAddress::from(occupied.local_addr().unwrap());
        let key = ServerKey::new(address.clone(), "json");
        let server = RpcServer::new(key, Arc::new(TcpServerTransport::new(address)));

        let err = server.open().await.unwrap_err();
        assert!(matches!(err, RpcError::Transport(TransportError::AddressInUse { .. })));
        assert!(server.state().is_closed());
    }

    #[tokio::test]
    async fn test_failed_release_still_settles_close_future() {
        let key = local_key();
        let transport = Arc::new(FailingClose {
            inner: TcpServerTransport::new(key.address.clone()),
            fail: AtomicBool::new(true),
        });
        let server = RpcServer::new(key, transport);
        server.open().await.unwrap();

        assert!(server.close().await.is_err());
        assert_eq!(server.state(), LifecycleState::Failed);
        assert!(server.close_future().is_done());
    }

    #[tokio::test]
    async fn test_reopen_after_close() {
        let key = local_key();
        let server = RpcServer::new(key.clone(), Arc::new(TcpServerTransport::new(key.address.clone())));
        server.open().await.unwrap();
        server.close().await.unwrap();

        server.open().await.unwrap();
        assert!(server.local_addr().is_some());
        assert!(!server.close_future().is_done());
        server.close().await.unwrap();
    }
}
