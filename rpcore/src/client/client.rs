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

//! RPC client bound to one destination.

use super::ClientInvoker;
use crate::error::{BoxError, FrameworkCode, RpcError};
use crate::future::{CloseFuture, CloseSignal};
use crate::lifecycle::{Lifecycle, LifecycleError, LifecycleHooks, LifecycleListener, LifecycleState};
use crate::pool::{ConnectionPool, PoolConfig};
use crate::transport::{Connector, RemoteAddress, TransportError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "observability")]
use tracing::{debug, info};

/// Lifecycle hooks of an [`RpcClient`].
pub(crate) struct ClientCore<C: Connector> {
    address: RemoteAddress,
    connector: C,
    config: PoolConfig,
    lazy: bool,
    pool: RwLock<ConnectionPool<C>>,
    closed: RwLock<CloseSignal>,
}

impl<C: Connector + Clone> ClientCore<C> {
    fn pool(&self) -> ConnectionPool<C> {
        self.pool.read().clone()
    }
}

#[async_trait]
impl<C: Connector + Clone> LifecycleHooks for ClientCore<C> {
    async fn on_start(&self) -> Result<(), BoxError> {
        // A client stopped earlier gets fresh resources when reopened.
        if self.pool.read().is_closed() {
            *self.pool.write() = ConnectionPool::new(self.connector.clone(), self.config.clone());
        }
        if self.closed.read().is_complete() {
            *self.closed.write() = CloseSignal::new();
        }

        let pool = self.pool();
        pool.start_idle_sweeper();

        if !self.lazy {
            let connection = pool.acquire(&self.address).await?;
            pool.release(&connection);
        }

        #[cfg(feature = "observability")]
        info!(address = %self.address, lazy = self.lazy, "Client opened");
        Ok(())
    }

    async fn on_stop(&self) -> Result<(), BoxError> {
        self.pool().close().await;
        self.closed.read().complete();

        #[cfg(feature = "observability")]
        debug!(address = %self.address, "Client closed");
        Ok(())
    }
}

/// A client for one destination address.
///
/// `open` and `close` drive the embedded [`Lifecycle`]; the client owns a
/// [`ConnectionPool`] for its destination and mints [`ClientInvoker`]s that
/// borrow connections from it.
///
/// # Examples
///
/// ```rust,no_run
/// use rpcore::client::RpcClient;
/// use rpcore::pool::PoolConfig;
/// use rpcore::transport::TcpConnector;
///
/// # async fn example() -> Result<(), rpcore::RpcError> {
/// let client = RpcClient::new(
///     "tcp://127.0.0.1:9000".parse().unwrap(),
///     TcpConnector::new(),
///     PoolConfig::default(),
/// );
/// client.open().await?;
/// let invoker = client.create_invoker("greeter");
/// // ... orchestrator.invoke_async(Arc::new(invoker), request, timeout) ...
/// client.close().await?;
/// client.close_future().await;
/// # Ok(())
/// # }
/// ```
pub struct RpcClient<C: Connector> {
    lifecycle: Arc<Lifecycle<ClientCore<C>>>,
}

impl<C: Connector> Clone for RpcClient<C> {
    fn clone(&self) -> Self {
        Self {
            lifecycle: self.lifecycle.clone(),
        }
    }
}

impl<C: Connector + Clone> RpcClient<C> {
    /// Creates a lazily connecting client.
    pub fn new(address: RemoteAddress, connector: C, config: PoolConfig) -> Self {
        Self::with_lazy(address, connector, config, true)
    }

    /// Creates a client that connects eagerly on open when `lazy` is `false`.
    pub fn with_lazy(address: RemoteAddress, connector: C, config: PoolConfig, lazy: bool) -> Self {
        let name = format!("client:{}", address);
        let pool = ConnectionPool::new(connector.clone(), config.clone());
        Self {
            lifecycle: Arc::new(Lifecycle::new(
                name,
                ClientCore {
                    address,
                    connector,
                    config,
                    lazy,
                    pool: RwLock::new(pool),
                    closed: RwLock::new(CloseSignal::new()),
                },
            )),
        }
    }

    /// The destination.
    pub fn address(&self) -> &RemoteAddress {
        &self.lifecycle.hooks().address
    }

    /// The pool backing this client.
    pub fn pool(&self) -> ConnectionPool<C> {
        self.lifecycle.hooks().pool()
    }

    /// Opens the client.
    ///
    /// # Errors
    ///
    /// [`RpcError::Transport`] naming the destination when an eager connect
    /// fails, [`RpcError::Framework`] for other start failures, or
    /// [`RpcError::Lifecycle`] for an invalid transition.
    pub async fn open(&self) -> Result<(), RpcError> {
        self.lifecycle
            .start()
            .await
            .map_err(|e| classify_open_error(e, self.address()))
    }

    /// Closes the client and every pooled connection.
    ///
    /// # Errors
    ///
    /// [`RpcError::Lifecycle`] if the stop hook fails.
    pub async fn close(&self) -> Result<(), RpcError> {
        self.lifecycle.stop().await.map_err(RpcError::from)
    }

    /// Returns `true` while the client is started.
    pub fn is_available(&self) -> bool {
        self.lifecycle.state() == LifecycleState::Started
    }

    /// Returns `true` once the client failed or began closing.
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
    /// [`LifecycleError::ListenerRejected`] once the client began starting.
    pub fn add_listener(&self, listener: Arc<dyn LifecycleListener>) -> Result<(), LifecycleError> {
        self.lifecycle.add_listener(listener)
    }

    /// Creates an invoker calling `service` through this client.
    pub fn create_invoker(&self, service: impl Into<String>) -> ClientInvoker<C> {
        ClientInvoker::new(self.clone(), service.into())
    }

    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.lifecycle, &other.lifecycle)
    }
}

fn classify_open_error(error: LifecycleError, address: &RemoteAddress) -> RpcError {
    let Some(cause) = error.cause() else {
        return RpcError::Lifecycle(error);
    };

    let transport = cause.downcast_ref::<TransportError>().cloned().or_else(|| {
        match cause.downcast_ref::<RpcError>() {
            Some(RpcError::Transport(e)) => Some(e.clone()),
            _ => None,
        }
    });

    match transport {
        Some(e) if e.is_connect_failure() || matches!(e, TransportError::Timeout { .. }) => {
            RpcError::Transport(e)
        }
        _ => RpcError::framework(
            FrameworkCode::Unknown,
            format!("failed to open client to {}: {}", address, error),
        ),
    }
}

impl<C: Connector + Clone> fmt::Debug for RpcClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcClient")
            .field("address", &self.lifecycle.hooks().address)
            .field("state", &self.lifecycle.state())
            .finish()
    }
}
