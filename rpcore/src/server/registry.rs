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

//! Process-wide set of servers keyed by bind address and protocol.

use super::server::ServerCore;
use super::{ProviderRegistry, RpcServer};
use crate::error::RpcError;
use crate::transport::{RemoteAddress, ServerTransport};
use futures_util::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(feature = "observability")]
use tracing::{info, warn};

/// Identity of a server: where it listens and what it speaks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerKey {
    /// Bind address
    pub address: RemoteAddress,
    /// Protocol name
    pub protocol: String,
}

impl ServerKey {
    /// Creates a key.
    pub fn new(address: RemoteAddress, protocol: impl Into<String>) -> Self {
        Self {
            address,
            protocol: protocol.into(),
        }
    }
}

impl fmt::Display for ServerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.protocol, self.address)
    }
}

pub(crate) struct RegistryInner {
    servers: Mutex<HashMap<ServerKey, RpcServer>>,
    closed: AtomicBool,
}

impl RegistryInner {
    /// Forgets the server owning `core` if it is still the one registered
    /// under `key`.
    pub(crate) fn remove_server(&self, key: &ServerKey, core: &ServerCore) {
        let mut servers = self.servers.lock();
        if servers.get(key).is_some_and(|current| current.owns(core)) {
            servers.remove(key);
        }
    }
}

/// Registry of [`RpcServer`]s.
///
/// At most one server exists per [`ServerKey`]. Once [`close_all`] ran the
/// registry refuses new servers until [`reset`].
///
/// [`close_all`]: ServerRegistry::close_all
/// [`reset`]: ServerRegistry::reset
///
/// # Examples
///
/// ```rust
/// use rpcore::server::{ServerKey, ServerRegistry};
/// use rpcore::transport::TcpServerTransport;
/// use std::sync::Arc;
///
/// let registry = ServerRegistry::new();
/// let key = ServerKey::new("tcp://127.0.0.1:0".parse().unwrap(), "json");
///
/// let first = registry
///     .get_or_create(key.clone(), |key| Arc::new(TcpServerTransport::new(key.address.clone())))
///     .unwrap();
/// let again = registry
///     .get_or_create(key.clone(), |_| unreachable!())
///     .unwrap();
/// assert_eq!(first.key(), again.key());
/// assert_eq!(registry.len(), 1);
/// ```
#[derive(Clone)]
pub struct ServerRegistry {
    inner: Arc<RegistryInner>,
}

impl ServerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                servers: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the server for `key`, creating it with a transport from
    /// `make_transport` when absent. The server is not opened.
    ///
    /// # Errors
    ///
    /// [`RpcError::RegistryClosed`] after [`close_all`](Self::close_all).
    pub fn get_or_create<F>(&self, key: ServerKey, make_transport: F) -> Result<RpcServer, RpcError>
    where
        F: FnOnce(&ServerKey) -> Arc<dyn ServerTransport>,
    {
        let mut servers = self.inner.servers.lock();
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(RpcError::RegistryClosed { key: key.to_string() });
        }
        if let Some(server) = servers.get(&key) {
            return Ok(server.clone());
        }

        let transport = make_transport(&key);
        let server = RpcServer::registered(
            key.clone(),
            transport,
            Arc::new(ProviderRegistry::new()),
            Arc::downgrade(&self.inner),
        );
        servers.insert(key, server.clone());
        Ok(server)
    }

    /// The server registered under `key`.
    pub fn get(&self, key: &ServerKey) -> Option<RpcServer> {
        self.inner.servers.lock().get(key).cloned()
    }

    /// Forgets the server under `key` without closing it.
    pub fn remove(&self, key: &ServerKey) -> Option<RpcServer> {
        self.inner.servers.lock().remove(key)
    }

    /// Every registered server.
    pub fn servers(&self) -> Vec<RpcServer> {
        self.inner.servers.lock().values().cloned().collect()
    }

    /// Number of registered servers.
    pub fn len(&self) -> usize {
        self.inner.servers.lock().len()
    }

    /// Returns `true` when no server is registered.
    pub fn is_empty(&self) -> bool {
        self.inner.servers.lock().is_empty()
    }

    /// Returns `true` after [`close_all`](Self::close_all).
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Closes every server and refuses new ones. Only the first call does
    /// anything; failures are logged and the first one is returned.
    ///
    /// # Errors
    ///
    /// The first server close failure.
    pub async fn close_all(&self) -> Result<(), RpcError> {
        let drained: Vec<RpcServer> = {
            let mut servers = self.inner.servers.lock();
            if self.inner.closed.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
            servers.drain().map(|(_, server)| server).collect()
        };

        #[cfg(feature = "observability")]
        info!(servers = drained.len(), "Closing servers");

        let results = join_all(drained.iter().map(|server| server.close())).await;
        let mut first = None;
        for (_server, result) in drained.iter().zip(results) {
            if let Err(e) = result {
                #[cfg(feature = "observability")]
                warn!(server = %_server.key(), error = %e, "Server failed to close");
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Accepts new servers again after [`close_all`](Self::close_all).
    pub fn reset(&self) {
        self.inner.closed.store(false, Ordering::Release);
    }
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerRegistry")
            .field("servers", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TcpServerTransport;

    fn key(port: u16) -> ServerKey {
        ServerKey::new(RemoteAddress::new("127.0.0.1", port), "json")
    }

    fn tcp(key: &ServerKey) -> Arc<dyn ServerTransport> {
        Arc::new(TcpServerTransport::new(key.address.clone()))
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_yields_one_server() {
        let registry = ServerRegistry::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get_or_create(key(0), tcp).unwrap() })
            })
            .collect();

        let mut servers = Vec::new();
        for handle in handles {
            servers.push(handle.await.unwrap());
        }
        assert!(servers.windows(2).all(|pair| pair[0].ptr_eq(&pair[1])));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_protocol_is_part_of_the_key() {
        let registry = ServerRegistry::new();
        registry.get_or_create(key(0), tcp).unwrap();
        registry
            .get_or_create(ServerKey::new(RemoteAddress::new("127.0.0.1", 0), "other"), tcp)
            .unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_closed_registry_refuses_until_reset() {
        let registry = ServerRegistry::new();
        let server = registry.get_or_create(key(0), tcp).unwrap();
        server.open().await.unwrap();

        registry.close_all().await.unwrap();
        assert!(registry.is_empty());
        assert!(server.is_closed());
        assert!(matches!(
            registry.get_or_create(key(0), tcp),
            Err(RpcError::RegistryClosed { .. })
        ));

        // second close is a no-op
        registry.close_all().await.unwrap();

        registry.reset();
        let fresh = registry.get_or_create(key(0), tcp).unwrap();
        assert!(!fresh.ptr_eq(&server));
    }

    #[tokio::test]
    async fn test_closed_server_leaves_the_registry() {
        let registry = ServerRegistry::new();
        let server = registry.get_or_create(key(0), tcp).unwrap();
        server.open().await.unwrap();
        server.close().await.unwrap();

        assert!(registry.get(&key(0)).is_none());
    }

    #[tokio::test]
    async fn test_stale_server_does_not_evict_replacement() {
        let registry = ServerRegistry::new();
        let stale = registry.get_or_create(key(0), tcp).unwrap();
        registry.remove(&key(0));
        let replacement = registry.get_or_create(key(0), tcp).unwrap();

        stale.open().await.unwrap();
        stale.close().await.unwrap();
        assert!(registry.get(&key(0)).is_some_and(|s| s.ptr_eq(&replacement)));
    }
}
