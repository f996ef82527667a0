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

//! Process-wide set of clients, one per destination.

use super::{BackendConfig, RpcClient};
use crate::error::RpcError;
use crate::transport::{Connector, RemoteAddress};
use futures_util::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "observability")]
use tracing::{debug, info};

/// Keeps at most one [`RpcClient`] per destination.
///
/// [`get_or_create`](Self::get_or_create) inserts the client under the map
/// lock, so concurrent callers for the same destination share one instance;
/// opening runs outside the lock and is serialized by the client's own
/// lifecycle. The first caller's backend settings decide the pool
/// configuration of a destination.
pub struct ClientCluster<C: Connector> {
    connector: C,
    clients: Mutex<HashMap<RemoteAddress, RpcClient<C>>>,
    closed: AtomicBool,
}

impl<C: Connector + Clone> ClientCluster<C> {
    /// Creates an empty cluster dialing through `connector`.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            clients: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the open client for `address`, creating and opening it if
    /// needed.
    ///
    /// # Errors
    ///
    /// [`RpcError::RegistryClosed`] after [`close_all`](Self::close_all), or
    /// the client's open error. A client that failed to open is dropped from
    /// the cluster so the next call starts over.
    pub async fn get_or_create(
        &self,
        address: &RemoteAddress,
        backend: &BackendConfig,
    ) -> Result<RpcClient<C>, RpcError> {
        let client = {
            let mut clients = self.clients.lock();
            if self.closed.load(Ordering::Acquire) {
                return Err(RpcError::RegistryClosed {
                    key: address.to_string(),
                });
            }
            clients
                .entry(address.clone())
                .or_insert_with(|| {
                    #[cfg(feature = "observability")]
                    debug!(address = %address, backend = %backend.name, "Creating client");
                    RpcClient::with_lazy(
                        address.clone(),
                        self.connector.clone(),
                        backend.pool.clone(),
                        backend.lazy,
                    )
                })
                .clone()
        };

        if client.is_available() {
            return Ok(client);
        }
        if let Err(e) = client.open().await {
            let mut clients = self.clients.lock();
            if clients.get(address).is_some_and(|current| current.ptr_eq(&client)) {
                clients.remove(address);
            }
            return Err(e);
        }
        Ok(client)
    }

    /// Looks up the client for `address` without creating one.
    pub fn get(&self, address: &RemoteAddress) -> Option<RpcClient<C>> {
        self.clients.lock().get(address).cloned()
    }

    /// Number of clients.
    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    /// Returns `true` when the cluster holds no client.
    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }

    /// Closes every client concurrently and refuses new ones. Returns once
    /// every close has finished; close failures are logged.
    pub async fn close_all(&self) {
        let clients: Vec<_> = {
            let mut clients = self.clients.lock();
            if self.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            clients.drain().map(|(_, client)| client).collect()
        };

        #[cfg(feature = "observability")]
        info!(clients = clients.len(), "Closing client cluster");

        join_all(clients.iter().map(|client| async move {
            if let Err(_e) = client.close().await {
                #[cfg(feature = "observability")]
                tracing::warn!(address = %client.address(), error = %_e, "Error closing client");
            }
        }))
        .await;
    }

    /// Returns `true` once [`close_all`](Self::close_all) has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Accepts new clients again after [`close_all`](Self::close_all).
    pub fn reset(&self) {
        self.closed.store(false, Ordering::Release);
    }
}

impl<C: Connector + Clone> fmt::Debug for ClientCluster<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCluster")
            .field("clients", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TcpConnector;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_same_destination_shares_one_client() {
        let cluster = Arc::new(ClientCluster::new(TcpConnector::new()));
        let backend = BackendConfig::new("b", "svc");
        let address = RemoteAddress::new("127.0.0.1", 1);

        let (a, b) = tokio::join!(
            cluster.get_or_create(&address, &backend),
            cluster.get_or_create(&address, &backend)
        );
        assert!(a.unwrap().ptr_eq(&b.unwrap()));
        assert_eq!(cluster.len(), 1);

        cluster.close_all().await;
        assert!(cluster.is_empty());
        assert!(matches!(
            cluster.get_or_create(&address, &backend).await,
            Err(RpcError::RegistryClosed { .. })
        ));

        cluster.reset();
        assert!(cluster.get_or_create(&address, &backend).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_open_is_not_kept() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = RemoteAddress::from(listener.local_addr().unwrap());
        drop(listener);

        let cluster = ClientCluster::new(TcpConnector::new());
        let eager = BackendConfig::new("b", "svc").with_lazy(false);
        assert!(cluster.get_or_create(&address, &eager).await.is_err());
        assert!(cluster.get(&address).is_none());
    }
}
