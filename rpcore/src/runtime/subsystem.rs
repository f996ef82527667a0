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

//! The collaborators driven by the [`ConfigManager`](super::ConfigManager).
//!
//! Each start step of the manager calls into one of these traits, and each
//! stop step calls the mirror operation. Tests substitute recording doubles;
//! production code uses [`DefaultClientSubsystem`] and
//! [`DefaultServerSubsystem`].

use super::{GlobalConfig, Selector, ServiceConfig, StaticSelector, WorkerPoolManager};
use crate::client::{BackendConfig, ClientCluster, ServiceProxy};
use crate::error::RpcError;
use crate::server::{RpcServer, ServerKey, ServerRegistry, ServiceHandler};
use crate::transport::{Connector, ServerTransport, TcpServerTransport};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "observability")]
use tracing::{debug, info, warn};

/// Notified first when the process starts.
pub trait StartupListener: Send + Sync + 'static {
    /// Called with the configuration as loaded, before defaults apply.
    ///
    /// # Errors
    ///
    /// Any error aborts startup.
    fn on_startup(&self, config: &GlobalConfig) -> Result<(), RpcError>;
}

impl<F> StartupListener for F
where
    F: Fn(&GlobalConfig) -> Result<(), RpcError> + Send + Sync + 'static,
{
    fn on_startup(&self, config: &GlobalConfig) -> Result<(), RpcError> {
        self(config)
    }
}

/// Pre-loads something expensive before traffic arrives. Failures are
/// logged, never fatal.
#[async_trait]
pub trait Warmup: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Performs the warmup.
    async fn warmup(&self) -> Result<(), RpcError>;
}

/// Business application hooks.
#[async_trait]
pub trait AppLifecycle: Send + Sync + 'static {
    /// Runs after plugins and warmup, before servers bind.
    async fn init(&self) -> Result<(), RpcError> {
        Ok(())
    }

    /// Runs after servers stopped accepting requests.
    async fn stop(&self) -> Result<(), RpcError> {
        Ok(())
    }
}

/// Service discovery registration.
#[async_trait]
pub trait ServiceRegistry: Send + Sync + 'static {
    /// Announces `services`.
    async fn register(&self, services: &[ServiceConfig]) -> Result<(), RpcError>;

    /// Withdraws `services`.
    async fn unregister(&self, services: &[ServiceConfig]) -> Result<(), RpcError>;
}

/// The consumer side of the process.
#[async_trait]
pub trait ClientSubsystem: Send + Sync + 'static {
    /// Prepares backends. Need not connect.
    async fn start(&self, config: &GlobalConfig) -> Result<(), RpcError>;

    /// Pre-resolves backends and opens eager connections.
    async fn warmup(&self) -> Result<(), RpcError> {
        Ok(())
    }

    /// Stops handing out proxies.
    async fn stop(&self) -> Result<(), RpcError>;

    /// Closes every client and connection.
    async fn close_cluster(&self) -> Result<(), RpcError>;
}

/// The provider side of the process.
#[async_trait]
pub trait ServerSubsystem: Send + Sync + 'static {
    /// The services exposed, for discovery registration.
    fn services(&self) -> Vec<ServiceConfig>;

    /// Binds every configured service.
    async fn start(&self, config: &GlobalConfig) -> Result<(), RpcError>;

    /// Closes every server.
    async fn stop(&self) -> Result<(), RpcError>;
}

/// Builds a [`ServiceProxy`] per configured backend over a shared
/// [`ClientCluster`].
///
/// Backends without an explicit selector resolve to a [`StaticSelector`]
/// over their `targets`.
pub struct DefaultClientSubsystem<C: Connector> {
    cluster: Arc<ClientCluster<C>>,
    backends: Vec<BackendConfig>,
    selectors: HashMap<String, Arc<dyn Selector>>,
    proxies: RwLock<HashMap<String, Arc<ServiceProxy<C>>>>,
}

impl<C: Connector + Clone> DefaultClientSubsystem<C> {
    /// Creates a subsystem dialing through `connector`.
    pub fn new(connector: C) -> Self {
        Self {
            cluster: Arc::new(ClientCluster::new(connector)),
            backends: Vec::new(),
            selectors: HashMap::new(),
            proxies: RwLock::new(HashMap::new()),
        }
    }

    /// Adds a backend.
    #[must_use]
    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backends.push(backend);
        self
    }

    /// Resolves the backend named `backend` through `selector`.
    #[must_use]
    pub fn with_selector(mut self, backend: impl Into<String>, selector: Arc<dyn Selector>) -> Self {
        self.selectors.insert(backend.into(), selector);
        self
    }

    /// The proxy of `backend`, once started.
    pub fn proxy(&self, backend: &str) -> Option<Arc<ServiceProxy<C>>> {
        self.proxies.read().get(backend).cloned()
    }

    /// The shared client cluster.
    pub fn cluster(&self) -> &Arc<ClientCluster<C>> {
        &self.cluster
    }
}

#[async_trait]
impl<C: Connector + Clone> ClientSubsystem for DefaultClientSubsystem<C> {
    async fn start(&self, config: &GlobalConfig) -> Result<(), RpcError> {
        self.cluster.reset();
        let mut proxies = HashMap::with_capacity(self.backends.len());
        for backend in &self.backends {
            let selector = self
                .selectors
                .get(&backend.name)
                .cloned()
                .unwrap_or_else(|| Arc::new(StaticSelector::new(backend.targets.clone())));
            let proxy = ServiceProxy::new(
                backend.clone(),
                selector,
                self.cluster.clone(),
                config.default_client_timeout(),
            )?;
            proxies.insert(backend.name.clone(), Arc::new(proxy));
        }

        #[cfg(feature = "observability")]
        info!(backends = proxies.len(), "Client subsystem started");
        *self.proxies.write() = proxies;
        Ok(())
    }

    async fn warmup(&self) -> Result<(), RpcError> {
        let proxies: Vec<_> = self.proxies.read().values().cloned().collect();
        let mut first = None;
        for proxy in proxies {
            if let Err(e) = proxy.warmup().await {
                #[cfg(feature = "observability")]
                warn!(backend = %proxy.backend().name, error = %e, "Backend warmup failed");
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }

    async fn stop(&self) -> Result<(), RpcError> {
        self.proxies.write().clear();
        #[cfg(feature = "observability")]
        debug!("Client subsystem stopped");
        Ok(())
    }

    async fn close_cluster(&self) -> Result<(), RpcError> {
        self.cluster.close_all().await;
        Ok(())
    }
}

impl<C: Connector + Clone> fmt::Debug for DefaultClientSubsystem<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.backends.iter().map(|b| b.name.as_str()).collect();
        f.debug_struct("DefaultClientSubsystem")
            .field("backends", &names)
            .field("cluster", &self.cluster)
            .finish()
    }
}

/// Hosts the configured services on TCP servers kept in a
/// [`ServerRegistry`].
///
/// Services sharing an address and protocol share one server. A service
/// naming a worker pool has its requests run on that pool.
pub struct DefaultServerSubsystem {
    registry: ServerRegistry,
    services: Vec<ServiceConfig>,
    handlers: HashMap<String, Arc<dyn ServiceHandler>>,
    workers: Arc<WorkerPoolManager>,
}

impl DefaultServerSubsystem {
    /// Creates a subsystem without services, drawing worker pools from
    /// `workers`.
    pub fn new(workers: Arc<WorkerPoolManager>) -> Self {
        Self {
            registry: ServerRegistry::new(),
            services: Vec::new(),
            handlers: HashMap::new(),
            workers,
        }
    }

    /// Exposes `handler` as configured by `service`.
    #[must_use]
    pub fn with_service(mut self, service: ServiceConfig, handler: Arc<dyn ServiceHandler>) -> Self {
        self.handlers.insert(service.name.clone(), handler);
        self.services.push(service);
        self
    }

    /// The registry holding the servers.
    pub fn registry(&self) -> &ServerRegistry {
        &self.registry
    }

    fn server_for(&self, service: &ServiceConfig) -> Result<RpcServer, RpcError> {
        service.validate().map_err(|reason| RpcError::Config { reason })?;
        if service.protocol != super::config::default_protocol() {
            return Err(RpcError::Config {
                reason: format!("service {}: unsupported protocol {}", service.name, service.protocol),
            });
        }
        let workers = match &service.worker_pool {
            Some(name) => Some(self.workers.get(name).ok_or_else(|| RpcError::Config {
                reason: format!("service {}: unknown worker pool {}", service.name, name),
            })?),
            None => None,
        };

        let key = ServerKey::new(service.address.clone(), service.protocol.clone());
        self.registry.get_or_create(key, |key| {
            let transport = TcpServerTransport::new(key.address.clone());
            let transport = match workers {
                Some(pool) => transport.with_worker_pool(pool),
                None => transport,
            };
            Arc::new(transport) as Arc<dyn ServerTransport>
        })
    }
}

#[async_trait]
impl ServerSubsystem for DefaultServerSubsystem {
    fn services(&self) -> Vec<ServiceConfig> {
        self.services.clone()
    }

    async fn start(&self, _config: &GlobalConfig) -> Result<(), RpcError> {
        self.registry.reset();
        let mut servers: Vec<RpcServer> = Vec::new();
        for service in &self.services {
            let handler = self.handlers.get(&service.name).cloned().ok_or_else(|| RpcError::Config {
                reason: format!("service {} has no handler", service.name),
            })?;
            let server = self.server_for(service)?;
            server.register_with_timeout(handler, service.timeout());
            if !servers.iter().any(|known| known.key() == server.key()) {
                servers.push(server);
            }
        }

        for server in &servers {
            server.open().await?;
        }

        #[cfg(feature = "observability")]
        info!(servers = servers.len(), services = self.services.len(), "Server subsystem started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), RpcError> {
        self.registry.close_all().await
    }
}

impl fmt::Debug for DefaultServerSubsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultServerSubsystem")
            .field("services", &self.services)
            .field("registry", &self.registry)
            .finish()
    }
}
