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

//! Service proxy: selection, timeout policy and backup requests for one
//! backend.

use super::{BackendConfig, ClientCluster};
use crate::error::RpcError;
use crate::invoke::{BackupResolver, InvocationOrchestrator, Invoker, Request, Response};
use crate::runtime::Selector;
use crate::transport::{Connector, RequestIdGenerator};
use futures_util::FutureExt;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "observability")]
use tracing::{debug, warn};

/// Calls one backend service.
///
/// Each call selects an instance, obtains its client from the shared
/// [`ClientCluster`] and runs the call through an
/// [`InvocationOrchestrator`]. The call timeout is, in order of precedence,
/// the request's own `timeout`, the backend's `timeout_ms`, then the process
/// default; the orchestrator then tightens it by the inherited link
/// deadline. When the backend configures a backup delay, a second instance
/// is selected and connected only if the backup leg is actually sent; a
/// backup instance that cannot be reached fails that leg, not the call.
///
/// # Examples
///
/// ```rust,no_run
/// use rpcore::client::{BackendConfig, ClientCluster, ServiceProxy};
/// use rpcore::invoke::Request;
/// use rpcore::runtime::StaticSelector;
/// use rpcore::transport::TcpConnector;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), rpcore::RpcError> {
/// let backend = BackendConfig::new("greeter", "demo.Greeter")
///     .with_timeout(Duration::from_millis(500));
/// let proxy = ServiceProxy::new(
///     backend,
///     Arc::new(StaticSelector::new(vec!["127.0.0.1:9000".parse().unwrap()])),
///     Arc::new(ClientCluster::new(TcpConnector::new())),
///     Duration::from_secs(1),
/// )?;
///
/// let response = proxy.invoke(Request::new("demo.Greeter", "hello", b"hi".to_vec())).await?;
/// println!("{:?}", response.body);
/// # Ok(())
/// # }
/// ```
pub struct ServiceProxy<C: Connector> {
    backend: BackendConfig,
    selector: Arc<dyn Selector>,
    cluster: Arc<ClientCluster<C>>,
    orchestrator: InvocationOrchestrator,
    default_timeout: Duration,
    ids: RequestIdGenerator,
}

impl<C: Connector + Clone> ServiceProxy<C> {
    /// Creates a proxy on the current runtime.
    ///
    /// # Errors
    ///
    /// [`RpcError::Config`] for an invalid backend, or
    /// [`RpcError::Framework`] outside a Tokio runtime.
    pub fn new(
        backend: BackendConfig,
        selector: Arc<dyn Selector>,
        cluster: Arc<ClientCluster<C>>,
        default_timeout: Duration,
    ) -> Result<Self, RpcError> {
        backend.validate().map_err(|reason| RpcError::Config { reason })?;
        Ok(Self {
            backend,
            selector,
            cluster,
            orchestrator: InvocationOrchestrator::current()?,
            default_timeout,
            ids: RequestIdGenerator::new(),
        })
    }

    /// The backend configuration.
    pub fn backend(&self) -> &BackendConfig {
        &self.backend
    }

    /// The local timeout that applies to `request`, before link tightening.
    pub fn timeout_for(&self, request: &Request) -> Duration {
        request
            .timeout
            .or_else(|| self.backend.timeout())
            .unwrap_or(self.default_timeout)
    }

    /// Performs a call.
    ///
    /// # Errors
    ///
    /// Selection, connection, timeout and framework failures. Business
    /// failures are returned inside the response.
    pub async fn invoke(&self, mut request: Request) -> Result<Response, RpcError> {
        if request.request_id == 0 {
            request.request_id = self.ids.next();
        }
        if request.context.callee().is_none() {
            request.context = std::mem::take(&mut request.context).with_callee(self.backend.service.clone());
        }
        let timeout = self.timeout_for(&request);

        let delay = match self.backend.backup_request_delay() {
            Some(delay) if !request.is_oneway() => delay,
            _ => {
                let primary = self.invoker().await?;
                return self.orchestrator.invoke_async(primary, request, timeout).await;
            }
        };

        let selector = self.selector.clone();
        let cluster = self.cluster.clone();
        let backend = self.backend.clone();
        let backup: BackupResolver = Box::new(move || {
            async move { connect_invoker(selector.as_ref(), &cluster, &backend).await }.boxed()
        });

        // A primary that cannot be set up has failed before the delay, so the
        // backup goes out at once.
        let primary = match self.invoker().await {
            Ok(primary) => primary,
            Err(_e) => {
                #[cfg(feature = "observability")]
                debug!(backend = %self.backend.name, error = %_e, "Primary setup failed, sending backup now");
                let backup = backup().await?;
                return self.orchestrator.invoke_async(backup, request, timeout).await;
            }
        };

        let (response, _winner) = self
            .orchestrator
            .invoke_with_deferred_backup(primary, backup, request, timeout, delay)
            .await?;

        #[cfg(feature = "observability")]
        debug!(backend = %self.backend.name, winner = ?_winner, "Hedged call finished");
        Ok(response)
    }

    /// Performs a call, blocking the calling thread.
    ///
    /// Business failures are returned as `Ok` with a non-zero
    /// `business_code`.
    ///
    /// # Panics
    ///
    /// Must not be called from within an async task.
    ///
    /// # Errors
    ///
    /// As [`invoke`](Self::invoke).
    pub fn invoke_sync(&self, request: Request) -> Result<Response, RpcError> {
        self.orchestrator.handle().clone().block_on(self.invoke(request))
    }

    /// Pre-resolves the service and, for eagerly connecting backends, opens a
    /// client to every instance. Failures are logged and returned but leave
    /// the proxy usable.
    ///
    /// # Errors
    ///
    /// The first failure encountered.
    pub async fn warmup(&self) -> Result<(), RpcError> {
        let instances = self.selector.resolve(&self.backend.service).await?;
        if self.backend.lazy {
            return Ok(());
        }

        let mut first_error = None;
        for address in instances {
            if let Err(e) = self.cluster.get_or_create(&address, &self.backend).await {
                #[cfg(feature = "observability")]
                warn!(backend = %self.backend.name, address = %address, error = %e, "Warmup connect failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn invoker(&self) -> Result<Arc<dyn Invoker>, RpcError> {
        connect_invoker(self.selector.as_ref(), &self.cluster, &self.backend).await
    }
}

async fn connect_invoker<C: Connector + Clone>(
    selector: &dyn Selector,
    cluster: &ClientCluster<C>,
    backend: &BackendConfig,
) -> Result<Arc<dyn Invoker>, RpcError> {
    let address = selector.select(&backend.service).await?;
    let client = cluster.get_or_create(&address, backend).await?;
    Ok(Arc::new(client.create_invoker(backend.service.clone())))
}

impl<C: Connector + Clone> fmt::Debug for ServiceProxy<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceProxy")
            .field("backend", &self.backend.name)
            .field("service", &self.backend.service)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FrameworkCode;
    use crate::invoke::InvocationContext;
    use crate::runtime::StaticSelector;
    use crate::transport::{Connection, RemoteAddress, TransportError};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers with its host name after a per-port delay.
    struct Instance {
        remote: RemoteAddress,
        delay: Duration,
    }

    #[async_trait]
    impl Connection for Instance {
        fn remote(&self) -> &RemoteAddress {
            &self.remote
        }

        fn is_healthy(&self) -> bool {
            true
        }

        async fn call(&self, request: Request) -> Result<Response, TransportError> {
            tokio::time::sleep(self.delay).await;
            Ok(Response::ok(request.request_id, self.remote.host().as_bytes().to_vec()))
        }

        async fn send_oneway(&self, _request: Request) -> Result<(), TransportError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct Instances {
        delays: Arc<HashMap<u16, Duration>>,
        refused: Option<u16>,
        dials: Arc<Mutex<Vec<RemoteAddress>>>,
    }

    impl Instances {
        fn new(delays: &[(u16, u64)], refused: Option<u16>) -> Self {
            Self {
                delays: Arc::new(delays.iter().map(|&(port, ms)| (port, Duration::from_millis(ms))).collect()),
                refused,
                dials: Arc::default(),
            }
        }

        fn dialed(&self, address: &RemoteAddress) -> bool {
            self.dials.lock().contains(address)
        }
    }

    #[async_trait]
    impl Connector for Instances {
        type Connection = Instance;

        async fn connect(&self, address: &RemoteAddress) -> Result<Instance, TransportError> {
            self.dials.lock().push(address.clone());
            if self.refused == Some(address.port()) {
                return Err(TransportError::connect_failed(
                    address.to_string(),
                    std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
                ));
            }
            Ok(Instance {
                remote: address.clone(),
                delay: self.delays.get(&address.port()).copied().unwrap_or_default(),
            })
        }
    }

    struct CountingSelector {
        inner: StaticSelector,
        selects: AtomicUsize,
    }

    #[async_trait]
    impl Selector for CountingSelector {
        async fn resolve(&self, service: &str) -> Result<Vec<RemoteAddress>, RpcError> {
            self.inner.resolve(service).await
        }

        async fn select(&self, service: &str) -> Result<RemoteAddress, RpcError> {
            self.selects.fetch_add(1, Ordering::SeqCst);
            self.inner.select(service).await
        }
    }

    fn primary() -> RemoteAddress {
        RemoteAddress::new("primary", 1)
    }

    fn backup() -> RemoteAddress {
        RemoteAddress::new("backup", 2)
    }

    fn hedged_backend() -> BackendConfig {
        BackendConfig::new("hedged", "svc")
            .with_timeout(Duration::from_millis(500))
            .with_backup_request_delay(Duration::from_millis(100))
            .with_lazy(false)
    }

    fn proxy(connector: &Instances) -> (ServiceProxy<Instances>, Arc<CountingSelector>) {
        let selector = Arc::new(CountingSelector {
            inner: StaticSelector::new(vec![primary(), backup()]),
            selects: AtomicUsize::new(0),
        });
        let proxy = ServiceProxy::new(
            hedged_backend(),
            selector.clone(),
            Arc::new(ClientCluster::new(connector.clone())),
            Duration::from_secs(1),
        )
        .unwrap();
        (proxy, selector)
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_primary_loses_to_backup_instance() {
        let connector = Instances::new(&[(1, 300), (2, 10)], None);
        let (proxy, _) = proxy(&connector);

        let response = proxy.invoke(Request::new("svc", "m", Vec::new())).await.unwrap();
        assert_eq!(response.body, b"backup");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_backup_does_not_fail_the_call() {
        let connector = Instances::new(&[(1, 200)], Some(2));
        let (proxy, _) = proxy(&connector);

        let response = proxy.invoke(Request::new("svc", "m", Vec::new())).await.unwrap();
        assert_eq!(response.body, b"primary");
        assert!(connector.dialed(&backup()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_primary_never_touches_backup_instance() {
        let connector = Instances::new(&[(1, 20)], None);
        let (proxy, selector) = proxy(&connector);

        let response = proxy.invoke(Request::new("svc", "m", Vec::new())).await.unwrap();
        assert_eq!(response.body, b"primary");

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(selector.selects.load(Ordering::SeqCst), 1);
        assert!(!connector.dialed(&backup()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_oneway_call_is_never_hedged() {
        let connector = Instances::new(&[(1, 0)], None);
        let (proxy, selector) = proxy(&connector);

        let request = Request::new("svc", "m", Vec::new()).with_context(InvocationContext::new().with_oneway(true));
        proxy.invoke(request).await.unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(selector.selects.load(Ordering::SeqCst), 1);
        assert!(!connector.dialed(&backup()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_primary_sends_backup_at_once() {
        let connector = Instances::new(&[(2, 10)], Some(1));
        let (proxy, _) = proxy(&connector);

        let start = tokio::time::Instant::now();
        let response = proxy.invoke(Request::new("svc", "m", Vec::new())).await.unwrap();
        assert_eq!(response.body, b"backup");
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_instances_unreachable() {
        let connector = Instances::new(&[], Some(1));
        let selector = Arc::new(StaticSelector::new(vec![primary(), RemoteAddress::new("other", 1)]));
        let proxy = ServiceProxy::new(
            hedged_backend(),
            selector,
            Arc::new(ClientCluster::new(connector.clone())),
            Duration::from_secs(1),
        )
        .unwrap();

        let err = proxy.invoke(Request::new("svc", "m", Vec::new())).await.unwrap_err();
        assert!(err.is_transport_error(), "{}", err);
        assert_eq!(err.framework_code(), Some(FrameworkCode::ClientConnect));
    }
}
