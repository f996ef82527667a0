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

//! Process-wide startup and shutdown choreography.
//!
//! The [`ConfigManager`] is an explicitly constructed context object, not a
//! global. Starting it runs eight steps in order:
//!
//! 1. notify [`StartupListener`]s
//! 2. apply configuration defaults
//! 3. start the [`ClientSubsystem`]
//! 4. initialize plugins
//! 5. warm up (failures are logged only)
//! 6. run the [`AppLifecycle`] initializer
//! 7. start the [`ServerSubsystem`]
//! 8. register services with discovery
//!
//! Stopping mirrors them, newest first: unregister, wait the drain interval,
//! close servers, stop the application, shut worker pools down within the
//! close timeout, stop clients, destroy plugins, close the client cluster.
//! Stop steps are best effort: each runs even when an earlier one failed, and
//! the first failure is reported. When a start step fails, only the stop
//! steps mirroring the steps already entered are run.

use super::{
    AppLifecycle, ClientSubsystem, GlobalConfig, PluginManager, ServerSubsystem, ServiceConfig,
    ServiceRegistry, StartupListener, Warmup, WorkerPoolManager,
};
use crate::error::{BoxError, RpcError};
use crate::lifecycle::{Lifecycle, LifecycleError, LifecycleHooks, LifecycleListener, LifecycleState};
use crate::observability::{log_error, LoggingListener};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

#[cfg(feature = "observability")]
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
enum Step {
    Idle = 0,
    NotifyListeners,
    ApplyDefaults,
    StartClients,
    InitPlugins,
    Warmup,
    InitApp,
    StartServers,
    RegisterServices,
}

impl Step {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::NotifyListeners,
            2 => Self::ApplyDefaults,
            3 => Self::StartClients,
            4 => Self::InitPlugins,
            5 => Self::Warmup,
            6 => Self::InitApp,
            7 => Self::StartServers,
            8 => Self::RegisterServices,
            _ => Self::Idle,
        }
    }
}

struct ManagerCore {
    config: RwLock<GlobalConfig>,
    clients: Arc<dyn ClientSubsystem>,
    servers: Arc<dyn ServerSubsystem>,
    discovery: Option<Arc<dyn ServiceRegistry>>,
    app: Option<Arc<dyn AppLifecycle>>,
    listeners: Vec<Arc<dyn StartupListener>>,
    warmups: Vec<Arc<dyn Warmup>>,
    plugins: Arc<PluginManager>,
    workers: Arc<WorkerPoolManager>,
    entered: AtomicU8,
}

impl ManagerCore {
    fn enter(&self, step: Step) {
        #[cfg(feature = "observability")]
        debug!(step = ?step, "Startup step");
        self.entered.store(step as u8, Ordering::Release);
    }

    fn fresh(&self) -> Self {
        Self {
            config: RwLock::new(self.config.read().clone()),
            clients: self.clients.clone(),
            servers: self.servers.clone(),
            discovery: self.discovery.clone(),
            app: self.app.clone(),
            listeners: self.listeners.clone(),
            warmups: self.warmups.clone(),
            plugins: self.plugins.clone(),
            workers: self.workers.clone(),
            entered: AtomicU8::new(0),
        }
    }

    async fn warm_up(&self) {
        if let Err(e) = self.clients.warmup().await {
            log_error(&e, "client warmup");
        }
        for warmup in &self.warmups {
            if let Err(e) = warmup.warmup().await {
                log_error(&e, warmup.name());
            }
        }
    }
}

fn note(first: &mut Option<RpcError>, step: &str, result: Result<(), RpcError>) {
    if let Err(e) = result {
        log_error(&e, step);
        first.get_or_insert(e);
    }
}

#[async_trait]
impl LifecycleHooks for ManagerCore {
    async fn on_start(&self) -> Result<(), BoxError> {
        self.enter(Step::NotifyListeners);
        let loaded = self.config.read().clone();
        for listener in &self.listeners {
            listener.on_startup(&loaded)?;
        }

        self.enter(Step::ApplyDefaults);
        let config = {
            let mut config = self.config.write();
            config.apply_defaults();
            config
                .validate()
                .map_err(|reason| RpcError::Config { reason })?;
            config.clone()
        };

        self.enter(Step::StartClients);
        self.clients.start(&config).await?;

        self.enter(Step::InitPlugins);
        self.plugins.init_all().await?;

        self.enter(Step::Warmup);
        self.warm_up().await;

        self.enter(Step::InitApp);
        if let Some(app) = &self.app {
            app.init().await?;
        }

        self.enter(Step::StartServers);
        self.servers.start(&config).await?;

        self.enter(Step::RegisterServices);
        if let Some(discovery) = &self.discovery {
            discovery.register(&self.servers.services()).await?;
        }

        #[cfg(feature = "observability")]
        info!(
            app = config.app.as_deref().unwrap_or(""),
            server = config.server_name.as_deref().unwrap_or(""),
            services = self.servers.services().len(),
            "Process started"
        );
        Ok(())
    }

    async fn on_stop(&self) -> Result<(), BoxError> {
        let entered = Step::from_u8(self.entered.swap(0, Ordering::AcqRel));
        if entered == Step::Idle {
            return Ok(());
        }
        let config = self.config.read().clone();
        let services: Vec<ServiceConfig> = self.servers.services();
        let mut first = None;

        if entered >= Step::RegisterServices {
            if let Some(discovery) = &self.discovery {
                note(&mut first, "unregister services", discovery.unregister(&services).await);
            }
        }

        if entered >= Step::StartServers {
            let drain = config.drain_wait();
            if !drain.is_zero() {
                #[cfg(feature = "observability")]
                debug!(drain = ?drain, "Waiting before closing servers");
                tokio::time::sleep(drain).await;
            }
            note(&mut first, "close servers", self.servers.stop().await);
        }

        if entered >= Step::InitApp {
            if let Some(app) = &self.app {
                note(&mut first, "application stop", app.stop().await);
            }
        }

        if !self.workers.shutdown_all(config.worker_close_timeout()).await {
            #[cfg(feature = "observability")]
            warn!(timeout = ?config.worker_close_timeout(), "Worker pools did not drain in time");
        }

        if entered >= Step::StartClients {
            note(&mut first, "stop clients", self.clients.stop().await);
        }

        if entered >= Step::InitPlugins {
            self.plugins.destroy_all().await;
        }

        if entered >= Step::StartClients {
            note(&mut first, "close client cluster", self.clients.close_cluster().await);
        }

        #[cfg(feature = "observability")]
        info!(clean = first.is_none(), "Process stopped");
        first.map_or(Ok(()), |e| Err(e.into()))
    }
}

/// Drives the startup and shutdown of one process.
///
/// # Examples
///
/// ```rust
/// use rpcore::runtime::{ConfigManager, GlobalConfig};
///
/// # async fn example() -> Result<(), rpcore::RpcError> {
/// let manager = ConfigManager::builder(GlobalConfig::default()).build();
/// manager.start().await?;
/// assert_eq!(manager.config().client.default_timeout_ms, Some(1000));
/// manager.stop().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConfigManager {
    lifecycle: Arc<Lifecycle<ManagerCore>>,
}

impl ConfigManager {
    /// Starts describing a process with `config`.
    pub fn builder(config: GlobalConfig) -> ConfigManagerBuilder {
        ConfigManagerBuilder::new(config)
    }

    fn from_core(core: ManagerCore) -> Self {
        let lifecycle = Lifecycle::new("config-manager", core).with_listener(Arc::new(LoggingListener));
        Self {
            lifecycle: Arc::new(lifecycle),
        }
    }

    /// Runs the start choreography.
    ///
    /// # Errors
    ///
    /// The error of the failing step, after the steps already entered were
    /// stopped, or [`RpcError::Lifecycle`] for an invalid transition.
    pub async fn start(&self) -> Result<(), RpcError> {
        self.lifecycle.start().await.map_err(unwrap_cause)
    }

    /// Runs the stop choreography.
    ///
    /// # Errors
    ///
    /// The first failing stop step; every other step still ran.
    pub async fn stop(&self) -> Result<(), RpcError> {
        self.lifecycle.stop().await.map_err(unwrap_cause)
    }

    /// Like [`stop`](Self::stop) but only logs a failure.
    pub async fn stop_quietly(&self) {
        self.lifecycle.stop_quietly().await;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Snapshot of the configuration, with defaults once started.
    pub fn config(&self) -> GlobalConfig {
        self.lifecycle.hooks().config.read().clone()
    }

    /// The plugins driven by this manager.
    pub fn plugins(&self) -> &Arc<PluginManager> {
        &self.lifecycle.hooks().plugins
    }

    /// The worker pools shut down by this manager.
    pub fn worker_pools(&self) -> &Arc<WorkerPoolManager> {
        &self.lifecycle.hooks().workers
    }

    /// Observes lifecycle transitions.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::ListenerRejected`] once the manager began starting.
    pub fn add_listener(&self, listener: Arc<dyn LifecycleListener>) -> Result<(), LifecycleError> {
        self.lifecycle.add_listener(listener)
    }

    /// A new manager in the `New` state over the same collaborators and
    /// configuration. Meant for tests that need to run a process twice.
    pub fn rebuild(&self) -> Self {
        Self::from_core(self.lifecycle.hooks().fresh())
    }
}

fn unwrap_cause(error: LifecycleError) -> RpcError {
    match error.cause().and_then(|cause| cause.downcast_ref::<RpcError>()) {
        Some(inner) => inner.clone(),
        None => RpcError::Lifecycle(error),
    }
}

impl fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigManager")
            .field("state", &self.state())
            .field("config", &*self.lifecycle.hooks().config.read())
            .finish()
    }
}

/// Builder for [`ConfigManager`].
///
/// Unset subsystems do nothing.
pub struct ConfigManagerBuilder {
    config: GlobalConfig,
    clients: Option<Arc<dyn ClientSubsystem>>,
    servers: Option<Arc<dyn ServerSubsystem>>,
    discovery: Option<Arc<dyn ServiceRegistry>>,
    app: Option<Arc<dyn AppLifecycle>>,
    listeners: Vec<Arc<dyn StartupListener>>,
    warmups: Vec<Arc<dyn Warmup>>,
    plugins: Arc<PluginManager>,
    workers: Arc<WorkerPoolManager>,
}

impl ConfigManagerBuilder {
    fn new(config: GlobalConfig) -> Self {
        Self {
            config,
            clients: None,
            servers: None,
            discovery: None,
            app: None,
            listeners: Vec::new(),
            warmups: Vec::new(),
            plugins: Arc::new(PluginManager::new()),
            workers: Arc::new(WorkerPoolManager::new()),
        }
    }

    /// Sets the client subsystem.
    #[must_use]
    pub fn client_subsystem(mut self, clients: Arc<dyn ClientSubsystem>) -> Self {
        self.clients = Some(clients);
        self
    }

    /// Sets the server subsystem.
    #[must_use]
    pub fn server_subsystem(mut self, servers: Arc<dyn ServerSubsystem>) -> Self {
        self.servers = Some(servers);
        self
    }

    /// Sets the discovery registry.
    #[must_use]
    pub fn service_registry(mut self, discovery: Arc<dyn ServiceRegistry>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Sets the application hooks.
    #[must_use]
    pub fn app(mut self, app: Arc<dyn AppLifecycle>) -> Self {
        self.app = Some(app);
        self
    }

    /// Adds a startup listener.
    #[must_use]
    pub fn startup_listener(mut self, listener: Arc<dyn StartupListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Adds a warmup task.
    #[must_use]
    pub fn warmup(mut self, warmup: Arc<dyn Warmup>) -> Self {
        self.warmups.push(warmup);
        self
    }

    /// Uses `plugins` instead of an empty plugin manager.
    #[must_use]
    pub fn plugins(mut self, plugins: Arc<PluginManager>) -> Self {
        self.plugins = plugins;
        self
    }

    /// Uses `workers` instead of an empty worker pool manager.
    #[must_use]
    pub fn worker_pools(mut self, workers: Arc<WorkerPoolManager>) -> Self {
        self.workers = workers;
        self
    }

    /// Builds the manager in the `New` state.
    pub fn build(self) -> ConfigManager {
        ConfigManager::from_core(ManagerCore {
            config: RwLock::new(self.config),
            clients: self.clients.unwrap_or_else(|| Arc::new(Idle)),
            servers: self.servers.unwrap_or_else(|| Arc::new(Idle)),
            discovery: self.discovery,
            app: self.app,
            listeners: self.listeners,
            warmups: self.warmups,
            plugins: self.plugins,
            workers: self.workers,
            entered: AtomicU8::new(0),
        })
    }
}

impl fmt::Debug for ConfigManagerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigManagerBuilder")
            .field("config", &self.config)
            .field("listeners", &self.listeners.len())
            .field("warmups", &self.warmups.len())
            .finish()
    }
}

struct Idle;

#[async_trait]
impl ClientSubsystem for Idle {
    async fn start(&self, _config: &GlobalConfig) -> Result<(), RpcError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), RpcError> {
        Ok(())
    }

    async fn close_cluster(&self) -> Result<(), RpcError> {
        Ok(())
    }
}

#[async_trait]
impl ServerSubsystem for Idle {
    fn services(&self) -> Vec<ServiceConfig> {
        Vec::new()
    }

    async fn start(&self, _config: &GlobalConfig) -> Result<(), RpcError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), RpcError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FrameworkCode;
    use crate::runtime::PluginConfig;
    use parking_lot::Mutex;

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        journal: Journal,
        fail_on: Option<&'static str>,
    }

    impl Recorder {
        fn record(&self, call: &'static str) -> Result<(), RpcError> {
            self.journal.lock().push(call.to_string());
            if self.fail_on == Some(call) {
                return Err(RpcError::framework(FrameworkCode::Unknown, call));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ClientSubsystem for Recorder {
        async fn start(&self, _config: &GlobalConfig) -> Result<(), RpcError> {
            self.record("clients.start")
        }
        async fn warmup(&self) -> Result<(), RpcError> {
            self.record("clients.warmup")
        }
        async fn stop(&self) -> Result<(), RpcError> {
            self.record("clients.stop")
        }
        async fn close_cluster(&self) -> Result<(), RpcError> {
            self.record("clients.close_cluster")
        }
    }

    #[async_trait]
    impl ServerSubsystem for Recorder {
        fn services(&self) -> Vec<ServiceConfig> {
            Vec::new()
        }
        async fn start(&self, _config: &GlobalConfig) -> Result<(), RpcError> {
            self.record("servers.start")
        }
        async fn stop(&self) -> Result<(), RpcError> {
            self.record("servers.stop")
        }
    }

    #[async_trait]
    impl ServiceRegistry for Recorder {
        async fn register(&self, _services: &[ServiceConfig]) -> Result<(), RpcError> {
            self.record("discovery.register")
        }
        async fn unregister(&self, _services: &[ServiceConfig]) -> Result<(), RpcError> {
            self.record("discovery.unregister")
        }
    }

    #[async_trait]
    impl AppLifecycle for Recorder {
        async fn init(&self) -> Result<(), RpcError> {
            self.record("app.init")
        }
        async fn stop(&self) -> Result<(), RpcError> {
            self.record("app.stop")
        }
    }

    struct PluginProbe(Journal);

    #[async_trait]
    impl LifecycleHooks for PluginProbe {
        async fn on_init(&self) -> Result<(), BoxError> {
            self.0.lock().push("plugin.init".to_string());
            Ok(())
        }
        async fn on_stop(&self) -> Result<(), BoxError> {
            self.0.lock().push("plugin.stop".to_string());
            Ok(())
        }
    }

    fn manager(journal: &Journal, fail_on: Option<&'static str>) -> ConfigManager {
        let recorder = Arc::new(Recorder {
            journal: journal.clone(),
            fail_on,
        });
        let plugins = Arc::new(PluginManager::new());
        plugins
            .register(
                PluginConfig::new("probe", "journal"),
                Arc::new(Lifecycle::new("probe", PluginProbe(journal.clone()))),
            )
            .unwrap();

        let listener_journal = journal.clone();
        ConfigManager::builder(GlobalConfig::default())
            .client_subsystem(recorder.clone())
            .server_subsystem(recorder.clone())
            .service_registry(recorder.clone())
            .app(recorder)
            .plugins(plugins)
            .startup_listener(Arc::new(move |_: &GlobalConfig| {
                listener_journal.lock().push("listener".to_string());
                Ok::<(), RpcError>(())
            }))
            .build()
    }

    fn calls(journal: &Journal) -> Vec<String> {
        journal.lock().clone()
    }

    #[tokio::test]
    async fn test_start_and_stop_order() {
        let journal = Journal::default();
        let manager = manager(&journal, None);

        manager.start().await.unwrap();
        assert_eq!(
            calls(&journal),
            vec![
                "listener",
                "clients.start",
                "plugin.init",
                "clients.warmup",
                "app.init",
                "servers.start",
                "discovery.register",
            ]
        );

        journal.lock().clear();
        manager.stop().await.unwrap();
        assert_eq!(
            calls(&journal),
            vec![
                "discovery.unregister",
                "servers.stop",
                "app.stop",
                "clients.stop",
                "plugin.stop",
                "clients.close_cluster",
            ]
        );
        assert_eq!(manager.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_failed_step_stops_only_what_started() {
        let journal = Journal::default();
        let manager = manager(&journal, Some("app.init"));

        let err = manager.start().await.unwrap_err();
        assert!(err.to_string().contains("app.init"));
        assert_eq!(
            calls(&journal),
            vec![
                "listener",
                "clients.start",
                "plugin.init",
                "clients.warmup",
                "app.init",
                "app.stop",
                "clients.stop",
                "plugin.stop",
                "clients.close_cluster",
            ]
        );
        assert_eq!(manager.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_warmup_failure_is_not_fatal() {
        let journal = Journal::default();
        let manager = manager(&journal, Some("clients.warmup"));
        manager.start().await.unwrap();
        assert_eq!(manager.state(), LifecycleState::Started);
        manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_continues_past_failures() {
        let journal = Journal::default();
        let manager = manager(&journal, Some("servers.stop"));
        manager.start().await.unwrap();
        journal.lock().clear();

        let err = manager.stop().await.unwrap_err();
        assert!(err.to_string().contains("servers.stop"));
        assert!(calls(&journal).contains(&"clients.close_cluster".to_string()));
        assert_eq!(manager.state(), LifecycleState::Failed);
    }

    #[tokio::test]
    async fn test_defaults_applied_on_start() {
        let manager = ConfigManager::builder(GlobalConfig::default()).build();
        assert_eq!(manager.config().server.close_timeout_ms, None);
        manager.start().await.unwrap();
        let config = manager.config();
        assert_eq!(config.server.wait_timeout_ms, Some(0));
        assert_eq!(config.server.close_timeout_ms, Some(5000));
        manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_rebuild_starts_over() {
        let journal = Journal::default();
        let manager = manager(&journal, None);
        manager.start().await.unwrap();
        manager.stop().await.unwrap();

        let again = manager.rebuild();
        assert_eq!(again.state(), LifecycleState::New);
        again.start().await.unwrap();
        again.stop().await.unwrap();
    }
}
