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

//! Plugin registry driven by the process manager.

use super::PluginConfig;
use crate::error::RpcError;
use crate::lifecycle::{LifecycleComponent, LifecycleState};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "observability")]
use tracing::{debug, info};

struct Registered {
    config: PluginConfig,
    plugin: Arc<dyn LifecycleComponent>,
}

/// Holds the configured plugins of a process.
///
/// Plugins are initialized in registration order and destroyed in reverse
/// order.
///
/// # Examples
///
/// ```rust
/// use rpcore::lifecycle::{Lifecycle, LifecycleHooks};
/// use rpcore::runtime::{PluginConfig, PluginManager};
/// use std::sync::Arc;
///
/// struct Registry;
/// impl LifecycleHooks for Registry {}
///
/// # async fn example() -> Result<(), rpcore::RpcError> {
/// let plugins = PluginManager::new();
/// plugins.register(
///     PluginConfig::new("registry", "static"),
///     Arc::new(Lifecycle::new("registry/static", Registry)),
/// )?;
///
/// plugins.init_all().await?;
/// plugins.destroy_all().await;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct PluginManager {
    plugins: RwLock<Vec<Registered>>,
}

impl PluginManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `plugin` under `config`'s interface and name.
    ///
    /// # Errors
    ///
    /// [`RpcError::Config`] if a plugin is already registered under the
    /// same key.
    pub fn register(
        &self,
        config: PluginConfig,
        plugin: Arc<dyn LifecycleComponent>,
    ) -> Result<(), RpcError> {
        let mut plugins = self.plugins.write();
        if plugins.iter().any(|p| p.config.key() == config.key()) {
            return Err(RpcError::Config {
                reason: format!("plugin {} is registered twice", config.key()),
            });
        }
        plugins.push(Registered { config, plugin });
        Ok(())
    }

    /// Looks up a plugin.
    pub fn get(&self, interface: &str, name: &str) -> Option<Arc<dyn LifecycleComponent>> {
        self.plugins
            .read()
            .iter()
            .find(|p| p.config.interface == interface && p.config.name == name)
            .map(|p| p.plugin.clone())
    }

    /// The configuration of every registered plugin, in registration order.
    pub fn configs(&self) -> Vec<PluginConfig> {
        self.plugins.read().iter().map(|p| p.config.clone()).collect()
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.plugins.read().len()
    }

    /// Returns `true` when no plugin is registered.
    pub fn is_empty(&self) -> bool {
        self.plugins.read().is_empty()
    }

    /// Initializes every plugin still in [`LifecycleState::New`], in
    /// registration order. Stops at the first failure.
    ///
    /// # Errors
    ///
    /// The failing plugin's [`RpcError::Lifecycle`].
    pub async fn init_all(&self) -> Result<(), RpcError> {
        for (key, plugin) in self.snapshot() {
            if plugin.state() != LifecycleState::New {
                #[cfg(feature = "observability")]
                debug!(plugin = %key, state = %plugin.state(), "Plugin already initialized");
                continue;
            }
            plugin.init().await?;

            #[cfg(feature = "observability")]
            info!(plugin = %key, "Plugin initialized");
            let _ = key;
        }
        Ok(())
    }

    /// Stops every plugin in reverse registration order. Failures are
    /// logged and do not interrupt the sweep.
    pub async fn destroy_all(&self) {
        for (_key, plugin) in self.snapshot().into_iter().rev() {
            plugin.stop_quietly().await;

            #[cfg(feature = "observability")]
            debug!(plugin = %_key, state = %plugin.state(), "Plugin destroyed");
        }
    }

    fn snapshot(&self) -> Vec<(String, Arc<dyn LifecycleComponent>)> {
        self.plugins
            .read()
            .iter()
            .map(|p| (p.config.key(), p.plugin.clone()))
            .collect()
    }
}

impl fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<_> = self.plugins.read().iter().map(|p| p.config.key()).collect();
        f.debug_struct("PluginManager").field("plugins", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::lifecycle::{Lifecycle, LifecycleHooks};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail_init: bool,
    }

    #[async_trait]
    impl LifecycleHooks for Recorder {
        async fn on_init(&self) -> Result<(), BoxError> {
            self.log.lock().push(format!("init {}", self.name));
            if self.fail_init {
                return Err("init refused".into());
            }
            Ok(())
        }

        async fn on_stop(&self) -> Result<(), BoxError> {
            self.log.lock().push(format!("stop {}", self.name));
            Ok(())
        }
    }

    fn plugin(name: &'static str, log: &Arc<Mutex<Vec<String>>>, fail_init: bool) -> Arc<dyn LifecycleComponent> {
        Arc::new(Lifecycle::new(
            name,
            Recorder {
                name,
                log: log.clone(),
                fail_init,
            },
        ))
    }

    #[tokio::test]
    async fn test_init_in_order_destroy_in_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let plugins = PluginManager::new();
        plugins.register(PluginConfig::new("codec", "a"), plugin("a", &log, false)).unwrap();
        plugins.register(PluginConfig::new("codec", "b"), plugin("b", &log, false)).unwrap();

        plugins.init_all().await.unwrap();
        plugins.init_all().await.unwrap();
        plugins.destroy_all().await;

        assert_eq!(*log.lock(), vec!["init a", "init b", "stop b", "stop a"]);
        assert!(plugins.get("codec", "a").unwrap().is_stopped());
    }

    #[tokio::test]
    async fn test_init_failure_stops_the_sweep() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let plugins = PluginManager::new();
        plugins.register(PluginConfig::new("x", "bad"), plugin("bad", &log, true)).unwrap();
        plugins.register(PluginConfig::new("x", "never"), plugin("never", &log, false)).unwrap();

        let err = plugins.init_all().await.unwrap_err();
        assert!(err.is_lifecycle_error());
        assert_eq!(log.lock()[0], "init bad");
        assert!(!log.lock().iter().any(|entry| entry == "init never"));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let plugins = PluginManager::new();
        plugins.register(PluginConfig::new("x", "a"), plugin("a", &log, false)).unwrap();
        let err = plugins
            .register(PluginConfig::new("x", "a"), plugin("a", &log, false))
            .unwrap_err();
        assert!(matches!(err, RpcError::Config { .. }));
        assert_eq!(plugins.len(), 1);
    }
}
