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

//! Process-level configuration objects.
//!
//! These are materialized by an external loader (any `serde` format) and
//! consumed as-is. Unset values are filled in by
//! [`GlobalConfig::apply_defaults`] during startup.

use crate::transport::RemoteAddress;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Drain interval applied when none is configured.
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 0;

/// Worker pool shutdown bound applied when none is configured.
pub const DEFAULT_CLOSE_TIMEOUT_MS: u64 = 5000;

/// Client call timeout applied when none is configured.
pub const DEFAULT_CLIENT_TIMEOUT_MS: u64 = 1000;

/// Process-wide settings.
///
/// # Examples
///
/// ```rust
/// use rpcore::runtime::GlobalConfig;
/// use std::time::Duration;
///
/// let mut config: GlobalConfig = serde_json::from_str(r#"{
///     "app": "shop",
///     "server": { "wait_timeout_ms": 200 }
/// }"#).unwrap();
/// config.apply_defaults();
///
/// assert_eq!(config.drain_wait(), Duration::from_millis(200));
/// assert_eq!(config.worker_close_timeout(), Duration::from_secs(5));
/// assert_eq!(config.default_client_timeout(), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Application name.
    pub app: Option<String>,

    /// Server (process) name.
    pub server_name: Option<String>,

    /// Provider-side settings.
    pub server: ServerSettings,

    /// Consumer-side settings.
    pub client: ClientSettings,
}

/// Provider-side settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Wait between unregistering from discovery and closing listeners.
    ///
    /// Default: 0 ms
    pub wait_timeout_ms: Option<u64>,

    /// Upper bound for worker pool shutdown.
    ///
    /// Default: 5000 ms
    pub close_timeout_ms: Option<u64>,
}

/// Consumer-side settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Timeout for backends that configure none.
    ///
    /// Default: 1000 ms
    pub default_timeout_ms: Option<u64>,
}

impl GlobalConfig {
    /// Fills every unset value with its default.
    pub fn apply_defaults(&mut self) {
        self.server.wait_timeout_ms.get_or_insert(DEFAULT_WAIT_TIMEOUT_MS);
        self.server.close_timeout_ms.get_or_insert(DEFAULT_CLOSE_TIMEOUT_MS);
        self.client.default_timeout_ms.get_or_insert(DEFAULT_CLIENT_TIMEOUT_MS);
    }

    /// The drain interval.
    pub fn drain_wait(&self) -> Duration {
        Duration::from_millis(self.server.wait_timeout_ms.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS))
    }

    /// The worker pool shutdown bound.
    pub fn worker_close_timeout(&self) -> Duration {
        Duration::from_millis(self.server.close_timeout_ms.unwrap_or(DEFAULT_CLOSE_TIMEOUT_MS))
    }

    /// The fallback client timeout.
    pub fn default_client_timeout(&self) -> Duration {
        Duration::from_millis(
            self.client
                .default_timeout_ms
                .unwrap_or(DEFAULT_CLIENT_TIMEOUT_MS),
        )
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.client.default_timeout_ms == Some(0) {
            return Err("client.default_timeout_ms must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// A service exposed by this process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name, as carried in requests.
    pub name: String,

    /// Bind address.
    pub address: RemoteAddress,

    /// Protocol identity of the listener.
    ///
    /// Default: "json"
    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// Server-side time limit for one request, when the caller sends none.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Worker pool requests are dispatched on; `None` uses plain tasks.
    #[serde(default)]
    pub worker_pool: Option<String>,
}

pub(crate) fn default_protocol() -> String {
    "json".to_string()
}

impl ServiceConfig {
    /// Creates a service configuration with the default protocol.
    pub fn new(name: impl Into<String>, address: RemoteAddress) -> Self {
        Self {
            name: name.into(),
            address,
            protocol: default_protocol(),
            timeout_ms: None,
            worker_pool: None,
        }
    }

    /// Sets the server-side timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Sets the worker pool.
    #[must_use]
    pub fn with_worker_pool(mut self, pool: impl Into<String>) -> Self {
        self.worker_pool = Some(pool.into());
        self
    }

    /// The server-side timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("service name must not be empty".to_string());
        }
        if self.protocol.is_empty() {
            return Err(format!("service {} has an empty protocol", self.name));
        }
        Ok(())
    }
}

/// Configuration of one plugin, keyed by the interface it implements and
/// its name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    /// The extension point the plugin implements, e.g. `"registry"`.
    pub interface: String,

    /// The plugin name, unique per interface.
    pub name: String,

    /// Plugin-specific settings, passed through untouched.
    #[serde(default)]
    pub properties: serde_json::Value,
}

impl PluginConfig {
    /// Creates a plugin configuration with no properties.
    pub fn new(interface: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            name: name.into(),
            properties: serde_json::Value::Null,
        }
    }

    /// Sets the properties.
    #[must_use]
    pub fn with_properties(mut self, properties: serde_json::Value) -> Self {
        self.properties = properties;
        self
    }

    /// `interface/name`
    pub fn key(&self) -> String {
        format!("{}/{}", self.interface, self.name)
    }
}
