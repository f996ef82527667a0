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

//! Backend (downstream service) configuration.

use crate::pool::PoolConfig;
use crate::transport::RemoteAddress;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_protocol() -> String {
    "json".to_string()
}

fn default_lazy() -> bool {
    true
}

/// How this process calls one downstream service.
///
/// # Examples
///
/// ```rust
/// use rpcore::client::BackendConfig;
/// use std::time::Duration;
///
/// let backend: BackendConfig = serde_json::from_str(r#"{
///     "name": "inventory",
///     "service": "shop.Inventory",
///     "targets": ["tcp://10.0.0.7:9000"],
///     "timeout_ms": 300,
///     "backup_request_delay_ms": 50
/// }"#).unwrap();
///
/// assert!(backend.lazy);
/// assert_eq!(backend.timeout(), Some(Duration::from_millis(300)));
/// assert_eq!(backend.backup_request_delay(), Some(Duration::from_millis(50)));
/// assert!(backend.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend name, used in logs.
    pub name: String,

    /// Service called on the backend.
    pub service: String,

    /// Fixed instances, for selectors that take them from configuration.
    #[serde(default)]
    pub targets: Vec<RemoteAddress>,

    /// Protocol identity.
    ///
    /// Default: "json"
    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// Call timeout. Unset falls back to the process default.
    ///
    /// Default: None (process default, 1000 ms)
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Delay after which a backup request is sent. Unset disables backup
    /// requests.
    ///
    /// Default: None
    #[serde(default)]
    pub backup_request_delay_ms: Option<u64>,

    /// Connect on first use instead of at startup.
    ///
    /// Default: true
    #[serde(default = "default_lazy")]
    pub lazy: bool,

    /// Connection pool settings.
    #[serde(default)]
    pub pool: PoolConfig,
}

impl BackendConfig {
    /// Creates a lazily connected backend with default settings.
    pub fn new(name: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            service: service.into(),
            targets: Vec::new(),
            protocol: default_protocol(),
            timeout_ms: None,
            backup_request_delay_ms: None,
            lazy: true,
            pool: PoolConfig::default(),
        }
    }

    /// Sets the fixed instances.
    #[must_use]
    pub fn with_targets(mut self, targets: Vec<RemoteAddress>) -> Self {
        self.targets = targets;
        self
    }

    /// Sets the call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Enables backup requests after `delay`.
    #[must_use]
    pub fn with_backup_request_delay(mut self, delay: Duration) -> Self {
        self.backup_request_delay_ms = Some(delay.as_millis() as u64);
        self
    }

    /// Sets lazy connecting.
    #[must_use]
    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// Sets the pool settings.
    #[must_use]
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// The configured call timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// The configured backup delay.
    pub fn backup_request_delay(&self) -> Option<Duration> {
        self.backup_request_delay_ms.map(Duration::from_millis)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("backend name must not be empty".to_string());
        }
        if self.service.is_empty() {
            return Err(format!("backend {} has no service", self.name));
        }
        if self.timeout_ms == Some(0) {
            return Err(format!("backend {} timeout_ms must be greater than 0", self.name));
        }
        if let (Some(delay), Some(timeout)) = (self.backup_request_delay_ms, self.timeout_ms) {
            if delay >= timeout {
                return Err(format!(
                    "backend {} backup_request_delay_ms ({}) must be below timeout_ms ({})",
                    self.name, delay, timeout
                ));
            }
        }
        self.pool
            .validate()
            .map_err(|reason| format!("backend {}: {}", self.name, reason))
    }
}
