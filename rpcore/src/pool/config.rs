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

//! Configuration for connection pools.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a [`ConnectionPool`](super::ConnectionPool).
///
/// # Examples
///
/// ```rust
/// use rpcore::pool::PoolConfig;
/// use std::time::Duration;
///
/// let config = PoolConfig {
///     connections_per_address: 4,
///     idle_timeout: None,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// assert_eq!(config.connect_timeout, Duration::from_secs(3));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of connections kept per destination.
    ///
    /// Calls are spread round-robin over the slots; each slot is dialed at
    /// most once at a time.
    ///
    /// Default: 2
    pub connections_per_address: usize,

    /// Upper bound on establishing a connection.
    ///
    /// Default: 3 seconds
    pub connect_timeout: Duration,

    /// Connections unused for this long are closed by the idle sweeper.
    /// `None` keeps connections until they fail or the pool closes.
    ///
    /// Default: 180 seconds
    pub idle_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            connections_per_address: 2,
            connect_timeout: Duration::from_secs(3),
            idle_timeout: Some(Duration::from_secs(180)),
        }
    }
}

impl PoolConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of connections per destination.
    #[must_use]
    pub fn with_connections_per_address(mut self, count: usize) -> Self {
        self.connections_per_address = count;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the idle timeout.
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.connections_per_address == 0 {
            return Err("connections_per_address must be greater than 0".to_string());
        }
        if self.connect_timeout.is_zero() {
            return Err("connect_timeout must be greater than 0".to_string());
        }
        if self.idle_timeout.is_some_and(|t| t.is_zero()) {
            return Err("idle_timeout must be greater than 0 when set".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.connections_per_address, 2);
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(180)));
    }

    #[test]
    fn test_validation() {
        assert!(PoolConfig::new().validate().is_ok());
        assert!(PoolConfig::new()
            .with_connections_per_address(0)
            .validate()
            .is_err());
        assert!(PoolConfig::new()
            .with_connect_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(PoolConfig::new()
            .with_idle_timeout(Some(Duration::ZERO))
            .validate()
            .is_err());
        assert!(PoolConfig::new().with_idle_timeout(None).validate().is_ok());
    }
}
