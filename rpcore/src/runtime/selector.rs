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

//! Destination selection.
//!
//! Discovery and load balancing live outside the runtime core. The core only
//! asks a [`Selector`] which instances serve a service and which one to call
//! next.

use crate::error::{FrameworkCode, RpcError};
use crate::transport::RemoteAddress;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Resolves a service to the instances serving it.
#[async_trait]
pub trait Selector: Send + Sync + 'static {
    /// Every known instance of `service`.
    ///
    /// # Errors
    ///
    /// [`FrameworkCode::ClientRouter`] when the service cannot be resolved.
    async fn resolve(&self, service: &str) -> Result<Vec<RemoteAddress>, RpcError>;

    /// The instance to use for the next call. Defaults to the first resolved
    /// instance.
    ///
    /// # Errors
    ///
    /// [`FrameworkCode::ClientRouter`] when no instance is available.
    async fn select(&self, service: &str) -> Result<RemoteAddress, RpcError> {
        self.resolve(service)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| no_instance(service))
    }

    /// Pre-resolves `service` so the first call does not pay for it.
    /// Failures are reported but callers treat them as non-fatal.
    async fn warmup(&self, service: &str) -> Result<(), RpcError> {
        self.resolve(service).await.map(|_| ())
    }
}

fn no_instance(service: &str) -> RpcError {
    RpcError::framework(
        FrameworkCode::ClientRouter,
        format!("no instance available for {}", service),
    )
}

/// A fixed instance list, selected round-robin.
///
/// # Examples
///
/// ```rust
/// use rpcore::runtime::{Selector, StaticSelector};
///
/// # async fn example() -> Result<(), rpcore::RpcError> {
/// let selector = StaticSelector::new(vec!["10.0.0.1:80".parse().unwrap(), "10.0.0.2:80".parse().unwrap()]);
/// let first = selector.select("greeter").await?;
/// let second = selector.select("greeter").await?;
/// assert_ne!(first, second);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct StaticSelector {
    instances: Vec<RemoteAddress>,
    cursor: AtomicUsize,
}

impl StaticSelector {
    /// Creates a selector over `instances`.
    pub fn new(instances: Vec<RemoteAddress>) -> Self {
        Self {
            instances,
            cursor: AtomicUsize::new(0),
        }
    }

    /// The configured instances.
    pub fn instances(&self) -> &[RemoteAddress] {
        &self.instances
    }
}

#[async_trait]
impl Selector for StaticSelector {
    async fn resolve(&self, service: &str) -> Result<Vec<RemoteAddress>, RpcError> {
        if self.instances.is_empty() {
            return Err(no_instance(service));
        }
        Ok(self.instances.clone())
    }

    async fn select(&self, service: &str) -> Result<RemoteAddress, RpcError> {
        if self.instances.is_empty() {
            return Err(no_instance(service));
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.instances.len();
        Ok(self.instances[index].clone())
    }
}
