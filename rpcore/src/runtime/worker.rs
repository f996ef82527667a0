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

//! Worker pools for business-logic dispatch.

use crate::error::{FrameworkCode, RpcError};
use async_trait::async_trait;
use futures_util::future::{join_all, BoxFuture};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

#[cfg(feature = "observability")]
use tracing::{info, warn};

/// A unit of work submitted to a [`WorkerPool`].
pub type Task = BoxFuture<'static, ()>;

/// Runs submitted tasks and can be shut down within a time bound.
#[async_trait]
pub trait WorkerPool: Send + Sync + 'static {
    /// Name used in logs and for lookup.
    fn name(&self) -> &str;

    /// Schedules `task`.
    ///
    /// # Errors
    ///
    /// [`RpcError::Framework`] with [`FrameworkCode::ServerOverload`] when the
    /// pool is saturated or shut down.
    fn submit(&self, task: Task) -> Result<(), RpcError>;

    /// Rejects new work and waits up to `timeout` for running tasks.
    /// Returns `true` if every task finished in time.
    async fn shutdown(&self, timeout: Duration) -> bool;
}

/// A [`WorkerPool`] running each task on the Tokio runtime, with at most
/// `max_tasks` in flight.
///
/// # Examples
///
/// ```rust
/// use rpcore::runtime::{TaskWorkerPool, WorkerPool};
/// use std::time::Duration;
///
/// # async fn example() {
/// let pool = TaskWorkerPool::new("biz", 64);
/// pool.submit(Box::pin(async { /* handle a request */ })).unwrap();
/// assert!(pool.shutdown(Duration::from_secs(1)).await);
/// assert!(pool.submit(Box::pin(async {})).is_err());
/// # }
/// ```
pub struct TaskWorkerPool {
    name: String,
    max_tasks: u32,
    permits: Arc<Semaphore>,
    closed: AtomicBool,
}

impl TaskWorkerPool {
    /// Creates a pool allowing `max_tasks` concurrent tasks.
    pub fn new(name: impl Into<String>, max_tasks: u32) -> Self {
        let max_tasks = max_tasks.max(1);
        Self {
            name: name.into(),
            max_tasks,
            permits: Arc::new(Semaphore::new(max_tasks as usize)),
            closed: AtomicBool::new(false),
        }
    }

    /// Tasks currently running.
    pub fn active(&self) -> usize {
        (self.max_tasks as usize).saturating_sub(self.permits.available_permits())
    }

    /// Returns `true` once shutdown has begun.
    pub fn is_shutdown(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn rejected(&self, reason: &str) -> RpcError {
        RpcError::framework(
            FrameworkCode::ServerOverload,
            format!("worker pool {} {}", self.name, reason),
        )
    }
}

#[async_trait]
impl WorkerPool for TaskWorkerPool {
    fn name(&self) -> &str {
        &self.name
    }

    fn submit(&self, task: Task) -> Result<(), RpcError> {
        if self.is_shutdown() {
            return Err(self.rejected("is shut down"));
        }
        let permit = self
            .permits
            .clone()
            .try_acquire_owned()
            .map_err(|_| self.rejected("is saturated"))?;
        tokio::spawn(async move {
            let _permit = permit;
            task.await;
        });
        Ok(())
    }

    async fn shutdown(&self, timeout: Duration) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return self.permits.available_permits() == self.max_tasks as usize;
        }

        let drained = matches!(
            tokio::time::timeout(timeout, self.permits.acquire_many(self.max_tasks)).await,
            Ok(Ok(_))
        );

        #[cfg(feature = "observability")]
        if drained {
            info!(pool = %self.name, "Worker pool drained");
        } else {
            warn!(pool = %self.name, active = self.active(), timeout = ?timeout, "Worker pool shutdown timed out");
        }
        drained
    }
}

impl fmt::Debug for TaskWorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskWorkerPool")
            .field("name", &self.name)
            .field("max_tasks", &self.max_tasks)
            .field("active", &self.active())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

/// Named worker pools of one process.
#[derive(Default)]
pub struct WorkerPoolManager {
    pools: RwLock<HashMap<String, Arc<dyn WorkerPool>>>,
}

impl WorkerPoolManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `pool` under its name, replacing any previous pool.
    pub fn register(&self, pool: Arc<dyn WorkerPool>) {
        self.pools.write().insert(pool.name().to_string(), pool);
    }

    /// Looks up a pool.
    pub fn get(&self, name: &str) -> Option<Arc<dyn WorkerPool>> {
        self.pools.read().get(name).cloned()
    }

    /// Number of registered pools.
    pub fn len(&self) -> usize {
        self.pools.read().len()
    }

    /// Returns `true` when no pool is registered.
    pub fn is_empty(&self) -> bool {
        self.pools.read().is_empty()
    }

    /// Shuts every pool down concurrently, each bounded by `timeout`.
    /// Returns `true` if all of them drained in time.
    pub async fn shutdown_all(&self, timeout: Duration) -> bool {
        let pools: Vec<_> = self.pools.read().values().cloned().collect();
        join_all(pools.iter().map(|pool| pool.shutdown(timeout)))
            .await
            .into_iter()
            .all(|drained| drained)
    }
}

impl fmt::Debug for WorkerPoolManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.pools.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("WorkerPoolManager").field("pools", &names).finish()
    }
}
