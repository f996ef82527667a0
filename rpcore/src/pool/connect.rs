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

//! Adapter from an in-flight dial to a caller-facing future.
//!
//! Every dial runs as its own task and publishes exactly one outcome on a
//! `watch` channel. Callers wait on a [`ConnectFuture`] subscribed to that
//! channel. Dropping the future only drops the subscription: the dial task
//! still observes its completion and, when nobody is left to receive the
//! connection, closes it instead of registering it.

use super::PooledConnection;
use crate::transport::{RemoteAddress, TransportError};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Outcome published by a dial task. `None` until the dial settles.
pub(crate) type ConnectOutcome<T> = Option<Result<Arc<PooledConnection<T>>, TransportError>>;

/// Publishing side of a dial.
pub(crate) type ConnectSender<T> = Arc<watch::Sender<ConnectOutcome<T>>>;

/// Waits for a pooled connection being established by another task.
///
/// Resolves exactly once: with the registered connection, with the dial's
/// error, or with [`TransportError::Timeout`] when `connect_timeout` elapses
/// first.
pub struct ConnectFuture<T> {
    rx: watch::Receiver<ConnectOutcome<T>>,
    address: RemoteAddress,
    deadline: Instant,
    timeout: Duration,
}

impl<T> ConnectFuture<T>
where
    T: Send + Sync + 'static,
{
    pub(crate) fn new(
        rx: watch::Receiver<ConnectOutcome<T>>,
        address: RemoteAddress,
        timeout: Duration,
    ) -> Self {
        Self {
            rx,
            address,
            deadline: Instant::now() + timeout,
            timeout,
        }
    }

    /// The destination being dialed.
    pub fn address(&self) -> &RemoteAddress {
        &self.address
    }

    /// Returns `true` once the dial has settled.
    pub fn is_settled(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Waits for the dial's outcome.
    ///
    /// # Errors
    ///
    /// The dial's error, [`TransportError::Timeout`] once the connect timeout
    /// elapses, or [`TransportError::Closed`] when the dial task went away
    /// without publishing.
    pub async fn wait(mut self) -> Result<Arc<PooledConnection<T>>, TransportError> {
        let address = self.address.to_string();
        let rx = &mut self.rx;
        let settled = tokio::time::timeout_at(self.deadline, async {
            loop {
                let current = rx.borrow_and_update().clone();
                if let Some(outcome) = current {
                    return outcome;
                }
                if rx.changed().await.is_err() {
                    return Err(TransportError::Closed {
                        address: address.clone(),
                    });
                }
            }
        })
        .await;

        settled.unwrap_or_else(|_| {
            Err(TransportError::Timeout {
                address: self.address.to_string(),
                duration: self.timeout,
            })
        })
    }
}

impl<T> IntoFuture for ConnectFuture<T>
where
    T: Send + Sync + 'static,
{
    type Output = Result<Arc<PooledConnection<T>>, TransportError>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        self.wait().boxed()
    }
}
