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

//! Pooled connection handle.

use crate::future::{CloseFuture, CloseSignal};
use crate::transport::{Connection, RemoteAddress, TransportError};
use parking_lot::Mutex;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// One open connection owned by a [`ConnectionPool`](super::ConnectionPool).
///
/// Callers borrow it through an `Arc` handed out by
/// [`acquire`](super::ConnectionPool::acquire) and give it back with
/// [`release`](super::ConnectionPool::release). It dereferences to the
/// underlying connection.
pub struct PooledConnection<T> {
    connection: T,
    address: RemoteAddress,
    slot: usize,
    open: AtomicBool,
    in_use: AtomicUsize,
    last_used: Mutex<Instant>,
    closed: CloseSignal,
}

impl<T: Connection> PooledConnection<T> {
    pub(crate) fn new(connection: T, address: RemoteAddress, slot: usize) -> Self {
        Self {
            connection,
            address,
            slot,
            open: AtomicBool::new(true),
            in_use: AtomicUsize::new(0),
            last_used: Mutex::new(Instant::now()),
            closed: CloseSignal::new(),
        }
    }

    /// The destination.
    pub fn address(&self) -> &RemoteAddress {
        &self.address
    }

    /// Index of the pool slot holding this connection.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Returns `true` while the connection may be handed out.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && self.connection.is_healthy()
    }

    /// Number of callers currently borrowing the connection.
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    /// When the connection was last handed out or released.
    pub fn last_used(&self) -> Instant {
        *self.last_used.lock()
    }

    /// How long the connection has been idle; zero while borrowed.
    pub fn idle_for(&self) -> Duration {
        if self.in_use() > 0 {
            return Duration::ZERO;
        }
        self.last_used().elapsed()
    }

    /// Settles once the connection has been closed.
    pub fn close_future(&self) -> CloseFuture {
        self.closed.future()
    }

    pub(crate) fn checkout(&self) {
        self.in_use.fetch_add(1, Ordering::AcqRel);
        self.touch();
    }

    pub(crate) fn checkin(&self) {
        let _ = self
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        self.touch();
    }

    fn touch(&self) {
        *self.last_used.lock() = Instant::now();
    }

    /// Closes the underlying connection and settles the close future.
    /// Only the first call closes; later calls wait for that close to settle.
    pub(crate) async fn close(&self) -> Result<(), TransportError> {
        if !self.open.swap(false, Ordering::AcqRel) {
            self.closed.future().wait().await;
            return Ok(());
        }
        let result = self.connection.close().await;
        self.closed.complete();
        result
    }
}

impl<T> Deref for PooledConnection<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.connection
    }
}

impl<T> fmt::Debug for PooledConnection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("address", &self.address)
            .field("slot", &self.slot)
            .field("open", &self.open.load(Ordering::Relaxed))
            .field("in_use", &self.in_use.load(Ordering::Relaxed))
            .finish()
    }
}
