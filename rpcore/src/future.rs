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

//! Close futures for shutdown coordination.
//!
//! Clients, servers and pooled connections each own a [`CloseSignal`]. Anyone
//! holding the matching [`CloseFuture`] can await the moment teardown has
//! fully finished, whether or not releasing the underlying resource
//! succeeded.
//!
//! # Examples
//!
//! ```rust
//! use rpcore::future::CloseSignal;
//!
//! # async fn example() {
//! let signal = CloseSignal::new();
//! let closed = signal.future();
//!
//! tokio::spawn(async move {
//!     // ... release resources ...
//!     signal.complete();
//! });
//!
//! closed.await;
//! # }
//! ```

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::future::IntoFuture;
use tokio::sync::watch;

/// Settling side of a close future. Completes at most once.
#[derive(Debug)]
pub struct CloseSignal {
    tx: watch::Sender<bool>,
}

impl CloseSignal {
    /// Creates an unsettled signal.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Settles every [`CloseFuture`] derived from this signal.
    ///
    /// Returns `true` on the first call and `false` afterwards.
    pub fn complete(&self) -> bool {
        self.tx.send_if_modified(|done| {
            if *done {
                false
            } else {
                *done = true;
                true
            }
        })
    }

    /// Returns `true` once [`complete`](Self::complete) has been called.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        *self.tx.borrow()
    }

    /// A future settling when this signal completes.
    #[must_use]
    pub fn future(&self) -> CloseFuture {
        CloseFuture {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for CloseSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Awaitable view of a [`CloseSignal`].
///
/// Cloning is cheap and every clone settles together. A future whose signal
/// was dropped without completing also settles, since its owner is gone.
#[derive(Debug, Clone)]
pub struct CloseFuture {
    rx: watch::Receiver<bool>,
}

impl CloseFuture {
    /// Returns `true` if the owner has finished closing.
    #[must_use]
    pub fn is_done(&self) -> bool {
        *self.rx.borrow()
    }

    /// Waits until the owner has finished closing.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow_and_update() {
            // An error means the signal was dropped; treat that as settled.
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

impl IntoFuture for CloseFuture {
    type Output = ();
    type IntoFuture = BoxFuture<'static, ()>;

    fn into_future(self) -> Self::IntoFuture {
        async move { self.wait().await }.boxed()
    }
}
