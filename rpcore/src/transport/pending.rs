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

//! In-flight requests awaiting their response on a connection.
//!
//! The table lock is synchronous and never held across an await, so entries
//! can be removed from `Drop`. A caller that gives up on a call (timeout,
//! cancellation) removes its entry that way, and a response arriving later
//! finds nothing to complete and is dropped.

use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::oneshot;

/// Maps request ids to the waiter for their response.
///
/// # Example
///
/// ```rust
/// use rpcore::transport::PendingRequests;
///
/// # async fn example() {
/// let pending = PendingRequests::<String>::new();
/// let rx = pending.register(42);
///
/// assert!(pending.complete(42, "response".to_string()));
/// assert_eq!(rx.await.unwrap(), "response");
/// # }
/// ```
#[derive(Debug)]
pub struct PendingRequests<T> {
    requests: Mutex<HashMap<u64, oneshot::Sender<T>>>,
}

impl<T> PendingRequests<T> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Registers `request_id` and returns the receiver for its response.
    pub fn register(&self, request_id: u64) -> oneshot::Receiver<T> {
        let (tx, rx) = oneshot::channel();
        self.requests.lock().insert(request_id, tx);
        rx
    }

    /// Delivers a response. Returns `false` if nobody is waiting for it.
    pub fn complete(&self, request_id: u64, response: T) -> bool {
        match self.requests.lock().remove(&request_id) {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    /// Forgets `request_id`. Returns `false` if it was not registered.
    pub fn cancel(&self, request_id: u64) -> bool {
        self.requests.lock().remove(&request_id).is_some()
    }

    /// Drops every waiter; their receivers observe a closed channel.
    /// Returns how many were pending.
    pub fn fail_all(&self) -> usize {
        let drained: Vec<_> = self.requests.lock().drain().collect();
        drained.len()
    }

    /// Number of in-flight requests.
    pub fn len(&self) -> usize {
        self.requests.lock().len()
    }

    /// Returns `true` when nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.requests.lock().is_empty()
    }
}

impl<T> Default for PendingRequests<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes its entry from a [`PendingRequests`] table when dropped.
pub(crate) struct PendingGuard<'a, T> {
    pending: &'a PendingRequests<T>,
    request_id: u64,
}

impl<'a, T> PendingGuard<'a, T> {
    pub(crate) fn new(pending: &'a PendingRequests<T>, request_id: u64) -> Self {
        Self {
            pending,
            request_id,
        }
    }
}

impl<T> Drop for PendingGuard<'_, T> {
    fn drop(&mut self) {
        self.pending.cancel(self.request_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_register_and_complete() {
        let pending = PendingRequests::<String>::new();
        let rx = pending.register(7);
        assert_eq!(pending.len(), 1);

        assert!(pending.complete(7, "done".to_string()));
        assert_eq!(rx.await.unwrap(), "done");
        assert!(pending.is_empty());
    }

    #[test]
    fn test_late_response_is_discarded() {
        let pending = PendingRequests::<u32>::new();
        let rx = pending.register(1);
        drop(rx);
        assert!(!pending.complete(1, 5));
        assert!(!pending.complete(2, 5));
    }

    #[tokio::test]
    async fn test_fail_all_closes_receivers() {
        let pending = PendingRequests::<u32>::new();
        let a = pending.register(1);
        let b = pending.register(2);
        assert_eq!(pending.fail_all(), 2);
        assert!(a.await.is_err());
        assert!(b.await.is_err());
        assert!(pending.is_empty());
    }

    #[test]
    fn test_guard_cancels_on_drop() {
        let pending = PendingRequests::<u32>::new();
        let _rx = pending.register(9);
        {
            let _guard = PendingGuard::new(&pending, 9);
        }
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_operations() {
        let pending = Arc::new(PendingRequests::<u64>::new());
        let mut handles = vec![];
        for i in 0..100 {
            let pending = pending.clone();
            handles.push(tokio::spawn(async move {
                let rx = pending.register(i);
                pending.complete(i, i * 2);
                rx.await.unwrap()
            }));
        }
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap(), (i as u64) * 2);
        }
        assert!(pending.is_empty());
    }
}
