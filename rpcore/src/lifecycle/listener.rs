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

//! Lifecycle listeners.
//!
//! Listeners are notified synchronously, in registration order, on every
//! state change. A listener that returns an error or panics is logged and
//! skipped; the transition and the remaining listeners are unaffected.

use super::LifecycleEvent;
use crate::error::BoxError;
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

#[cfg(feature = "observability")]
use tracing::error;

/// Observer of lifecycle transitions.
///
/// Any `Fn(&LifecycleEvent)` closure is a listener.
///
/// # Examples
///
/// ```rust
/// use rpcore::lifecycle::{Lifecycle, LifecycleEvent, LifecycleHooks};
/// use std::sync::Arc;
///
/// struct Noop;
/// impl LifecycleHooks for Noop {}
///
/// let lifecycle = Lifecycle::new("example", Noop);
/// lifecycle
///     .add_listener(Arc::new(|event: &LifecycleEvent| {
///         println!("{} -> {}", event.previous, event.current);
///     }))
///     .unwrap();
/// ```
pub trait LifecycleListener: Send + Sync + 'static {
    /// Called after the component's state changed.
    fn on_event(&self, event: &LifecycleEvent) -> Result<(), BoxError>;
}

impl<F> LifecycleListener for F
where
    F: Fn(&LifecycleEvent) + Send + Sync + 'static,
{
    fn on_event(&self, event: &LifecycleEvent) -> Result<(), BoxError> {
        self(event);
        Ok(())
    }
}

/// Ordered listener list with per-listener failure isolation.
#[derive(Default)]
pub(crate) struct ListenerList {
    listeners: RwLock<Vec<Arc<dyn LifecycleListener>>>,
}

impl ListenerList {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, listener: Arc<dyn LifecycleListener>) {
        self.listeners.write().push(listener);
    }

    /// Appends `listener` unless `reject` returns `true` under the write lock.
    pub(crate) fn push_unless(
        &self,
        listener: Arc<dyn LifecycleListener>,
        reject: impl FnOnce() -> bool,
    ) -> bool {
        let mut listeners = self.listeners.write();
        if reject() {
            return false;
        }
        listeners.push(listener);
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub(crate) fn notify(&self, event: &LifecycleEvent) {
        // Snapshot so a listener may register further listeners without deadlocking.
        let listeners: Vec<_> = self.listeners.read().iter().cloned().collect();
        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(_e)) => {
                    #[cfg(feature = "observability")]
                    error!(
                        component = %event.component,
                        state = %event.current,
                        error = %_e,
                        "Lifecycle listener failed"
                    );
                }
                Err(_) => {
                    #[cfg(feature = "observability")]
                    error!(
                        component = %event.component,
                        state = %event.current,
                        "Lifecycle listener panicked"
                    );
                }
            }
        }
    }
}
