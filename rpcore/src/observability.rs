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

//! Structured logging helpers.
//!
//! With the `observability` feature (default) these emit `tracing` events;
//! without it they compile to nothing. Install a subscriber to see them:
//!
//! ```rust,no_run
//! tracing_subscriber::fmt()
//!     .with_env_filter("rpcore=debug")
//!     .init();
//! ```
//!
//! Levels follow the error taxonomy: transport and framework failures log at
//! `ERROR`, timeouts and lifecycle failures at `WARN`, business results at
//! `INFO`.

use crate::error::{BoxError, RpcError};
use crate::lifecycle::{LifecycleEvent, LifecycleListener};

#[cfg(feature = "observability")]
use crate::lifecycle::LifecycleState;

/// Logs `error` with structured fields at a level matching its category.
///
/// `context` names the operation that failed.
#[cfg(feature = "observability")]
pub fn log_error(error: &RpcError, context: &str) {
    match error {
        RpcError::Transport(e) => {
            tracing::error!(
                context,
                error = %e,
                recoverable = error.is_recoverable(),
                "Transport error"
            );
        }
        RpcError::Framework { code, message } => {
            tracing::error!(context, code = code.as_i32(), message = %message, "Framework error");
        }
        RpcError::Timeout { kind, timeout, target } => {
            tracing::warn!(context, kind = %kind, timeout = ?timeout, target = %target, "Invocation timed out");
        }
        RpcError::Lifecycle(e) => {
            tracing::warn!(context, error = %e, "Lifecycle error");
        }
        RpcError::Business { code, message } => {
            tracing::info!(context, code, message = %message, "Business error");
        }
        RpcError::RegistryClosed { .. } | RpcError::Config { .. } => {
            tracing::warn!(context, error = %error, "Error");
        }
    }
}

/// Logs an error with structured context (no-op when `observability` is
/// disabled).
#[cfg(not(feature = "observability"))]
#[inline]
pub fn log_error(_error: &RpcError, _context: &str) {}

/// A [`LifecycleListener`] logging every transition of a component.
///
/// Failures are logged at `WARN` with their cause, everything else at
/// `DEBUG`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingListener;

impl LifecycleListener for LoggingListener {
    fn on_event(&self, event: &LifecycleEvent) -> Result<(), BoxError> {
        #[cfg(feature = "observability")]
        match (&event.current, &event.cause) {
            (LifecycleState::Failed, Some(cause)) => tracing::warn!(
                component = %event.component,
                previous = %event.previous,
                cause = %cause,
                "Component failed"
            ),
            _ => tracing::debug!(
                component = %event.component,
                previous = %event.previous,
                current = %event.current,
                "Component state changed"
            ),
        }
        #[cfg(not(feature = "observability"))]
        let _ = event;
        Ok(())
    }
}
