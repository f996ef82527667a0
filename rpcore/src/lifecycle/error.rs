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

//! Lifecycle error types.

use super::{LifecyclePhase, LifecycleState};
use crate::error::SharedError;
use thiserror::Error;

/// Errors raised by lifecycle transitions.
///
/// A failing hook is reported as [`LifecycleError::HookFailed`]. When the
/// compensating stop that follows an init or start failure also fails, its
/// error is kept in `suppressed` and the original cause stays the
/// [`source`](std::error::Error::source).
#[derive(Debug, Clone, Error)]
pub enum LifecycleError {
    /// The requested transition is not legal from the current state.
    #[error("{component}: cannot {action} while {from}")]
    InvalidTransition {
        /// Component name
        component: String,
        /// The transition that was requested
        action: &'static str,
        /// State at the time of the request
        from: LifecycleState,
    },

    /// A component hook returned an error.
    #[error("{component}: {phase} failed: {source}")]
    HookFailed {
        /// Component name
        component: String,
        /// Hook that failed
        phase: LifecyclePhase,
        /// The hook's error
        #[source]
        source: SharedError,
        /// Error raised by the compensating stop, if any
        suppressed: Option<SharedError>,
    },

    /// A listener was added after the component began starting.
    #[error("{component}: listeners cannot be added while {state}")]
    ListenerRejected {
        /// Component name
        component: String,
        /// State at the time of the request
        state: LifecycleState,
    },
}

impl LifecycleError {
    /// The hook error that caused this failure, if any.
    #[must_use]
    pub fn cause(&self) -> Option<&SharedError> {
        match self {
            Self::HookFailed { source, .. } => Some(source),
            _ => None,
        }
    }

    /// The secondary error raised while compensating for a failed hook.
    #[must_use]
    pub fn suppressed(&self) -> Option<&SharedError> {
        match self {
            Self::HookFailed { suppressed, .. } => suppressed.as_ref(),
            _ => None,
        }
    }

    /// The phase whose hook failed.
    #[must_use]
    pub fn phase(&self) -> Option<LifecyclePhase> {
        match self {
            Self::HookFailed { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}
