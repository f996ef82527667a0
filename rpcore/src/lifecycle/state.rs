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

//! Lifecycle states, phases and transition events.

use crate::error::SharedError;
use std::fmt;

/// State of a component governed by a [`Lifecycle`](super::Lifecycle).
///
/// Transitions run along `New → Initializing → Initialized → Starting →
/// Started → Stopping → Stopped`. `Failed` can be entered from any in-progress
/// transition and is always followed by an attempt to reach `Stopped`.
///
/// # Examples
///
/// ```rust
/// use rpcore::lifecycle::LifecycleState;
///
/// assert!(LifecycleState::Stopped.is_closed());
/// assert!(!LifecycleState::Initialized.is_closed());
/// assert_eq!(LifecycleState::Started.to_string(), "started");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Constructed, nothing acquired yet.
    New,
    /// The init hook is running.
    Initializing,
    /// The init hook completed.
    Initialized,
    /// The start hook is running.
    Starting,
    /// The start hook completed; the component is serving.
    Started,
    /// The stop hook is running.
    Stopping,
    /// The stop hook completed, or there was nothing to release.
    Stopped,
    /// A hook failed.
    Failed,
}

impl LifecycleState {
    /// Returns the lowercase name of the state.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Initializing => "initializing",
            Self::Initialized => "initialized",
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }

    /// `Failed`, `Stopping` or `Stopped`.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Failed | Self::Stopping | Self::Stopped)
    }

    /// Returns `true` once the component has begun starting. Listeners are
    /// no longer accepted from this point on.
    #[must_use]
    pub const fn has_begun_starting(&self) -> bool {
        matches!(
            self,
            Self::Starting | Self::Started | Self::Stopping | Self::Stopped
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The hook a lifecycle transition runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecyclePhase {
    /// `on_init`
    Init,
    /// `on_start`
    Start,
    /// `on_stop`
    Stop,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => f.write_str("init"),
            Self::Start => f.write_str("start"),
            Self::Stop => f.write_str("stop"),
        }
    }
}

/// A single state change, delivered to every registered listener.
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    /// Name of the component that changed state.
    pub component: String,
    /// State before the change.
    pub previous: LifecycleState,
    /// State after the change.
    pub current: LifecycleState,
    /// The hook failure that caused a move to [`LifecycleState::Failed`].
    pub cause: Option<SharedError>,
}
