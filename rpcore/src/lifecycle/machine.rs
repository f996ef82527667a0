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

//! The lifecycle state machine.

use super::listener::ListenerList;
use super::{LifecycleError, LifecycleEvent, LifecycleListener, LifecyclePhase, LifecycleState};
use crate::error::{BoxError, SharedError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

#[cfg(feature = "observability")]
use tracing::{debug, warn};

/// Component-specific work run by a [`Lifecycle`].
///
/// Every hook defaults to a no-op.
#[async_trait]
pub trait LifecycleHooks: Send + Sync + 'static {
    /// Acquire whatever the component needs before it can start.
    async fn on_init(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Begin serving.
    async fn on_start(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Release everything acquired by init and start.
    async fn on_stop(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Object-safe view of a lifecycle-managed component.
///
/// Plugins implement this (usually by wrapping a [`Lifecycle`]) to be driven
/// by the [`ConfigManager`](crate::runtime::ConfigManager).
#[async_trait]
pub trait LifecycleComponent: Send + Sync + 'static {
    /// Component name used in logs and errors.
    fn name(&self) -> &str;

    /// Current state.
    fn state(&self) -> LifecycleState;

    /// Runs the init transition.
    async fn init(&self) -> Result<(), LifecycleError>;

    /// Runs the start transition, initializing first when needed.
    async fn start(&self) -> Result<(), LifecycleError>;

    /// Runs the stop transition.
    async fn stop(&self) -> Result<(), LifecycleError>;

    /// Stops and logs instead of returning an error.
    async fn stop_quietly(&self);

    /// Registers a listener.
    fn add_listener(&self, listener: Arc<dyn LifecycleListener>) -> Result<(), LifecycleError>;

    /// `state() == Started`
    fn is_started(&self) -> bool {
        self.state() == LifecycleState::Started
    }

    /// `state() == Stopped`
    fn is_stopped(&self) -> bool {
        self.state() == LifecycleState::Stopped
    }

    /// `state() == Failed`
    fn is_failed(&self) -> bool {
        self.state() == LifecycleState::Failed
    }
}

/// Reusable init/start/stop state machine.
///
/// A component embeds a `Lifecycle` and supplies its resource handling through
/// [`LifecycleHooks`]. Transition methods serialize on a per-instance async
/// mutex, so concurrent `start` and `stop` calls take effect one after the
/// other. The state itself is only ever changed by these methods.
///
/// When an init or start hook fails the machine moves to `Failed`, then runs
/// the stop transition to release whatever was acquired. The error returned
/// carries the hook's error and, if the stop failed as well, that error as
/// `suppressed`.
///
/// # Examples
///
/// ```rust
/// use rpcore::error::BoxError;
/// use rpcore::lifecycle::{Lifecycle, LifecycleHooks, LifecycleState};
///
/// struct Server;
///
/// #[async_trait::async_trait]
/// impl LifecycleHooks for Server {
///     async fn on_start(&self) -> Result<(), BoxError> {
///         Ok(())
///     }
/// }
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let lifecycle = Lifecycle::new("server", Server);
/// lifecycle.start().await?;
/// assert_eq!(lifecycle.state(), LifecycleState::Started);
///
/// lifecycle.stop().await?;
/// lifecycle.stop().await?; // no-op
/// assert!(lifecycle.is_stopped());
/// # Ok(())
/// # }
/// ```
pub struct Lifecycle<H> {
    name: String,
    hooks: H,
    state: RwLock<LifecycleState>,
    transition: Mutex<()>,
    listeners: ListenerList,
}

impl<H: LifecycleHooks> Lifecycle<H> {
    /// Creates a machine in state [`LifecycleState::New`].
    pub fn new(name: impl Into<String>, hooks: H) -> Self {
        Self {
            name: name.into(),
            hooks,
            state: RwLock::new(LifecycleState::New),
            transition: Mutex::new(()),
            listeners: ListenerList::new(),
        }
    }

    /// Attaches `listener` to a machine that has not been shared yet.
    #[must_use]
    pub(crate) fn with_listener(self, listener: Arc<dyn LifecycleListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Component name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The embedded hooks.
    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// Current state.
    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    /// `state() == Started`
    pub fn is_started(&self) -> bool {
        self.state() == LifecycleState::Started
    }

    /// `state() == Stopped`
    pub fn is_stopped(&self) -> bool {
        self.state() == LifecycleState::Stopped
    }

    /// `state() == Failed`
    pub fn is_failed(&self) -> bool {
        self.state() == LifecycleState::Failed
    }

    /// Registers a listener.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::ListenerRejected`] once the component has begun
    /// starting, since the listener would have missed earlier events.
    pub fn add_listener(&self, listener: Arc<dyn LifecycleListener>) -> Result<(), LifecycleError> {
        let mut observed = LifecycleState::New;
        let accepted = self.listeners.push_unless(listener, || {
            observed = self.state();
            observed.has_begun_starting()
        });
        if accepted {
            Ok(())
        } else {
            Err(LifecycleError::ListenerRejected {
                component: self.name.clone(),
                state: observed,
            })
        }
    }

    /// Runs the init hook. Legal only from `New`.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::InvalidTransition`] outside `New`, or
    /// [`LifecycleError::HookFailed`] if the hook failed.
    pub async fn init(&self) -> Result<(), LifecycleError> {
        let _guard = self.transition.lock().await;
        self.init_locked().await
    }

    /// Runs the start hook.
    ///
    /// Returns immediately when already starting or started. Initializes first
    /// from `New`, and stops first from `Failed`.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::InvalidTransition`] from a state other than
    /// `New`, `Initialized`, `Stopped` or `Failed`, or
    /// [`LifecycleError::HookFailed`] if a hook failed.
    pub async fn start(&self) -> Result<(), LifecycleError> {
        let _guard = self.transition.lock().await;
        match self.state() {
            LifecycleState::Starting | LifecycleState::Started => return Ok(()),
            LifecycleState::New => self.init_locked().await?,
            LifecycleState::Failed => self.stop_locked().await?,
            LifecycleState::Initialized | LifecycleState::Stopped => {}
            other => return Err(self.invalid("start", other)),
        }

        self.set_state(LifecycleState::Starting, None);
        match self.hooks.on_start().await {
            Ok(()) => {
                self.set_state(LifecycleState::Started, None);
                Ok(())
            }
            Err(e) => Err(self.fail_and_stop(LifecyclePhase::Start, e).await),
        }
    }

    /// Runs the stop hook.
    ///
    /// A no-op when already stopping or stopped; from `New` the component is
    /// marked stopped without running the hook.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::HookFailed`] if the hook failed; the component is
    /// left `Failed`.
    pub async fn stop(&self) -> Result<(), LifecycleError> {
        let _guard = self.transition.lock().await;
        self.stop_locked().await
    }

    /// Like [`stop`](Self::stop) but only logs a failure.
    pub async fn stop_quietly(&self) {
        if let Err(_e) = self.stop().await {
            #[cfg(feature = "observability")]
            warn!(component = %self.name, error = %_e, "Quiet stop failed");
        }
    }

    async fn init_locked(&self) -> Result<(), LifecycleError> {
        let state = self.state();
        if state != LifecycleState::New {
            return Err(self.invalid("init", state));
        }

        self.set_state(LifecycleState::Initializing, None);
        match self.hooks.on_init().await {
            Ok(()) => {
                self.set_state(LifecycleState::Initialized, None);
                Ok(())
            }
            Err(e) => Err(self.fail_and_stop(LifecyclePhase::Init, e).await),
        }
    }

    async fn stop_locked(&self) -> Result<(), LifecycleError> {
        match self.state() {
            LifecycleState::Stopping | LifecycleState::Stopped => return Ok(()),
            LifecycleState::New => {
                self.set_state(LifecycleState::Stopped, None);
                return Ok(());
            }
            _ => {}
        }

        self.set_state(LifecycleState::Stopping, None);
        match self.hooks.on_stop().await {
            Ok(()) => {
                self.set_state(LifecycleState::Stopped, None);
                Ok(())
            }
            Err(e) => {
                let source: SharedError = Arc::from(e);
                self.set_state(LifecycleState::Failed, Some(source.clone()));
                Err(LifecycleError::HookFailed {
                    component: self.name.clone(),
                    phase: LifecyclePhase::Stop,
                    source,
                    suppressed: None,
                })
            }
        }
    }

    async fn fail_and_stop(&self, phase: LifecyclePhase, error: BoxError) -> LifecycleError {
        let source: SharedError = Arc::from(error);
        self.set_state(LifecycleState::Failed, Some(source.clone()));

        let suppressed = match self.stop_locked().await {
            Ok(()) => None,
            Err(stop_error) => Some(Arc::new(stop_error) as SharedError),
        };

        LifecycleError::HookFailed {
            component: self.name.clone(),
            phase,
            source,
            suppressed,
        }
    }

    fn set_state(&self, next: LifecycleState, cause: Option<SharedError>) {
        let previous = std::mem::replace(&mut *self.state.write(), next);

        #[cfg(feature = "observability")]
        debug!(component = %self.name, from = %previous, to = %next, "Lifecycle transition");

        self.listeners.notify(&LifecycleEvent {
            component: self.name.clone(),
            previous,
            current: next,
            cause,
        });
    }

    fn invalid(&self, action: &'static str, from: LifecycleState) -> LifecycleError {
        LifecycleError::InvalidTransition {
            component: self.name.clone(),
            action,
            from,
        }
    }
}

#[async_trait]
impl<H: LifecycleHooks> LifecycleComponent for Lifecycle<H> {
    fn name(&self) -> &str {
        Lifecycle::name(self)
    }

    fn state(&self) -> LifecycleState {
        Lifecycle::state(self)
    }

    async fn init(&self) -> Result<(), LifecycleError> {
        Lifecycle::init(self).await
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        Lifecycle::start(self).await
    }

    async fn stop(&self) -> Result<(), LifecycleError> {
        Lifecycle::stop(self).await
    }

    async fn stop_quietly(&self) {
        Lifecycle::stop_quietly(self).await;
    }

    fn add_listener(&self, listener: Arc<dyn LifecycleListener>) -> Result<(), LifecycleError> {
        Lifecycle::add_listener(self, listener)
    }
}

impl<H> fmt::Debug for Lifecycle<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("name", &self.name)
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}
