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

//! Backup (hedged) requests.
//!
//! The primary leg starts at once. If it has not finished after the backup
//! delay, a second leg is sent to the backup invoker and the two race. A
//! primary that fails before the delay starts the backup straight away. The
//! backup invoker itself is resolved only when its leg is sent, so a fast
//! primary never pays for selecting or dialing a second instance, and a
//! backup that cannot be set up counts as a failed leg. The first success
//! wins; the other leg keeps running in the background and its
//! result is dropped. When both legs fail the error of the one that failed
//! last is returned.
//!
//! ```text
//!  t=0            delay                 first success
//!   │ primary ──────┼───────────────────────x  (dropped)
//!   │               │ backup ──────────▶ ✓ winner
//! ```

use super::{Invoker, LeftTimeout, Request, Response};
use crate::error::{FrameworkCode, RpcError};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[cfg(feature = "observability")]
use tracing::debug;

/// Produces the backup invoker when the backup leg is sent.
pub type BackupResolver =
    Box<dyn FnOnce() -> BoxFuture<'static, Result<Arc<dyn Invoker>, RpcError>> + Send>;

/// Which leg of a hedged call produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HedgeWinner {
    /// The primary invoker answered first.
    Primary,
    /// The backup invoker answered first.
    Backup,
}

impl HedgeWinner {
    /// Returns `true` if the primary won.
    #[must_use]
    pub const fn is_primary(self) -> bool {
        matches!(self, Self::Primary)
    }

    /// Returns `true` if the backup won.
    #[must_use]
    pub const fn is_backup(self) -> bool {
        matches!(self, Self::Backup)
    }
}

/// Hedging policy: how long to wait for the primary before sending a backup.
///
/// # Examples
///
/// ```rust
/// use rpcore::invoke::{BackupRequest, FnInvoker, HedgeWinner, Request, Response};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), rpcore::RpcError> {
/// let slow = Arc::new(FnInvoker::new("slow", |r: Request| async move {
///     tokio::time::sleep(Duration::from_millis(300)).await;
///     Ok(Response::ok(r.request_id, b"slow".to_vec()))
/// }));
/// let fast = Arc::new(FnInvoker::new("fast", |r: Request| async move {
///     Ok(Response::ok(r.request_id, b"fast".to_vec()))
/// }));
///
/// let hedge = BackupRequest::new(Duration::from_millis(100));
/// let (response, winner) = hedge
///     .invoke(slow, fast, Request::new("svc", "m", Vec::new()), Duration::from_secs(1))
///     .await?;
/// assert_eq!(winner, HedgeWinner::Backup);
/// assert_eq!(response.body, b"fast");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupRequest {
    delay: Duration,
}

impl BackupRequest {
    /// Creates a policy sending the backup after `delay`.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// The backup trigger delay.
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Runs a hedged call bounded by `timeout` (tightened by the request's
    /// link deadline).
    ///
    /// A delay that is not shorter than the budget leaves no room for a
    /// backup, and one-way requests are never duplicated; both run the
    /// primary only.
    ///
    /// # Errors
    ///
    /// [`RpcError::Timeout`] when the budget runs out before either leg
    /// succeeds, otherwise the last leg's error when both fail.
    pub async fn invoke(
        &self,
        primary: Arc<dyn Invoker>,
        backup: Arc<dyn Invoker>,
        request: Request,
        timeout: Duration,
    ) -> Result<(Response, HedgeWinner), RpcError> {
        let resolve: BackupResolver = Box::new(move || async move { Ok::<_, RpcError>(backup) }.boxed());
        self.invoke_deferred(primary, resolve, request, timeout).await
    }

    /// Runs a hedged call whose backup invoker is obtained from `backup` only
    /// when the backup leg is sent. A resolver error fails the backup leg and
    /// leaves the primary running.
    ///
    /// # Errors
    ///
    /// As [`invoke`](Self::invoke).
    pub async fn invoke_deferred(
        &self,
        primary: Arc<dyn Invoker>,
        backup: BackupResolver,
        mut request: Request,
        timeout: Duration,
    ) -> Result<(Response, HedgeWinner), RpcError> {
        let target = primary.target();
        let left = LeftTimeout::compute(timeout, request.context.link_timeout());
        if left.is_expired() {
            return Err(RpcError::timeout(left.kind(), Duration::ZERO, target));
        }
        let deadline = Instant::now() + left.timeout();
        request.timeout = Some(left.timeout());

        let hedged = self.delay < left.timeout() && !request.is_oneway();
        let race = async {
            if hedged {
                self.race(primary, backup, request).await
            } else {
                settle(spawn_leg(primary, request).await).map(|r| (r, HedgeWinner::Primary))
            }
        };

        match tokio::time::timeout_at(deadline, race).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::timeout(left.kind(), left.timeout(), target)),
        }
    }

    async fn race(
        &self,
        primary: Arc<dyn Invoker>,
        backup: BackupResolver,
        request: Request,
    ) -> Result<(Response, HedgeWinner), RpcError> {
        let mut primary_leg = spawn_leg(primary, request.clone());

        tokio::select! {
            outcome = &mut primary_leg => {
                match settle(outcome) {
                    Ok(response) => return Ok((response, HedgeWinner::Primary)),
                    Err(_e) => {
                        #[cfg(feature = "observability")]
                        debug!(error = %_e, "Primary failed before backup delay, sending backup now");
                        let backup_leg = spawn_backup(backup, request);
                        return settle(backup_leg.await).map(|r| (r, HedgeWinner::Backup));
                    }
                }
            }
            _ = tokio::time::sleep(self.delay) => {}
        }

        #[cfg(feature = "observability")]
        debug!(delay = ?self.delay, "Primary still pending, sending backup");
        let mut backup_leg = spawn_backup(backup, request);

        // The losing leg's handle is dropped on return; the task finishes on
        // its own and its result is discarded.
        tokio::select! {
            outcome = &mut primary_leg => match settle(outcome) {
                Ok(response) => Ok((response, HedgeWinner::Primary)),
                Err(_) => settle(backup_leg.await).map(|r| (r, HedgeWinner::Backup)),
            },
            outcome = &mut backup_leg => match settle(outcome) {
                Ok(response) => Ok((response, HedgeWinner::Backup)),
                Err(_) => settle(primary_leg.await).map(|r| (r, HedgeWinner::Primary)),
            },
        }
    }
}

type Leg = JoinHandle<Result<Response, RpcError>>;

fn spawn_leg(invoker: Arc<dyn Invoker>, request: Request) -> Leg {
    tokio::spawn(async move { invoker.invoke(request).await })
}

fn spawn_backup(resolve: BackupResolver, request: Request) -> Leg {
    tokio::spawn(async move {
        let invoker = resolve().await?;
        invoker.invoke(request).await
    })
}

/// Flattens a leg's outcome; a response carrying a framework failure counts
/// as a failed leg.
fn settle(outcome: Result<Result<Response, RpcError>, tokio::task::JoinError>) -> Result<Response, RpcError> {
    match outcome {
        Ok(result) => result.and_then(Response::check_framework),
        Err(e) => Err(RpcError::framework(
            FrameworkCode::Unknown,
            format!("invocation task failed: {}", e),
        )),
    }
}
