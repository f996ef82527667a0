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

//! Invocation orchestration: timeouts and sync/async adaptation.

use super::{BackupRequest, BackupResolver, HedgeWinner, Invoker, LeftTimeout, Request, Response};
use crate::error::{FrameworkCode, RpcError};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;

#[cfg(feature = "observability")]
use tracing::debug;

/// Future returned by [`InvocationOrchestrator::invoke_async`].
pub type ResponseFuture = BoxFuture<'static, Result<Response, RpcError>>;

/// Turns an [`Invoker`] call into a caller-visible result bounded by a timeout.
///
/// The underlying call always runs as its own task. When the timeout fires
/// first the caller sees [`RpcError::Timeout`] immediately, while the call
/// keeps running in the background and its result is discarded when it
/// arrives.
///
/// Framework failures reported inside a response are raised as errors.
/// Business failures stay in the returned [`Response`]; use
/// [`Response::into_result`] to raise them as well.
///
/// # Examples
///
/// ```rust
/// use rpcore::invoke::{FnInvoker, InvocationOrchestrator, Request, Response};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), rpcore::RpcError> {
/// let orchestrator = InvocationOrchestrator::current()?;
/// let echo = Arc::new(FnInvoker::new("echo", |r: Request| async move {
///     Ok(Response::ok(r.request_id, r.body))
/// }));
///
/// let response = orchestrator
///     .invoke_async(echo, Request::new("echo", "say", b"hi".to_vec()), Duration::from_secs(1))
///     .await?;
/// assert_eq!(response.body, b"hi");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct InvocationOrchestrator {
    handle: Handle,
}

impl InvocationOrchestrator {
    /// Creates an orchestrator spawning calls onto `handle`.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Creates an orchestrator bound to the runtime of the calling context.
    ///
    /// # Errors
    ///
    /// [`RpcError::Framework`] when called outside a Tokio runtime.
    pub fn current() -> Result<Self, RpcError> {
        Handle::try_current().map(Self::new).map_err(|e| {
            RpcError::framework(FrameworkCode::Unknown, format!("no async runtime: {}", e))
        })
    }

    /// The runtime calls are spawned onto.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Starts the call and returns a future for its result.
    ///
    /// The call is issued before this method returns and the timeout is
    /// measured from that moment, whether or not the future is polled.
    /// `timeout` is tightened by the request's link deadline and the result is
    /// written to `request.timeout` for the callee.
    pub fn invoke_async(
        &self,
        invoker: Arc<dyn Invoker>,
        mut request: Request,
        timeout: Duration,
    ) -> ResponseFuture {
        let target = invoker.target();
        let left = LeftTimeout::compute(timeout, request.context.link_timeout());
        if left.is_expired() {
            let err = RpcError::timeout(left.kind(), Duration::ZERO, target);
            return async move { Err(err) }.boxed();
        }
        request.timeout = Some(left.timeout());
        let deadline = Instant::now() + left.timeout();

        let call = self.handle.spawn(async move { invoker.invoke(request).await });
        let guarded = self.handle.spawn(async move {
            match tokio::time::timeout_at(deadline, call).await {
                Ok(Ok(result)) => result.and_then(Response::check_framework),
                Ok(Err(e)) => Err(RpcError::framework(
                    FrameworkCode::Unknown,
                    format!("invocation task failed: {}", e),
                )),
                Err(_) => {
                    #[cfg(feature = "observability")]
                    debug!(target = %target, timeout = ?left.timeout(), kind = %left.kind(), "Invocation timed out");
                    Err(RpcError::timeout(left.kind(), left.timeout(), target))
                }
            }
        });

        async move {
            guarded.await.unwrap_or_else(|e| {
                Err(RpcError::framework(
                    FrameworkCode::Unknown,
                    format!("invocation task failed: {}", e),
                ))
            })
        }
        .boxed()
    }

    /// Performs the call and blocks the calling thread until it completes or
    /// `timeout` expires.
    ///
    /// A business failure is returned as `Ok(response)` with a non-zero
    /// `business_code`; framework failures and timeouts are errors.
    ///
    /// # Panics
    ///
    /// Must not be called from within an async task; use it from plain
    /// threads or [`tokio::task::spawn_blocking`].
    ///
    /// # Errors
    ///
    /// [`RpcError::Timeout`] on expiry, or the call's framework error.
    pub fn invoke_sync(
        &self,
        invoker: Arc<dyn Invoker>,
        request: Request,
        timeout: Duration,
    ) -> Result<Response, RpcError> {
        let pending = self.invoke_async(invoker, request, timeout);
        self.handle.block_on(pending)
    }

    /// Runs a hedged call: see [`BackupRequest`].
    ///
    /// # Errors
    ///
    /// As [`BackupRequest::invoke`].
    pub async fn invoke_with_backup(
        &self,
        primary: Arc<dyn Invoker>,
        backup: Arc<dyn Invoker>,
        request: Request,
        timeout: Duration,
        delay: Duration,
    ) -> Result<(Response, HedgeWinner), RpcError> {
        BackupRequest::new(delay)
            .invoke(primary, backup, request, timeout)
            .await
    }

    /// Runs a hedged call whose backup invoker is resolved only if the
    /// backup leg is sent: see [`BackupRequest::invoke_deferred`].
    ///
    /// # Errors
    ///
    /// As [`BackupRequest::invoke`].
    pub async fn invoke_with_deferred_backup(
        &self,
        primary: Arc<dyn Invoker>,
        backup: BackupResolver,
        request: Request,
        timeout: Duration,
        delay: Duration,
    ) -> Result<(Response, HedgeWinner), RpcError> {
        BackupRequest::new(delay)
            .invoke_deferred(primary, backup, request, timeout)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TimeoutKind;
    use crate::invoke::{FnInvoker, LinkInvokeTimeout};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn sleeping(delay: Duration) -> Arc<dyn Invoker> {
        Arc::new(FnInvoker::new("sleeper", move |r: Request| async move {
            tokio::time::sleep(delay).await;
            Ok(Response::ok(r.request_id, Vec::new()))
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires_at_deadline() {
        let orchestrator = InvocationOrchestrator::current().unwrap();
        let start = Instant::now();

        let err = orchestrator
            .invoke_async(
                sleeping(Duration::from_millis(2000)),
                Request::new("s", "m", Vec::new()),
                Duration::from_millis(50),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RpcError::Timeout { kind: TimeoutKind::Invoke, .. }));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(50), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(100), "{:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_call_completes_in_background() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let invoker: Arc<dyn Invoker> = Arc::new(FnInvoker::new("late", move |r: Request| {
            let flag = flag.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(Response::ok(r.request_id, Vec::new()))
            }
        }));

        let orchestrator = InvocationOrchestrator::current().unwrap();
        let result = orchestrator
            .invoke_async(invoker, Request::new("s", "m", Vec::new()), Duration::from_millis(20))
            .await;
        assert!(result.is_err());
        assert!(!finished.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_deadline_tightens_and_propagates() {
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let sink = seen.clone();
        let invoker: Arc<dyn Invoker> = Arc::new(FnInvoker::new("peek", move |r: Request| {
            *sink.lock() = r.timeout;
            async move { Ok(Response::ok(r.request_id, Vec::new())) }
        }));

        let context = crate::invoke::InvocationContext::new()
            .with_link_timeout(LinkInvokeTimeout::new(Duration::from_millis(80)));
        let request = Request::new("s", "m", Vec::new()).with_context(context);

        InvocationOrchestrator::current()
            .unwrap()
            .invoke_async(invoker, request, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(*seen.lock(), Some(Duration::from_millis(80)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_timeout_kind_reported() {
        let context = crate::invoke::InvocationContext::new()
            .with_link_timeout(LinkInvokeTimeout::new(Duration::from_millis(30)));
        let request = Request::new("s", "m", Vec::new()).with_context(context);

        let err = InvocationOrchestrator::current()
            .unwrap()
            .invoke_async(sleeping(Duration::from_secs(1)), request, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.framework_code(), Some(FrameworkCode::ClientFullLinkTimeout));
    }

    #[tokio::test]
    async fn test_framework_status_is_raised() {
        let invoker: Arc<dyn Invoker> = Arc::new(FnInvoker::new("broken", |r: Request| async move {
            Ok(Response::framework_error(r.request_id, FrameworkCode::ServerNoFunction, "no such method"))
        }));
        let err = InvocationOrchestrator::current()
            .unwrap()
            .invoke_async(invoker, Request::new("s", "m", Vec::new()), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.framework_code(), Some(FrameworkCode::ServerNoFunction));
    }

    #[test]
    fn test_invoke_sync_returns_business_result() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let orchestrator = InvocationOrchestrator::new(runtime.handle().clone());
        let invoker: Arc<dyn Invoker> = Arc::new(FnInvoker::new("biz", |r: Request| async move {
            Ok(Response::business_error(r.request_id, 42, "insufficient funds"))
        }));

        let response = orchestrator
            .invoke_sync(invoker, Request::new("s", "m", Vec::new()), Duration::from_secs(1))
            .unwrap();
        assert_eq!(response.business_code, 42);
    }

    #[test]
    fn test_invoke_sync_times_out() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let orchestrator = InvocationOrchestrator::new(runtime.handle().clone());

        let start = std::time::Instant::now();
        let err = orchestrator
            .invoke_sync(
                sleeping(Duration::from_secs(2)),
                Request::new("s", "m", Vec::new()),
                Duration::from_millis(50),
            )
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(start.elapsed() < Duration::from_millis(1000));
    }
}
