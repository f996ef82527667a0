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

//! The uniform call surface.

use super::{Request, Response};
use crate::error::RpcError;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A ready-to-call handle bound to one resolved destination.
#[async_trait]
pub trait Invoker: Send + Sync + 'static {
    /// Performs the call.
    async fn invoke(&self, request: Request) -> Result<Response, RpcError>;

    /// Description of the destination, used in error messages.
    fn target(&self) -> String {
        "invoker".to_string()
    }
}

#[async_trait]
impl<I: Invoker + ?Sized> Invoker for Arc<I> {
    async fn invoke(&self, request: Request) -> Result<Response, RpcError> {
        (**self).invoke(request).await
    }

    fn target(&self) -> String {
        (**self).target()
    }
}

/// An [`Invoker`] backed by an async closure.
///
/// # Examples
///
/// ```rust
/// use rpcore::invoke::{FnInvoker, Invoker, Request, Response};
///
/// # async fn example() -> Result<(), rpcore::RpcError> {
/// let echo = FnInvoker::new("echo", |request: Request| async move {
///     Ok(Response::ok(request.request_id, request.body))
/// });
///
/// let response = echo.invoke(Request::new("echo", "say", b"hi".to_vec())).await?;
/// assert_eq!(response.body, b"hi");
/// # Ok(())
/// # }
/// ```
pub struct FnInvoker<F> {
    name: String,
    call: F,
}

impl<F, Fut> FnInvoker<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, RpcError>> + Send + 'static,
{
    /// Wraps `call` under the target description `name`.
    pub fn new(name: impl Into<String>, call: F) -> Self {
        Self {
            name: name.into(),
            call,
        }
    }
}

#[async_trait]
impl<F, Fut> Invoker for FnInvoker<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, RpcError>> + Send + 'static,
{
    async fn invoke(&self, request: Request) -> Result<Response, RpcError> {
        (self.call)(request).await
    }

    fn target(&self) -> String {
        self.name.clone()
    }
}

impl<F> fmt::Debug for FnInvoker<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnInvoker").field("name", &self.name).finish()
    }
}
