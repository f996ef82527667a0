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

//! Provider-side dispatch.
//!
//! A [`ProviderRegistry`] maps service names to [`ServiceHandler`]s and is
//! the [`Dispatcher`] a server transport feeds. Every failure is turned into
//! a response:
//!
//! | Situation                        | Response                     |
//! |----------------------------------|------------------------------|
//! | unknown service                  | framework code 11            |
//! | unknown method                   | framework code 12            |
//! | deadline expired on the server   | framework code 21            |
//! | handler panicked                 | framework code 31            |
//! | handler returned a business error| business code of the error   |

use crate::error::{FrameworkCode, RpcError};
use crate::invoke::{LinkInvokeTimeout, Request, Response};
use crate::transport::Dispatcher;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "observability")]
use tracing::{debug, error};

/// Implementation of one service.
#[async_trait]
pub trait ServiceHandler: Send + Sync + 'static {
    /// The service name requests carry.
    fn name(&self) -> &str;

    /// Handles one call of `method`.
    ///
    /// # Errors
    ///
    /// [`RpcError::Business`] for application failures,
    /// [`RpcError::Framework`] with [`FrameworkCode::ServerNoFunction`] for
    /// unknown methods.
    async fn handle(&self, method: &str, request: Request) -> Result<Response, RpcError>;
}

type MethodFn = Arc<dyn Fn(Request) -> BoxFuture<'static, Result<Vec<u8>, RpcError>> + Send + Sync>;

/// A [`ServiceHandler`] routing methods to async closures returning the
/// response body.
///
/// # Examples
///
/// ```rust
/// use rpcore::invoke::Request;
/// use rpcore::server::{MethodRouter, ServiceHandler};
///
/// # async fn example() -> Result<(), rpcore::RpcError> {
/// let greeter = MethodRouter::new("demo.Greeter")
///     .route("hello", |request: Request| async move {
///         Ok(format!("hello {}", String::from_utf8_lossy(&request.body)).into_bytes())
///     });
///
/// let response = greeter.handle("hello", Request::new("demo.Greeter", "hello", b"bob".to_vec())).await?;
/// assert_eq!(response.body, b"hello bob");
/// # Ok(())
/// # }
/// ```
pub struct MethodRouter {
    service: String,
    methods: HashMap<String, MethodFn>,
}

impl MethodRouter {
    /// Creates a router without methods.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            methods: HashMap::new(),
        }
    }

    /// Adds a method.
    #[must_use]
    pub fn route<F, Fut>(mut self, method: impl Into<String>, call: F) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Vec<u8>, RpcError>> + Send + 'static,
    {
        self.methods
            .insert(method.into(), Arc::new(move |request| call(request).boxed()));
        self
    }
}

#[async_trait]
impl ServiceHandler for MethodRouter {
    fn name(&self) -> &str {
        &self.service
    }

    async fn handle(&self, method: &str, request: Request) -> Result<Response, RpcError> {
        let Some(call) = self.methods.get(method) else {
            return Err(RpcError::framework(
                FrameworkCode::ServerNoFunction,
                format!("{} has no method {}", self.service, method),
            ));
        };
        let request_id = request.request_id;
        let body = call(request).await?;
        Ok(Response::ok(request_id, body))
    }
}

impl fmt::Debug for MethodRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<_> = self.methods.keys().collect();
        methods.sort();
        f.debug_struct("MethodRouter")
            .field("service", &self.service)
            .field("methods", &methods)
            .finish()
    }
}

#[derive(Clone)]
struct Provider {
    handler: Arc<dyn ServiceHandler>,
    timeout: Option<Duration>,
}

/// The services hosted by one server.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Provider>>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hosts `handler` under its name, replacing any previous handler.
    pub fn register(&self, handler: Arc<dyn ServiceHandler>) {
        self.register_with_timeout(handler, None);
    }

    /// Hosts `handler`, bounding each call by `timeout` in addition to the
    /// caller's budget.
    pub fn register_with_timeout(&self, handler: Arc<dyn ServiceHandler>, timeout: Option<Duration>) {
        let name = handler.name().to_string();
        self.providers
            .write()
            .insert(name, Provider { handler, timeout });
    }

    /// Stops hosting `service`. Returns `true` if it was hosted.
    pub fn unregister(&self, service: &str) -> bool {
        self.providers.write().remove(service).is_some()
    }

    /// Returns `true` if `service` is hosted.
    pub fn contains(&self, service: &str) -> bool {
        self.providers.read().contains_key(service)
    }

    /// Names of the hosted services, sorted.
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<_> = self.providers.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl Dispatcher for ProviderRegistry {
    async fn dispatch(&self, mut request: Request) -> Response {
        let request_id = request.request_id;
        let Some(provider) = self.providers.read().get(&request.service).cloned() else {
            #[cfg(feature = "observability")]
            debug!(service = %request.service, "Request for unknown service");
            return Response::framework_error(
                request_id,
                FrameworkCode::ServerNoService,
                format!("service {} not found", request.service),
            );
        };

        // The caller's budget becomes the link deadline for downstream calls.
        if let Some(budget) = request.timeout {
            request
                .context
                .set_link_timeout(Some(LinkInvokeTimeout::new(budget)));
        }
        let budget = match (request.timeout, provider.timeout) {
            (Some(caller), Some(local)) => Some(caller.min(local)),
            (caller, local) => caller.or(local),
        };

        let target = request.target();
        let method = request.method.clone();
        let call = AssertUnwindSafe(provider.handler.handle(&method, request)).catch_unwind();

        let outcome = match budget {
            Some(budget) => match tokio::time::timeout(budget, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    #[cfg(feature = "observability")]
                    debug!(target = %target, budget = ?budget, "Request exceeded its deadline");
                    return Response::framework_error(
                        request_id,
                        FrameworkCode::ServerTimeout,
                        format!("{} timed out after {:?}", target, budget),
                    );
                }
            },
            None => call.await,
        };

        match outcome {
            Ok(Ok(mut response)) => {
                response.request_id = request_id;
                response
            }
            Ok(Err(e)) => Response::from_error(request_id, &e),
            Err(_panic) => {
                #[cfg(feature = "observability")]
                error!(target = %target, "Handler panicked");
                Response::framework_error(
                    request_id,
                    FrameworkCode::ServerSystem,
                    format!("{} failed unexpectedly", target),
                )
            }
        }
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("services", &self.services())
            .finish()
    }
}
