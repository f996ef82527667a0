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

//! Request and response messages.

use super::{Attachments, InvocationContext};
use crate::error::{FrameworkCode, RpcError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A call to one method of one service.
///
/// `timeout` is the budget granted to the callee; the orchestrator fills it
/// in with the tighter of the local timeout and the inherited link deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Identifier matching the response to this request on a connection.
    pub request_id: u64,
    /// Target service.
    pub service: String,
    /// Target method.
    pub method: String,
    /// Budget granted to the callee.
    pub timeout: Option<Duration>,
    /// Call context.
    pub context: InvocationContext,
    /// Encoded arguments.
    pub body: Vec<u8>,
}

impl Request {
    /// Creates a request with an empty context.
    pub fn new(service: impl Into<String>, method: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            request_id: 0,
            service: service.into(),
            method: method.into(),
            timeout: None,
            context: InvocationContext::new(),
            body,
        }
    }

    /// Replaces the context.
    #[must_use]
    pub fn with_context(mut self, context: InvocationContext) -> Self {
        self.context = context;
        self
    }

    /// `service/method`
    pub fn target(&self) -> String {
        format!("{}/{}", self.service, self.method)
    }

    /// Whether the caller expects no response.
    pub fn is_oneway(&self) -> bool {
        self.context.is_oneway()
    }
}

/// The outcome of a call as reported by the callee.
///
/// A response carries two independent statuses. A non-zero
/// `framework_code` means the exchange failed; a non-zero `business_code` is
/// an application-level result the callee chose to return.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// The request this answers.
    pub request_id: u64,
    /// Framework status, `0` on success.
    pub framework_code: i32,
    /// Application status, `0` on success.
    pub business_code: i32,
    /// Detail for a non-zero status.
    pub message: String,
    /// Attachments returned by the callee.
    #[serde(default)]
    pub attachments: Attachments,
    /// Encoded result.
    pub body: Vec<u8>,
}

impl Response {
    /// A successful response.
    pub fn ok(request_id: u64, body: Vec<u8>) -> Self {
        Self {
            request_id,
            body,
            ..Self::default()
        }
    }

    /// A response reporting a framework failure.
    pub fn framework_error(request_id: u64, code: FrameworkCode, message: impl Into<String>) -> Self {
        Self {
            request_id,
            framework_code: code.as_i32(),
            message: message.into(),
            ..Self::default()
        }
    }

    /// A response reporting a business failure.
    pub fn business_error(request_id: u64, code: i32, message: impl Into<String>) -> Self {
        Self {
            request_id,
            business_code: code,
            message: message.into(),
            ..Self::default()
        }
    }

    /// Builds the response a server sends for `error`.
    pub fn from_error(request_id: u64, error: &RpcError) -> Self {
        match error {
            RpcError::Business { code, message } => Self::business_error(request_id, *code, message.clone()),
            other => Self::framework_error(
                request_id,
                other.framework_code().unwrap_or(FrameworkCode::Unknown),
                other.to_string(),
            ),
        }
    }

    /// Both statuses are zero.
    pub fn is_success(&self) -> bool {
        self.framework_code == 0 && self.business_code == 0
    }

    /// The framework status.
    pub fn framework_status(&self) -> FrameworkCode {
        FrameworkCode::from_i32(self.framework_code)
    }

    /// Raises a framework failure as an error and passes anything else,
    /// including business failures, through unchanged.
    ///
    /// # Errors
    ///
    /// [`RpcError::Framework`] when `framework_code` is non-zero.
    pub fn check_framework(self) -> Result<Self, RpcError> {
        if self.framework_code != 0 {
            return Err(RpcError::framework(self.framework_status(), self.message));
        }
        Ok(self)
    }

    /// Raises either status as an error.
    ///
    /// # Errors
    ///
    /// [`RpcError::Framework`] or [`RpcError::Business`] for a non-zero status.
    pub fn into_result(self) -> Result<Self, RpcError> {
        let response = self.check_framework()?;
        if response.business_code != 0 {
            return Err(RpcError::business(response.business_code, response.message));
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_failure_passes_framework_check() {
        let response = Response::business_error(1, 404, "missing");
        let response = response.check_framework().unwrap();
        assert!(!response.is_success());

        let err = response.into_result().unwrap_err();
        assert!(matches!(err, RpcError::Business { code: 404, .. }));
    }

    #[test]
    fn test_framework_failure_is_raised() {
        let response = Response::framework_error(1, FrameworkCode::ServerNoService, "no service");
        let err = response.check_framework().unwrap_err();
        assert_eq!(err.framework_code(), Some(FrameworkCode::ServerNoService));
    }

    #[test]
    fn test_from_error_keeps_layers_apart() {
        let business = Response::from_error(3, &RpcError::business(7, "nope"));
        assert_eq!(business.business_code, 7);
        assert_eq!(business.framework_code, 0);

        let framework = Response::from_error(
            3,
            &RpcError::framework(FrameworkCode::ServerTimeout, "late"),
        );
        assert_eq!(framework.framework_status(), FrameworkCode::ServerTimeout);
    }

    #[test]
    fn test_request_target() {
        let request = Request::new("greeter", "hello", Vec::new());
        assert_eq!(request.target(), "greeter/hello");
        assert!(!request.is_oneway());
    }
}
