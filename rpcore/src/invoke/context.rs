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

//! Per-call invocation context.

use super::LinkInvokeTimeout;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Transparent key/value pairs carried alongside a call.
pub type Attachments = HashMap<String, Vec<u8>>;

/// State carried by one call.
///
/// A context belongs to exactly one call. A server handling an inbound call
/// that makes a downstream call builds the downstream context with
/// [`derive_client_context`](Self::derive_client_context) rather than sharing
/// its own.
///
/// Response attachments and the link deadline are local to a hop and are not
/// serialized; the deadline travels as [`Request::timeout`](super::Request).
///
/// # Examples
///
/// ```rust
/// use rpcore::invoke::InvocationContext;
///
/// let mut inbound = InvocationContext::new()
///     .with_caller("gateway")
///     .with_callee("user-service")
///     .with_dyeing_key("trace-me");
/// inbound.set_request_attachment("tenant", b"acme".to_vec());
/// inbound.set_response_attachment("cost", b"3".to_vec());
///
/// let outbound = inbound.derive_client_context();
/// assert_eq!(outbound.caller(), Some("user-service"));
/// assert_eq!(outbound.dyeing_key(), Some("trace-me"));
/// assert_eq!(outbound.request_attachment("tenant"), Some(&b"acme"[..]));
/// assert!(outbound.response_attachments().is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationContext {
    caller: Option<String>,
    callee: Option<String>,
    #[serde(default)]
    request_attachments: Attachments,
    #[serde(skip)]
    response_attachments: Attachments,
    #[serde(skip)]
    link_timeout: Option<LinkInvokeTimeout>,
    #[serde(default)]
    oneway: bool,
    dyeing_key: Option<String>,
    #[serde(default)]
    debug: bool,
}

impl InvocationContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the calling service.
    #[must_use]
    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    /// Sets the called service.
    #[must_use]
    pub fn with_callee(mut self, callee: impl Into<String>) -> Self {
        self.callee = Some(callee.into());
        self
    }

    /// Marks the call as one-way: no response is expected.
    #[must_use]
    pub fn with_oneway(mut self, oneway: bool) -> Self {
        self.oneway = oneway;
        self
    }

    /// Sets the dyeing key used to trace a call chain.
    #[must_use]
    pub fn with_dyeing_key(mut self, key: impl Into<String>) -> Self {
        self.dyeing_key = Some(key.into());
        self
    }

    /// Enables debug handling along the call chain.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Sets the inherited link deadline.
    #[must_use]
    pub fn with_link_timeout(mut self, link: LinkInvokeTimeout) -> Self {
        self.link_timeout = Some(link);
        self
    }

    /// The calling service.
    pub fn caller(&self) -> Option<&str> {
        self.caller.as_deref()
    }

    /// The called service.
    pub fn callee(&self) -> Option<&str> {
        self.callee.as_deref()
    }

    /// Whether the call expects no response.
    pub fn is_oneway(&self) -> bool {
        self.oneway
    }

    /// The dyeing key.
    pub fn dyeing_key(&self) -> Option<&str> {
        self.dyeing_key.as_deref()
    }

    /// Whether debug handling is on.
    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// The inherited link deadline.
    pub fn link_timeout(&self) -> Option<&LinkInvokeTimeout> {
        self.link_timeout.as_ref()
    }

    /// Replaces the inherited link deadline.
    pub fn set_link_timeout(&mut self, link: Option<LinkInvokeTimeout>) {
        self.link_timeout = link;
    }

    /// A request attachment.
    pub fn request_attachment(&self, key: &str) -> Option<&[u8]> {
        self.request_attachments.get(key).map(Vec::as_slice)
    }

    /// Sets a request attachment.
    pub fn set_request_attachment(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.request_attachments.insert(key.into(), value);
    }

    /// All request attachments.
    pub fn request_attachments(&self) -> &Attachments {
        &self.request_attachments
    }

    /// Sets a response attachment.
    pub fn set_response_attachment(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.response_attachments.insert(key.into(), value);
    }

    /// All response attachments.
    pub fn response_attachments(&self) -> &Attachments {
        &self.response_attachments
    }

    /// Takes the response attachments, leaving the context's set empty.
    pub fn take_response_attachments(&mut self) -> Attachments {
        std::mem::take(&mut self.response_attachments)
    }

    /// Builds the context for a downstream call made while serving this one.
    ///
    /// Deep-copied: request attachments. Carried over: dyeing key, debug flag
    /// and link deadline. This context's callee becomes the caller. Response
    /// attachments, the callee and the one-way flag start empty.
    #[must_use]
    pub fn derive_client_context(&self) -> Self {
        Self {
            caller: self.callee.clone(),
            callee: None,
            request_attachments: self.request_attachments.clone(),
            response_attachments: Attachments::new(),
            link_timeout: self.link_timeout,
            oneway: false,
            dyeing_key: self.dyeing_key.clone(),
            debug: self.debug,
        }
    }
}
