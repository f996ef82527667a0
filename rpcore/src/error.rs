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

//! Top-level error types for rpcore.
//!
//! [`RpcError`] composes the layers a caller can observe:
//!
//! 1. **Lifecycle**: invalid transitions and hook failures ([`LifecycleError`])
//! 2. **Transport**: dial, bind and connection failures ([`TransportError`])
//! 3. **Timeout**: the caller's deadline or the call chain's link deadline expired
//! 4. **Framework**: an unexpected failure inside the RPC machinery, tagged
//!    with a [`FrameworkCode`]
//! 5. **Business**: a structured failure the callee chose to return, carrying
//!    an application status code
//!
//! Framework and business failures are kept apart on purpose: a business
//! status is part of a successful exchange and travels in the
//! [`Response`](crate::invoke::Response), while a framework failure means the
//! exchange itself did not work.
//!
//! # Examples
//!
//! ```rust
//! use rpcore::error::{FrameworkCode, RpcError};
//! use rpcore::transport::TransportError;
//!
//! let err: RpcError = TransportError::NotConnected.into();
//! assert!(err.is_transport_error());
//! assert_eq!(err.framework_code(), Some(FrameworkCode::ClientConnect));
//!
//! let err = RpcError::business(404, "no such user");
//! assert!(err.is_business_error());
//! assert_eq!(err.framework_code(), None);
//! ```

use crate::lifecycle::LifecycleError;
use crate::transport::TransportError;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Owned, boxed error returned by hooks and collaborator traits.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Shared error, used where one failure is reported to several observers.
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

/// Framework status codes carried in responses and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum FrameworkCode {
    /// The exchange succeeded.
    Success = 0,
    /// The server does not host the requested service.
    ServerNoService = 11,
    /// The service does not implement the requested method.
    ServerNoFunction = 12,
    /// The server gave up on the request because its deadline expired.
    ServerTimeout = 21,
    /// The server rejected the request because it is overloaded.
    ServerOverload = 22,
    /// Unexpected failure inside the server.
    ServerSystem = 31,
    /// The caller's own timeout expired.
    ClientInvokeTimeout = 101,
    /// The call chain's link deadline expired.
    ClientFullLinkTimeout = 102,
    /// No connection could be established.
    ClientConnect = 111,
    /// The request could not be encoded.
    ClientEncode = 121,
    /// The response could not be decoded.
    ClientDecode = 122,
    /// No destination could be selected.
    ClientRouter = 131,
    /// Network failure on an established connection.
    ClientNetwork = 141,
    /// Anything else.
    Unknown = 999,
}

impl FrameworkCode {
    /// Numeric value as sent on the wire.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Maps a wire value back to a code; unrecognized values become
    /// [`FrameworkCode::Unknown`].
    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        match code {
            0 => Self::Success,
            11 => Self::ServerNoService,
            12 => Self::ServerNoFunction,
            21 => Self::ServerTimeout,
            22 => Self::ServerOverload,
            31 => Self::ServerSystem,
            101 => Self::ClientInvokeTimeout,
            102 => Self::ClientFullLinkTimeout,
            111 => Self::ClientConnect,
            121 => Self::ClientEncode,
            122 => Self::ClientDecode,
            131 => Self::ClientRouter,
            141 => Self::ClientNetwork,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for FrameworkCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i32())
    }
}

/// Which deadline expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutKind {
    /// The timeout configured for this call.
    Invoke,
    /// The remaining budget of the upstream call chain.
    Link,
}

impl fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invoke => f.write_str("invoke"),
            Self::Link => f.write_str("full-link"),
        }
    }
}

/// The error type surfaced to callers of rpcore.
///
/// `RpcError` is [`Clone`]: hedged requests and single-flighted operations
/// hand the same failure to several waiters.
#[derive(Debug, Clone)]
pub enum RpcError {
    /// A lifecycle transition failed.
    Lifecycle(LifecycleError),

    /// A transport failure; the message names the destination.
    Transport(TransportError),

    /// A deadline expired before the call completed.
    Timeout {
        /// Which deadline expired
        kind: TimeoutKind,
        /// The budget that was exhausted
        timeout: Duration,
        /// Description of the call target
        target: String,
    },

    /// An unexpected failure in the framework.
    Framework {
        /// Framework status code
        code: FrameworkCode,
        /// Human-readable detail
        message: String,
    },

    /// A structured failure returned by the callee.
    Business {
        /// Application status code
        code: i32,
        /// Human-readable detail
        message: String,
    },

    /// The server registry has been shut down.
    RegistryClosed {
        /// The key that could not be served
        key: String,
    },

    /// A configuration value is invalid.
    Config {
        /// Description of the problem
        reason: String,
    },
}

impl RpcError {
    /// Builds a [`RpcError::Framework`].
    pub fn framework(code: FrameworkCode, message: impl Into<String>) -> Self {
        Self::Framework {
            code,
            message: message.into(),
        }
    }

    /// Builds a [`RpcError::Business`].
    pub fn business(code: i32, message: impl Into<String>) -> Self {
        Self::Business {
            code,
            message: message.into(),
        }
    }

    /// Builds a [`RpcError::Timeout`].
    pub fn timeout(kind: TimeoutKind, timeout: Duration, target: impl Into<String>) -> Self {
        Self::Timeout {
            kind,
            timeout,
            target: target.into(),
        }
    }

    /// Returns `true` if this is a lifecycle error.
    #[must_use]
    pub const fn is_lifecycle_error(&self) -> bool {
        matches!(self, Self::Lifecycle(_))
    }

    /// Returns `true` if this is a transport error.
    #[must_use]
    pub const fn is_transport_error(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns `true` if a deadline expired.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if the callee returned a business failure.
    #[must_use]
    pub const fn is_business_error(&self) -> bool {
        matches!(self, Self::Business { .. })
    }

    /// The framework status code describing this error.
    ///
    /// `None` for business errors, which carry an application code instead.
    #[must_use]
    pub fn framework_code(&self) -> Option<FrameworkCode> {
        match self {
            Self::Lifecycle(_) | Self::RegistryClosed { .. } | Self::Config { .. } => {
                Some(FrameworkCode::Unknown)
            }
            Self::Transport(e) if e.is_connect_failure() => Some(FrameworkCode::ClientConnect),
            Self::Transport(TransportError::Codec { .. }) => Some(FrameworkCode::ClientDecode),
            Self::Transport(_) => Some(FrameworkCode::ClientNetwork),
            Self::Timeout {
                kind: TimeoutKind::Invoke,
                ..
            } => Some(FrameworkCode::ClientInvokeTimeout),
            Self::Timeout {
                kind: TimeoutKind::Link,
                ..
            } => Some(FrameworkCode::ClientFullLinkTimeout),
            Self::Framework { code, .. } => Some(*code),
            Self::Business { .. } => None,
        }
    }

    /// Returns `true` if retrying on a different connection may succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_recoverable(),
            Self::Timeout { .. } => true,
            Self::Framework { code, .. } => matches!(code, FrameworkCode::ServerOverload),
            Self::Lifecycle(_)
            | Self::Business { .. }
            | Self::RegistryClosed { .. }
            | Self::Config { .. } => false,
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lifecycle(e) => write!(f, "lifecycle error: {}", e),
            Self::Transport(e) => write!(f, "transport error: {}", e),
            Self::Timeout {
                kind,
                timeout,
                target,
            } => write!(f, "{} timeout after {:?} calling {}", kind, timeout, target),
            Self::Framework { code, message } => {
                write!(f, "framework error {}: {}", code, message)
            }
            Self::Business { code, message } => write!(f, "business error {}: {}", code, message),
            Self::RegistryClosed { key } => {
                write!(f, "server registry is closed, cannot serve {}", key)
            }
            Self::Config { reason } => write!(f, "invalid configuration: {}", reason),
        }
    }
}

impl StdError for RpcError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Lifecycle(e) => Some(e),
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LifecycleError> for RpcError {
    fn from(error: LifecycleError) -> Self {
        Self::Lifecycle(error)
    }
}

impl From<TransportError> for RpcError {
    fn from(error: TransportError) -> Self {
        Self::Transport(error)
    }
}
