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

//! Transport layer error types.
//!
//! Transport errors are the lowest layer of the error hierarchy: dial
//! failures, lost connections, bind failures and framing problems. Every
//! variant that concerns a peer carries the destination so that the message a
//! caller finally sees names the address that failed.
//!
//! I/O sources are held behind an [`Arc`] so the error is [`Clone`]. A single
//! connect attempt is awaited by every caller that joined it, and each of them
//! receives its own copy of the outcome.

use std::io;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur in the transport layer.
///
/// # Examples
///
/// ```rust
/// use rpcore::transport::TransportError;
/// use std::io;
///
/// let error = TransportError::connect_failed(
///     "127.0.0.1:8080",
///     io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
/// );
///
/// assert!(error.is_recoverable());
/// assert!(error.to_string().contains("127.0.0.1:8080"));
/// ```
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Failed to establish a connection to the remote endpoint.
    #[error("failed to connect to {address}: {source}")]
    ConnectionFailed {
        /// The address that failed to connect
        address: String,
        /// The underlying I/O error
        #[source]
        source: Arc<io::Error>,
    },

    /// An established connection was lost.
    #[error("connection to {address} lost: {reason}")]
    ConnectionLost {
        /// The peer the connection pointed at
        address: String,
        /// Description of why the connection was lost
        reason: String,
    },

    /// Failed to read from the transport.
    #[error("failed to read from {address}: {source}")]
    ReadFailed {
        /// The peer being read from
        address: String,
        /// The underlying I/O error
        #[source]
        source: Arc<io::Error>,
    },

    /// Failed to write to the transport.
    #[error("failed to write to {address}: {source}")]
    WriteFailed {
        /// The peer being written to
        address: String,
        /// The underlying I/O error
        #[source]
        source: Arc<io::Error>,
    },

    /// A transport operation exceeded its time limit.
    #[error("transport operation against {address} timed out after {duration:?}")]
    Timeout {
        /// The peer involved
        address: String,
        /// The duration that was exceeded
        duration: Duration,
    },

    /// Failed to bind a listening socket.
    #[error("failed to bind to {address}: {source}")]
    BindFailed {
        /// The address that failed to bind
        address: String,
        /// The underlying I/O error
        #[source]
        source: Arc<io::Error>,
    },

    /// Another listener already owns the address.
    #[error("address already in use: {address}")]
    AddressInUse {
        /// The contested address
        address: String,
    },

    /// Invalid transport configuration.
    #[error("invalid transport configuration: {reason}")]
    InvalidConfiguration {
        /// Description of the configuration problem
        reason: String,
    },

    /// A frame could not be encoded or decoded.
    #[error("codec failure: {reason}")]
    Codec {
        /// Description of the codec problem
        reason: String,
    },

    /// The transport or the pool owning it has been closed.
    #[error("transport closed: {address}")]
    Closed {
        /// The address whose transport is closed
        address: String,
    },

    /// The transport is not connected.
    #[error("transport not connected")]
    NotConnected,

    /// Generic I/O error that does not fit the categories above.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error
        #[source]
        source: Arc<io::Error>,
    },
}

impl TransportError {
    /// Builds a [`TransportError::ConnectionFailed`] for `address`.
    pub fn connect_failed(address: impl Into<String>, source: io::Error) -> Self {
        Self::ConnectionFailed {
            address: address.into(),
            source: Arc::new(source),
        }
    }

    /// Classifies a bind failure, separating "address already in use".
    pub fn bind_failed(address: impl Into<String>, source: io::Error) -> Self {
        let address = address.into();
        if source.kind() == io::ErrorKind::AddrInUse {
            Self::AddressInUse { address }
        } else {
            Self::BindFailed {
                address,
                source: Arc::new(source),
            }
        }
    }

    /// Builds a [`TransportError::ReadFailed`] for `address`.
    pub fn read_failed(address: impl Into<String>, source: io::Error) -> Self {
        Self::ReadFailed {
            address: address.into(),
            source: Arc::new(source),
        }
    }

    /// Builds a [`TransportError::WriteFailed`] for `address`.
    pub fn write_failed(address: impl Into<String>, source: io::Error) -> Self {
        Self::WriteFailed {
            address: address.into(),
            source: Arc::new(source),
        }
    }

    /// Returns `true` if the operation that produced this error may succeed
    /// when retried against a fresh connection.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            TransportError::ConnectionFailed { .. }
            | TransportError::ConnectionLost { .. }
            | TransportError::Timeout { .. }
            | TransportError::NotConnected => true,

            TransportError::ReadFailed { source, .. }
            | TransportError::WriteFailed { source, .. }
            | TransportError::Io { source } => matches!(
                source.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),

            TransportError::BindFailed { .. }
            | TransportError::AddressInUse { .. }
            | TransportError::InvalidConfiguration { .. }
            | TransportError::Codec { .. }
            | TransportError::Closed { .. } => false,
        }
    }

    /// Returns `true` if the connection that produced this error must not be
    /// handed out again.
    #[must_use]
    pub fn should_close_transport(&self) -> bool {
        match self {
            TransportError::ConnectionLost { .. }
            | TransportError::ReadFailed { .. }
            | TransportError::WriteFailed { .. }
            | TransportError::Codec { .. }
            | TransportError::Closed { .. }
            | TransportError::Io { .. } => true,

            TransportError::ConnectionFailed { .. }
            | TransportError::Timeout { .. }
            | TransportError::BindFailed { .. }
            | TransportError::AddressInUse { .. }
            | TransportError::InvalidConfiguration { .. }
            | TransportError::NotConnected => false,
        }
    }

    /// Returns `true` for failures to establish a connection.
    #[must_use]
    pub const fn is_connect_failure(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectionFailed { .. } | TransportError::NotConnected
        )
    }
}

impl From<io::Error> for TransportError {
    fn from(error: io::Error) -> Self {
        TransportError::Io {
            source: Arc::new(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refused() -> io::Error {
        io::Error::new(io::ErrorKind::ConnectionRefused, "refused")
    }

    #[test]
    fn test_connection_failed_names_address() {
        let error = TransportError::connect_failed("10.0.0.1:9000", refused());
        assert!(error.to_string().contains("10.0.0.1:9000"));
        assert!(error.is_recoverable());
        assert!(error.is_connect_failure());
        assert!(!error.should_close_transport());
    }

    #[test]
    fn test_bind_classifies_address_in_use() {
        let error = TransportError::bind_failed(
            "0.0.0.0:8080",
            io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        );
        assert!(matches!(error, TransportError::AddressInUse { .. }));

        let error = TransportError::bind_failed(
            "0.0.0.0:8080",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(error, TransportError::BindFailed { .. }));
        assert!(!error.is_recoverable());
    }

    #[test]
    fn test_lost_connection_must_close() {
        let error = TransportError::ConnectionLost {
            address: "peer".to_string(),
            reason: "reset".to_string(),
        };
        assert!(error.should_close_transport());
        assert!(error.is_recoverable());
    }

    #[test]
    fn test_transient_io_is_recoverable() {
        let error = TransportError::from(io::Error::new(io::ErrorKind::TimedOut, "slow"));
        assert!(error.is_recoverable());

        let error = TransportError::read_failed("peer", io::Error::other("broken"));
        assert!(!error.is_recoverable());
        assert!(error.should_close_transport());
    }

    #[test]
    fn test_clone_shares_source() {
        let error = TransportError::connect_failed("peer:1", refused());
        let copy = error.clone();
        assert_eq!(error.to_string(), copy.to_string());
        assert!(std::error::Error::source(&copy).is_some());
    }
}
