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

//! Core transport traits.
//!
//! The client side is a [`Connector`] that dials [`Connection`]s, which the
//! [`ConnectionPool`](crate::pool::ConnectionPool) keeps per destination. The
//! server side is a [`ServerTransport`] that, once bound, feeds every inbound
//! request to a [`Dispatcher`].

use crate::invoke::{Request, Response};
use crate::transport::{RemoteAddress, TransportError};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;

/// An open, possibly multiplexed, connection to one destination.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// The destination this connection points at.
    fn remote(&self) -> &RemoteAddress;

    /// Returns `false` once the connection can no longer carry calls.
    fn is_healthy(&self) -> bool;

    /// Sends `request` and waits for its response.
    ///
    /// Dropping the returned future abandons the call; a response arriving
    /// afterwards is discarded.
    async fn call(&self, request: Request) -> Result<Response, TransportError>;

    /// Sends `request` without waiting for a response.
    async fn send_oneway(&self, request: Request) -> Result<(), TransportError>;

    /// Closes the connection. Closing twice is harmless.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Dials connections.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced.
    type Connection: Connection;

    /// Opens a connection to `address`.
    async fn connect(&self, address: &RemoteAddress) -> Result<Self::Connection, TransportError>;
}

/// Handles requests arriving at a server transport.
#[async_trait]
pub trait Dispatcher: Send + Sync + 'static {
    /// Produces the response for `request`. Failures are reported inside the
    /// response.
    async fn dispatch(&self, request: Request) -> Response;
}

/// A listening transport owned by an [`RpcServer`](crate::server::RpcServer).
#[async_trait]
pub trait ServerTransport: Send + Sync + 'static {
    /// Binds and starts feeding requests to `dispatcher`.
    ///
    /// # Errors
    ///
    /// [`TransportError::AddressInUse`] when another listener owns the
    /// address, [`TransportError::BindFailed`] for other bind failures.
    async fn bind(&self, dispatcher: Arc<dyn Dispatcher>) -> Result<(), TransportError>;

    /// Stops accepting and releases the listener. Closing an unbound
    /// transport is a no-op.
    async fn close(&self) -> Result<(), TransportError>;

    /// The bound local address, once bound.
    fn local_addr(&self) -> Option<SocketAddr>;
}
