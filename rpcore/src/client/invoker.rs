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

//! Invoker issuing calls over a client's pooled connections.

use super::RpcClient;
use crate::error::RpcError;
use crate::invoke::{Invoker, Request, Response};
use crate::pool::{ConnectionPool, PooledConnection};
use crate::transport::{Connection, Connector, TransportError};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Calls one service through an [`RpcClient`].
///
/// Each call borrows a pooled connection and gives it back afterwards. A
/// transport failure that leaves the connection unusable evicts it, so the
/// next call dials a fresh one. Framework failures reported in the response
/// are raised as [`RpcError::Framework`]; one-way calls resolve to an empty
/// success once the request is written.
pub struct ClientInvoker<C: Connector> {
    client: RpcClient<C>,
    service: String,
}

impl<C: Connector + Clone> ClientInvoker<C> {
    pub(crate) fn new(client: RpcClient<C>, service: String) -> Self {
        Self { client, service }
    }

    /// The service called.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The client used.
    pub fn client(&self) -> &RpcClient<C> {
        &self.client
    }
}

struct Lease<C: Connector> {
    pool: ConnectionPool<C>,
    connection: Arc<PooledConnection<C::Connection>>,
    broken: bool,
}

impl<C: Connector> Drop for Lease<C> {
    fn drop(&mut self) {
        self.pool.release(&self.connection);
        if self.broken {
            self.pool.invalidate(&self.connection);
        }
    }
}

#[async_trait]
impl<C: Connector + Clone> Invoker for ClientInvoker<C> {
    async fn invoke(&self, request: Request) -> Result<Response, RpcError> {
        if !self.client.is_available() {
            return Err(TransportError::Closed {
                address: self.client.address().to_string(),
            }
            .into());
        }

        let pool = self.client.pool();
        let connection = pool.acquire(self.client.address()).await?;
        let mut lease = Lease {
            pool,
            connection,
            broken: false,
        };

        let result = if request.is_oneway() {
            let request_id = request.request_id;
            lease
                .connection
                .send_oneway(request)
                .await
                .map(|()| Response::ok(request_id, Vec::new()))
        } else {
            lease.connection.call(request).await
        };

        match result {
            Ok(response) => response.check_framework(),
            Err(e) => {
                lease.broken = e.should_close_transport();
                Err(e.into())
            }
        }
    }

    fn target(&self) -> String {
        format!("{}@{}", self.service, self.client.address())
    }
}

impl<C: Connector + Clone> fmt::Debug for ClientInvoker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientInvoker")
            .field("service", &self.service)
            .field("address", self.client.address())
            .finish()
    }
}
