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

//! Connection pooling.
//!
//! A [`ConnectionPool`] owns every client-side connection. Callers
//! [`acquire`](ConnectionPool::acquire) a shared [`PooledConnection`], issue
//! calls on it and [`release`](ConnectionPool::release) it. Dials are
//! single-flighted per slot and surfaced through a [`ConnectFuture`].

mod config;
mod connect;
mod connection;
mod pool;

pub use config::PoolConfig;
pub use connect::ConnectFuture;
pub use connection::PooledConnection;
pub use pool::ConnectionPool;
