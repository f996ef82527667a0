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

#![doc = include_str!("../../README.md")]
#![allow(clippy::module_inception)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

//! # Architecture
//!
//! ```text
//! ┌──────────────────────────── ConfigManager ────────────────────────────┐
//! │  start: listeners → defaults → clients → plugins → warmup → app →     │
//! │         servers → discovery        stop: the mirror image             │
//! └───────┬───────────────────────────────────────────────────┬───────────┘
//!         │                                                   │
//!   ClientSubsystem                                     ServerSubsystem
//!         │                                                   │
//!   ServiceProxy ─▶ Selector                            ServerRegistry
//!         │                                                   │
//!   InvocationOrchestrator (timeout, backup)            RpcServer ─▶ ProviderRegistry
//!         │                                                   │           │
//!   ClientCluster ─▶ RpcClient ─▶ ConnectionPool        ServerTransport   ServiceHandler
//!                                      │                      ▲
//!                                 Connector / Connection ─────┘ (wire)
//! ```
//!
//! Every long-lived component ([`ConfigManager`](runtime::ConfigManager),
//! [`RpcClient`](client::RpcClient), [`RpcServer`](server::RpcServer))
//! embeds a [`Lifecycle`](lifecycle::Lifecycle) state machine.
//!
//! # Modules
//!
//! - [`lifecycle`]: the shared state machine, listeners and errors
//! - [`transport`]: addresses, codecs, the connection traits and TCP
//! - [`pool`]: per-destination connection pool with single-flight dialing
//! - [`invoke`]: requests, contexts, timeouts, backup requests
//! - [`client`] / [`server`]: the two sides of a call
//! - [`runtime`]: configuration, plugins, worker pools, startup/shutdown
//! - [`observability`]: structured logging helpers
//!
//! # Feature flags
//!
//! - `observability` (default): structured logging through `tracing`.

pub mod client;
pub mod error;
pub mod future;
pub mod invoke;
pub mod lifecycle;
pub mod observability;
pub mod pool;
pub mod runtime;
pub mod server;
pub mod transport;

pub use error::{FrameworkCode, RpcError, TimeoutKind};
pub use future::{CloseFuture, CloseSignal};
pub use invoke::{InvocationContext, InvocationOrchestrator, Invoker, Request, Response};
pub use lifecycle::{Lifecycle, LifecycleComponent, LifecycleHooks, LifecycleState};
pub use observability::log_error;
pub use runtime::ConfigManager;
pub use transport::{RemoteAddress, TransportError};
