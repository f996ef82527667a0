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

//! Component lifecycle management.
//!
//! Every long-lived component in rpcore (the [`ConfigManager`], each
//! [`RpcClient`] and each [`RpcServer`]) embeds a [`Lifecycle`] and plugs its
//! resource handling in through [`LifecycleHooks`]:
//!
//! ```text
//! New ─init─▶ Initializing ─▶ Initialized ─start─▶ Starting ─▶ Started
//!                  │                                  │           │
//!                  └────────────▶ Failed ◀────────────┘         stop
//!                                   │                             ▼
//!                                   └──────stop──────▶ Stopping ─▶ Stopped
//! ```
//!
//! Transitions are serialized per component. Listeners observe every state
//! change synchronously and in registration order.
//!
//! [`ConfigManager`]: crate::runtime::ConfigManager
//! [`RpcClient`]: crate::client::RpcClient
//! [`RpcServer`]: crate::server::RpcServer

mod error;
mod listener;
mod machine;
mod state;

pub use error::LifecycleError;
pub use listener::LifecycleListener;
pub use machine::{Lifecycle, LifecycleComponent, LifecycleHooks};
pub use state::{LifecycleEvent, LifecyclePhase, LifecycleState};
