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

//! Invocation: requests, contexts, timeouts and orchestration.
//!
//! A call path looks like this:
//!
//! ```text
//! caller ─▶ InvocationOrchestrator ─▶ Invoker::invoke ─▶ ConnectionPool ─▶ Connection
//!             │  timeout / backup                                          │
//!             ◀──────────────── Response (sync or async) ◀─────────────────┘
//! ```

mod backup;
mod context;
mod invoker;
mod orchestrator;
mod request;
mod timeout;

pub use backup::{BackupRequest, BackupResolver, HedgeWinner};
pub use context::{Attachments, InvocationContext};
pub use invoker::{FnInvoker, Invoker};
pub use orchestrator::{InvocationOrchestrator, ResponseFuture};
pub use request::{Request, Response};
pub use timeout::{LeftTimeout, LinkInvokeTimeout};
