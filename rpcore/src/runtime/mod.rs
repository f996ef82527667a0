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

//! Process runtime: configuration, plugins, worker pools, selectors and the
//! [`ConfigManager`] that starts and stops them in order.

mod config;
mod manager;
mod plugin;
mod selector;
mod subsystem;
mod worker;

pub use config::{
    ClientSettings, GlobalConfig, PluginConfig, ServerSettings, ServiceConfig,
    DEFAULT_CLIENT_TIMEOUT_MS, DEFAULT_CLOSE_TIMEOUT_MS, DEFAULT_WAIT_TIMEOUT_MS,
};
pub use manager::{ConfigManager, ConfigManagerBuilder};
pub use plugin::PluginManager;
pub use selector::{Selector, StaticSelector};
pub use subsystem::{
    AppLifecycle, ClientSubsystem, DefaultClientSubsystem, DefaultServerSubsystem, ServerSubsystem,
    ServiceRegistry, StartupListener, Warmup,
};
pub use worker::{Task, TaskWorkerPool, WorkerPool, WorkerPoolManager};
