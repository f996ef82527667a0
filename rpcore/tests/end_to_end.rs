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

//! A provider and a consumer in one process, talking over TCP.

use rpcore::client::BackendConfig;
use rpcore::invoke::Request;
use rpcore::runtime::{
    ConfigManager, DefaultClientSubsystem, DefaultServerSubsystem, GlobalConfig, ServiceConfig,
    TaskWorkerPool, WorkerPoolManager,
};
use rpcore::server::MethodRouter;
use rpcore::transport::{RemoteAddress, TcpConnector};
use rpcore::{FrameworkCode, RpcError};
use std::sync::Arc;
use std::time::Duration;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn greeter() -> MethodRouter {
    MethodRouter::new("demo.Greeter")
        .route("hello", |r: Request| async move {
            let name = String::from_utf8_lossy(&r.body).into_owned();
            Ok(format!("hello {}", name).into_bytes())
        })
        .route("forbidden", |_r: Request| async move {
            Err(RpcError::business(403, "not allowed"))
        })
        .route("slow", |_r: Request| async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Vec::new())
        })
}

struct Process {
    manager: ConfigManager,
    clients: Arc<DefaultClientSubsystem<TcpConnector>>,
}

fn process(lazy: bool) -> Process {
    let address = RemoteAddress::new("127.0.0.1", free_port());

    let workers = Arc::new(WorkerPoolManager::new());
    workers.register(Arc::new(TaskWorkerPool::new("business", 64)));

    let servers = DefaultServerSubsystem::new(workers.clone()).with_service(
        ServiceConfig::new("demo.Greeter", address.clone()).with_worker_pool("business"),
        Arc::new(greeter()),
    );
    let clients = Arc::new(
        DefaultClientSubsystem::new(TcpConnector::new()).with_backend(
            BackendConfig::new("greeter", "demo.Greeter")
                .with_targets(vec![address])
                .with_timeout(Duration::from_millis(500))
                .with_lazy(lazy),
        ),
    );

    let manager = ConfigManager::builder(GlobalConfig::default())
        .client_subsystem(clients.clone())
        .server_subsystem(Arc::new(servers))
        .worker_pools(workers)
        .build();
    Process { manager, clients }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_call_through_proxy() {
    let process = process(true);
    process.manager.start().await.unwrap();
    let proxy = process.clients.proxy("greeter").unwrap();

    let response = proxy
        .invoke(Request::new("demo.Greeter", "hello", b"ada".to_vec()))
        .await
        .unwrap();
    assert!(response.is_success());
    assert_eq!(response.body, b"hello ada");

    let business = proxy
        .invoke(Request::new("demo.Greeter", "forbidden", Vec::new()))
        .await
        .unwrap();
    assert_eq!(business.business_code, 403);

    let missing = proxy
        .invoke(Request::new("demo.Greeter", "absent", Vec::new()))
        .await
        .unwrap_err();
    assert_eq!(missing.framework_code(), Some(FrameworkCode::ServerNoFunction));

    process.manager.stop().await.unwrap();
    assert!(process.clients.cluster().is_closed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_handler_times_out_on_both_sides() {
    let process = process(true);
    process.manager.start().await.unwrap();
    let proxy = process.clients.proxy("greeter").unwrap();

    let mut slow = Request::new("demo.Greeter", "slow", Vec::new());
    slow.timeout = Some(Duration::from_millis(100));
    let err = proxy.invoke(slow).await.unwrap_err();
    assert!(
        err.is_timeout() || err.framework_code() == Some(FrameworkCode::ServerTimeout),
        "{:?}",
        err
    );

    // the connection is still usable afterwards
    let response = proxy
        .invoke(Request::new("demo.Greeter", "hello", b"again".to_vec()))
        .await
        .unwrap();
    assert_eq!(response.body, b"hello again");

    process.manager.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_eager_warmup_before_servers_is_not_fatal() {
    // Warmup runs before the local servers bind, so the eager connect fails.
    let process = process(false);
    process.manager.start().await.unwrap();
    assert!(process.clients.cluster().is_empty());

    let proxy = process.clients.proxy("greeter").unwrap();
    let response = proxy
        .invoke(Request::new("demo.Greeter", "hello", b"late".to_vec()))
        .await
        .unwrap();
    assert_eq!(response.body, b"hello late");
    assert_eq!(process.clients.cluster().len(), 1);

    process.manager.stop().await.unwrap();
    assert!(process.clients.cluster().is_empty());
}

#[test]
fn test_blocking_call_from_plain_thread() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();
    let process = runtime.block_on(async {
        let process = process(true);
        process.manager.start().await.unwrap();
        process
    });

    let proxy = process.clients.proxy("greeter").unwrap();
    let response = proxy
        .invoke_sync(Request::new("demo.Greeter", "hello", b"sync".to_vec()))
        .unwrap();
    assert_eq!(response.body, b"hello sync");

    runtime.block_on(process.manager.stop()).unwrap();
}
