//! Invocation benchmarks for rpcore
//!
//! Measures:
//! - Orchestrated call overhead against an in-process invoker
//! - Pool acquire/release on a warm pool
//! - TCP round-trip latency through `RpcClient` for several body sizes

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rpcore::client::RpcClient;
use rpcore::invoke::{FnInvoker, InvocationOrchestrator, Invoker, Request, Response};
use rpcore::pool::PoolConfig;
use rpcore::server::{MethodRouter, RpcServer, ServerKey};
use rpcore::transport::{RemoteAddress, TcpConnector, TcpServerTransport};
use std::sync::Arc;
use std::time::Duration;

/// Orchestrator overhead with an invoker that answers immediately
fn bench_orchestrator_overhead(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let orchestrator = InvocationOrchestrator::new(rt.handle().clone());
    let echo: Arc<dyn Invoker> = Arc::new(FnInvoker::new("echo", |r: Request| async move {
        Ok(Response::ok(r.request_id, r.body))
    }));

    c.bench_function("orchestrator_invoke_async", |b| {
        b.to_async(&rt).iter(|| {
            let pending = orchestrator.invoke_async(
                echo.clone(),
                Request::new("bench", "echo", vec![0u8; 64]),
                Duration::from_secs(1),
            );
            async move { pending.await.unwrap() }
        });
    });
}

fn start_echo_server(rt: &tokio::runtime::Runtime) -> (RpcServer, RemoteAddress) {
    rt.block_on(async {
        let bind = RemoteAddress::new("127.0.0.1", 0);
        let server = RpcServer::new(
            ServerKey::new(bind.clone(), "json"),
            Arc::new(TcpServerTransport::new(bind)),
        );
        server.register(Arc::new(
            MethodRouter::new("bench").route("echo", |r: Request| async move { Ok(r.body) }),
        ));
        server.open().await.unwrap();
        let address = RemoteAddress::from(server.local_addr().unwrap());
        (server, address)
    })
}

/// Acquire and release on a pool whose connection is already open
fn bench_pool_checkout(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (server, address) = start_echo_server(&rt);
    let client = RpcClient::with_lazy(address.clone(), TcpConnector::new(), PoolConfig::default(), false);
    rt.block_on(client.open()).unwrap();
    let pool = client.pool();

    c.bench_function("pool_acquire_release", |b| {
        b.to_async(&rt).iter(|| {
            let pool = pool.clone();
            let address = address.clone();
            async move {
                let connection = pool.acquire(&address).await.unwrap();
                pool.release(&connection);
            }
        });
    });

    rt.block_on(async {
        client.close().await.unwrap();
        server.close().await.unwrap();
    });
}

/// Round-trip latency over TCP for different body sizes
fn bench_tcp_round_trip(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (server, address) = start_echo_server(&rt);
    let client = RpcClient::new(address, TcpConnector::new(), PoolConfig::default());
    rt.block_on(client.open()).unwrap();
    let orchestrator = InvocationOrchestrator::new(rt.handle().clone());
    let invoker: Arc<dyn Invoker> = Arc::new(client.create_invoker("bench"));

    let mut group = c.benchmark_group("tcp_round_trip");
    for size in [64usize, 1024, 16 * 1024] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}bytes", size)),
            &size,
            |b, &size| {
                b.to_async(&rt).iter(|| {
                    let pending = orchestrator.invoke_async(
                        invoker.clone(),
                        Request::new("bench", "echo", vec![0u8; size]),
                        Duration::from_secs(1),
                    );
                    async move { pending.await.unwrap() }
                });
            },
        );
    }
    group.finish();

    rt.block_on(async {
        client.close().await.unwrap();
        server.close().await.unwrap();
    });
}

criterion_group!(
    benches,
    bench_orchestrator_overhead,
    bench_pool_checkout,
    bench_tcp_round_trip
);
criterion_main!(benches);
