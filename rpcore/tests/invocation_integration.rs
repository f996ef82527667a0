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

//! Timeout and backup-request behavior of the invocation orchestrator.

use rpcore::error::{FrameworkCode, TimeoutKind};
use rpcore::invoke::{
    FnInvoker, HedgeWinner, InvocationContext, InvocationOrchestrator, Invoker, LinkInvokeTimeout,
    Request, Response,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn answering_after(delay: Duration, body: &'static [u8]) -> Arc<dyn Invoker> {
    Arc::new(FnInvoker::new("delayed", move |r: Request| async move {
        tokio::time::sleep(delay).await;
        Ok(Response::ok(r.request_id, body.to_vec()))
    }))
}

fn request() -> Request {
    Request::new("demo.Greeter", "hello", b"hi".to_vec())
}

#[tokio::test(start_paused = true)]
async fn test_timeout_fires_at_deadline_not_at_completion() {
    let orchestrator = InvocationOrchestrator::current().unwrap();
    let start = Instant::now();

    let err = orchestrator
        .invoke_async(
            answering_after(Duration::from_millis(2000), b"late"),
            request(),
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();

    let elapsed = start.elapsed();
    assert!(err.is_timeout());
    assert_eq!(err.framework_code(), Some(FrameworkCode::ClientInvokeTimeout));
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(100), "timed out after {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_backup_wins_and_primary_result_is_discarded() {
    let orchestrator = InvocationOrchestrator::current().unwrap();
    let primary_finished = Arc::new(AtomicBool::new(false));
    let flag = primary_finished.clone();
    let primary: Arc<dyn Invoker> = Arc::new(FnInvoker::new("primary", move |r: Request| {
        let flag = flag.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(Response::ok(r.request_id, b"primary".to_vec()))
        }
    }));
    let backup = answering_after(Duration::from_millis(50), b"backup");

    let start = Instant::now();
    let (response, winner) = orchestrator
        .invoke_with_backup(
            primary,
            backup,
            request(),
            Duration::from_millis(1000),
            Duration::from_millis(100),
        )
        .await
        .unwrap();

    assert_eq!(winner, HedgeWinner::Backup);
    assert_eq!(response.body, b"backup");
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(150) && elapsed < Duration::from_millis(300));
    assert!(!primary_finished.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_fast_primary_sends_no_backup() {
    let orchestrator = InvocationOrchestrator::current().unwrap();
    let backup_called = Arc::new(AtomicBool::new(false));
    let flag = backup_called.clone();
    let backup: Arc<dyn Invoker> = Arc::new(FnInvoker::new("backup", move |r: Request| {
        flag.store(true, Ordering::SeqCst);
        async move { Ok(Response::ok(r.request_id, Vec::new())) }
    }));

    let (response, winner) = orchestrator
        .invoke_with_backup(
            answering_after(Duration::from_millis(20), b"primary"),
            backup,
            request(),
            Duration::from_millis(1000),
            Duration::from_millis(100),
        )
        .await
        .unwrap();

    assert_eq!(winner, HedgeWinner::Primary);
    assert_eq!(response.body, b"primary");
    assert!(!backup_called.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_link_deadline_shorter_than_local_timeout() {
    let orchestrator = InvocationOrchestrator::current().unwrap();
    let context = InvocationContext::new()
        .with_link_timeout(LinkInvokeTimeout::new(Duration::from_millis(30)));

    let err = orchestrator
        .invoke_async(
            answering_after(Duration::from_millis(500), b"late"),
            request().with_context(context),
            Duration::from_millis(200),
        )
        .await
        .unwrap_err();

    match err {
        rpcore::RpcError::Timeout { kind, timeout, .. } => {
            assert_eq!(kind, TimeoutKind::Link);
            assert_eq!(timeout, Duration::from_millis(30));
        }
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[test]
fn test_invoke_sync_blocks_until_response() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();
    let orchestrator = InvocationOrchestrator::new(runtime.handle().clone());

    let response = orchestrator
        .invoke_sync(
            answering_after(Duration::from_millis(10), b"sync"),
            request(),
            Duration::from_secs(1),
        )
        .unwrap();
    assert_eq!(response.body, b"sync");
}
