//! Cleanup never runs against a node that has a pending launch anywhere or
//! an active session of its own, whatever the interleaving of requests and
//! scheduler ticks.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::TestServer;
use session_coordinator::cleanup::TickReport;

const NODES: [&str; 3] = [
    "http://node-a.test:4444",
    "http://node-b.test:4444",
    "http://node-c.test:5555",
];

#[tokio::test]
async fn test_tick_skips_while_a_launch_is_pending() {
    let server = TestServer::start(&NODES).await;

    server.client.add_pending().await.unwrap();
    assert_eq!(
        server.handle.scheduler.tick().await,
        TickReport::PendingSessions { pending: 1 }
    );
    assert_eq!(server.runner.call_count(), 0);

    server.client.remove_pending().await.unwrap();
    assert_eq!(server.handle.scheduler.tick().await.cleaned_nodes().len(), 3);
}

#[tokio::test]
async fn test_tick_skips_busy_nodes_only() {
    let server = TestServer::start(&NODES).await;

    server.client.add_session("NODE-B.test:4444").await.unwrap();
    let report = server.handle.scheduler.tick().await;
    assert_eq!(
        report.cleaned_nodes(),
        vec!["node-a.test:4444", "node-c.test:5555"]
    );
}

#[tokio::test]
async fn test_session_on_written_default_port_blocks_cleanup() {
    let server = TestServer::start(&["http://grid.test:80", "http://grid.test"]).await;
    assert_eq!(
        server.raw("SESSION\nINCREASE\ngrid.test:80\n").await,
        "SUCCESS\n1\n"
    );

    let report = server.handle.scheduler.tick().await;
    assert_eq!(report.cleaned_nodes(), vec!["grid.test:-1"]);
    assert!(server.runner.violations.lock().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_cleanup_under_concurrent_traffic() {
    let server = Arc::new(TestServer::start_with(&NODES, 0, Duration::from_millis(5)).await);

    let ticks = {
        let server = server.clone();
        tokio::spawn(async move {
            for _ in 0..20 {
                server.handle.scheduler.tick().await;
                tokio::time::sleep(Duration::from_millis(3)).await;
            }
        })
    };

    let mut workers = Vec::new();
    for worker in 0..6 {
        let server = server.clone();
        workers.push(tokio::spawn(async move {
            let node = match worker % 3 {
                0 => "node-a.test:4444",
                1 => "node-b.test:4444",
                _ => "node-c.test:5555",
            };
            for _ in 0..10 {
                // A test launch: pending while the browser starts, then an
                // active session until the test ends.
                server.client.add_pending().await.unwrap();
                tokio::time::sleep(Duration::from_millis(2)).await;
                server.client.add_session(node).await.unwrap();
                server.client.remove_pending().await.unwrap();
                tokio::time::sleep(Duration::from_millis(2)).await;
                server.client.remove_session(node).await.unwrap();
            }
        }));
    }

    for worker in workers {
        worker.await.unwrap();
    }
    ticks.await.unwrap();

    let violations = server.runner.violations.lock().clone();
    assert!(violations.is_empty(), "unsafe cleanups: {violations:?}");

    // Traffic is over: every node is idle and gets cleaned
    assert_eq!(server.handle.scheduler.tick().await.cleaned_nodes().len(), 3);
}
