//! End-to-end protocol exchanges against a running coordinator.

mod common;

use common::TestServer;
use session_coordinator::NodeOutcome;

#[tokio::test]
async fn test_pending_increase_on_fresh_registry() {
    let server = TestServer::start(&["http://127.0.0.1:4444"]).await;
    assert_eq!(server.raw("PENDING\nINCREASE\n").await, "SUCCESS\n1\n");
}

#[tokio::test]
async fn test_session_count_of_unseen_key() {
    let server = TestServer::start(&["http://127.0.0.1:4444"]).await;
    assert_eq!(server.raw("SESSION\nCOUNT\nhost1:4444\n").await, "SUCCESS\n0\n");
}

#[tokio::test]
async fn test_unsupported_command() {
    let server = TestServer::start(&["http://127.0.0.1:4444"]).await;
    assert_eq!(
        server.raw("FOO\n").await,
        "ERROR\nUnsupported command:  FOO\n"
    );
    assert_eq!(server.client.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_duplicate_node_is_listed_once() {
    let server = TestServer::start(&["http://127.0.0.1:4444"]).await;

    assert_eq!(
        server.raw("NODES\nINCREASE\nhttp://a.com:4444\n").await,
        "SUCCESS\nAdded Node:  http://a.com:4444\n"
    );
    assert_eq!(
        server.raw("NODES\nINCREASE\nhttp://a.com:4444\n").await,
        "SUCCESS\nDuplicate Node:  http://a.com:4444\n"
    );

    let nodes = server.client.list_nodes().await.unwrap();
    assert_eq!(
        nodes.iter().filter(|node| node.as_str() == "a.com:4444").count(),
        1
    );
    assert_eq!(nodes, vec!["127.0.0.1:4444", "a.com:4444"]);
}

#[tokio::test]
async fn test_test_command_gets_no_reply() {
    let server = TestServer::start(&["http://127.0.0.1:4444"]).await;
    assert_eq!(server.raw("TEST\n").await, "");
    server.client.test_connection().await.unwrap();
}

#[tokio::test]
async fn test_client_round_trip() {
    let server = TestServer::start(&["http://127.0.0.1:4444"]).await;
    let client = &server.client;

    assert_eq!(client.add_pending().await.unwrap(), 1);
    assert_eq!(client.add_pending().await.unwrap(), 2);
    assert_eq!(client.add_session("127.0.0.1:4444").await.unwrap(), 1);
    assert_eq!(client.remove_pending().await.unwrap(), 1);

    let summary = client.summary().await.unwrap();
    assert_eq!(summary.pending, 1);
    assert_eq!(summary.nodes.len(), 1);
    assert_eq!(summary.nodes[0].node, "127.0.0.1:4444");
    assert_eq!(summary.nodes[0].sessions, 1);

    assert_eq!(client.remove_session("127.0.0.1:4444").await.unwrap(), 0);
    assert_eq!(client.remove_session("127.0.0.1:4444").await.unwrap(), 0);
    client.reset_pending().await.unwrap();
    assert_eq!(client.pending_count().await.unwrap(), 0);

    assert_eq!(client.add_node("http://b.com:5555").await.unwrap(), NodeOutcome::Applied);
    assert_eq!(client.remove_node("http://b.com:5555").await.unwrap(), NodeOutcome::Applied);
    assert_eq!(client.remove_node("http://b.com:5555").await.unwrap(), NodeOutcome::Unchanged);
    assert!(client.add_node("b.com:5555").await.is_err());

    client.add_session("x.com:1").await.unwrap();
    client.reset_all_sessions().await.unwrap();
    assert!(client.list_hosts().await.unwrap().contains(&"x.com:1".to_string()));
    assert_eq!(client.session_count("x.com:1").await.unwrap(), 0);
}

#[tokio::test]
async fn test_admission_ceiling_over_client() {
    let server = TestServer::start_with(
        &["http://127.0.0.1:4444"],
        1,
        std::time::Duration::ZERO,
    )
    .await;

    // Occupy the only slot with a half-sent request
    let mut occupant = tokio::net::TcpStream::connect(server.handle.address)
        .await
        .unwrap();
    tokio::io::AsyncWriteExt::write_all(&mut occupant, b"PENDING\n")
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    match server.client.pending_count().await {
        Err(session_coordinator::ClientError::Rejected { message }) => {
            assert_eq!(message, "Max Connections Reached:  1")
        }
        other => panic!("unexpected result {other:?}"),
    }

    drop(occupant);
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(server.client.pending_count().await.unwrap(), 0);
}
