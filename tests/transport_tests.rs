// Integration tests for the session transport
//
// A scripted in-process chat server stands in for the network so the tests
// can count handshakes and requests.

mod common;

use common::{MockConnector, MockServer};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use ziyue::error::TransportError;
use ziyue::transport::{ChatRequest, ConnectionEndpoint, ConnectionPhase, SessionTransport};

fn endpoint(server: &Arc<MockServer>, address: &str) -> Arc<ConnectionEndpoint> {
    Arc::new(ConnectionEndpoint::new(address, MockConnector::new(server.clone())).unwrap())
}

async fn wait_for_phase(transport: &SessionTransport, phase: ConnectionPhase) {
    let mut rx = transport.subscribe();
    rx.wait_for(|s| s.phase == phase).await.unwrap();
}

#[tokio::test]
async fn test_connect_send_disconnect() {
    let server = MockServer::new();
    let endpoint = endpoint(&server, "wss://host/chat");
    let transport = SessionTransport::new();

    assert_eq!(transport.phase(), ConnectionPhase::Disconnected);
    assert!(!endpoint.is_live().await);
    assert!(endpoint.last_connected_at().await.is_none());

    transport.connect(endpoint.clone()).await.unwrap();

    assert_eq!(transport.phase(), ConnectionPhase::Connected);
    assert!(transport.is_connected());
    assert!(endpoint.is_live().await);
    assert!(endpoint.last_connected_at().await.is_some());
    assert_eq!(server.opens(), 1);

    let active = transport.active_endpoint().unwrap();
    assert_eq!(active.id(), endpoint.id());
    assert_eq!(active.address(), "wss://host/chat");

    let response = transport.send(ChatRequest::text("hi")).await.unwrap();
    assert_eq!(response.content, "echo: hi");

    transport.disconnect().await;

    assert_eq!(transport.phase(), ConnectionPhase::Disconnected);
    assert!(transport.active_endpoint().is_none());
    assert!(!endpoint.is_live().await);
    assert_eq!(server.closes(), 1);
}

#[tokio::test]
async fn test_endpoint_creation_does_not_connect() {
    let server = MockServer::new();
    let endpoint = endpoint(&server, "wss://host/chat");

    assert_eq!(server.opens(), 0);
    assert!(!endpoint.is_live().await);

    let status = endpoint.status().await;
    assert_eq!(status.address, "wss://host/chat");
    assert!(!status.is_live);
    assert!(status.last_connected_at.is_none());
}

#[tokio::test]
async fn test_endpoint_rejects_blank_address() {
    let server = MockServer::new();

    for address in ["", "   "] {
        let result = ConnectionEndpoint::new(address, MockConnector::new(server.clone()));
        assert!(matches!(result, Err(TransportError::InvalidAddress(_))));
    }
}

#[tokio::test]
async fn test_endpoint_ids_are_unique() {
    let server = MockServer::new();
    let a = endpoint(&server, "wss://host/chat");
    let b = endpoint(&server, "wss://host/chat");

    assert_ne!(a.id(), b.id());
}

#[tokio::test]
async fn test_send_without_connection_is_rejected_locally() {
    let server = MockServer::new();
    let transport = SessionTransport::new();

    let result = transport.send(ChatRequest::text("hi")).await;
    assert_eq!(result.unwrap_err(), TransportError::NotConnected);

    let mut partials = Vec::new();
    let result = transport
        .send_streaming(ChatRequest::text("hi"), |p| partials.push(p.to_string()))
        .await;
    assert_eq!(result.unwrap_err(), TransportError::NotConnected);
    assert!(partials.is_empty());

    assert_eq!(server.opens(), 0);
    assert_eq!(server.requests(), 0);
}

#[tokio::test]
async fn test_send_after_disconnect_is_rejected() {
    let server = MockServer::new();
    let transport = SessionTransport::new();
    transport
        .connect(endpoint(&server, "wss://host/chat"))
        .await
        .unwrap();
    transport.disconnect().await;

    let result = transport.send(ChatRequest::text("late")).await;
    assert_eq!(result.unwrap_err(), TransportError::NotConnected);
    assert_eq!(server.requests(), 0);
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let server = MockServer::new();
    let transport = SessionTransport::new();

    // Never connected
    transport.disconnect().await;
    assert_eq!(transport.phase(), ConnectionPhase::Disconnected);

    transport
        .connect(endpoint(&server, "wss://host/chat"))
        .await
        .unwrap();
    transport.disconnect().await;
    transport.disconnect().await;

    assert_eq!(transport.phase(), ConnectionPhase::Disconnected);
    assert_eq!(server.closes(), 1);
}

#[tokio::test]
async fn test_connect_failure_allows_retry() {
    let server = MockServer::new();
    server.fail_connect.store(true, Ordering::SeqCst);
    let endpoint = endpoint(&server, "wss://host/chat");
    let transport = SessionTransport::new();

    let result = transport.connect(endpoint.clone()).await;
    assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
    assert_eq!(transport.phase(), ConnectionPhase::Disconnected);
    assert!(transport.active_endpoint().is_none());
    assert!(!endpoint.is_live().await);

    server.fail_connect.store(false, Ordering::SeqCst);
    transport.connect(endpoint.clone()).await.unwrap();

    assert_eq!(transport.phase(), ConnectionPhase::Connected);
    assert_eq!(server.opens(), 2);
}

#[tokio::test]
async fn test_connect_while_connected_is_rejected() {
    let server = MockServer::new();
    let transport = SessionTransport::new();
    let first = endpoint(&server, "wss://host/chat");
    transport.connect(first.clone()).await.unwrap();

    let result = transport.connect(endpoint(&server, "wss://other/chat")).await;

    assert_eq!(result.unwrap_err(), TransportError::AlreadyConnected);
    assert_eq!(transport.phase(), ConnectionPhase::Connected);
    assert_eq!(transport.active_endpoint().unwrap().id(), first.id());
    assert_eq!(server.opens(), 1);
}

#[tokio::test]
async fn test_connect_while_connecting_is_rejected() {
    let server = MockServer::new();
    let gate = server.gate_handshake();
    let transport = Arc::new(SessionTransport::new());

    let pending = {
        let transport = transport.clone();
        let endpoint = endpoint(&server, "wss://host/chat");
        tokio::spawn(async move { transport.connect(endpoint).await })
    };
    wait_for_phase(&transport, ConnectionPhase::Connecting).await;

    let result = transport.connect(endpoint(&server, "wss://host/chat")).await;
    assert_eq!(result.unwrap_err(), TransportError::AlreadyConnecting);

    gate.notify_one();
    pending.await.unwrap().unwrap();

    assert_eq!(transport.phase(), ConnectionPhase::Connected);
    assert_eq!(server.opens(), 1);
}

#[tokio::test]
async fn test_disconnect_waits_for_pending_connect() {
    let server = MockServer::new();
    let gate = server.gate_handshake();
    let transport = Arc::new(SessionTransport::new());

    let pending = {
        let transport = transport.clone();
        let endpoint = endpoint(&server, "wss://host/chat");
        tokio::spawn(async move { transport.connect(endpoint).await })
    };
    wait_for_phase(&transport, ConnectionPhase::Connecting).await;

    let disconnecting = {
        let transport = transport.clone();
        tokio::spawn(async move { transport.disconnect().await })
    };

    gate.notify_one();
    pending.await.unwrap().unwrap();
    disconnecting.await.unwrap();

    assert_eq!(transport.phase(), ConnectionPhase::Disconnected);
    assert_eq!(server.closes(), 1);
}

#[tokio::test]
async fn test_abandoned_connect_restores_disconnected() {
    let server = MockServer::new();
    let _gate = server.gate_handshake();
    let transport = Arc::new(SessionTransport::new());

    let pending = {
        let transport = transport.clone();
        let endpoint = endpoint(&server, "wss://host/chat");
        tokio::spawn(async move { transport.connect(endpoint).await })
    };
    wait_for_phase(&transport, ConnectionPhase::Connecting).await;

    pending.abort();
    wait_for_phase(&transport, ConnectionPhase::Disconnected).await;

    assert!(transport.active_endpoint().is_none());
}

#[tokio::test]
async fn test_failed_send_keeps_connection() {
    let server = MockServer::new();
    let transport = SessionTransport::new();
    transport
        .connect(endpoint(&server, "wss://host/chat"))
        .await
        .unwrap();

    server.fail_requests.store(true, Ordering::SeqCst);
    let result = transport.send(ChatRequest::text("hi")).await;

    assert!(matches!(result, Err(TransportError::RequestFailed(_))));
    assert_eq!(transport.phase(), ConnectionPhase::Connected);

    server.fail_requests.store(false, Ordering::SeqCst);
    assert!(transport.send(ChatRequest::text("again")).await.is_ok());
}

#[tokio::test]
async fn test_streaming_partials_arrive_in_order() {
    let server = MockServer::with_partials(&["Hel", "lo ", "there"]);
    let transport = SessionTransport::new();
    transport
        .connect(endpoint(&server, "wss://host/chat"))
        .await
        .unwrap();

    let request = ChatRequest::text("greet me");
    let request_id = request.request_id.clone();
    let mut partials = Vec::new();

    let response = transport
        .send_streaming(request, |p| partials.push(p.to_string()))
        .await
        .unwrap();

    assert_eq!(partials, vec!["Hel", "lo ", "there"]);
    assert_eq!(response.content, "Hello there");
    assert_eq!(response.request_id, request_id);
}

#[tokio::test]
async fn test_streaming_drop_reports_connection_lost() {
    let server = MockServer::with_partials(&["partial"]);
    server.drop_streams.store(true, Ordering::SeqCst);
    let transport = SessionTransport::new();
    transport
        .connect(endpoint(&server, "wss://host/chat"))
        .await
        .unwrap();

    let mut partials = Vec::new();
    let result = transport
        .send_streaming(ChatRequest::text("hi"), |p| partials.push(p.to_string()))
        .await;

    assert_eq!(result.unwrap_err(), TransportError::ConnectionLost);
    assert_eq!(partials, vec!["partial"]);
}

#[tokio::test]
async fn test_concurrent_sends_share_connection() {
    let server = MockServer::new();
    let transport = Arc::new(SessionTransport::new());
    transport
        .connect(endpoint(&server, "wss://host/chat"))
        .await
        .unwrap();

    let sends: Vec<_> = (0..5)
        .map(|i| {
            let transport = transport.clone();
            tokio::spawn(async move { transport.send(ChatRequest::text(format!("m{i}"))).await })
        })
        .collect();

    for (i, send) in sends.into_iter().enumerate() {
        let response = send.await.unwrap().unwrap();
        assert_eq!(response.content, format!("echo: m{i}"));
    }
    assert_eq!(server.requests(), 5);
    assert_eq!(server.opens(), 1);
}

#[tokio::test]
async fn test_endpoint_reused_across_transports() {
    let server = MockServer::new();
    let shared = endpoint(&server, "wss://host/chat");
    let first = SessionTransport::new();
    let second = SessionTransport::new();

    first.connect(shared.clone()).await.unwrap();
    second.connect(shared.clone()).await.unwrap();

    // Already live: no second handshake
    assert_eq!(server.opens(), 1);
    assert!(second.is_connected());
}

#[tokio::test]
async fn test_shared_endpoint_closed_by_other_transport() {
    let server = MockServer::new();
    let shared = endpoint(&server, "wss://host/chat");
    let first = SessionTransport::new();
    let second = SessionTransport::new();

    first.connect(shared.clone()).await.unwrap();
    second.connect(shared.clone()).await.unwrap();
    second.disconnect().await;
    assert!(!shared.is_live().await);
    assert_eq!(server.closes(), 1);

    let result = first.send(ChatRequest::text("hi")).await;
    assert_eq!(result.unwrap_err(), TransportError::ConnectionLost);
    assert_eq!(first.phase(), ConnectionPhase::Disconnected);
    assert!(first.active_endpoint().is_none());
    assert_eq!(server.requests(), 0);

    let result = first
        .send_streaming(ChatRequest::text("hi"), |_| {})
        .await;
    assert_eq!(result.unwrap_err(), TransportError::NotConnected);

    // Reconnecting performs a fresh handshake
    first.connect(shared.clone()).await.unwrap();
    assert_eq!(server.opens(), 2);
    let response = first.send(ChatRequest::text("again")).await.unwrap();
    assert_eq!(response.content, "echo: again");
}

#[tokio::test]
async fn test_phase_transitions_are_observable() {
    let server = MockServer::new();
    let transport = SessionTransport::new();
    let mut rx = transport.subscribe();

    transport
        .connect(endpoint(&server, "wss://host/chat"))
        .await
        .unwrap();
    assert!(rx.has_changed().unwrap());
    assert_eq!(rx.borrow_and_update().phase, ConnectionPhase::Connected);

    transport.disconnect().await;
    assert_eq!(rx.borrow_and_update().phase, ConnectionPhase::Disconnected);
}
