//! Integration tests for the socket and pub/sub transports against an
//! in-process WebSocket server.

mod common;

use std::{sync::Arc, time::Duration};

use common::{Recorder, payment};
use futures_util::{SinkExt, StreamExt};
use nakapay_sync::{
    SyncConfig, SyncEngine,
    payment::PaymentStatus,
    transport::{ConnectionState, TransportKind},
};
use serde_json::{Value, json};
use tokio::{net::TcpListener, sync::oneshot};
use tokio_tungstenite::{
    WebSocketStream, accept_async, accept_hdr_async,
    tungstenite::{
        Message,
        handshake::server::{ErrorResponse, Request, Response},
    },
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param},
};

const RUN_TIMEOUT: Duration = Duration::from_secs(5);

type ServerStream = WebSocketStream<tokio::net::TcpStream>;

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, format!("127.0.0.1:{}", addr.port()))
}

async fn send(ws: &mut ServerStream, text: &str) {
    ws.send(Message::text(text.to_owned())).await.unwrap();
}

async fn next_text(ws: &mut ServerStream) -> String {
    loop {
        match ws.next().await.expect("client hung up").unwrap() {
            Message::Text(text) => return text.as_str().to_owned(),
            _ => continue,
        }
    }
}

/// Runs one Socket.IO session and returns what the client sent.
async fn socket_session(ws: &mut ServerStream) -> Vec<String> {
    let mut received = Vec::new();
    send(ws, r#"0{"sid":"s1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#).await;
    received.push(next_text(ws).await);
    send(ws, r#"40{"sid":"n1"}"#).await;
    received.push(next_text(ws).await);
    send(ws, "2").await;
    received.push(next_text(ws).await);
    send(ws, r#"42["payment-completed",{"paymentId":"p2"}]"#).await;
    send(ws, r#"42["chat",{"paymentId":"p1"}]"#).await;
    send(ws, r#"42["payment-failed",{"paymentId":"p1","reason":"Invoice cancelled"}]"#).await;
    received
}

#[tokio::test]
async fn test_socket_joins_room_and_reports_failure() {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        socket_session(&mut ws).await
    });

    let config = SyncConfig::from_toml(&format!(
        "use_socket = true\nsocket_url = \"http://{addr}\"\nstatus_endpoint = \"http://{addr}/unused\""
    ))
    .unwrap();
    let recorder = Arc::new(Recorder::default());
    let mut engine = SyncEngine::start(payment("p1"), &config, recorder.clone()).unwrap();
    assert_eq!(engine.transport_kind(), TransportKind::Socket);

    let status = tokio::time::timeout(RUN_TIMEOUT, engine.run()).await.unwrap().unwrap();
    assert_eq!(status, PaymentStatus::Failed);
    assert_eq!(recorder.log(), vec!["status:failed", "error:Invoice cancelled"]);

    let received = server.await.unwrap();
    assert_eq!(received, vec!["40", r#"42["join-payment-room","p1"]"#, "3"]);
}

#[tokio::test]
async fn test_socket_reconnects_and_rejoins() {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(async move {
        // First session: close right after the handshake.
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        send(&mut ws, r#"0{"sid":"s0"}"#).await;
        let _ = next_text(&mut ws).await;
        send(&mut ws, "1").await;
        drop(ws);

        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        socket_session(&mut ws).await
    });

    let config = SyncConfig::from_toml(&format!(
        "use_socket = true\nsocket_url = \"ws://{addr}\"\nstatus_endpoint = \"http://{addr}/unused\"\n\
         [reconnect]\ninitial_delay_ms = 20\nmax_delay_ms = 100"
    ))
    .unwrap();
    let recorder = Arc::new(Recorder::default());
    let mut engine = SyncEngine::start(payment("p1"), &config, recorder.clone()).unwrap();

    let status = tokio::time::timeout(RUN_TIMEOUT, engine.run()).await.unwrap().unwrap();
    assert_eq!(status, PaymentStatus::Failed);
    assert_eq!(
        recorder.connections(),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
        ]
    );
    assert_eq!(server.await.unwrap()[1], r#"42["join-payment-room","p1"]"#);
}

/// Runs one realtime session; returns the attach frame the client sent.
async fn pubsub_session(ws: &mut ServerStream) -> Value {
    send(ws, r#"{"action":4,"connectionId":"c1"}"#).await;
    let attach: Value = serde_json::from_str(&next_text(ws).await).unwrap();
    send(ws, r#"{"action":11,"channel":"payment-p1"}"#).await;
    send(ws, r#"{"action":0}"#).await;
    send(ws, r#"{"action":9,"channel":"payment-p1","error":{"code":40160,"message":"not permitted"}}"#).await;
    let batch = json!({
        "action": 15,
        "channel": "payment-p1",
        "messages": [
            {"name": "payment-update", "data": {"paymentId": "p2", "event": "payment.completed"}},
            {"name": "presence", "data": {}},
            {"name": "payment-success", "data": "{\"paymentId\":\"p1\"}"}
        ]
    });
    send(ws, &batch.to_string()).await;
    attach
}

async fn accept_recording_uri(listener: TcpListener) -> (ServerStream, String) {
    let (tcp, _) = listener.accept().await.unwrap();
    let (uri_tx, uri_rx) = oneshot::channel();
    let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let _ = uri_tx.send(request.uri().to_string());
        Ok(response)
    };
    let ws = accept_hdr_async(tcp, callback).await.unwrap();
    (ws, uri_rx.await.unwrap())
}

#[tokio::test]
async fn test_pubsub_with_key_attaches_and_completes() {
    let (listener, addr) = listen().await;
    let server = tokio::spawn(async move {
        let (mut ws, uri) = accept_recording_uri(listener).await;
        let attach = pubsub_session(&mut ws).await;
        (uri, attach)
    });

    let config = SyncConfig::from_toml(&format!(
        "use_pubsub = true\npubsub_key = \"app.key:secret\"\npubsub_realtime_url = \"ws://{addr}\"\n\
         status_endpoint = \"http://{addr}/unused\""
    ))
    .unwrap();
    let recorder = Arc::new(Recorder::default());
    let mut engine = SyncEngine::start(payment("p1"), &config, recorder.clone()).unwrap();
    assert_eq!(engine.transport_kind(), TransportKind::PubSub);

    let status = tokio::time::timeout(RUN_TIMEOUT, engine.run()).await.unwrap().unwrap();
    assert_eq!(status, PaymentStatus::Completed);
    assert_eq!(recorder.log(), vec!["status:completed", "success:p1"]);

    let (uri, attach) = server.await.unwrap();
    assert!(uri.contains("key=app.key%3Asecret"), "unexpected uri {uri}");
    assert!(uri.contains("format=json"));
    assert_eq!(attach, json!({"action": 10, "channel": "payment-p1"}));
}

#[tokio::test]
async fn test_pubsub_token_auth_is_preferred_over_polling() {
    let http = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/ably-token"))
        .and(query_param("paymentId", "p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "tok-1"})))
        .expect(1)
        .mount(&http)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/payment-status/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "failed"})))
        .expect(0)
        .mount(&http)
        .await;

    let (listener, addr) = listen().await;
    let server = tokio::spawn(async move {
        let (mut ws, uri) = accept_recording_uri(listener).await;
        pubsub_session(&mut ws).await;
        uri
    });

    let config = SyncConfig::from_toml(&format!(
        "base_url = \"{}\"\npoll_interval_ms = 100\nuse_pubsub = true\n\
         pubsub_auth_url = \"/api/ably-token\"\npubsub_realtime_url = \"ws://{addr}\"",
        http.uri()
    ))
    .unwrap();
    let recorder = Arc::new(Recorder::default());
    let mut engine = SyncEngine::start(payment("p1"), &config, recorder.clone()).unwrap();

    let status = tokio::time::timeout(RUN_TIMEOUT, engine.run()).await.unwrap().unwrap();
    assert_eq!(status, PaymentStatus::Completed);
    assert!(server.await.unwrap().contains("access_token=tok-1"));

    tokio::time::sleep(Duration::from_millis(250)).await;
}
