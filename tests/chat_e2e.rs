//! End-to-end chat session against an in-process chat service: REST history
//! plus a WebSocket endpoint, driven through the real connector and client.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::timeout;

use forum_client::chat::{ChatHandle, ChatSnapshot, ConnectionStatus, SessionError, spawn_chat_session};
use forum_client::config::{Endpoints, SessionSettings};
use forum_client::net::api::ApiClient;
use forum_client::net::socket::WsConnector;
use forum_client::net::types::{ChatDraft, WireId};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Clone)]
struct ChatService {
    upgrades: Arc<AtomicUsize>,
    received: mpsc::UnboundedSender<String>,
}

async fn history(headers: HeaderMap) -> Response {
    let bearer = headers.get("authorization").and_then(|v| v.to_str().ok()).and_then(|v| v.strip_prefix("Bearer "));
    if bearer.is_none_or(str::is_empty) {
        return (StatusCode::UNAUTHORIZED, axum::Json(json!({"error": "invalid token"}))).into_response();
    }
    axum::Json(json!([
        {"id": 1, "author_id": 7, "author_name": "alice", "message": "welcome", "timestamp": "2024-01-01T00:00:00Z"}
    ]))
    .into_response()
}

async fn upgrade(
    State(service): State<ChatService>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let token = params.get("token").cloned().unwrap_or_default();
    if token != "tok" && token != "revoked" {
        return (StatusCode::UNAUTHORIZED, "invalid token").into_response();
    }
    service.upgrades.fetch_add(1, Ordering::SeqCst);
    ws.on_upgrade(move |socket| run_socket(socket, token, service))
}

async fn run_socket(mut socket: WebSocket, token: String, service: ChatService) {
    if token == "revoked" {
        let frame = CloseFrame { code: 4001, reason: "token revoked".into() };
        socket.send(Message::Close(Some(frame))).await.unwrap();
        return;
    }
    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(text) = msg else { continue };
        service.received.send(text.to_string()).unwrap();
        let sent: Value = serde_json::from_str(&text).unwrap();
        let echo = json!({
            "id": 2,
            "user_id": 7,
            "username": sent["username"],
            "message": sent["message"],
            "timestamp": sent["timestamp"],
        });
        if socket.send(Message::Text(echo.to_string().into())).await.is_err() {
            break;
        }
    }
}

struct Fixture {
    endpoints: Endpoints,
    upgrades: Arc<AtomicUsize>,
    received: mpsc::UnboundedReceiver<String>,
}

async fn start_service() -> Fixture {
    let (tx, received) = mpsc::unbounded_channel();
    let upgrades = Arc::new(AtomicUsize::new(0));
    let service = ChatService { upgrades: upgrades.clone(), received: tx };
    let app = Router::new()
        .route("/api/v1/messages", get(history))
        .route("/ws", get(upgrade))
        .with_state(service);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let endpoints = Endpoints {
        chat: format!("http://{addr}/api/v1"),
        chat_ws: format!("ws://{addr}/ws"),
        ..Endpoints::default()
    };
    Fixture { endpoints, upgrades, received }
}

fn session(endpoints: &Endpoints) -> ChatHandle {
    let settings = SessionSettings {
        reconnect_base: Duration::from_millis(50),
        reconnect_max: Duration::from_millis(200),
        queue_limit: 16,
    };
    let api = ApiClient::new(endpoints.clone(), WAIT).unwrap();
    spawn_chat_session(settings, Arc::new(WsConnector), Arc::new(api))
}

async fn wait_for(handle: &ChatHandle, what: &str, mut pred: impl FnMut(&ChatSnapshot) -> bool) -> ChatSnapshot {
    let mut rx = handle.subscribe();
    let found = timeout(WAIT, rx.wait_for(|s| pred(s))).await.ok().and_then(Result::ok).map(|s| s.clone());
    found.unwrap_or_else(|| panic!("timed out waiting for {what}; last snapshot {:?}", handle.snapshot()))
}

#[tokio::test]
async fn history_then_live_chat_round_trip() {
    let mut fixture = start_service().await;
    let handle = session(&fixture.endpoints);
    handle.configure(fixture.endpoints.chat_ws.clone(), fixture.endpoints.history_url(), Some("tok".to_owned()));

    let snapshot = wait_for(&handle, "history and connection", |s| {
        s.status == ConnectionStatus::Connected && !s.messages.is_empty()
    })
    .await;
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(snapshot.messages[0].id, WireId::Number(1));
    assert_eq!(snapshot.messages[0].display_author(), "alice");

    handle.send(ChatDraft { username: Some("bob".to_owned()), ..ChatDraft::text("hi") });

    let frame = timeout(WAIT, fixture.received.recv()).await.unwrap().unwrap();
    let frame: Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(frame["message"], "hi");
    assert_eq!(frame["type"], "message");
    assert!(frame["timestamp"].as_str().is_some_and(|t| !t.is_empty()));
    assert!(fixture.received.try_recv().is_err());

    let snapshot = wait_for(&handle, "echoed message", |s| s.messages.len() == 2).await;
    assert_eq!(snapshot.messages[1].message, "hi");
    assert_eq!(snapshot.messages[1].display_author(), "bob");
    assert_eq!(fixture.upgrades.load(Ordering::SeqCst), 1);

    timeout(WAIT, handle.shutdown()).await.unwrap();
}

#[tokio::test]
async fn revoked_token_is_not_retried() {
    let fixture = start_service().await;
    let handle = session(&fixture.endpoints);
    handle.configure(fixture.endpoints.chat_ws.clone(), fixture.endpoints.history_url(), Some("revoked".to_owned()));

    let snapshot = wait_for(&handle, "auth rejection", |s| s.error == Some(SessionError::AuthRequired)).await;
    assert_eq!(snapshot.status, ConnectionStatus::Disconnected);

    // Several reconnect periods pass without another upgrade.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(fixture.upgrades.load(Ordering::SeqCst), 1);
    assert_eq!(handle.snapshot().error, Some(SessionError::AuthRequired));
}

#[tokio::test]
async fn rejected_upgrade_is_an_auth_failure() {
    let fixture = start_service().await;
    let handle = session(&fixture.endpoints);
    handle.configure(fixture.endpoints.chat_ws.clone(), fixture.endpoints.history_url(), Some("bogus".to_owned()));

    wait_for(&handle, "auth rejection", |s| s.error == Some(SessionError::AuthRequired)).await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(fixture.upgrades.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unreachable_service_keeps_retrying() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let endpoints = Endpoints {
        chat: format!("http://{addr}/api/v1"),
        chat_ws: format!("ws://{addr}/ws"),
        ..Endpoints::default()
    };

    let handle = session(&endpoints);
    handle.configure(endpoints.chat_ws.clone(), endpoints.history_url(), Some("tok".to_owned()));
    let snapshot = wait_for(&handle, "repeated attempts", |s| s.attempts >= 3).await;
    assert_ne!(snapshot.status, ConnectionStatus::Connected);
    assert!(snapshot.error.is_some());
    assert!(snapshot.messages.is_empty());
}
