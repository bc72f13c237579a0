use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use uuid::Uuid;

use scribe_gateway::connection::handle_connection;
use scribe_gateway::dispatcher::Dispatcher;
use scribe_types::models::SessionIdentity;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn avatar(name: &str) -> String {
    format!("https://gravatar.com/avatar/{}?s=128", name)
}

/// Stands in for session decoding: `?user=<name>` authenticates as that name.
async fn ws_as_user(
    State(dispatcher): State<Dispatcher>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let identity = params.get("user").map(|name| SessionIdentity {
        id: Uuid::new_v4(),
        username: name.clone(),
        avatar: avatar(name),
    });
    ws.on_upgrade(move |socket| handle_connection(socket, dispatcher, identity))
}

async fn start_test_server() -> SocketAddr {
    let router = Router::new()
        .route("/gateway", get(ws_as_user))
        .with_state(Dispatcher::new());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind to random port");
    let addr = listener.local_addr().expect("get local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr, user: Option<&str>) -> Client {
    let url = match user {
        Some(name) => format!("ws://{}/gateway?user={}", addr, name),
        None => format!("ws://{}/gateway", addr),
    };
    let (stream, _response) = connect_async(&url).await.expect("WebSocket connect should succeed");
    stream
}

async fn read_json(client: &mut Client) -> Value {
    let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("should receive message within timeout")
        .expect("stream should not end")
        .expect("message should be ok");

    match msg {
        Message::Text(text) => serde_json::from_str(text.as_str()).expect("should be valid JSON"),
        other => panic!("Expected text message, got: {:?}", other),
    }
}

async fn assert_silent(client: &mut Client) {
    let next = tokio::time::timeout(Duration::from_millis(300), client.next()).await;
    assert!(next.is_err(), "expected no frames, got {:?}", next);
}

async fn say(client: &mut Client, payload: Value) {
    client
        .send(Message::text(payload.to_string()))
        .await
        .expect("send frame");
}

async fn joined(addr: SocketAddr, name: &str) -> Client {
    let mut client = connect(addr, Some(name)).await;
    let welcome = read_json(&mut client).await;
    assert_eq!(welcome["type"], "Welcome");
    assert_eq!(welcome["data"]["username"], name);
    assert_eq!(welcome["data"]["avatar"], avatar(name));
    client
}

#[tokio::test]
async fn chat_reaches_peers_but_not_sender() {
    let addr = start_test_server().await;
    let mut alice = joined(addr, "alice").await;
    let mut bob = joined(addr, "bob").await;
    let mut carol = joined(addr, "carol").await;

    say(&mut alice, json!({"type": "ChatMessage", "data": {"message": "<b>hi</b>"}})).await;

    for peer in [&mut bob, &mut carol] {
        let event = read_json(peer).await;
        assert_eq!(event["type"], "ChatMessage");
        assert_eq!(event["data"]["message"], "hi");
        assert_eq!(event["data"]["username"], "alice");
        assert_eq!(event["data"]["avatar"], avatar("alice"));
    }
    assert_silent(&mut alice).await;
}

#[tokio::test]
async fn client_supplied_identity_is_ignored() {
    let addr = start_test_server().await;
    let mut alice = joined(addr, "alice").await;
    let mut bob = joined(addr, "bob").await;

    say(
        &mut alice,
        json!({"type": "ChatMessage", "data": {"message": "trust me", "username": "admin", "avatar": "evil"}}),
    )
    .await;

    let event = read_json(&mut bob).await;
    assert_eq!(event["data"]["username"], "alice");
    assert_eq!(event["data"]["avatar"], avatar("alice"));
}

#[tokio::test]
async fn malformed_frames_are_skipped() {
    let addr = start_test_server().await;
    let mut alice = joined(addr, "alice").await;
    let mut bob = joined(addr, "bob").await;

    alice.send(Message::text("not json".to_string())).await.unwrap();
    say(&mut alice, json!({"type": "Shout", "data": {}})).await;
    say(&mut alice, json!({"type": "ChatMessage", "data": {"message": "still here"}})).await;

    let event = read_json(&mut bob).await;
    assert_eq!(event["data"]["message"], "still here");
}

#[tokio::test]
async fn anonymous_sockets_stay_open_without_chat() {
    let addr = start_test_server().await;
    let mut anon = connect(addr, None).await;
    let mut alice = joined(addr, "alice").await;

    say(&mut alice, json!({"type": "ChatMessage", "data": {"message": "hello?"}})).await;
    assert_silent(&mut anon).await;

    say(&mut anon, json!({"type": "ChatMessage", "data": {"message": "let me in"}})).await;
    assert_silent(&mut alice).await;
    assert_silent(&mut anon).await;
}

#[tokio::test]
async fn departed_peers_do_not_break_broadcast() {
    let addr = start_test_server().await;
    let mut alice = joined(addr, "alice").await;
    let bob = joined(addr, "bob").await;
    let mut carol = joined(addr, "carol").await;

    drop(bob);
    tokio::time::sleep(Duration::from_millis(100)).await;

    say(&mut alice, json!({"type": "ChatMessage", "data": {"message": "bye bob"}})).await;
    let event = read_json(&mut carol).await;
    assert_eq!(event["data"]["message"], "bye bob");
}
