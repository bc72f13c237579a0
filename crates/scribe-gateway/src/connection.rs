use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use scribe_types::events::GatewayCommand;
use scribe_types::models::SessionIdentity;

use crate::dispatcher::Dispatcher;

/// Drive one websocket. The identity was resolved once at the HTTP upgrade
/// and is trusted for the lifetime of the socket.
///
/// Anonymous sockets are kept open but never join chat.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, identity: Option<SessionIdentity>) {
    match identity {
        Some(identity) => run_chat(socket, dispatcher, identity).await,
        None => idle_anonymous(socket).await,
    }
}

async fn idle_anonymous(mut socket: WebSocket) {
    debug!("Anonymous gateway connection, chat disabled");

    while let Some(Ok(msg)) = socket.recv().await {
        if let Message::Close(_) = msg {
            break;
        }
    }

    debug!("Anonymous gateway connection closed");
}

async fn run_chat(socket: WebSocket, dispatcher: Dispatcher, identity: SessionIdentity) {
    let (mut sender, mut receiver) = socket.split();

    let username = identity.username.clone();
    let user_id = identity.id;
    let mut channel = dispatcher.connect(identity).await;
    let conn_id = channel.conn_id();

    info!("{} ({}) joined chat [conn={}]", username, user_id, conn_id);

    // Hub -> client
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = channel.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to encode gateway event: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Client -> hub
    let recv_dispatcher = dispatcher.clone();
    let recv_username = username.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(text.as_str()) {
                    Ok(cmd) => recv_dispatcher.on_message(conn_id, cmd).await,
                    Err(e) => {
                        let raw: String = text.as_str().chars().take(200).collect();
                        warn!("{} ({}) bad command: {} -- raw: {}", recv_username, user_id, e, raw);
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.disconnect(conn_id).await;
    info!("{} ({}) disconnected from gateway", username, user_id);
}
