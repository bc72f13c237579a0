use serde::{Deserialize, Serialize};

/// Events sent over the chat gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Sent privately to a connection right after it joins chat
    Welcome { username: String, avatar: String },

    /// A chat line from another participant, already stripped of markup
    ChatMessage {
        message: String,
        username: String,
        avatar: String,
    },
}

/// Commands sent FROM client TO server over the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Say something in chat. Sender name and avatar come from the session,
    /// never from the client.
    ChatMessage { message: String },
}
