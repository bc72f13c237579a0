use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use scribe_markup::strip_all;
use scribe_types::events::{GatewayCommand, GatewayEvent};
use scribe_types::models::SessionIdentity;

/// A broadcast event tagged with the connection that caused it.
#[derive(Debug, Clone)]
struct Envelope {
    origin: Uuid,
    event: GatewayEvent,
}

struct Participant {
    identity: SessionIdentity,
    direct_tx: mpsc::UnboundedSender<GatewayEvent>,
}

/// The shared chat hub. Every authenticated connection joins through
/// `connect` and leaves through `disconnect`.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Chat fan-out. A single queue keeps each sender's messages in order.
    broadcast_tx: broadcast::Sender<Envelope>,

    /// conn_id -> identity captured at connect time + private channel
    participants: RwLock<HashMap<Uuid, Participant>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                participants: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Join chat as `identity`. The connection is sent a private `Welcome`
    /// and from then on receives every chat line except its own.
    pub async fn connect(&self, identity: SessionIdentity) -> ChatChannel {
        let conn_id = Uuid::new_v4();
        let (direct_tx, direct_rx) = mpsc::unbounded_channel();
        let broadcast_rx = self.inner.broadcast_tx.subscribe();

        let welcome = GatewayEvent::Welcome {
            username: identity.username.clone(),
            avatar: identity.avatar.clone(),
        };

        self.inner
            .participants
            .write()
            .await
            .insert(conn_id, Participant { identity, direct_tx });
        self.emit(conn_id, welcome).await;

        ChatChannel {
            conn_id,
            broadcast_rx,
            direct_rx,
        }
    }

    /// Handle a command from `conn_id`. The sender's name and avatar always
    /// come from the identity stored at connect time.
    pub async fn on_message(&self, conn_id: Uuid, command: GatewayCommand) {
        let identity = {
            let participants = self.inner.participants.read().await;
            match participants.get(&conn_id) {
                Some(participant) => participant.identity.clone(),
                None => {
                    debug!("Dropping command from departed connection {}", conn_id);
                    return;
                }
            }
        };

        match command {
            GatewayCommand::ChatMessage { message } => {
                let message = strip_all(&message);
                if message.trim().is_empty() {
                    debug!("{} sent an empty chat message", identity.username);
                    return;
                }

                self.broadcast_except(
                    conn_id,
                    GatewayEvent::ChatMessage {
                        message,
                        username: identity.username,
                        avatar: identity.avatar,
                    },
                );
            }
        }
    }

    /// Send an event to one connection only. A closed connection is ignored.
    pub async fn emit(&self, conn_id: Uuid, event: GatewayEvent) {
        let participants = self.inner.participants.read().await;
        if let Some(participant) = participants.get(&conn_id) {
            let _ = participant.direct_tx.send(event);
        }
    }

    /// Fire-and-forget delivery to every connection except `origin`.
    pub fn broadcast_except(&self, origin: Uuid, event: GatewayEvent) {
        // No receivers is not an error: nobody else is in chat.
        let _ = self.inner.broadcast_tx.send(Envelope { origin, event });
    }

    pub async fn disconnect(&self, conn_id: Uuid) {
        if let Some(participant) = self.inner.participants.write().await.remove(&conn_id) {
            info!("{} left chat ({})", participant.identity.username, conn_id);
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.participants.read().await.len()
    }
}

/// One connection's view of the hub.
pub struct ChatChannel {
    conn_id: Uuid,
    broadcast_rx: broadcast::Receiver<Envelope>,
    direct_rx: mpsc::UnboundedReceiver<GatewayEvent>,
}

impl ChatChannel {
    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    /// Next event for this connection. Private events are delivered before
    /// queued broadcasts. Returns `None` once the connection has been
    /// disconnected from the hub.
    pub async fn recv(&mut self) -> Option<GatewayEvent> {
        loop {
            tokio::select! {
                biased;

                direct = self.direct_rx.recv() => return direct,

                result = self.broadcast_rx.recv() => match result {
                    Ok(envelope) if envelope.origin == self.conn_id => continue,
                    Ok(envelope) => return Some(envelope.event),
                    Err(RecvError::Lagged(n)) => {
                        warn!("Chat receiver {} lagged by {} messages", self.conn_id, n);
                        continue;
                    }
                    Err(RecvError::Closed) => return None,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn identity(name: &str) -> SessionIdentity {
        SessionIdentity {
            id: Uuid::new_v4(),
            username: name.to_string(),
            avatar: format!("https://gravatar.com/avatar/{}?s=128", name),
        }
    }

    fn say(text: &str) -> GatewayCommand {
        GatewayCommand::ChatMessage {
            message: text.to_string(),
        }
    }

    async fn next(channel: &mut ChatChannel) -> GatewayEvent {
        tokio::time::timeout(Duration::from_secs(1), channel.recv())
            .await
            .expect("event within timeout")
            .expect("channel open")
    }

    async fn nothing_pending(channel: &mut ChatChannel) -> bool {
        tokio::time::timeout(Duration::from_millis(50), channel.recv())
            .await
            .is_err()
    }

    #[tokio::test]
    async fn welcome_is_private_and_first() {
        let hub = Dispatcher::new();
        let mut alice = hub.connect(identity("alice")).await;
        let mut bob = hub.connect(identity("bob")).await;

        assert_eq!(
            next(&mut alice).await,
            GatewayEvent::Welcome {
                username: "alice".into(),
                avatar: "https://gravatar.com/avatar/alice?s=128".into(),
            }
        );
        assert!(matches!(next(&mut bob).await, GatewayEvent::Welcome { username, .. } if username == "bob"));
        assert!(nothing_pending(&mut alice).await);
    }

    #[tokio::test]
    async fn chat_is_stripped_and_never_echoed() {
        let hub = Dispatcher::new();
        let mut alice = hub.connect(identity("alice")).await;
        let mut bob = hub.connect(identity("bob")).await;
        let mut carol = hub.connect(identity("carol")).await;
        next(&mut alice).await;
        next(&mut bob).await;
        next(&mut carol).await;

        hub.on_message(alice.conn_id(), say("<b>hi</b>")).await;

        let expected = GatewayEvent::ChatMessage {
            message: "hi".into(),
            username: "alice".into(),
            avatar: "https://gravatar.com/avatar/alice?s=128".into(),
        };
        assert_eq!(next(&mut bob).await, expected);
        assert_eq!(next(&mut carol).await, expected);
        assert!(nothing_pending(&mut alice).await);
    }

    #[tokio::test]
    async fn empty_messages_are_dropped() {
        let hub = Dispatcher::new();
        let alice = hub.connect(identity("alice")).await;
        let mut bob = hub.connect(identity("bob")).await;
        next(&mut bob).await;

        hub.on_message(alice.conn_id(), say("<script>alert(1)</script>")).await;
        hub.on_message(alice.conn_id(), say("   ")).await;
        assert!(nothing_pending(&mut bob).await);
    }

    #[tokio::test]
    async fn per_sender_order_is_preserved() {
        let hub = Dispatcher::new();
        let alice = hub.connect(identity("alice")).await;
        let mut bob = hub.connect(identity("bob")).await;
        next(&mut bob).await;

        for i in 0..20 {
            hub.on_message(alice.conn_id(), say(&format!("line {}", i))).await;
        }
        for i in 0..20 {
            match next(&mut bob).await {
                GatewayEvent::ChatMessage { message, .. } => assert_eq!(message, format!("line {}", i)),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn late_joiners_get_no_replay() {
        let hub = Dispatcher::new();
        let alice = hub.connect(identity("alice")).await;
        hub.on_message(alice.conn_id(), say("anyone here?")).await;

        let mut bob = hub.connect(identity("bob")).await;
        assert!(matches!(next(&mut bob).await, GatewayEvent::Welcome { .. }));
        assert!(nothing_pending(&mut bob).await);
    }

    #[tokio::test]
    async fn disconnect_removes_participant() {
        let hub = Dispatcher::new();
        let mut alice = hub.connect(identity("alice")).await;
        let bob = hub.connect(identity("bob")).await;
        next(&mut alice).await;
        assert_eq!(hub.connection_count().await, 2);

        hub.disconnect(bob.conn_id()).await;
        assert_eq!(hub.connection_count().await, 1);

        // Commands from a departed connection go nowhere.
        hub.on_message(bob.conn_id(), say("ghost")).await;
        assert!(nothing_pending(&mut alice).await);

        hub.disconnect(alice.conn_id()).await;
        assert!(alice.recv().await.is_none());
    }
}
