//! Broadcast groups and the WebSocket chat consumer.
//!
//! A [`GroupLayer`] keeps one `tokio::sync::broadcast` channel per group name.
//! Every connection that joins a group gets its own receiver; anything sent to
//! the group is delivered to all current members, sender included. Delivery is
//! best effort: a member that falls more than `capacity` messages behind skips
//! the messages it missed.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const GROUP_MESSAGE: &str = "group.message";

/// Event published to a group. `kind` names the handler, `content` is relayed verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: Value,
}

impl GroupEvent {
    pub fn message(content: Value) -> Self {
        Self {
            kind: GROUP_MESSAGE.to_string(),
            content,
        }
    }
}

#[derive(Debug)]
pub struct GroupLayer {
    capacity: usize,
    groups: RwLock<HashMap<String, broadcast::Sender<GroupEvent>>>,
}

impl GroupLayer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            groups: RwLock::new(HashMap::new()),
        }
    }

    /// Join `group`, creating it on first use.
    pub fn group_add(&self, group: &str) -> broadcast::Receiver<GroupEvent> {
        let mut groups = self.groups.write().unwrap_or_else(|e| e.into_inner());
        groups
            .entry(group.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Publish to every current member. Returns how many members it reached.
    pub fn group_send(&self, group: &str, event: GroupEvent) -> usize {
        let groups = self.groups.read().unwrap_or_else(|e| e.into_inner());
        match groups.get(group) {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        }
    }

    /// Leave `group`. The group is dropped once its last member is gone.
    pub fn group_discard(&self, group: &str, receiver: broadcast::Receiver<GroupEvent>) {
        drop(receiver);
        let mut groups = self.groups.write().unwrap_or_else(|e| e.into_inner());
        if groups
            .get(group)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            groups.remove(group);
            debug!(group, "group discarded");
        }
    }

    pub fn member_count(&self, group: &str) -> usize {
        let groups = self.groups.read().unwrap_or_else(|e| e.into_inner());
        groups.get(group).map_or(0, |s| s.receiver_count())
    }
}

/// Shared state of the chat endpoint.
#[derive(Debug, Clone)]
pub struct ChatState {
    pub layer: Arc<GroupLayer>,
    pub group: String,
}

/// `GET /chat/`: upgrade and join the chat group.
pub async fn chat_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<ChatState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_consumer(socket, state, params))
}

async fn run_consumer(socket: WebSocket, state: ChatState, params: HashMap<String, String>) {
    let connection = Uuid::new_v4();
    let mut receiver = state.layer.group_add(&state.group);
    metrics::gauge!("sale_chat_connections").increment(1.0);
    info!(%connection, group = %state.group, ?params, "chat connected");

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<Value>(&text) {
                    Ok(content) => {
                        let reached = state.layer.group_send(&state.group, GroupEvent::message(content));
                        metrics::counter!("sale_chat_messages_total").increment(1);
                        debug!(%connection, reached, "relayed chat message");
                    }
                    Err(e) => warn!(%connection, error = %e, "dropping non-JSON chat frame"),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(%connection, error = %e, "chat socket error");
                    break;
                }
            },
            event = receiver.recv() => match event {
                Ok(event) if event.kind == GROUP_MESSAGE => {
                    if sink.send(Message::Text(event.content.to_string())).await.is_err() {
                        break;
                    }
                }
                Ok(event) => debug!(%connection, kind = %event.kind, "ignoring group event"),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%connection, skipped, "chat receiver lagged, messages dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    state.layer.group_discard(&state.group, receiver);
    metrics::gauge!("sale_chat_connections").decrement(1.0);
    info!(%connection, group = %state.group, "chat disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn every_member_receives_group_messages() {
        let layer = GroupLayer::new(16);
        let mut first = layer.group_add("chat");
        let mut second = layer.group_add("chat");

        let reached = layer.group_send("chat", GroupEvent::message(json!({"text": "hi"})));
        assert_eq!(reached, 2);

        for receiver in [&mut first, &mut second] {
            let event = receiver.recv().await.unwrap();
            assert_eq!(event.kind, GROUP_MESSAGE);
            assert_eq!(event.content, json!({"text": "hi"}));
        }
    }

    #[test]
    fn groups_are_isolated() {
        let layer = GroupLayer::new(4);
        let mut chat = layer.group_add("chat");
        let _other = layer.group_add("other");

        assert_eq!(layer.group_send("other", GroupEvent::message(json!(1))), 1);
        assert!(chat.try_recv().is_err());
        assert_eq!(layer.group_send("missing", GroupEvent::message(json!(1))), 0);
    }

    #[test]
    fn discarding_the_last_member_drops_the_group() {
        let layer = GroupLayer::new(4);
        let a = layer.group_add("chat");
        let b = layer.group_add("chat");
        assert_eq!(layer.member_count("chat"), 2);

        layer.group_discard("chat", a);
        assert_eq!(layer.member_count("chat"), 1);
        layer.group_discard("chat", b);
        assert_eq!(layer.member_count("chat"), 0);
        assert_eq!(layer.group_send("chat", GroupEvent::message(json!(null))), 0);
    }

    #[tokio::test]
    async fn slow_members_skip_lost_messages() {
        let layer = GroupLayer::new(2);
        let mut slow = layer.group_add("chat");
        for i in 0..4 {
            layer.group_send("chat", GroupEvent::message(json!(i)));
        }
        assert!(matches!(slow.recv().await, Err(RecvError::Lagged(2))));
        assert_eq!(slow.recv().await.unwrap().content, json!(2));
    }

    #[test]
    fn group_event_serializes_with_type_key() {
        let event = GroupEvent::message(json!({"a": 1}));
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "group.message", "content": {"a": 1}})
        );
    }
}
