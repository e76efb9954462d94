use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// A message delivered to channel subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub channel: String,
    pub payload: Value,
}

#[derive(Debug)]
struct Subscriber {
    id: Uuid,
    sender: UnboundedSender<Message>,
}

/// Channel to subscribers, in registration order. A channel exists only while
/// it has at least one subscriber.
#[derive(Debug, Default)]
pub struct Registry {
    channels: HashMap<String, Vec<Subscriber>>,
}

impl Registry {
    pub fn subscribe(&mut self, channel: &str, id: Uuid, sender: UnboundedSender<Message>) {
        let subscribers = self.channels.entry(channel.to_string()).or_default();
        if subscribers.iter().any(|s| s.id == id) {
            return;
        }
        subscribers.push(Subscriber { id, sender });
    }

    pub fn unsubscribe(&mut self, channel: &str, id: Uuid) -> bool {
        let Some(subscribers) = self.channels.get_mut(channel) else {
            return false;
        };

        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        let removed = subscribers.len() != before;

        if subscribers.is_empty() {
            self.channels.remove(channel);
        }
        removed
    }

    /// Delivers `payload` to every current subscriber and returns how many
    /// there were. Nothing is retained for later subscribers.
    pub fn publish(&self, channel: &str, payload: &Value) -> usize {
        let Some(subscribers) = self.channels.get(channel) else {
            return 0;
        };

        for subscriber in subscribers {
            // A closed receiver means the connection is going away and will
            // unsubscribe itself.
            let _ = subscriber.sender.send(Message {
                channel: channel.to_string(),
                payload: payload.clone(),
            });
        }
        subscribers.len()
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels.get(channel).map(Vec::len).unwrap_or(0)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
