//! WebSocket client subscription registry
//!
//! Tracks which connected clients subscribed to which channels, and owns the
//! outbound sender for each client. Mutated only by connect, subscribe,
//! unsubscribe and disconnect events; the telemetry hub just reads
//! membership and writes to senders.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;

/// Outbound frame sender for one connected client
pub type ClientSender = mpsc::UnboundedSender<String>;

struct ClientEntry {
    channels: HashSet<String>,
    sender: ClientSender,
}

/// Channel membership per connected client. All operations are idempotent.
#[derive(Default)]
pub struct SubscriptionRegistry {
    clients: RwLock<HashMap<String, ClientEntry>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly connected client. Replaces any stale entry with the
    /// same id.
    pub fn register(&self, client_id: &str, sender: ClientSender) {
        self.clients.write().insert(
            client_id.to_string(),
            ClientEntry {
                channels: HashSet::new(),
                sender,
            },
        );
    }

    /// Drop a client and all of its subscriptions (disconnect).
    pub fn remove_client(&self, client_id: &str) {
        self.clients.write().remove(client_id);
    }

    /// Subscribe a client to a channel. Subscribing twice has no additional
    /// effect; an unknown client is a no-op.
    pub fn subscribe(&self, client_id: &str, channel: &str) {
        if let Some(entry) = self.clients.write().get_mut(client_id) {
            entry.channels.insert(channel.to_string());
        }
    }

    /// Unsubscribe a client from a channel; never-subscribed is a no-op.
    pub fn unsubscribe(&self, client_id: &str, channel: &str) {
        if let Some(entry) = self.clients.write().get_mut(client_id) {
            entry.channels.remove(channel);
        }
    }

    pub fn subscribers_of(&self, channel: &str) -> Vec<String> {
        self.clients
            .read()
            .iter()
            .filter(|(_, entry)| entry.channels.contains(channel))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Send a frame to one client; false when the client is gone or its
    /// socket task has shut down.
    pub fn send_to(&self, client_id: &str, frame: String) -> bool {
        match self.clients.read().get(client_id) {
            Some(entry) => entry.sender.send(frame).is_ok(),
            None => false,
        }
    }

    /// Deliver a frame to every subscriber of `channel`; returns how many
    /// sends were accepted. A client whose socket task already exited is
    /// skipped, not an error.
    pub fn broadcast(&self, channel: &str, frame: &str) -> usize {
        let clients = self.clients.read();
        clients
            .values()
            .filter(|entry| entry.channels.contains(channel))
            .filter(|entry| entry.sender.send(frame.to_string()).is_ok())
            .count()
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(registry: &SubscriptionRegistry, id: &str) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(id, tx);
        rx
    }

    #[test]
    fn subscribe_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        let _rx = client(&registry, "a");

        registry.subscribe("a", "metrics:update");
        registry.subscribe("a", "metrics:update");

        assert_eq!(registry.subscribers_of("metrics:update"), vec!["a"]);
    }

    #[test]
    fn unsubscribe_of_unknown_channel_is_a_noop() {
        let registry = SubscriptionRegistry::new();
        let _rx = client(&registry, "a");

        registry.unsubscribe("a", "never-subscribed");
        registry.unsubscribe("ghost", "metrics:update");

        assert!(registry.subscribers_of("metrics:update").is_empty());
    }

    #[test]
    fn broadcast_reaches_only_current_subscribers() {
        let registry = SubscriptionRegistry::new();
        let mut a = client(&registry, "a");
        let mut b = client(&registry, "b");

        registry.subscribe("a", "metrics:update");
        registry.subscribe("b", "metrics:update");
        registry.unsubscribe("b", "metrics:update");

        let delivered = registry.broadcast("metrics:update", "frame-1");
        assert_eq!(delivered, 1);
        assert_eq!(a.try_recv().unwrap(), "frame-1");
        assert!(b.try_recv().is_err());
    }

    #[test]
    fn disconnect_removes_all_subscriptions() {
        let registry = SubscriptionRegistry::new();
        let _rx = client(&registry, "a");
        registry.subscribe("a", "metrics:update");

        registry.remove_client("a");

        assert_eq!(registry.client_count(), 0);
        assert_eq!(registry.broadcast("metrics:update", "x"), 0);
    }

    #[test]
    fn closed_receiver_is_skipped_silently() {
        let registry = SubscriptionRegistry::new();
        let rx = client(&registry, "a");
        registry.subscribe("a", "metrics:update");
        drop(rx);

        assert_eq!(registry.broadcast("metrics:update", "x"), 0);
    }
}
