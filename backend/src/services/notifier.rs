//! In-process event fan-out for the WebSocket stream.
//!
//! Events are serialized once and pushed through a broadcast channel; every
//! WebSocket session holds its own receiver. Lagging or closed receivers
//! drop out on their own, so broadcasting never blocks the pipeline.

use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

pub struct Notifier {
    sender: broadcast::Sender<String>,
    clients: AtomicUsize,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender, clients: AtomicUsize::new(0) }
    }

    /// Broadcast `{event, data}` to all subscribers. Best-effort: an empty
    /// audience is not an error.
    pub fn broadcast(&self, event: &str, data: serde_json::Value) {
        let message = json!({ "event": event, "data": data }).to_string();
        match self.sender.send(message) {
            Ok(receivers) => {
                tracing::debug!("Broadcast '{}' to {} client(s)", event, receivers);
            },
            Err(_) => {
                tracing::debug!("Broadcast '{}' with no connected clients", event);
            },
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    pub fn client_connected(&self) -> usize {
        self.clients.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn client_disconnected(&self) -> usize {
        let previous = self.clients.fetch_sub(1, Ordering::Relaxed);
        previous.saturating_sub(1)
    }

    pub fn client_count(&self) -> usize {
        self.clients.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_to_subscribers() {
        let notifier = Notifier::new();
        let mut receiver = notifier.subscribe();

        notifier.broadcast("incident.created", json!({"incident_id": 1, "severity": "high"}));

        let message = receiver.recv().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&message).unwrap();
        assert_eq!(parsed["event"], "incident.created");
        assert_eq!(parsed["data"]["incident_id"], 1);
    }

    #[test]
    fn broadcast_without_clients_is_fine() {
        let notifier = Notifier::new();
        notifier.broadcast("scan.completed", json!({"tables_scanned": 0, "anomalies_found": 0}));
        assert_eq!(notifier.client_count(), 0);
    }

    #[test]
    fn client_count_tracks_connections() {
        let notifier = Notifier::new();
        assert_eq!(notifier.client_connected(), 1);
        assert_eq!(notifier.client_connected(), 2);
        assert_eq!(notifier.client_disconnected(), 1);
        assert_eq!(notifier.client_count(), 1);
    }
}
