use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// Minimal event envelope (RFC3339 time).
///
/// `kind` is one of the `odr_topics` constants; `payload` is whatever the
/// publisher serialized for that kind. Consumers that only care about one
/// kind filter on it after `recv`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Envelope {
    pub time: String,
    pub kind: String,
    pub payload: Value,
}

/// A lossy broadcast bus for JSON-serializable lifecycle events.
///
/// Slow subscribers miss events rather than back-pressuring the registry;
/// the bus is an observation surface, not a delivery guarantee.
#[derive(Clone)]
pub struct Bus {
    tx: broadcast::Sender<Envelope>,
}

impl Bus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    /// Number of live subscribers; events published with none are dropped.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn publish<T: Serialize>(&self, kind: &str, payload: &T) {
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let val =
            serde_json::to_value(payload).unwrap_or_else(|_| serde_json::json!({"_ser":"error"}));
        let _ = self.tx.send(Envelope {
            time: now,
            kind: kind.to_string(),
            payload: val,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn publish_reaches_subscriber_with_kind_and_payload() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        bus.publish("resource.download.progress", &json!({"tag": "Chapter1"}));
        let env = rx.recv().await.expect("envelope");
        assert_eq!(env.kind, "resource.download.progress");
        assert_eq!(
            env.payload.get("tag").and_then(Value::as_str),
            Some("Chapter1")
        );
        assert!(!env.time.is_empty());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_silent() {
        let bus = Bus::new(8);
        assert_eq!(bus.receiver_count(), 0);
        bus.publish("resource.records.changed", &json!({"count": 0}));
    }
}
