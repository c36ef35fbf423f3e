//! Broker client contract and the demo implementation.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tracing::{debug, info};

use super::NetError;

/// Topic carrying serialized statistics windows.
pub const STATS_TOPIC: &str = "bms/esp32/stats";

/// Fire-and-forget publisher. QoS0 semantics: `publish_qos0` returns
/// once the message left the client; no delivery guarantee exists and
/// callers log failures and move on.
pub trait BrokerClient: Send + Sync {
    fn is_connected(&self) -> bool;
    fn publish_qos0(&self, topic: &str, payload: &[u8]) -> Result<(), NetError>;
}

/// Demo broker: validates the URI, then counts what would go out.
pub struct DemoBroker {
    uri: String,
    connected: AtomicBool,
    published: AtomicUsize,
}

impl DemoBroker {
    /// Initialize the client and "connect". Only `mqtt://` URIs are
    /// accepted, matching the transport the node speaks.
    pub fn connect(uri: &str) -> Result<Self, NetError> {
        if !uri.starts_with("mqtt://") {
            return Err(NetError::BadUri(uri.to_string()));
        }
        info!(uri, "broker client started");
        Ok(Self {
            uri: uri.to_string(),
            connected: AtomicBool::new(true),
            published: AtomicUsize::new(0),
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Messages accepted for publishing so far.
    pub fn published(&self) -> usize {
        self.published.load(Ordering::Relaxed)
    }

    /// Drop the link, for tests exercising the failure path.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
    }
}

impl BrokerClient for DemoBroker {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn publish_qos0(&self, topic: &str, payload: &[u8]) -> Result<(), NetError> {
        if !self.is_connected() {
            return Err(NetError::NotConnected);
        }
        self.published.fetch_add(1, Ordering::Relaxed);
        debug!(topic, len = payload.len(), "published qos0");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_mqtt_uri() {
        assert!(matches!(
            DemoBroker::connect("http://nope"),
            Err(NetError::BadUri(_))
        ));
    }

    #[test]
    fn publish_counts_when_connected() {
        let broker = DemoBroker::connect("mqtt://127.0.0.1:1883").unwrap();
        broker.publish_qos0(STATS_TOPIC, b"{}").unwrap();
        broker.publish_qos0(STATS_TOPIC, b"{}").unwrap();
        assert_eq!(broker.published(), 2);
    }

    #[test]
    fn publish_fails_when_disconnected() {
        let broker = DemoBroker::connect("mqtt://127.0.0.1:1883").unwrap();
        broker.disconnect();
        assert!(matches!(
            broker.publish_qos0(STATS_TOPIC, b"{}"),
            Err(NetError::NotConnected)
        ));
        assert_eq!(broker.published(), 0);
    }
}
