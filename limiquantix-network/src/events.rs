//! Network change notifications.
//!
//! Provides an in-process bus for "network changed" events with:
//! - Live fan-out to subscribers via a tokio broadcast channel
//! - A bounded ring buffer of recent events for late readers

use std::collections::VecDeque;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::traits::ChangeNotifier;

/// Maximum number of events kept in memory.
const DEFAULT_CAPACITY: usize = 256;

/// A single network change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEvent {
    /// Unique event ID (UUID)
    pub id: String,
    /// Event timestamp
    pub timestamp: DateTime<Utc>,
    /// Change namespace (e.g. "nuagenetwork")
    pub namespace: String,
    /// "created", "updated" or "deleted"
    pub change: String,
    /// Affected network name
    pub network: String,
}

impl NetworkEvent {
    pub fn new(
        namespace: impl Into<String>,
        change: impl Into<String>,
        network: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            namespace: namespace.into(),
            change: change.into(),
            network: network.into(),
        }
    }
}

/// Broadcast bus implementing [`ChangeNotifier`].
pub struct EventBus {
    sender: broadcast::Sender<NetworkEvent>,
    recent: RwLock<VecDeque<NetworkEvent>>,
    capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            recent: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<NetworkEvent> {
        self.sender.subscribe()
    }

    /// Recent events, oldest first.
    pub fn recent(&self) -> Vec<NetworkEvent> {
        match self.recent.read() {
            Ok(recent) => recent.iter().cloned().collect(),
            Err(_) => {
                warn!("Event buffer lock poisoned");
                Vec::new()
            }
        }
    }

    fn publish(&self, event: NetworkEvent) {
        debug!(
            namespace = %event.namespace,
            change = %event.change,
            network = %event.network,
            "Publishing network change"
        );

        if let Ok(mut recent) = self.recent.write() {
            if recent.len() == self.capacity {
                recent.pop_front();
            }
            recent.push_back(event.clone());
        }

        // No subscribers is not an error
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotifier for EventBus {
    fn push_change(&self, namespace: &str, change: &str, network: &str) {
        self.publish(NetworkEvent::new(namespace, change, network));
    }
}
