use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Change;

const CHANNEL_CAPACITY: usize = 256;

/// A committed change on one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidation {
    pub service_id: Ulid,
    pub change: Change,
}

/// Broadcast hub for change notifications, one channel per service.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Invalidation>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a service's changes. Creates the channel if needed.
    pub fn subscribe(&self, service_id: Ulid) -> broadcast::Receiver<Invalidation> {
        let sender = self
            .channels
            .entry(service_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, service_id: Ulid, change: &Change) {
        if let Some(sender) = self.channels.get(&service_id) {
            let _ = sender.send(Invalidation {
                service_id,
                change: change.clone(),
            });
        }
    }

    /// Drop a service's channel; subscribers see the stream close.
    pub fn remove(&self, service_id: &Ulid) {
        self.channels.remove(service_id);
    }

    pub fn subscriber_count(&self, service_id: &Ulid) -> usize {
        self.channels
            .get(service_id)
            .map_or(0, |s| s.receiver_count())
    }
}
