//! Fan-out of notifications to every connected listener.
//!
//! Each subscriber is a bounded `mpsc` channel of encoded text frames. A
//! broadcast encodes once, snapshots the subscriber set, and `try_send`s
//! to every handle; handles that are closed or full are unregistered after
//! the sweep. Nothing is queued for listeners that connect later.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use gamecast_core::types::Notification;
use gamecast_core::wire::{WireError, encode_notification};
use tokio::sync::{RwLock, mpsc};

pub type SubscriberId = u64;

/// Default per-subscriber buffer, in frames.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 16;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub evicted: Vec<SubscriberId>,
}

pub struct BroadcastHub {
    subscribers: RwLock<HashMap<SubscriberId, mpsc::Sender<String>>>,
    next_id: AtomicU64,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> SubscriberId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Allocate an id, register a fresh channel, and hand back its receiver.
    pub async fn subscribe(&self, capacity: usize) -> (SubscriberId, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.next_id();
        self.register(id, tx).await;
        (id, rx)
    }

    /// Add a handle. Registering an id that is already present keeps the
    /// existing handle and returns `false`.
    pub async fn register(&self, id: SubscriberId, tx: mpsc::Sender<String>) -> bool {
        let mut subs = self.subscribers.write().await;
        if subs.contains_key(&id) {
            return false;
        }
        subs.insert(id, tx);
        tracing::debug!(id, subscribers = subs.len(), "hub: subscriber registered");
        true
    }

    /// Remove a handle. Absent ids are ignored.
    pub async fn unregister(&self, id: SubscriberId) -> bool {
        let mut subs = self.subscribers.write().await;
        let removed = subs.remove(&id).is_some();
        if removed {
            tracing::debug!(id, subscribers = subs.len(), "hub: subscriber removed");
        }
        removed
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    pub async fn broadcast(&self, notification: &Notification) -> Result<BroadcastReport, WireError> {
        let targets: Vec<(SubscriberId, mpsc::Sender<String>)> = {
            let subs = self.subscribers.read().await;
            subs.iter().map(|(id, tx)| (*id, tx.clone())).collect()
        };

        if targets.is_empty() {
            tracing::info!("hub: no subscribers, notification dropped");
            return Ok(BroadcastReport::default());
        }

        let frame = encode_notification(notification)?;
        let mut report = BroadcastReport::default();

        for (id, tx) in targets {
            match tx.try_send(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(id, "hub: subscriber buffer full, evicting");
                    report.evicted.push(id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!(id, "hub: subscriber gone, evicting");
                    report.evicted.push(id);
                }
            }
        }

        for id in &report.evicted {
            self.unregister(*id).await;
        }

        tracing::info!(
            delivered = report.delivered,
            evicted = report.evicted.len(),
            "hub: broadcast complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gamecast_core::wire::{Inbound, decode_message};

    fn notification() -> Notification {
        Notification {
            text: "gg".into(),
            audio: vec![9, 8, 7],
            voice: "onyx".into(),
        }
    }

    #[tokio::test]
    async fn register_and_unregister_are_idempotent() {
        let hub = BroadcastHub::new();
        let (tx, _rx) = mpsc::channel(1);
        let id = hub.next_id();
        assert!(hub.register(id, tx.clone()).await);
        assert!(!hub.register(id, tx).await);
        assert_eq!(hub.subscriber_count().await, 1);

        assert!(hub.unregister(id).await);
        assert!(!hub.unregister(id).await);
        assert!(!hub.unregister(999).await);
        assert_eq!(hub.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn broadcast_without_subscribers_is_silent() {
        let hub = BroadcastHub::new();
        let report = hub.broadcast(&notification()).await.unwrap();
        assert_eq!(report, BroadcastReport::default());

        // A late subscriber never sees the earlier notification.
        let (_id, mut rx) = hub.subscribe(4).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn every_subscriber_gets_the_same_frame() {
        let hub = BroadcastHub::new();
        let (_a, mut rx_a) = hub.subscribe(4).await;
        let (_b, mut rx_b) = hub.subscribe(4).await;

        let report = hub.broadcast(&notification()).await.unwrap();
        assert_eq!(report.delivered, 2);

        let frame_a = rx_a.recv().await.unwrap();
        let frame_b = rx_b.recv().await.unwrap();
        assert_eq!(frame_a, frame_b);
        assert_eq!(
            decode_message(&frame_a).unwrap(),
            Inbound::Notification(notification())
        );
    }

    #[tokio::test]
    async fn failed_handles_are_evicted_without_blocking_others() {
        let hub = BroadcastHub::new();
        let (gone, rx_gone) = hub.subscribe(4).await;
        drop(rx_gone);
        let (full, _rx_full) = hub.subscribe(1).await;
        let (_ok, mut rx_ok) = hub.subscribe(4).await;

        // Fill the slow subscriber's single slot.
        hub.broadcast(&notification()).await.unwrap();
        rx_ok.recv().await.unwrap();

        let report = hub.broadcast(&notification()).await.unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.evicted, vec![full]);
        assert!(rx_ok.recv().await.is_some());
        assert_eq!(hub.subscriber_count().await, 1);
        assert!(!hub.unregister(gone).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn churn_during_broadcast_neither_blocks_nor_leaks() {
        use std::sync::Arc;
        use std::time::Duration;

        const ROUNDS: usize = 200;
        let hub = Arc::new(BroadcastHub::new());
        let (_stable, mut stable_rx) = hub.subscribe(ROUNDS + 1).await;

        let broadcaster = {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move {
                for _ in 0..ROUNDS {
                    hub.broadcast(&notification()).await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };
        let churners: Vec<_> = (0..4)
            .map(|_| {
                let hub = Arc::clone(&hub);
                tokio::spawn(async move {
                    let mut removed = Vec::new();
                    for _ in 0..50 {
                        let (id, rx) = hub.subscribe(ROUNDS + 1).await;
                        tokio::task::yield_now().await;
                        assert!(hub.unregister(id).await);
                        removed.push(rx);
                    }
                    removed
                })
            })
            .collect();

        let mut removed = tokio::time::timeout(Duration::from_secs(10), async {
            broadcaster.await.unwrap();
            let mut removed = Vec::new();
            for churner in churners {
                removed.extend(churner.await.unwrap());
            }
            removed
        })
        .await
        .expect("hub deadlocked under churn");

        for rx in &mut removed {
            while rx.try_recv().is_ok() {}
        }
        let report = hub.broadcast(&notification()).await.unwrap();
        assert_eq!(report.delivered, 1);
        for rx in &mut removed {
            assert!(rx.try_recv().is_err());
        }
        assert_eq!(hub.subscriber_count().await, 1);

        let mut frames = 0;
        while stable_rx.try_recv().is_ok() {
            frames += 1;
        }
        assert_eq!(frames, ROUNDS + 1);
    }
}
