//! Broadcast fan-out
//!
//! The tick loop hands each serialized update to a single-slot queue. A drain
//! task takes it from there and fans it out to every registered connection.
//! If the previous update is still waiting in the slot, the new one is
//! dropped: clients may see stale state, but nothing buffers without bound.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::metrics::Metrics;
use crate::net::connection::{ConnectionHandle, ConnectionId, ConnectionRegistry, Payload};

/// Why a tick update was not accepted for broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("Broadcast queue saturated")]
    Saturated,
    #[error("Broadcast queue closed")]
    Closed,
}

/// Unicast delivery failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("Connection {0} is closed")]
    ConnectionClosed(ConnectionId),
}

/// Result of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Connections the payload was queued for
    pub delivered: usize,
    /// Connections whose outbound queue was full; they stay registered
    pub skipped: usize,
    /// Connections found closed and removed from the registry
    pub removed: usize,
}

/// Fans serialized messages out to registered connections
#[derive(Debug)]
pub struct Broadcaster {
    connections: Arc<ConnectionRegistry>,
    metrics: Arc<Metrics>,
    submit: mpsc::Sender<Payload>,
}

/// Receiving end of the tick handoff, drained by [`BroadcastQueue::spawn`]
#[derive(Debug)]
pub struct BroadcastQueue {
    rx: mpsc::Receiver<Payload>,
}

impl Broadcaster {
    pub fn new(
        connections: Arc<ConnectionRegistry>,
        metrics: Arc<Metrics>,
    ) -> (Arc<Self>, BroadcastQueue) {
        let (submit, rx) = mpsc::channel(1);
        let broadcaster = Arc::new(Self {
            connections,
            metrics,
            submit,
        });
        (broadcaster, BroadcastQueue { rx })
    }

    /// Hand a payload to the drain task without waiting
    pub fn try_submit(&self, payload: Payload) -> Result<(), SubmitError> {
        match self.submit.try_send(payload) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.metrics.broadcasts_dropped.fetch_add(1, Ordering::Relaxed);
                Err(SubmitError::Saturated)
            }
            Err(TrySendError::Closed(_)) => Err(SubmitError::Closed),
        }
    }

    /// Deliver `payload` to every registered connection.
    ///
    /// Connections are snapshotted under the registry lock and written to after
    /// it is released. A closed connection is unregistered and does not affect
    /// delivery to the rest.
    pub fn publish(&self, payload: &Payload) -> PublishReport {
        let mut report = PublishReport::default();

        for handle in self.connections.handles() {
            match handle.outbound().try_send(payload.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    debug!("Outbound queue full for connection {}, skipping", handle.id());
                    report.skipped += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    if let Some(player_id) = self.connections.unregister(handle.id()) {
                        debug!(
                            "Dropped closed connection {} (player {})",
                            handle.id(),
                            player_id
                        );
                        self.metrics.connections_dropped.fetch_add(1, Ordering::Relaxed);
                        report.removed += 1;
                    }
                }
            }
        }

        self.metrics.record_sent(payload.len(), report.delivered as u64);
        self.metrics.broadcasts_published.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .connections_active
            .store(self.connections.len() as u64, Ordering::Relaxed);
        report
    }

    /// Deliver `payload` to one connection, waiting for queue space
    pub async fn send_to(
        &self,
        handle: &ConnectionHandle,
        payload: Payload,
    ) -> Result<(), SendError> {
        let len = payload.len();
        handle
            .outbound()
            .send(payload)
            .await
            .map_err(|_| SendError::ConnectionClosed(handle.id()))?;
        self.metrics.record_sent(len, 1);
        Ok(())
    }
}

impl BroadcastQueue {
    /// Fan out every submitted payload until the submitting side is gone
    pub async fn run(mut self, broadcaster: Arc<Broadcaster>) {
        info!("Broadcast drain started");
        while let Some(payload) = self.rx.recv().await {
            let report = broadcaster.publish(&payload);
            if report.removed > 0 {
                debug!("Broadcast removed {} closed connection(s)", report.removed);
            }
        }
        info!("Broadcast drain stopped");
    }

    pub fn spawn(self, broadcaster: Arc<Broadcaster>) -> JoinHandle<()> {
        tokio::spawn(self.run(broadcaster))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn setup() -> (Arc<ConnectionRegistry>, Arc<Broadcaster>, BroadcastQueue) {
        let connections = Arc::new(ConnectionRegistry::new());
        let (broadcaster, queue) = Broadcaster::new(connections.clone(), Arc::new(Metrics::new()));
        (connections, broadcaster, queue)
    }

    fn payload(text: &str) -> Payload {
        Arc::from(text)
    }

    #[tokio::test]
    async fn test_publish_reaches_every_connection() {
        let (connections, broadcaster, _queue) = setup();
        let (a, mut rx_a) = ConnectionHandle::channel(4);
        let (b, mut rx_b) = ConnectionHandle::channel(4);
        connections.register(&a, "p1".to_string());
        connections.register(&b, "p2".to_string());

        let report = broadcaster.publish(&payload("tick"));

        assert_eq!(report.delivered, 2);
        assert_eq!(&*rx_a.recv().await.unwrap(), "tick");
        assert_eq!(&*rx_b.recv().await.unwrap(), "tick");
    }

    #[tokio::test]
    async fn test_closed_connection_removed_others_still_served() {
        let (connections, broadcaster, _queue) = setup();
        let (alive, mut rx_alive) = ConnectionHandle::channel(4);
        let (dead, rx_dead) = ConnectionHandle::channel(4);
        connections.register(&alive, "p1".to_string());
        connections.register(&dead, "p2".to_string());
        drop(rx_dead);

        let report = broadcaster.publish(&payload("tick"));

        assert_eq!(report, PublishReport { delivered: 1, skipped: 0, removed: 1 });
        assert!(!connections.contains(dead.id()));
        assert!(connections.contains(alive.id()));
        assert_eq!(&*rx_alive.recv().await.unwrap(), "tick");

        let report = broadcaster.publish(&payload("tick2"));
        assert_eq!(report, PublishReport { delivered: 1, skipped: 0, removed: 0 });
    }

    #[tokio::test]
    async fn test_full_queue_skips_without_removal() {
        let (connections, broadcaster, _queue) = setup();
        let (slow, mut rx_slow) = ConnectionHandle::channel(1);
        connections.register(&slow, "p1".to_string());

        broadcaster.publish(&payload("first"));
        let report = broadcaster.publish(&payload("second"));

        assert_eq!(report.skipped, 1);
        assert!(connections.contains(slow.id()));
        assert_eq!(&*rx_slow.recv().await.unwrap(), "first");
    }

    #[tokio::test]
    async fn test_try_submit_drops_when_saturated() {
        let (_connections, broadcaster, _queue) = setup();

        assert_eq!(broadcaster.try_submit(payload("one")), Ok(()));
        assert_eq!(broadcaster.try_submit(payload("two")), Err(SubmitError::Saturated));
        assert_eq!(broadcaster.metrics.broadcasts_dropped.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_try_submit_after_queue_dropped() {
        let (_connections, broadcaster, queue) = setup();
        drop(queue);
        assert_eq!(broadcaster.try_submit(payload("x")), Err(SubmitError::Closed));
    }

    #[tokio::test]
    async fn test_drain_task_fans_out_submissions() {
        let (connections, broadcaster, queue) = setup();
        let (handle, mut rx) = ConnectionHandle::channel(4);
        connections.register(&handle, "p1".to_string());
        let task = queue.spawn(broadcaster.clone());

        tokio_test::assert_ok!(broadcaster.try_submit(payload("update")));

        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&*received, "update");
        task.abort();
    }

    #[tokio::test]
    async fn test_send_to_reports_closed_connection() {
        let (_connections, broadcaster, _queue) = setup();
        let (handle, rx) = ConnectionHandle::channel(4);
        drop(rx);

        let result = broadcaster.send_to(&handle, payload("hello")).await;

        assert_eq!(result, Err(SendError::ConnectionClosed(handle.id())));
    }

    #[tokio::test]
    async fn test_send_to_delivers() {
        let (_connections, broadcaster, _queue) = setup();
        let (handle, mut rx) = ConnectionHandle::channel(4);

        tokio_test::assert_ok!(broadcaster.send_to(&handle, payload("hello")).await);

        assert_eq!(&*rx.recv().await.unwrap(), "hello");
    }
}
