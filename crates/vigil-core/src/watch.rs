//! Watch fan-out: broadcast emitted statuses to independent watchers.
//!
//! Each watcher owns a bounded queue. Publishing never waits: a watcher
//! whose queue is full misses that status. Closing drops every sender,
//! which ends each watcher's stream once it has drained what it holds.

use tokio::sync::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

use crate::status::Status;

/// Receiving end of a watch subscription.
pub type Watcher = mpsc::Receiver<Status>;

/// Result of one publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    /// Watchers that missed this status because their queue was full.
    pub dropped: usize,
}

#[derive(Default)]
struct Subscribers {
    senders: Vec<mpsc::Sender<Status>>,
    closed: bool,
}

/// Multiplexes statuses onto any number of watcher queues.
#[derive(Default)]
pub struct Broadcaster {
    inner: RwLock<Subscribers>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new watcher with a queue of `capacity` (at least one).
    ///
    /// After `close()` the returned watcher is already at end of stream.
    pub async fn subscribe(&self, capacity: usize) -> Watcher {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let mut inner = self.inner.write().await;
        if !inner.closed {
            inner.senders.push(tx);
        }
        rx
    }

    /// Offer `status` to every watcher without blocking.
    pub async fn publish(&self, status: &Status) -> Delivery {
        let mut delivery = Delivery::default();
        let mut stale = 0usize;

        {
            let inner = self.inner.read().await;
            for tx in &inner.senders {
                match tx.try_send(status.clone()) {
                    Ok(()) => delivery.delivered += 1,
                    Err(TrySendError::Full(_)) => delivery.dropped += 1,
                    Err(TrySendError::Closed(_)) => stale += 1,
                }
            }
        }

        if delivery.dropped > 0 {
            debug!(dropped = delivery.dropped, "watchers too slow, status dropped");
        }
        if stale > 0 {
            let mut inner = self.inner.write().await;
            inner.senders.retain(|tx| !tx.is_closed());
            debug!(removed = stale, "pruned watchers that went away");
        }

        delivery
    }

    /// Close every watcher. Idempotent; later subscriptions start closed.
    pub async fn close(&self) {
        let mut inner = self.inner.write().await;
        if inner.closed {
            return;
        }
        inner.closed = true;
        let count = inner.senders.len();
        inner.senders.clear();
        debug!(watchers = count, "watchers closed");
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.read().await.closed
    }

    pub async fn subscriber_count(&self) -> usize {
        self.inner.read().await.senders.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::status::ProbeError;

    fn status(name: &str) -> Status {
        Status::builder().with(name, None).finish(Duration::ZERO)
    }

    #[tokio::test]
    async fn every_watcher_gets_every_status() {
        let hub = Broadcaster::new();
        let mut a = hub.subscribe(4).await;
        let mut b = hub.subscribe(4).await;

        let first = status("one");
        let second = Status::builder()
            .with("two", Some(ProbeError::Panic("x".into())))
            .finish(Duration::ZERO);
        hub.publish(&first).await;
        hub.publish(&second).await;

        assert_eq!(a.recv().await.unwrap(), first);
        assert_eq!(a.recv().await.unwrap(), second);
        assert_eq!(b.recv().await.unwrap(), first);
        assert_eq!(b.recv().await.unwrap(), second);
    }

    #[tokio::test]
    async fn full_watcher_drops_without_blocking_others() {
        let hub = Broadcaster::new();
        let mut slow = hub.subscribe(1).await;
        let mut fast = hub.subscribe(8).await;

        for i in 0..5 {
            let d = hub.publish(&status(&format!("s{i}"))).await;
            if i == 0 {
                assert_eq!(d, Delivery { delivered: 2, dropped: 0 });
            } else {
                assert_eq!(d, Delivery { delivered: 1, dropped: 1 });
            }
        }

        let mut fast_seen = 0;
        while fast.try_recv().is_ok() {
            fast_seen += 1;
        }
        assert_eq!(fast_seen, 5);

        assert!(slow.recv().await.unwrap().outcome("s0").is_some());
        assert!(slow.try_recv().is_err());
    }

    #[tokio::test]
    async fn close_ends_every_stream_once() {
        let hub = Broadcaster::new();
        let mut a = hub.subscribe(2).await;
        let mut b = hub.subscribe(2).await;
        hub.publish(&status("last")).await;

        hub.close().await;
        hub.close().await;
        assert!(hub.is_closed().await);

        assert!(a.recv().await.is_some());
        assert!(a.recv().await.is_none());
        assert!(b.recv().await.is_some());
        assert!(b.recv().await.is_none());

        let after = hub.publish(&status("ignored")).await;
        assert_eq!(after, Delivery::default());
    }

    #[tokio::test]
    async fn subscribe_after_close_is_already_closed() {
        let hub = Broadcaster::new();
        hub.close().await;
        let mut late = hub.subscribe(3).await;
        assert!(late.recv().await.is_none());
        assert_eq!(hub.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn dropped_watchers_are_pruned() {
        let hub = Broadcaster::new();
        let gone = hub.subscribe(1).await;
        let _kept = hub.subscribe(1).await;
        drop(gone);

        hub.publish(&status("x")).await;
        assert_eq!(hub.subscriber_count().await, 1);
    }
}
