// In-process pub/sub bus for command-set notices.
//
// Each subscriber gets its own bounded mpsc queue. Delivery is
// fire-and-forget and at-most-once: publishing never blocks the mutating
// operation, and a notice that finds a full queue is dropped (logged, not
// retried). A missed eviction notice means a briefly stale command-set
// snapshot, which the evaluation path tolerates.

use crate::core::commands::{CommandNotice, NoticePublisher};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

/// Default size for each subscriber's queue.
const DEFAULT_BUFFER_SIZE: usize = 1024;

pub struct EventBus {
    subscribers: Mutex<Vec<mpsc::Sender<CommandNotice>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Returns a receiver on which notices will be delivered.
    pub fn subscribe(&self, buffer_size: Option<usize>) -> mpsc::Receiver<CommandNotice> {
        let size = buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let (tx, rx) = mpsc::channel(size);
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    fn broadcast(&self, notice: CommandNotice) {
        let mut subs = self.subscribers.lock().unwrap();
        subs.retain(|tx| match tx.try_send(notice.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(?notice, "subscriber queue full, dropping notice");
                true
            }
            // Receiver dropped; forget the subscriber.
            Err(TrySendError::Closed(_)) => false,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NoticePublisher for EventBus {
    fn publish(&self, notice: CommandNotice) {
        self.broadcast(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_notices() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe(Some(5));
        let mut rx2 = bus.subscribe(Some(5));

        bus.publish(CommandNotice::SetChanged { guild_id: 1 });

        assert_eq!(
            rx1.recv().await.unwrap(),
            CommandNotice::SetChanged { guild_id: 1 }
        );
        assert_eq!(
            rx2.recv().await.unwrap(),
            CommandNotice::SetChanged { guild_id: 1 }
        );
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_no_op() {
        let bus = EventBus::new();
        bus.publish(CommandNotice::SetChanged { guild_id: 1 });
    }

    #[tokio::test]
    async fn full_queue_drops_the_notice_instead_of_blocking() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(Some(1));

        bus.publish(CommandNotice::SetChanged { guild_id: 1 });
        // Queue is full; this one is dropped, and publish returns immediately.
        bus.publish(CommandNotice::SetChanged { guild_id: 2 });

        assert_eq!(
            rx.recv().await.unwrap(),
            CommandNotice::SetChanged { guild_id: 1 }
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe(Some(5));
        drop(rx);

        bus.publish(CommandNotice::RunRequested {
            guild_id: 1,
            local_id: 2,
        });
        assert!(bus.subscribers.lock().unwrap().is_empty());
    }
}
