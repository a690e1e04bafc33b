//! In-process change bus.

use std::sync::Mutex;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::bus::{ChangeBus, Subscription};

#[derive(Debug, Error)]
pub enum InMemoryBusError {
    /// Publish failed due to internal lock poisoning.
    #[error("change bus lock poisoned")]
    Poisoned,
}

/// In-memory pub/sub bus.
///
/// - No IO; `publish` never blocks on subscribers
/// - Fan-out over unbounded Tokio channels
/// - Dead subscribers are dropped while publishing
#[derive(Debug)]
pub struct InMemoryChangeBus<M> {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<M>>>,
}

impl<M> InMemoryChangeBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscribers as of the last publish/subscribe.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .map(|subs| subs.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

impl<M> Default for InMemoryChangeBus<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<M> ChangeBus<M> for InMemoryChangeBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut subs = self.subscribers.lock().map_err(|_| InMemoryBusError::Poisoned)?;

        // Drop any dead subscribers while publishing.
        subs.retain(|tx| tx.send(message.clone()).is_ok());

        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::unbounded_channel();

        // If the lock is poisoned, we still return a subscription;
        // it just won't receive messages.
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }

        Subscription::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_gets_a_copy() {
        let bus = InMemoryChangeBus::<u32>::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(1).unwrap();
        bus.publish(2).unwrap();

        assert_eq!(a.drain(), vec![1, 2]);
        assert_eq!(b.drain(), vec![1, 2]);
    }

    #[test]
    fn late_subscriber_misses_earlier_messages() {
        let bus = InMemoryChangeBus::<u32>::new();
        bus.publish(1).unwrap();

        let mut late = bus.subscribe();
        bus.publish(2).unwrap();

        assert_eq!(late.drain(), vec![2]);
    }

    #[test]
    fn dropped_subscription_is_pruned() {
        let bus = InMemoryChangeBus::<u32>::new();
        let keep = bus.subscribe();
        let gone = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(gone);
        bus.publish(7).unwrap();

        assert_eq!(bus.subscriber_count(), 1);
        drop(keep);
    }

    #[tokio::test]
    async fn recv_waits_for_publish() {
        let bus = std::sync::Arc::new(InMemoryChangeBus::<&'static str>::new());
        let mut sub = bus.subscribe();

        let publisher = bus.clone();
        tokio::spawn(async move {
            publisher.publish("hello").unwrap();
        });

        assert_eq!(sub.recv().await, Some("hello"));
    }
}
