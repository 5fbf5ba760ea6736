//! Topic-based fan-out bus for price updates
//!
//! Every subscriber of a topic receives every message published to it after
//! the subscription was made (no backlog for late joiners). Slow subscribers
//! that fall more than `capacity` messages behind observe
//! [`BusError::Lagged`] and continue from the oldest retained message.

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
#![deny(clippy::cargo)]
#![deny(dead_code)]
#![deny(unused)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Trait for messages that can be sent through the bus
pub trait Message: Clone + Send + Sync + 'static {}

/// Bus errors
#[derive(Debug, Error)]
pub enum BusError {
    /// Every sender for the topic is gone
    #[error("topic `{topic}` is closed")]
    Closed {
        /// Topic name
        topic: String,
    },

    /// The receiver fell behind and messages were overwritten
    #[error("receiver lagged behind, {skipped} messages skipped")]
    Lagged {
        /// Number of messages lost
        skipped: u64,
    },

    /// The transport refused the message
    #[error("publish rejected: {0}")]
    Rejected(String),
}

/// Result type for bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Publisher trait for sending messages
pub trait Publisher<T: Message>: Send + Sync {
    /// Publish a message, returning how many subscribers it reached
    ///
    /// # Errors
    /// Returns an error if the transport rejects the message
    fn publish(&self, msg: T) -> BusResult<usize>;
}

/// Subscriber trait for receiving messages
pub trait Subscriber<T: Message>: Send + Sync {
    /// Subscribe to receive messages published from now on
    fn subscribe(&self) -> Receiver<T>;
}

/// Receiver for messages from one topic
pub struct Receiver<T> {
    topic: String,
    rx: broadcast::Receiver<T>,
}

impl<T: Message> Receiver<T> {
    /// Wait for the next message
    ///
    /// # Errors
    /// `BusError::Lagged` if messages were dropped before this receiver could
    /// read them (the next call resumes with the oldest retained message), or
    /// `BusError::Closed` once the topic can produce no more messages.
    pub async fn recv(&mut self) -> BusResult<T> {
        match self.rx.recv().await {
            Ok(msg) => Ok(msg),
            Err(broadcast::error::RecvError::Lagged(skipped)) => Err(BusError::Lagged { skipped }),
            Err(broadcast::error::RecvError::Closed) => Err(BusError::Closed {
                topic: self.topic.clone(),
            }),
        }
    }

    /// Try to receive a message without waiting
    ///
    /// # Errors
    /// Same as [`Receiver::recv`]
    pub fn try_recv(&mut self) -> BusResult<Option<T>> {
        match self.rx.try_recv() {
            Ok(msg) => Ok(Some(msg)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                Err(BusError::Lagged { skipped })
            }
            Err(broadcast::error::TryRecvError::Closed) => Err(BusError::Closed {
                topic: self.topic.clone(),
            }),
        }
    }

    /// Topic this receiver listens on
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// Multi-topic broadcast bus
pub struct Bus<T: Message> {
    capacity: usize,
    topics: Arc<RwLock<FxHashMap<String, broadcast::Sender<T>>>>,
}

impl<T: Message> Clone for Bus<T> {
    fn clone(&self) -> Self {
        Self {
            capacity: self.capacity,
            topics: Arc::clone(&self.topics),
        }
    }
}

impl<T: Message> Bus<T> {
    /// Create a new bus; each topic buffers up to `capacity` messages per
    /// subscriber
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: Arc::new(RwLock::new(FxHashMap::default())),
        }
    }

    /// Per-topic buffer size
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get or create the sender for a topic
    fn sender(&self, topic: &str) -> broadcast::Sender<T> {
        if let Some(tx) = self.topics.read().get(topic) {
            return tx.clone();
        }
        let mut topics = self.topics.write();
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Publish a message to every current subscriber of `topic`
    ///
    /// Publishing to a topic nobody listens on is not an error; the message
    /// is dropped and `Ok(0)` returned.
    ///
    /// # Errors
    /// Currently never fails; the signature leaves room for remote transports.
    pub fn publish(&self, topic: &str, msg: T) -> BusResult<usize> {
        if let Ok(receivers) = self.sender(topic).send(msg) {
            trace!(topic, receivers, "Message published");
            Ok(receivers)
        } else {
            debug!(topic, "No subscribers for topic, message dropped");
            Ok(0)
        }
    }

    /// Subscribe to `topic`
    #[must_use]
    pub fn subscribe(&self, topic: &str) -> Receiver<T> {
        Receiver {
            topic: topic.to_string(),
            rx: self.sender(topic).subscribe(),
        }
    }

    /// Number of live subscribers on `topic`
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .get(topic)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Handle bound to a single topic
    #[must_use]
    pub fn topic(&self, name: impl Into<String>) -> Topic<T> {
        Topic {
            name: name.into(),
            bus: self.clone(),
        }
    }
}

/// A bus handle bound to one topic; implements both [`Publisher`] and
/// [`Subscriber`]
pub struct Topic<T: Message> {
    name: String,
    bus: Bus<T>,
}

impl<T: Message> Clone for Topic<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            bus: self.bus.clone(),
        }
    }
}

impl<T: Message> Topic<T> {
    /// Topic name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T: Message> Publisher<T> for Topic<T> {
    fn publish(&self, msg: T) -> BusResult<usize> {
        self.bus.publish(&self.name, msg)
    }
}

impl<T: Message> Subscriber<T> for Topic<T> {
    fn subscribe(&self) -> Receiver<T> {
        self.bus.subscribe(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct TestMessage {
        id: u64,
        data: String,
    }

    impl Message for TestMessage {}

    fn msg(id: u64) -> TestMessage {
        TestMessage {
            id,
            data: format!("msg-{id}"),
        }
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_every_message() -> BusResult<()> {
        let bus = Bus::<TestMessage>::new(16);
        let topic = bus.topic("prices");
        let mut first = topic.subscribe();
        let mut second = topic.subscribe();

        assert_eq!(topic.publish(msg(1))?, 2);
        assert_eq!(first.recv().await?, msg(1));
        assert_eq!(second.recv().await?, msg(1));
        Ok(())
    }

    #[tokio::test]
    async fn test_topics_are_isolated() -> BusResult<()> {
        let bus = Bus::<TestMessage>::new(16);
        let mut prices = bus.subscribe("prices");
        let mut other = bus.subscribe("other");

        bus.publish("prices", msg(7))?;
        assert_eq!(prices.recv().await?, msg(7));
        assert_eq!(other.try_recv()?, None);
        Ok(())
    }

    #[test]
    fn test_late_subscriber_gets_no_backlog() -> BusResult<()> {
        let bus = Bus::<TestMessage>::new(16);
        let _early = bus.subscribe("prices");
        bus.publish("prices", msg(1))?;

        let mut late = bus.subscribe("prices");
        assert_eq!(late.try_recv()?, None);
        bus.publish("prices", msg(2))?;
        assert_eq!(late.try_recv()?, Some(msg(2)));
        Ok(())
    }

    #[test]
    fn test_publish_without_subscribers_is_not_an_error() -> BusResult<()> {
        let bus = Bus::<TestMessage>::new(4);
        assert_eq!(bus.publish("prices", msg(1))?, 0);
        assert_eq!(bus.subscriber_count("prices"), 0);
        Ok(())
    }

    #[test]
    fn test_slow_subscriber_reports_lag() -> BusResult<()> {
        let bus = Bus::<TestMessage>::new(2);
        let mut rx = bus.subscribe("prices");
        for id in 0..5 {
            bus.publish("prices", msg(id))?;
        }

        assert!(matches!(rx.try_recv(), Err(BusError::Lagged { skipped: 3 })));
        assert_eq!(rx.try_recv()?, Some(msg(3)));
        assert_eq!(rx.try_recv()?, Some(msg(4)));
        Ok(())
    }

    #[test]
    fn test_dropped_receivers_leave_topic() {
        let bus = Bus::<TestMessage>::new(4);
        let rx = bus.subscribe("prices");
        assert_eq!(bus.subscriber_count("prices"), 1);
        drop(rx);
        assert_eq!(bus.subscriber_count("prices"), 0);
    }
}
