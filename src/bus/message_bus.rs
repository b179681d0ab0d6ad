//! Topic-keyed message bus
//!
//! A single publication surface with a per-topic fan-out to subscriber
//! channels. Delivery to a single subscriber is FIFO; channels are bounded so
//! that a slow consumer back-pressures publishers instead of growing an
//! unbounded queue.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use super::error_handling::{MessageBusError, MessageBusResult, RecvTimeoutError, TryRecvError};
use super::events::{Envelope, Event, Topic};

/// Default per-subscriber channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Receiving half of a topic subscription.
pub struct Consumer {
    receiver: mpsc::Receiver<Envelope>,
}

impl Consumer {
    pub(crate) fn new(receiver: mpsc::Receiver<Envelope>) -> Self {
        Self { receiver }
    }

    /// Receive the next envelope; `None` once the bus has been closed and the
    /// channel drained.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.receiver.recv().await
    }

    /// Receive with a timeout.
    pub async fn recv_timeout(&mut self, duration: Duration) -> Result<Envelope, RecvTimeoutError> {
        match timeout(duration, self.receiver.recv()).await {
            Ok(Some(envelope)) => Ok(envelope),
            Ok(None) => Err(RecvTimeoutError::Disconnected),
            Err(_) => Err(RecvTimeoutError::Timeout),
        }
    }

    /// Try to receive without waiting.
    pub fn try_recv(&mut self) -> Result<Envelope, TryRecvError> {
        match self.receiver.try_recv() {
            Ok(envelope) => Ok(envelope),
            Err(mpsc::error::TryRecvError::Empty) => Err(TryRecvError::Empty),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(TryRecvError::Disconnected),
        }
    }
}

/// Registry of per-topic subscriber senders.
struct SubscriberRegistry {
    topic_subscribers: HashMap<Topic, Vec<mpsc::Sender<Envelope>>>,
}

impl SubscriberRegistry {
    fn new() -> Self {
        Self {
            topic_subscribers: HashMap::new(),
        }
    }

    fn add_subscriber(&mut self, topic: Topic, sender: mpsc::Sender<Envelope>) {
        self.topic_subscribers.entry(topic).or_default().push(sender);
    }

    fn subscribers(&self, topic: Topic) -> Vec<mpsc::Sender<Envelope>> {
        self.topic_subscribers
            .get(&topic)
            .map(|senders| senders.to_vec())
            .unwrap_or_default()
    }
}

/// Topic-keyed publish/subscribe bus over bounded channels.
pub struct MessageBus {
    registry: Arc<tokio::sync::Mutex<SubscriberRegistry>>,
    capacity: usize,
}

impl MessageBus {
    /// Create a bus with the default channel capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bus with an explicit per-subscriber channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            registry: Arc::new(tokio::sync::Mutex::new(SubscriberRegistry::new())),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to a topic; the returned [`Consumer`] receives every
    /// envelope published to it, in publish order.
    pub async fn subscribe(&self, topic: Topic) -> Consumer {
        let (sender, receiver) = mpsc::channel(self.capacity);

        let mut registry = self.registry.lock().await;
        registry.add_subscriber(topic, sender);

        Consumer::new(receiver)
    }

    /// Publish an event to one topic, stamping the envelope timestamp.
    pub async fn publish(&self, topic: Topic, event: Event) -> MessageBusResult<()> {
        self.publish_envelope(Envelope::new(topic, event)).await
    }

    /// Publish the same event to several topics.
    pub async fn publish_to_topics(&self, topics: &[Topic], event: Event) -> MessageBusResult<()> {
        for topic in topics {
            self.publish(*topic, event.clone()).await?;
        }
        Ok(())
    }

    /// Publish a pre-built envelope to all subscribers of its topic.
    ///
    /// The sender list is snapshotted before any send so no lock is held
    /// across a channel operation. Sends block when a subscriber channel is
    /// full.
    pub async fn publish_envelope(&self, envelope: Envelope) -> MessageBusResult<()> {
        let subscribers = {
            let registry = self.registry.lock().await;
            registry.subscribers(envelope.topic)
        };

        if subscribers.is_empty() {
            // No subscribers for this topic - this is not an error
            return Ok(());
        }

        let mut failed_sends = 0;
        let total_subscribers = subscribers.len();

        for subscriber in subscribers {
            if subscriber.send(envelope.clone()).await.is_err() {
                failed_sends += 1;
            }
        }

        if failed_sends > 0 {
            return Err(MessageBusError::SendFailed {
                reason: format!(
                    "{} of {} subscribers failed to receive event on topic {}",
                    failed_sends, total_subscribers, envelope.topic
                ),
            });
        }

        Ok(())
    }

    /// Get the number of subscribers for a topic.
    pub async fn subscriber_count(&self, topic: Topic) -> usize {
        let registry = self.registry.lock().await;
        registry.subscribers(topic).len()
    }

    /// Drop every registered sender so all consumers observe end-of-stream.
    ///
    /// Publishing after close succeeds vacuously (no subscribers).
    pub async fn close(&self) {
        let mut registry = self.registry.lock().await;
        registry.topic_subscribers.clear();
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
