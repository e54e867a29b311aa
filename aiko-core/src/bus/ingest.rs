//! Entry point for chat coming from the streaming platform

use super::event_bus::EventBus;
use super::events::{ChatMessage, Event, EventType};
use super::queue::{priority_score, PriorityMessageQueue};
use tracing::debug;

/// Feeds typed chat into the relay queue and notifies bus subscribers
#[derive(Clone)]
pub struct ChatIngestor {
    bus: EventBus,
    queue: PriorityMessageQueue,
    source: String,
}

impl ChatIngestor {
    /// Create an ingestor publishing under the given source label
    pub fn new(bus: EventBus, queue: PriorityMessageQueue, source: impl Into<String>) -> Self {
        Self {
            bus,
            queue,
            source: source.into(),
        }
    }

    /// Enqueue the message for relay, then publish its notification
    ///
    /// The message is queued even when a subscriber fails; the subscriber
    /// error is still returned to the caller.
    pub async fn ingest(&self, msg: ChatMessage) -> crate::Result<()> {
        let event = self.notification_for(&msg);
        debug!(
            "Ingesting {} from {} (priority={})",
            event.topic, msg.username, event.priority
        );
        self.queue.put(msg);
        self.bus.publish(event).await
    }

    fn notification_for(&self, msg: &ChatMessage) -> Event {
        let topic = if msg.is_donation {
            EventType::Donation
        } else if msg.is_sub {
            EventType::Subscription
        } else {
            EventType::ChatMessage
        };

        let mut event = Event::new(topic)
            .with_payload("username", msg.username.clone())
            .with_payload("text", msg.text.clone())
            .with_priority(priority_score(msg))
            .with_source(self.source.clone());
        if msg.is_donation {
            event = event.with_payload("amount", msg.donation_amount);
        }
        if msg.is_sub {
            event = event.with_payload("tier", msg.sub_tier);
        }
        event
    }
}
