//! Topic-based publish/subscribe fan-out

use super::events::{Event, EventType};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Boxed async subscriber callback
pub type EventHandler = Arc<
    dyn Fn(Arc<Event>) -> Pin<Box<dyn Future<Output = crate::Result<()>> + Send>> + Send + Sync,
>;

/// In-process event bus
///
/// Handlers are kept per topic in registration order. Publishing runs every
/// handler of the event's topic concurrently and waits for all of them. A
/// failing handler never stops its siblings: once every handler has
/// finished, the first failure in registration order is returned.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<RwLock<HashMap<EventType, Vec<EventHandler>>>>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a topic
    pub async fn subscribe<F, Fut>(&self, topic: EventType, handler: F)
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = crate::Result<()>> + Send + 'static,
    {
        let wrapped: EventHandler = Arc::new(move |event| Box::pin(handler(event)));

        let mut subscribers = self.subscribers.write().await;
        subscribers.entry(topic).or_default().push(wrapped);
    }

    /// Number of handlers registered for a topic
    pub async fn subscriber_count(&self, topic: EventType) -> usize {
        self.subscribers
            .read()
            .await
            .get(&topic)
            .map_or(0, Vec::len)
    }

    /// Dispatch an event to every handler of its topic
    pub async fn publish(&self, event: Event) -> crate::Result<()> {
        // Snapshot the handler list so subscribing during dispatch never blocks.
        let handlers: Vec<EventHandler> = match self.subscribers.read().await.get(&event.topic) {
            Some(handlers) if !handlers.is_empty() => handlers.clone(),
            _ => {
                debug!("No subscribers for topic: {}", event.topic);
                return Ok(());
            }
        };

        let topic = event.topic;
        let event = Arc::new(event);
        let tasks: Vec<_> = handlers
            .iter()
            .map(|handler| tokio::spawn(handler(Arc::clone(&event))))
            .collect();

        let mut first_failure = None;
        for (index, outcome) in futures::future::join_all(tasks).await.into_iter().enumerate() {
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(join_err) => crate::Error::Subscriber(format!(
                    "handler {} for {} aborted: {}",
                    index, topic, join_err
                )),
            };
            warn!("Subscriber {} failed on {}: {}", index, topic, failure);
            first_failure.get_or_insert(failure);
        }

        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
