//! Event distribution and chat prioritisation
//!
//! The [`EventBus`] fans lightweight notifications out to analytics-style
//! subscribers, while the [`PriorityMessageQueue`] holds the full chat
//! messages waiting to be relayed to the conversational session.

pub mod event_bus;
pub mod events;
pub mod ingest;
pub mod queue;

pub use event_bus::{EventBus, EventHandler};
pub use events::{ChatMessage, Event, EventType, MODERATOR_BADGE};
pub use ingest::ChatIngestor;
pub use queue::{priority_score, PriorityMessageQueue, QueuedMessage};
