//! Event and chat message types

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Badge label that earns a chat message moderator priority
pub const MODERATOR_BADGE: &str = "moderator";

/// Closed set of event topics carried by the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ChatMessage,
    Donation,
    Subscription,
    Raid,
    ViewerCount,
    Speak,
    SetExpression,
    ClipMoment,
    StreamState,
}

impl EventType {
    /// Every topic, in declaration order
    pub const ALL: [EventType; 9] = [
        EventType::ChatMessage,
        EventType::Donation,
        EventType::Subscription,
        EventType::Raid,
        EventType::ViewerCount,
        EventType::Speak,
        EventType::SetExpression,
        EventType::ClipMoment,
        EventType::StreamState,
    ];

    /// Wire name of the topic
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ChatMessage => "chat_message",
            EventType::Donation => "donation",
            EventType::Subscription => "subscription",
            EventType::Raid => "raid",
            EventType::ViewerCount => "viewer_count",
            EventType::Speak => "speak",
            EventType::SetExpression => "set_expression",
            EventType::ClipMoment => "clip_moment",
            EventType::StreamState => "stream_state",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification published on the event bus
///
/// Handlers receive events behind an `Arc`, so an event cannot change
/// once it has been published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Topic the event is dispatched on
    #[serde(rename = "type")]
    pub topic: EventType,
    /// Free-form payload
    pub payload: HashMap<String, serde_json::Value>,
    /// Advisory priority, higher is more important
    pub priority: i64,
    /// Label of the component that produced the event
    pub source: String,
}

impl Event {
    /// Create a new event with an empty payload
    pub fn new(topic: EventType) -> Self {
        Self {
            topic,
            payload: HashMap::new(),
            priority: 0,
            source: "unknown".to_string(),
        }
    }

    /// Add a payload entry
    pub fn with_payload(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Set the advisory priority
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Set the source label
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Read a string payload entry
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }

    /// Read a numeric payload entry
    pub fn payload_f64(&self, key: &str) -> Option<f64> {
        self.payload.get(key).and_then(|v| v.as_f64())
    }
}

/// Chat message produced by the ingestion side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub username: String,
    pub text: String,
    #[serde(default)]
    pub is_donation: bool,
    #[serde(default)]
    pub donation_amount: f64,
    #[serde(default)]
    pub is_sub: bool,
    #[serde(default)]
    pub sub_tier: u32,
    #[serde(default)]
    pub badges: BTreeSet<String>,
}

impl ChatMessage {
    /// Create a plain chat message
    pub fn new(username: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            text: text.into(),
            is_donation: false,
            donation_amount: 0.0,
            is_sub: false,
            sub_tier: 0,
            badges: BTreeSet::new(),
        }
    }

    /// Mark the message as a donation of `amount`
    pub fn with_donation(mut self, amount: f64) -> Self {
        self.is_donation = true;
        self.donation_amount = amount;
        self
    }

    /// Mark the message as a subscription at `tier`
    pub fn with_subscription(mut self, tier: u32) -> Self {
        self.is_sub = true;
        self.sub_tier = tier;
        self
    }

    /// Attach a badge label
    pub fn with_badge(mut self, badge: impl Into<String>) -> Self {
        self.badges.insert(badge.into());
        self
    }

    /// Whether the sender carries the moderator badge
    pub fn is_moderator(&self) -> bool {
        self.badges.contains(MODERATOR_BADGE)
    }

    /// Text line sent to the conversational session
    pub fn relay_text(&self) -> String {
        format!("[{}]: {}", self.username, self.text)
    }
}
