//! End-of-stream summary and reward feedback
//!
//! [`SessionTally`] listens on the bus while the stream runs. At shutdown
//! its numbers become a [`StreamSummary`], whose revenue-based reward is
//! credited to every activity that dominated the stream.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::bandit::{Action, DecisionEngine};
use crate::bus::{EventBus, EventType};

/// Revenue per hour that earns the full reward
const FULL_REWARD_REVENUE_PER_HOUR: f64 = 50.0;

/// How many activities count as "top"
const TOP_ACTIVITY_COUNT: usize = 3;

#[derive(Debug, Default)]
struct TallyState {
    chat_messages: u64,
    total_revenue: f64,
    peak_viewers: u64,
    activities: HashMap<String, u64>,
}

/// Running counters for the current stream, fed from the event bus
#[derive(Clone)]
pub struct SessionTally {
    state: Arc<Mutex<TallyState>>,
    started_at: DateTime<Utc>,
}

impl SessionTally {
    /// Start tallying now
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TallyState::default())),
            started_at: Utc::now(),
        }
    }

    /// Subscribe the tally to the topics it counts
    ///
    /// Chat, donations and subscriptions all count as chat messages;
    /// donations also add their `amount` to revenue.
    pub async fn attach(&self, bus: &EventBus) {
        for topic in [
            EventType::ChatMessage,
            EventType::Donation,
            EventType::Subscription,
        ] {
            let tally = self.clone();
            bus.subscribe(topic, move |event| {
                let tally = tally.clone();
                async move {
                    tally.record_chat();
                    if event.topic == EventType::Donation {
                        tally.record_donation(event.payload_f64("amount").unwrap_or(0.0));
                    }
                    Ok(())
                }
            })
            .await;
        }

        let tally = self.clone();
        bus.subscribe(EventType::ViewerCount, move |event| {
            let tally = tally.clone();
            async move {
                if let Some(count) = event.payload.get("count").and_then(|v| v.as_u64()) {
                    tally.record_viewers(count);
                }
                Ok(())
            }
        })
        .await;

        let tally = self.clone();
        bus.subscribe(EventType::StreamState, move |event| {
            let tally = tally.clone();
            async move {
                if let Some(activity) = event.payload_str("activity") {
                    tally.record_activity(activity);
                }
                Ok(())
            }
        })
        .await;
    }

    pub fn record_chat(&self) {
        self.state.lock().chat_messages += 1;
    }

    pub fn record_donation(&self, amount: f64) {
        if amount.is_finite() && amount > 0.0 {
            self.state.lock().total_revenue += amount;
        }
    }

    pub fn record_viewers(&self, count: u64) {
        let mut state = self.state.lock();
        state.peak_viewers = state.peak_viewers.max(count);
    }

    pub fn record_activity(&self, activity: &str) {
        *self
            .state
            .lock()
            .activities
            .entry(activity.to_string())
            .or_default() += 1;
    }

    /// Summarize everything recorded so far
    pub fn summary(&self, stream_id: impl Into<String>) -> StreamSummary {
        let elapsed = Utc::now() - self.started_at;
        let duration_minutes = elapsed.num_milliseconds().max(0) as f64 / 60_000.0;

        let state = self.state.lock();
        let mut ranked: Vec<(&String, &u64)> = state.activities.iter().collect();
        // most frequent first, names break ties for a stable report
        ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        let top_activities = ranked
            .into_iter()
            .take(TOP_ACTIVITY_COUNT)
            .map(|(name, _)| name.clone())
            .collect();

        StreamSummary::build(
            stream_id,
            duration_minutes,
            state.peak_viewers,
            state.total_revenue,
            top_activities,
            state.chat_messages,
        )
    }
}

impl Default for SessionTally {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregate numbers for one stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSummary {
    pub stream_id: String,
    pub duration_minutes: f64,
    pub peak_viewers: u64,
    pub total_revenue: f64,
    pub revenue_per_hour: f64,
    pub top_activities: Vec<String>,
    pub chat_messages: u64,
    pub engagement_score: f64,
}

impl StreamSummary {
    /// Derive the hourly revenue and engagement score from raw totals
    pub fn build(
        stream_id: impl Into<String>,
        duration_minutes: f64,
        peak_viewers: u64,
        total_revenue: f64,
        top_activities: Vec<String>,
        chat_messages: u64,
    ) -> Self {
        let hours = duration_minutes / 60.0;
        let hours = if hours > 0.0 { hours } else { 1.0 };
        let engagement = if duration_minutes > 0.0 {
            (chat_messages as f64 / duration_minutes).min(100.0)
        } else {
            0.0
        };

        Self {
            stream_id: stream_id.into(),
            duration_minutes,
            peak_viewers,
            total_revenue,
            revenue_per_hour: round_to(total_revenue / hours, 2),
            top_activities,
            chat_messages,
            engagement_score: round_to(engagement, 1),
        }
    }

    /// Reward in [0, 1] earned by this stream
    pub fn reward(&self) -> f64 {
        (self.revenue_per_hour / FULL_REWARD_REVENUE_PER_HOUR).clamp(0.0, 1.0)
    }

    /// Credit the reward to every top activity the engine knows
    ///
    /// Returns the actions that were updated. Names that are not actions
    /// are skipped.
    pub fn apply_to(&self, engine: &mut DecisionEngine) -> Vec<Action> {
        let reward = self.reward();
        let mut updated = Vec::new();
        for name in &self.top_activities {
            match name.parse::<Action>() {
                Ok(action) => {
                    engine.update(action, reward);
                    updated.push(action);
                }
                Err(_) => debug!("Skipping unknown activity in retrospective: {}", name),
            }
        }
        updated
    }

    /// Suggestions for the next stream
    pub fn recommendations(&self) -> Vec<String> {
        let mut recs = Vec::new();
        if self.revenue_per_hour < 10.0 {
            recs.push("Set a donation goal early in the stream to prime giving behavior".to_string());
        }
        if self.engagement_score < 30.0 {
            recs.push("Chat velocity was low, try more direct questions and polls".to_string());
        }
        if self.top_activities.iter().any(|a| a == Action::Idle.as_str()) {
            recs.push(
                "Replace idle time with q_and_a segments for high engagement at low effort"
                    .to_string(),
            );
        }
        if self.peak_viewers > 200 && self.total_revenue < 20.0 {
            recs.push(
                "High viewer count but low revenue, mention subscription perks".to_string(),
            );
        }
        if recs.is_empty() {
            recs.push("Stream performed well, maintain the current content mix".to_string());
        }
        recs
    }

    /// Plain-text report
    pub fn format_report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== Stream Retrospective: {} ===", self.stream_id);
        let _ = writeln!(out, "Duration:       {:.0} min", self.duration_minutes);
        let _ = writeln!(out, "Peak viewers:   {}", self.peak_viewers);
        let _ = writeln!(
            out,
            "Revenue:        ${:.2} (${:.2}/hr)",
            self.total_revenue, self.revenue_per_hour
        );
        let _ = writeln!(out, "Chat messages:  {}", self.chat_messages);
        let _ = writeln!(out, "Engagement:     {:.1}/100", self.engagement_score);
        let _ = writeln!(out, "Top activities: {}", self.top_activities.join(", "));
        let _ = writeln!(out);
        let _ = writeln!(out, "Recommendations:");
        for rec in self.recommendations() {
            let _ = writeln!(out, "  - {}", rec);
        }
        out
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Event;

    fn activities(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_build_summary_derives_rates() {
        let summary = StreamSummary::build("s1", 120.0, 80, 60.0, activities(&["talk"]), 600);
        assert_eq!(summary.revenue_per_hour, 30.0);
        assert_eq!(summary.engagement_score, 5.0);
        assert!((summary.reward() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_zero_duration_uses_one_hour() {
        let summary = StreamSummary::build("s1", 0.0, 0, 12.5, Vec::new(), 10);
        assert_eq!(summary.revenue_per_hour, 12.5);
        assert_eq!(summary.engagement_score, 0.0);
    }

    #[test]
    fn test_reward_is_capped() {
        let summary = StreamSummary::build("s1", 60.0, 0, 500.0, Vec::new(), 0);
        assert_eq!(summary.reward(), 1.0);
    }

    #[test]
    fn test_apply_to_updates_known_activities() {
        let summary = StreamSummary::build(
            "s1",
            60.0,
            0,
            25.0,
            activities(&["game", "dance", "talk"]),
            0,
        );
        let mut engine = DecisionEngine::with_default_actions();

        let updated = summary.apply_to(&mut engine);
        assert_eq!(updated, vec![Action::Game, Action::Talk]);
        assert_eq!(engine.arm(Action::Game).unwrap().alpha(), 1.5);
        assert_eq!(engine.arm(Action::Talk).unwrap().alpha(), 1.5);
        assert_eq!(engine.arm(Action::React).unwrap().alpha(), 1.0);
    }

    #[test]
    fn test_zero_revenue_penalizes_activities() {
        let summary = StreamSummary::build("s1", 60.0, 0, 0.0, activities(&["idle"]), 0);
        let mut engine = DecisionEngine::with_default_actions();
        summary.apply_to(&mut engine);
        assert_eq!(engine.arm(Action::Idle).unwrap().beta(), 2.0);
    }

    #[test]
    fn test_recommendations() {
        let quiet = StreamSummary::build("s1", 60.0, 250, 5.0, activities(&["idle"]), 60);
        let recs = quiet.recommendations();
        assert_eq!(recs.len(), 4);
        assert!(recs.iter().any(|r| r.contains("q_and_a")));

        let great = StreamSummary::build("s2", 60.0, 50, 100.0, activities(&["talk"]), 3000);
        assert_eq!(
            great.recommendations(),
            vec!["Stream performed well, maintain the current content mix".to_string()]
        );
    }

    #[test]
    fn test_format_report_lists_numbers() {
        let summary = StreamSummary::build("live", 90.0, 42, 30.0, activities(&["talk", "game"]), 900);
        let report = summary.format_report();
        assert!(report.contains("=== Stream Retrospective: live ==="));
        assert!(report.contains("$30.00 ($20.00/hr)"));
        assert!(report.contains("Top activities: talk, game"));
        assert!(report.contains("Recommendations:"));
    }

    #[tokio::test]
    async fn test_tally_counts_bus_events() {
        let bus = EventBus::new();
        let tally = SessionTally::new();
        tally.attach(&bus).await;

        bus.publish(Event::new(EventType::ChatMessage)).await.unwrap();
        bus.publish(Event::new(EventType::Subscription)).await.unwrap();
        bus.publish(Event::new(EventType::Donation).with_payload("amount", 7.5))
            .await
            .unwrap();
        bus.publish(Event::new(EventType::ViewerCount).with_payload("count", 120))
            .await
            .unwrap();
        bus.publish(Event::new(EventType::ViewerCount).with_payload("count", 90))
            .await
            .unwrap();
        for activity in ["talk", "game", "talk", "idle", "react", "talk", "game"] {
            bus.publish(Event::new(EventType::StreamState).with_payload("activity", activity))
                .await
                .unwrap();
        }

        let summary = tally.summary("live");
        assert_eq!(summary.chat_messages, 3);
        assert_eq!(summary.total_revenue, 7.5);
        assert_eq!(summary.peak_viewers, 120);
        assert_eq!(summary.top_activities, activities(&["talk", "game", "idle"]));
    }
}
