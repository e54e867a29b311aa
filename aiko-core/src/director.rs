//! Periodic decision loop
//!
//! Every interval the director asks the decision engine for the next
//! performer action, announces it on the bus as a `stream_state` event and
//! persists the engine so learned state survives a restart.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bandit::{Action, SharedEngine};
use crate::bus::{Event, EventBus, EventType};
use crate::config::DirectorConfig;

/// Source label of events published by the director
pub const DIRECTOR_SOURCE: &str = "director";

/// Event priority of activity changes
const ACTIVITY_PRIORITY: i64 = 5;

/// Drives action selection on a fixed cadence
#[derive(Clone)]
pub struct Director {
    engine: SharedEngine,
    bus: EventBus,
    config: DirectorConfig,
    state_path: PathBuf,
    current: Arc<Mutex<Option<Action>>>,
}

impl Director {
    /// Create a director over a shared engine
    pub fn new(
        engine: SharedEngine,
        bus: EventBus,
        config: DirectorConfig,
        state_path: impl AsRef<Path>,
    ) -> Self {
        Self {
            engine,
            bus,
            config,
            state_path: state_path.as_ref().to_path_buf(),
            current: Arc::new(Mutex::new(None)),
        }
    }

    /// The most recently chosen action, if any
    pub fn current_activity(&self) -> Option<Action> {
        *self.current.lock()
    }

    /// Feed an observed reward for `action` back into the engine
    pub fn report_reward(&self, action: Action, reward: f64) {
        self.engine.lock().update(action, reward);
    }

    /// Persist the engine state to the configured path
    pub fn persist(&self) -> crate::Result<()> {
        self.engine.lock().save(&self.state_path)
    }

    /// Run one decision cycle: select, announce, persist
    ///
    /// A failing subscriber or a failed save is logged; the chosen action is
    /// still returned.
    pub async fn tick(&self) -> Action {
        let action = self.engine.lock().select();
        *self.current.lock() = Some(action);
        info!("Director chose activity: {}", action);

        let event = Event::new(EventType::StreamState)
            .with_payload("activity", action.as_str())
            .with_priority(ACTIVITY_PRIORITY)
            .with_source(DIRECTOR_SOURCE);
        if let Err(e) = self.bus.publish(event).await {
            warn!("Activity announcement failed: {}", e);
        }

        if let Err(e) = self.persist() {
            error!(
                "Failed to persist decision engine to {}: {}",
                self.state_path.display(),
                e
            );
        }
        action
    }

    /// Decide immediately, then every `interval_s`, until `shutdown` fires
    pub async fn run(&self, shutdown: CancellationToken) {
        if !self.config.enabled {
            info!("Director disabled");
            return;
        }

        let interval = Duration::from_secs(self.config.interval_s);
        info!("Director started (every {}s)", self.config.interval_s);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.tick() => {}
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        debug!("Director stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bandit::DecisionEngine;
    use tempfile::TempDir;
    use tokio::time::timeout;

    fn director_in(temp_dir: &TempDir, bus: EventBus, config: DirectorConfig) -> Director {
        let engine = DecisionEngine::with_seed(Action::ALL, 11).into_shared();
        Director::new(
            engine,
            bus,
            config,
            temp_dir.path().join("data").join("bandit_state.json"),
        )
    }

    #[tokio::test]
    async fn test_tick_announces_and_persists() {
        let temp_dir = TempDir::new().unwrap();
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        bus.subscribe(EventType::StreamState, move |event| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().push((
                    event.payload_str("activity").map(str::to_string),
                    event.priority,
                    event.source.clone(),
                ));
                Ok(())
            }
        })
        .await;

        let director = director_in(&temp_dir, bus, DirectorConfig::default());
        assert_eq!(director.current_activity(), None);

        let action = director.tick().await;
        assert_eq!(director.current_activity(), Some(action));
        assert_eq!(
            *seen.lock(),
            vec![(
                Some(action.as_str().to_string()),
                ACTIVITY_PRIORITY,
                DIRECTOR_SOURCE.to_string()
            )]
        );

        let reloaded = DecisionEngine::load(temp_dir.path().join("data").join("bandit_state.json"))
            .unwrap();
        assert_eq!(reloaded.actions().count(), Action::ALL.len());
    }

    #[tokio::test]
    async fn test_tick_survives_failing_subscriber() {
        let temp_dir = TempDir::new().unwrap();
        let bus = EventBus::new();
        bus.subscribe(EventType::StreamState, |_| async {
            Err(crate::Error::Subscriber("renderer offline".to_string()))
        })
        .await;

        let director = director_in(&temp_dir, bus, DirectorConfig::default());
        let action = director.tick().await;
        assert!(Action::ALL.contains(&action));
    }

    #[tokio::test]
    async fn test_report_reward_updates_engine() {
        let temp_dir = TempDir::new().unwrap();
        let director = director_in(&temp_dir, EventBus::new(), DirectorConfig::default());

        director.report_reward(Action::Game, 0.5);
        director.report_reward(Action::Idle, 0.0);
        director.persist().unwrap();

        let reloaded = DecisionEngine::load(temp_dir.path().join("data").join("bandit_state.json"))
            .unwrap();
        assert_eq!(reloaded.arm(Action::Game).unwrap().alpha(), 1.5);
        assert_eq!(reloaded.arm(Action::Idle).unwrap().beta(), 2.0);
    }

    #[tokio::test]
    async fn test_run_decides_until_cancelled() {
        let temp_dir = TempDir::new().unwrap();
        let director = director_in(
            &temp_dir,
            EventBus::new(),
            DirectorConfig {
                enabled: true,
                interval_s: 3600,
            },
        );

        let shutdown = CancellationToken::new();
        let handle = {
            let director = director.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { director.run(shutdown).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(director.current_activity().is_some());

        shutdown.cancel();
        timeout(Duration::from_secs(1), handle)
            .await
            .expect("director stops on cancel")
            .unwrap();
    }

    #[tokio::test]
    async fn test_disabled_director_returns_immediately() {
        let temp_dir = TempDir::new().unwrap();
        let director = director_in(
            &temp_dir,
            EventBus::new(),
            DirectorConfig {
                enabled: false,
                interval_s: 1,
            },
        );

        timeout(Duration::from_millis(200), director.run(CancellationToken::new()))
            .await
            .expect("disabled director returns");
        assert_eq!(director.current_activity(), None);
    }
}
