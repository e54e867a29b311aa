//! Beta-Bernoulli bandit over the performer actions

use super::action::Action;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Beta, Distribution};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Decision engine shared between the director and the process supervisor
pub type SharedEngine = Arc<Mutex<DecisionEngine>>;

/// Learned Beta(alpha, beta) posterior for one action
///
/// Both parameters start at 1.0 and only ever grow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arm {
    alpha: f64,
    beta: f64,
}

impl Arm {
    /// Uniform prior
    pub const PRIOR: Arm = Arm {
        alpha: 1.0,
        beta: 1.0,
    };

    /// Build an arm from raw parameters, rejecting non-positive or non-finite values
    pub fn new(alpha: f64, beta: f64) -> crate::Result<Self> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(alpha) || !valid(beta) {
            return Err(crate::Error::Bandit(format!(
                "arm parameters must be positive and finite (alpha={}, beta={})",
                alpha, beta
            )));
        }
        Ok(Self { alpha, beta })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Posterior mean alpha / (alpha + beta)
    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }
}

impl Default for Arm {
    fn default() -> Self {
        Self::PRIOR
    }
}

/// Display/telemetry view of an arm
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArmSnapshot {
    pub alpha: f64,
    pub beta: f64,
    /// Derived posterior mean, never read back as state
    pub expected: f64,
}

/// Thompson-sampling decision engine
///
/// The action set is fixed when the engine is built. Live decisions use
/// [`select`](Self::select), which samples every posterior and picks the
/// highest draw; [`exploit`](Self::exploit) is the greedy variant used for
/// evaluation.
pub struct DecisionEngine {
    arms: BTreeMap<Action, Arm>,
    rng: StdRng,
}

impl DecisionEngine {
    /// Create an engine with uniform priors over `actions`
    ///
    /// An empty action list falls back to [`Action::ALL`].
    pub fn new(actions: impl IntoIterator<Item = Action>) -> Self {
        Self::with_rng(actions, StdRng::from_os_rng())
    }

    /// Create an engine over `actions` with a deterministic random source
    pub fn with_seed(actions: impl IntoIterator<Item = Action>, seed: u64) -> Self {
        Self::with_rng(actions, StdRng::seed_from_u64(seed))
    }

    /// Create an engine over `actions` drawing samples from `rng`
    pub fn with_rng(actions: impl IntoIterator<Item = Action>, rng: StdRng) -> Self {
        let mut arms: BTreeMap<Action, Arm> = actions
            .into_iter()
            .map(|action| (action, Arm::PRIOR))
            .collect();
        if arms.is_empty() {
            warn!("Decision engine built without actions, using the default set");
            arms = Action::ALL.into_iter().map(|a| (a, Arm::PRIOR)).collect();
        }
        Self { arms, rng }
    }

    /// Engine over the full default action set
    pub fn with_default_actions() -> Self {
        Self::new(Action::ALL)
    }

    /// Build an engine from already-validated arms
    pub(crate) fn from_arms(arms: BTreeMap<Action, Arm>, rng: StdRng) -> Self {
        Self { arms, rng }
    }

    /// Wrap the engine for sharing between tasks
    pub fn into_shared(self) -> SharedEngine {
        Arc::new(Mutex::new(self))
    }

    /// Configured actions in their fixed order
    pub fn actions(&self) -> impl Iterator<Item = Action> + '_ {
        self.arms.keys().copied()
    }

    /// Current posterior of an action
    pub fn arm(&self, action: Action) -> Option<Arm> {
        self.arms.get(&action).copied()
    }

    /// Draw one sample per arm and return the action with the highest draw
    pub fn select(&mut self) -> Action {
        let mut best: Option<(Action, f64)> = None;
        for (action, arm) in &self.arms {
            let sample = match Beta::new(arm.alpha, arm.beta) {
                Ok(dist) => dist.sample(&mut self.rng),
                Err(e) => {
                    warn!("Cannot sample {} ({}), using its mean", action, e);
                    arm.mean()
                }
            };
            if best.map_or(true, |(_, top)| sample > top) {
                best = Some((*action, sample));
            }
        }
        // The arm map is never empty, see `with_rng`.
        let (action, sample) = best.unwrap_or((Action::Idle, 0.0));
        debug!("Selected {} (sample={:.3})", action, sample);
        action
    }

    /// Action with the highest posterior mean; ties go to the earlier action
    pub fn exploit(&self) -> Action {
        let mut best: Option<(Action, f64)> = None;
        for (action, arm) in &self.arms {
            let mean = arm.mean();
            if best.map_or(true, |(_, top)| mean > top) {
                best = Some((*action, mean));
            }
        }
        best.map_or(Action::Idle, |(action, _)| action)
    }

    /// Record an observed reward for an action
    ///
    /// A positive reward adds exactly `reward` to alpha and leaves beta
    /// alone; anything else adds one full unit to beta. Actions outside the
    /// configured set are ignored.
    pub fn update(&mut self, action: Action, reward: f64) {
        let Some(arm) = self.arms.get_mut(&action) else {
            debug!("Ignoring reward for unconfigured action {}", action);
            return;
        };
        if reward > 0.0 {
            arm.alpha += reward;
        } else {
            arm.beta += 1.0;
        }
        debug!(
            "Updated {} with reward {} -> alpha={:.3} beta={:.3}",
            action, reward, arm.alpha, arm.beta
        );
    }

    /// Per-action parameters with the derived posterior mean
    pub fn snapshot(&self) -> BTreeMap<Action, ArmSnapshot> {
        self.arms
            .iter()
            .map(|(action, arm)| {
                (
                    *action,
                    ArmSnapshot {
                        alpha: arm.alpha,
                        beta: arm.beta,
                        expected: arm.mean(),
                    },
                )
            })
            .collect()
    }
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::with_default_actions()
    }
}

impl fmt::Debug for DecisionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecisionEngine")
            .field("arms", &self.arms)
            .finish_non_exhaustive()
    }
}
