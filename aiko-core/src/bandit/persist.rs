//! JSON persistence for the decision engine
//!
//! The state file maps action names to `{alpha, beta, expected}`.
//! `expected` is written for humans and dashboards only; loading always
//! recomputes it from alpha and beta.

use super::action::Action;
use super::engine::{Arm, DecisionEngine};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// One arm as stored on disk
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersistedArm {
    pub alpha: f64,
    pub beta: f64,
    #[serde(default, skip_deserializing)]
    pub expected: f64,
}

impl DecisionEngine {
    /// Write the raw alpha/beta of every arm to `path`
    ///
    /// Missing parent directories are created. Blocking I/O; call it once
    /// per decision cycle at most.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let path = path.as_ref();
        let state: BTreeMap<Action, PersistedArm> = self
            .snapshot()
            .into_iter()
            .map(|(action, snap)| {
                (
                    action,
                    PersistedArm {
                        alpha: snap.alpha,
                        beta: snap.beta,
                        expected: snap.expected,
                    },
                )
            })
            .collect();

        crate::utils::ensure_parent_dir(path)?;
        let content = serde_json::to_string_pretty(&state)?;
        std::fs::write(path, content)?;
        debug!("Saved decision engine state to {}", path.display());
        Ok(())
    }

    /// Rebuild an engine from a state file written by [`save`](Self::save)
    ///
    /// The engine covers exactly the actions present in the file. Unknown
    /// action names, invalid parameters and empty documents are errors.
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let raw: BTreeMap<String, PersistedArm> = serde_json::from_str(&content)?;
        if raw.is_empty() {
            return Err(crate::Error::Bandit(format!(
                "no arms stored in {}",
                path.display()
            )));
        }

        let mut arms = BTreeMap::new();
        for (name, stored) in raw {
            let action: Action = name.parse()?;
            arms.insert(action, Arm::new(stored.alpha, stored.beta)?);
        }

        info!(
            "Loaded decision engine state for {} actions from {}",
            arms.len(),
            path.display()
        );
        Ok(Self::from_arms(arms, StdRng::from_os_rng()))
    }

    /// Load the engine from `path`, or start fresh over every action
    ///
    /// Never fails: a missing, unreadable, corrupt or incomplete file
    /// yields an engine with uniform priors.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(engine) => engine,
            Err(crate::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "No decision engine state at {}, starting fresh",
                    path.display()
                );
                Self::with_default_actions()
            }
            Err(e) => {
                warn!(
                    "Discarding decision engine state at {}: {}",
                    path.display(),
                    e
                );
                Self::with_default_actions()
            }
        }
    }
}
