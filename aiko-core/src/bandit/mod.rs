//! Thompson-sampling decision engine
//!
//! One Beta posterior per performer [`Action`], learned from reward
//! feedback and persisted as a small JSON document between streams.

pub mod action;
pub mod engine;
pub mod persist;

pub use action::Action;
pub use engine::{Arm, ArmSnapshot, DecisionEngine, SharedEngine};
pub use persist::PersistedArm;
