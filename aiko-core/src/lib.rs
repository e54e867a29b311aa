//! Core types and services for the aiko performer
//!
//! This crate provides the event bus, the priority chat queue, the
//! Thompson-sampling decision engine and the supporting configuration
//! and logging used by the other aiko components.

pub mod bandit;
pub mod bus;
pub mod config;
pub mod director;
pub mod error;
pub mod logging;
pub mod retrospective;
pub mod utils;

pub use error::{Error, Result};
