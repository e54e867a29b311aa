//! Downstream session integrations for aiko
//!
//! This crate relays prioritized chat into the conversational session that
//! voices the performer.

pub mod base;
pub mod relay;

pub use base::{ChannelError, Result};
pub use relay::{ConnectionState, RelayBridge};
