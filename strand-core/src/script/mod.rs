//! Script engine
//!
//! Queues LED commands received from the host in persistent storage and
//! plays them back one per scheduler tick, replaying loop bodies.

pub mod buffer;
pub mod layout;

pub use buffer::{AddOutcome, ScriptBuffer, Step, MAX_LOOP_DEPTH};
pub use layout::ScriptLayout;
