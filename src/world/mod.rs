//! Small Worlds
//!
//! The population arena: agents, their per-state security holdings, and the
//! information machinery (`not_info`, uncertain sets, aspiration backlogs)
//! that drives what each agent believes its securities are worth.

pub mod agent;
pub mod holding;
pub mod population;

pub use agent::Agent;
pub use holding::{Holding, HoldingId};
pub use population::Population;

/// Identifier of a state (equivalently, of the security contingent on it).
/// Stable across the whole run.
pub type StateId = usize;
