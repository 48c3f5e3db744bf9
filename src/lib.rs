//! Large Worlds - Agent-Based Market Experiment Engine
//!
//! Simulates a population of boundedly informed agents trading
//! state-contingent securities in per-security continuous double auctions.
//! Each period a random subset of states realizes; agents receive partial
//! information, quote randomized bids and asks bounded by their aspirations,
//! and collect dividends at period end. The experiment observes whether
//! market prices aggregate information fragmented across the population.
//!
//! Runs are deterministic: identical configuration and seed replay the
//! identical history, row for row, in the persistence sink.

pub mod config;
pub mod engine;
pub mod intelligence;
pub mod market;
pub mod persistence;
pub mod rng;
pub mod world;

pub use config::{DividendScheme, MarketDiscipline, RepVariant, SimConfig};
pub use engine::LargeWorld;
pub use persistence::{MemorySink, RecordSink};
pub use rng::SimRng;
