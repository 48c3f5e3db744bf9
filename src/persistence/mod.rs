//! Persistence Sink
//!
//! The simulation appends to six tabular record streams: transactions,
//! per-period realizations, agent snapshots, security balances, starting
//! aspirations, and the one-time dividend assignment. The sink is an
//! abstraction with one append method per table so the engine can be
//! exercised against an in-memory store in tests; the SQLite implementation
//! lives in [`sqlite`].

pub mod sqlite;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::world::StateId;

/// One cleared trade: a single unit moved from seller to buyer.
/// `bid_arrived_later` distinguishes which side of the book triggered the
/// cross.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRow {
    pub period: u64,
    pub iteration: i64,
    pub state: StateId,
    pub tx_index: u64,
    pub buyer: usize,
    pub seller: usize,
    pub price: f64,
    pub bid_arrived_later: bool,
    pub bid: f64,
    pub buyer_aspiration: f64,
    pub ask: f64,
    pub seller_aspiration: f64,
    pub spread: f64,
}

/// Whether a state realized this period. Logged for every state in
/// `[0, S)`, held or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealizationRow {
    pub period: u64,
    pub state: StateId,
    pub realized: bool,
}

/// End-of-period agent snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshotRow {
    pub period: u64,
    pub agent: usize,
    pub num_states: usize,
    pub balance: f64,
    pub states_csv: String,
    pub not_info_csv: String,
    pub uncertain_count: usize,
}

/// End-of-period position in one security, with the dividend payout it
/// produced (zero when unrealized).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityBalanceRow {
    pub period: u64,
    pub agent: usize,
    pub state: StateId,
    pub amount: i64,
    pub dividend: f64,
    pub payout: f64,
    pub realized: bool,
}

/// Starting aspiration of one holding, logged when period information is
/// distributed. `from_not_info` is set exactly when the state is in the
/// agent's `not_info`; `from_backlog` when the value came from a matching
/// backlog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspirationRow {
    pub period: u64,
    pub agent: usize,
    pub state: StateId,
    pub uncertain_count: usize,
    pub start_aspiration: f64,
    pub from_not_info: bool,
    pub from_backlog: bool,
}

/// Dividend assigned to one (agent, state) pair. Logged once, at
/// construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DividendRow {
    pub agent: usize,
    pub trader_type: usize,
    pub state: StateId,
    pub dividend: f64,
}

/// Append-only tabular record sink. Implementations must preserve append
/// order; the engine writes every row in deterministic program order.
pub trait RecordSink {
    fn transaction(&mut self, row: &TransactionRow) -> Result<()>;
    fn realization(&mut self, row: &RealizationRow) -> Result<()>;
    fn agent_snapshot(&mut self, row: &AgentSnapshotRow) -> Result<()>;
    fn security_balance(&mut self, row: &SecurityBalanceRow) -> Result<()>;
    fn aspiration(&mut self, row: &AspirationRow) -> Result<()>;
    fn dividend(&mut self, row: &DividendRow) -> Result<()>;

    /// Called at every period boundary. Durable sinks commit here so an
    /// aborted run keeps its completed periods.
    fn checkpoint(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called once, after the last period. Durable sinks commit and close
    /// here.
    fn flush(&mut self) -> Result<()>;
}

/// Vector-backed sink for tests and programmatic runs.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MemorySink {
    pub transactions: Vec<TransactionRow>,
    pub realizations: Vec<RealizationRow>,
    pub agents: Vec<AgentSnapshotRow>,
    pub security_balances: Vec<SecurityBalanceRow>,
    pub aspirations: Vec<AspirationRow>,
    pub dividends: Vec<DividendRow>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordSink for MemorySink {
    fn transaction(&mut self, row: &TransactionRow) -> Result<()> {
        self.transactions.push(row.clone());
        Ok(())
    }

    fn realization(&mut self, row: &RealizationRow) -> Result<()> {
        self.realizations.push(row.clone());
        Ok(())
    }

    fn agent_snapshot(&mut self, row: &AgentSnapshotRow) -> Result<()> {
        self.agents.push(row.clone());
        Ok(())
    }

    fn security_balance(&mut self, row: &SecurityBalanceRow) -> Result<()> {
        self.security_balances.push(row.clone());
        Ok(())
    }

    fn aspiration(&mut self, row: &AspirationRow) -> Result<()> {
        self.aspirations.push(row.clone());
        Ok(())
    }

    fn dividend(&mut self, row: &DividendRow) -> Result<()> {
        self.dividends.push(row.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
