//! Small-world agent.

use std::collections::{BTreeMap, BTreeSet};

use super::{HoldingId, StateId};

/// An agent endowed with a bounded subset of the large world's securities.
///
/// `not_info` is the set of held states the agent has been told are not
/// realized this period; `uncertain` is everything else it holds, mapped to
/// the dividend it would collect. The two sets are always disjoint and are
/// rebuilt together when information arrives.
#[derive(Debug, Clone)]
pub struct Agent {
    num: usize,
    trader_type: usize,
    balance: f64,
    holdings: BTreeMap<StateId, HoldingId>,
    not_info: BTreeSet<StateId>,
    uncertain: BTreeMap<StateId, f64>,
}

impl Agent {
    pub fn new(num: usize) -> Self {
        Self {
            num,
            trader_type: 0,
            balance: 0.0,
            holdings: BTreeMap::new(),
            not_info: BTreeSet::new(),
            uncertain: BTreeMap::new(),
        }
    }

    /// External agent number. In fix-K-worlds mode agents that received no
    /// states are excluded, so numbers may have gaps while arena indices
    /// stay dense.
    pub fn num(&self) -> usize {
        self.num
    }

    pub fn trader_type(&self) -> usize {
        self.trader_type
    }

    pub(crate) fn set_trader_type(&mut self, trader_type: usize) {
        self.trader_type = trader_type;
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn balance_add(&mut self, amount: f64) {
        self.balance += amount;
    }

    pub fn balance_reset(&mut self) {
        self.balance = 0.0;
    }

    pub(crate) fn insert_holding(&mut self, state: StateId, id: HoldingId) {
        self.holdings.insert(state, id);
    }

    pub fn num_states(&self) -> usize {
        self.holdings.len()
    }

    pub fn holding_for(&self, state: StateId) -> Option<HoldingId> {
        self.holdings.get(&state).copied()
    }

    /// Held state ids in ascending order.
    pub fn held_states(&self) -> Vec<StateId> {
        self.holdings.keys().copied().collect()
    }

    /// (state, holding) pairs in ascending state order.
    pub fn holdings_entries(&self) -> Vec<(StateId, HoldingId)> {
        self.holdings.iter().map(|(s, h)| (*s, *h)).collect()
    }

    pub fn not_info(&self) -> &BTreeSet<StateId> {
        &self.not_info
    }

    /// True if the agent has been told this state will not realize.
    pub fn knows_unrealized(&self, state: StateId) -> bool {
        self.not_info.contains(&state)
    }

    /// Canonical backlog key for the current information context.
    pub fn backlog_key(&self) -> Vec<StateId> {
        self.not_info.iter().copied().collect()
    }

    pub fn uncertain(&self) -> &BTreeMap<StateId, f64> {
        &self.uncertain
    }

    pub fn is_uncertain(&self, state: StateId) -> bool {
        self.uncertain.contains_key(&state)
    }

    /// `C`: how many held states the agent is still uncertain about.
    pub fn uncertain_count(&self) -> usize {
        self.uncertain.len()
    }

    /// Replace the information sets. `uncertain` must be the held states
    /// outside `not_info` with their dividends; the population computes it.
    pub(crate) fn set_information(
        &mut self,
        not_info: BTreeSet<StateId>,
        uncertain: BTreeMap<StateId, f64>,
    ) {
        self.not_info = not_info;
        self.uncertain = uncertain;
    }

    /// Mark a state as resolved (used by the cross-security elimination
    /// heuristic). Returns whether the state was still uncertain.
    pub fn remove_uncertain(&mut self, state: StateId) -> bool {
        self.uncertain.remove(&state).is_some()
    }

    /// The dividend among uncertain states closest to `price`, ties broken
    /// by the lowest state id. `None` when nothing is uncertain.
    pub fn closest_dividend(&self, price: f64) -> Option<f64> {
        let mut best: Option<(f64, f64)> = None;
        for (_, &dividend) in &self.uncertain {
            let diff = (price - dividend).abs();
            match best {
                Some((best_diff, _)) if diff >= best_diff => {}
                _ => best = Some((diff, dividend)),
            }
        }
        best.map(|(_, dividend)| dividend)
    }
}
