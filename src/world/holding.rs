//! Per-(agent, state) security holding.

use std::collections::HashMap;

use super::StateId;

/// Index of a holding in the population arena. Markets and agents refer to
/// holdings only through this id; the arena is the single owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HoldingId(pub usize);

/// One agent's position in one state-contingent security: how many units it
/// holds, what it currently believes a unit is worth (its aspiration), the
/// dividend a unit pays if the state realizes, and a backlog of aspirations
/// learned in past periods, keyed by the information context they were
/// learned under.
#[derive(Debug, Clone)]
pub struct Holding {
    agent: usize,
    state: StateId,
    amount: i64,
    aspiration: f64,
    dividend: f64,
    backlog: HashMap<Vec<StateId>, f64>,
}

impl Holding {
    pub fn new(agent: usize, state: StateId) -> Self {
        Self {
            agent,
            state,
            amount: 0,
            aspiration: 0.0,
            dividend: 0.0,
            backlog: HashMap::new(),
        }
    }

    /// Arena index of the owning agent.
    pub fn agent(&self) -> usize {
        self.agent
    }

    pub fn state(&self) -> StateId {
        self.state
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    pub fn amount_add(&mut self, delta: i64) {
        self.amount += delta;
    }

    pub fn amount_reset(&mut self) {
        self.amount = 0;
    }

    pub fn aspiration(&self) -> f64 {
        self.aspiration
    }

    pub fn set_aspiration(&mut self, aspiration: f64) {
        self.aspiration = aspiration;
    }

    pub fn dividend(&self) -> f64 {
        self.dividend
    }

    /// Dividend payoffs are assigned once, right after population
    /// construction, before any trading.
    pub fn set_dividend(&mut self, dividend: f64) {
        self.dividend = dividend;
    }

    /// Look up the aspiration learned under the exact same information
    /// context in an earlier period. The key is the canonical (sorted)
    /// form of the agent's `not_info` set.
    pub fn backlog_lookup(&self, key: &[StateId]) -> Option<f64> {
        self.backlog.get(key).copied()
    }

    /// Overwrite the backlog entry for the given information context.
    pub fn backlog_update(&mut self, key: Vec<StateId>, aspiration: f64) {
        self.backlog.insert(key, aspiration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backlog_keyed_by_exact_context() {
        let mut h = Holding::new(0, 3);
        h.backlog_update(vec![1, 4], 0.7);

        assert_eq!(h.backlog_lookup(&[1, 4]), Some(0.7));
        assert_eq!(h.backlog_lookup(&[1]), None);
        assert_eq!(h.backlog_lookup(&[]), None);

        // Same context overwrites, it does not accumulate.
        h.backlog_update(vec![1, 4], 0.2);
        assert_eq!(h.backlog_lookup(&[1, 4]), Some(0.2));
    }

    #[test]
    fn test_amount_bookkeeping() {
        let mut h = Holding::new(0, 0);
        h.amount_add(5);
        h.amount_add(-2);
        assert_eq!(h.amount(), 3);
        h.amount_reset();
        assert_eq!(h.amount(), 0);
    }
}
