//! Population arena.
//!
//! Owns every agent and every holding in contiguous storage. Markets and the
//! driver refer to holdings by [`HoldingId`] and to agents by arena index;
//! there are no back-references, so the simulation is the single owner of
//! the whole object graph.

use std::collections::{BTreeMap, BTreeSet};

use crate::intelligence::rescale_factor;

use super::{Agent, Holding, HoldingId, StateId};

#[derive(Debug, Default)]
pub struct Population {
    agents: Vec<Agent>,
    holdings: Vec<Holding>,
}

impl Population {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an agent holding one security per state in `states`. Holdings
    /// start empty (amount 0, aspiration 0); the per-period reset endows
    /// them and dividend assignment prices them.
    pub fn add_agent(&mut self, num: usize, states: &[StateId]) -> usize {
        let agent_idx = self.agents.len();
        let mut agent = Agent::new(num);
        for &state in states {
            let id = HoldingId(self.holdings.len());
            self.holdings.push(Holding::new(agent_idx, state));
            agent.insert_holding(state, id);
        }
        self.agents.push(agent);
        agent_idx
    }

    pub fn num_agents(&self) -> usize {
        self.agents.len()
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agent(&self, idx: usize) -> &Agent {
        &self.agents[idx]
    }

    pub fn agent_mut(&mut self, idx: usize) -> &mut Agent {
        &mut self.agents[idx]
    }

    pub fn holding(&self, id: HoldingId) -> &Holding {
        &self.holdings[id.0]
    }

    pub fn holding_mut(&mut self, id: HoldingId) -> &mut Holding {
        &mut self.holdings[id.0]
    }

    pub fn iter_holdings(&self) -> impl Iterator<Item = (HoldingId, &Holding)> {
        self.holdings
            .iter()
            .enumerate()
            .map(|(i, h)| (HoldingId(i), h))
    }

    /// Union of all held states, ascending.
    pub fn traded_states(&self) -> Vec<StateId> {
        let states: BTreeSet<StateId> = self.holdings.iter().map(|h| h.state()).collect();
        states.into_iter().collect()
    }

    /// Start-of-period reset: zero every balance and endow every holding
    /// with `endowment` more units.
    pub fn reset_balances_and_endow(&mut self, endowment: i64) {
        for agent in &mut self.agents {
            agent.balance_reset();
        }
        for holding in &mut self.holdings {
            holding.amount_add(endowment);
        }
    }

    /// Hand an agent its period information: `not_info` replaces the old
    /// set and `uncertain` is rebuilt as the held states outside it, each
    /// mapped to its dividend.
    pub fn give_not_info(&mut self, agent_idx: usize, not_info: BTreeSet<StateId>) {
        let uncertain: BTreeMap<StateId, f64> = self.agents[agent_idx]
            .holdings_entries()
            .into_iter()
            .filter(|(state, _)| !not_info.contains(state))
            .map(|(state, id)| (state, self.holdings[id.0].dividend()))
            .collect();
        self.agents[agent_idx].set_information(not_info, uncertain);
    }

    /// Cross-security elimination (representativeness variant 2).
    ///
    /// A falling streak on `state`'s market convinces the agent the state
    /// will not realize: it leaves `uncertain`, every other still-uncertain
    /// holding is rescaled up by `(C + 1) / C` clamped at its dividend, and
    /// the eliminated holding's aspiration drops to `min(epsilon, current)`.
    ///
    /// `C` is the post-removal count unless `rescale_uses_prior_count`
    /// selects the pre-removal reading. No-op when the state already left
    /// the uncertain set.
    pub fn eliminate_uncertain(
        &mut self,
        agent_idx: usize,
        state: StateId,
        epsilon: f64,
        rescale_uses_prior_count: bool,
    ) {
        let prior_count = self.agents[agent_idx].uncertain_count();
        if !self.agents[agent_idx].remove_uncertain(state) {
            return;
        }
        let count = if rescale_uses_prior_count {
            prior_count
        } else {
            prior_count - 1
        };
        if count > 0 {
            let factor = rescale_factor(count);
            let survivors: Vec<HoldingId> = self.agents[agent_idx]
                .uncertain()
                .keys()
                .filter_map(|s| self.agents[agent_idx].holding_for(*s))
                .collect();
            for id in survivors {
                let holding = &mut self.holdings[id.0];
                let rescaled = (holding.aspiration() * factor).min(holding.dividend());
                holding.set_aspiration(rescaled);
            }
        }
        if let Some(id) = self.agents[agent_idx].holding_for(state) {
            let holding = &mut self.holdings[id.0];
            let floored = holding.aspiration().min(epsilon);
            holding.set_aspiration(floored);
        }
    }

    /// Dividend matching (representativeness variant 3).
    ///
    /// The agent presumes the security whose dividend is closest to the
    /// latest transaction price is the realized one: that holding's
    /// aspiration jumps to its dividend (every holding sharing the closest
    /// dividend value does) and every other uncertain holding drops to 0.
    pub fn apply_dividend_matching(&mut self, agent_idx: usize, latest_price: f64) {
        let Some(closest) = self.agents[agent_idx].closest_dividend(latest_price) else {
            return;
        };
        let updates: Vec<(HoldingId, f64)> = self.agents[agent_idx]
            .uncertain()
            .iter()
            .filter_map(|(state, &dividend)| {
                let id = self.agents[agent_idx].holding_for(*state)?;
                let aspiration = if dividend == closest { dividend } else { 0.0 };
                Some((id, aspiration))
            })
            .collect();
        for (id, aspiration) in updates {
            self.holdings[id.0].set_aspiration(aspiration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two agents sharing state 0; agent 0 also holds states 1 and 2.
    fn two_agent_population() -> Population {
        let mut pop = Population::new();
        pop.add_agent(0, &[0, 1, 2]);
        pop.add_agent(1, &[0]);
        for id in pop.iter_holdings().map(|(id, _)| id).collect::<Vec<_>>() {
            pop.holding_mut(id).set_dividend(1.0);
        }
        pop
    }

    #[test]
    fn test_give_not_info_rebuilds_uncertain() {
        let mut pop = two_agent_population();
        pop.give_not_info(0, [1].into_iter().collect());

        let agent = pop.agent(0);
        assert!(agent.knows_unrealized(1));
        assert!(!agent.knows_unrealized(0));
        assert_eq!(agent.uncertain_count(), 2);
        assert_eq!(agent.uncertain().get(&0), Some(&1.0));
        assert_eq!(agent.uncertain().get(&2), Some(&1.0));
        assert!(agent.uncertain().get(&1).is_none());
    }

    #[test]
    fn test_endowment_accumulates_and_balances_zero() {
        let mut pop = two_agent_population();
        pop.agent_mut(0).balance_add(3.5);
        pop.reset_balances_and_endow(2);
        pop.reset_balances_and_endow(2);

        assert_eq!(pop.agent(0).balance(), 0.0);
        for (_, holding) in pop.iter_holdings() {
            assert_eq!(holding.amount(), 4);
        }
    }

    #[test]
    fn test_eliminate_uncertain_rescales_survivors() {
        // Two uncertain states, both at aspiration 0.4, C = 2. Eliminating
        // one leaves C = 1, so the survivor rescales by (1+1)/1 = 2.
        let mut pop = Population::new();
        pop.add_agent(0, &[0, 1]);
        let a = pop.agent(0).holding_for(0).unwrap();
        let b = pop.agent(0).holding_for(1).unwrap();
        pop.holding_mut(a).set_dividend(1.0);
        pop.holding_mut(b).set_dividend(1.0);
        pop.give_not_info(0, BTreeSet::new());
        pop.holding_mut(a).set_aspiration(0.4);
        pop.holding_mut(b).set_aspiration(0.4);

        pop.eliminate_uncertain(0, 0, 0.1, false);

        assert_eq!(pop.agent(0).uncertain_count(), 1);
        assert!(!pop.agent(0).is_uncertain(0));
        assert_eq!(pop.holding(b).aspiration(), 0.8);
        assert_eq!(pop.holding(a).aspiration(), 0.1);
    }

    #[test]
    fn test_eliminate_uncertain_clamps_at_dividend() {
        let mut pop = Population::new();
        pop.add_agent(0, &[0, 1]);
        let a = pop.agent(0).holding_for(0).unwrap();
        let b = pop.agent(0).holding_for(1).unwrap();
        pop.holding_mut(a).set_dividend(1.0);
        pop.holding_mut(b).set_dividend(0.5);
        pop.give_not_info(0, BTreeSet::new());
        pop.holding_mut(a).set_aspiration(0.4);
        pop.holding_mut(b).set_aspiration(0.4);

        pop.eliminate_uncertain(0, 0, 0.1, false);

        // 0.4 * 2 would be 0.8 but the dividend caps it at 0.5.
        assert_eq!(pop.holding(b).aspiration(), 0.5);
    }

    #[test]
    fn test_eliminate_uncertain_prior_count_reading() {
        let mut pop = Population::new();
        pop.add_agent(0, &[0, 1]);
        let a = pop.agent(0).holding_for(0).unwrap();
        let b = pop.agent(0).holding_for(1).unwrap();
        pop.holding_mut(a).set_dividend(1.0);
        pop.holding_mut(b).set_dividend(1.0);
        pop.give_not_info(0, BTreeSet::new());
        pop.holding_mut(b).set_aspiration(0.4);

        // Pre-removal C = 2, so the factor is (2+1)/2 = 1.5.
        pop.eliminate_uncertain(0, 0, 0.1, true);
        assert!((pop.holding(b).aspiration() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_eliminate_uncertain_noop_when_already_resolved() {
        let mut pop = two_agent_population();
        pop.give_not_info(0, BTreeSet::new());
        pop.eliminate_uncertain(0, 2, 0.1, false);
        let survivor = pop.agent(0).holding_for(0).unwrap();
        pop.holding_mut(survivor).set_aspiration(0.9);

        // Second elimination of the same state changes nothing.
        pop.eliminate_uncertain(0, 2, 0.1, false);
        assert_eq!(pop.holding(survivor).aspiration(), 0.9);
        assert_eq!(pop.agent(0).uncertain_count(), 2);
    }

    #[test]
    fn test_dividend_matching_sets_closest_and_zeroes_rest() {
        let mut pop = Population::new();
        pop.add_agent(0, &[0, 1, 2]);
        let dividends = [0.2, 0.6, 0.9];
        for (state, dividend) in dividends.into_iter().enumerate() {
            let id = pop.agent(0).holding_for(state).unwrap();
            pop.holding_mut(id).set_dividend(dividend);
        }
        pop.give_not_info(0, BTreeSet::new());

        pop.apply_dividend_matching(0, 0.55);

        let get = |pop: &Population, s: StateId| {
            let id = pop.agent(0).holding_for(s).unwrap();
            pop.holding(id).aspiration()
        };
        assert_eq!(get(&pop, 0), 0.0);
        assert_eq!(get(&pop, 1), 0.6);
        assert_eq!(get(&pop, 2), 0.0);
    }
}
