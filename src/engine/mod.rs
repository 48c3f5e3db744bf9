//! Large-World Driver
//!
//! Composes population construction, per-period information distribution,
//! randomized order generation, market clearing and dividend realization
//! into one deterministic pipeline. Exactly one iteration is processed at a
//! time; every random choice draws from the single seeded stream, so a run
//! is fully reproducible from its configuration and seed.

use std::collections::BTreeSet;

use anyhow::{ensure, Result};
use tracing::{debug, info};

use crate::config::{DividendScheme, MarketDiscipline, RepVariant, SimConfig};
use crate::intelligence::dividend_anchor;
use crate::market::{table::MarketTable, MarketParams};
use crate::persistence::{
    AgentSnapshotRow, AspirationRow, DividendRow, RealizationRow, RecordSink, SecurityBalanceRow,
};
use crate::rng::SimRng;
use crate::world::{Population, StateId};

pub struct LargeWorld<S: RecordSink> {
    config: SimConfig,
    population: Population,
    table: MarketTable,
    /// Union of all assigned states, ascending. Only these have markets.
    traded_states: Vec<StateId>,
    rng: SimRng,
    sink: S,
}

impl<S: RecordSink> LargeWorld<S> {
    /// Validate the configuration, build the population and the markets,
    /// assign dividends and log them. Nothing is published on error.
    pub fn new(config: SimConfig, sink: S) -> Result<Self> {
        config.validate()?;
        let mut rng = SimRng::seeded(config.seed);
        let mut sink = sink;
        let mut population = Population::new();

        if config.fix_num_states {
            // Each agent draws K distinct states.
            for agent_num in 0..config.num_agents {
                let states = rng.sample(config.num_states, config.states_per_agent);
                population.add_agent(agent_num, &states);
            }
        } else {
            // Each state goes to K distinct agents; agents left with no
            // states are excluded from the run.
            let mut assigned: Vec<Vec<StateId>> = vec![Vec::new(); config.num_agents];
            for state in 0..config.num_states {
                for agent_num in rng.sample(config.num_agents, config.states_per_agent) {
                    assigned[agent_num].push(state);
                }
            }
            for (agent_num, states) in assigned.iter().enumerate() {
                if !states.is_empty() {
                    population.add_agent(agent_num, states);
                }
            }
        }

        // Dividend assignment: agents in order, drawing from the next
        // non-exhausted trader-type bucket.
        let mut remaining = match &config.dividends {
            DividendScheme::Custom { counts, .. } => counts.clone(),
            DividendScheme::Homogeneous => Vec::new(),
        };
        let mut trader_type = 0usize;
        for agent_idx in 0..population.num_agents() {
            if let DividendScheme::Custom { .. } = &config.dividends {
                while remaining[trader_type] == 0 {
                    trader_type += 1;
                }
                remaining[trader_type] -= 1;
            }
            population.agent_mut(agent_idx).set_trader_type(trader_type);
            let agent_num = population.agent(agent_idx).num();
            for (state, id) in population.agent(agent_idx).holdings_entries() {
                let dividend = match &config.dividends {
                    DividendScheme::Custom { payoffs, .. } => payoffs[trader_type][state],
                    DividendScheme::Homogeneous => 1.0,
                };
                population.holding_mut(id).set_dividend(dividend);
                sink.dividend(&DividendRow {
                    agent: agent_num,
                    trader_type,
                    state,
                    dividend,
                })?;
            }
        }

        let traded_states = population.traded_states();
        let params = MarketParams {
            by_midpoint: config.by_midpoint,
            alpha: config.alpha,
            rep: config.rep,
        };
        let table = MarketTable::new(&traded_states, &population, &params);
        info!(
            "large world ready: {} agents trading {} states",
            population.num_agents(),
            traded_states.len()
        );

        Ok(Self {
            config,
            population,
            table,
            traded_states,
            rng,
            sink,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn market_table(&self) -> &MarketTable {
        &self.table
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Run every period and flush the sink.
    pub fn simulate(&mut self) -> Result<()> {
        info!(
            "starting simulation: {} periods of {} iterations",
            self.config.num_periods, self.config.iterations
        );
        for period in 0..self.config.num_periods {
            self.run_period(period)?;
            info!("finished running period {}", period);
        }
        self.sink.flush()?;
        info!(
            "simulation complete after {} random draws",
            self.rng.samples_drawn()
        );
        Ok(())
    }

    /// One full period: realization draw, endowment reset, information
    /// distribution, `i` market iterations, then payoffs and snapshots.
    pub fn run_period(&mut self, period: u64) -> Result<()> {
        ensure!(
            self.config.num_realized <= self.config.num_states,
            "r = {} states cannot realize out of S = {}",
            self.config.num_realized,
            self.config.num_states
        );
        // States outside every small world may still realize.
        let realized: BTreeSet<StateId> = self
            .rng
            .sample(self.config.num_states, self.config.num_realized)
            .into_iter()
            .collect();
        for state in 0..self.config.num_states {
            self.sink.realization(&RealizationRow {
                period,
                state,
                realized: realized.contains(&state),
            })?;
        }

        self.population
            .reset_balances_and_endow(self.config.endowment);
        self.give_minimal_intelligence(period, &realized)?;

        for t in 0..self.config.iterations {
            match self.config.discipline {
                MarketDiscipline::Continuous { pick_agent_first } => {
                    self.continuous_iteration(t, pick_agent_first)?;
                }
                MarketDiscipline::SemiSync { rho } => {
                    self.semisync_iteration(t, rho)?;
                }
            }
        }

        self.table.table_reset();
        self.realize_period(period, &realized)?;
        self.snapshot_agents(period)?;
        self.sink.checkpoint()?;
        debug!("period {} settled", period);
        Ok(())
    }

    /// Start-of-period information: each agent learns a random half of its
    /// unrealized states (`not_info`), then every holding's aspiration is
    /// initialized from 0, a matching backlog entry, or `dividend / C`.
    fn give_minimal_intelligence(
        &mut self,
        period: u64,
        realized: &BTreeSet<StateId>,
    ) -> Result<()> {
        for agent_idx in 0..self.population.num_agents() {
            let held = self.population.agent(agent_idx).held_states();
            let not_realized: Vec<StateId> = held
                .iter()
                .copied()
                .filter(|state| !realized.contains(state))
                .collect();
            let picks = self
                .rng
                .sample(not_realized.len(), not_realized.len() / 2);
            let not_info: BTreeSet<StateId> =
                picks.into_iter().map(|i| not_realized[i]).collect();
            self.population.give_not_info(agent_idx, not_info);

            let agent = self.population.agent(agent_idx);
            let agent_num = agent.num();
            let uncertain_count = agent.uncertain_count();
            let backlog_key = agent.backlog_key();
            for (state, id) in agent.holdings_entries() {
                let in_not_info = self.population.agent(agent_idx).knows_unrealized(state);
                let (start, from_backlog) = if in_not_info {
                    (0.0, false)
                } else {
                    let holding = self.population.holding(id);
                    let fallback = holding.dividend() / uncertain_count as f64;
                    if self.config.use_backlog {
                        match holding.backlog_lookup(&backlog_key) {
                            Some(learned) => (learned, true),
                            None => (fallback, false),
                        }
                    } else {
                        (fallback, false)
                    }
                };
                self.population.holding_mut(id).set_aspiration(start);
                self.sink.aspiration(&AspirationRow {
                    period,
                    agent: agent_num,
                    state,
                    uncertain_count,
                    start_aspiration: start,
                    from_not_info: in_not_info,
                    from_backlog,
                })?;
            }
        }
        Ok(())
    }

    /// Continuous discipline: one randomized (agent, security, bid/ask)
    /// action, cleared on arrival, then possibly the dividend-matching
    /// heuristic.
    fn continuous_iteration(&mut self, t: i64, pick_agent_first: bool) -> Result<()> {
        let holding = if pick_agent_first {
            let agent_idx = self.rng.index(self.population.num_agents());
            let entries = self.population.agent(agent_idx).holdings_entries();
            entries[self.rng.index(entries.len())].1
        } else {
            let state = self.traded_states[self.rng.index(self.traded_states.len())];
            let Some(market) = self.table.market(state) else {
                return Ok(());
            };
            let pick = self.rng.index(market.reserve().len());
            market.reserve()[pick]
        };

        let (aspiration, dividend) = {
            let h = self.population.holding(holding);
            (h.aspiration(), h.dividend())
        };
        if self.rng.coin() {
            let price = self.rng.uniform(0.0, aspiration);
            self.table
                .update_bidder(price, holding, t, &mut self.population, &mut self.sink)?;
        } else {
            let price = self.rng.uniform(aspiration, dividend);
            self.table
                .update_asker(price, holding, t, &mut self.population, &mut self.sink)?;
        }

        if let RepVariant::Three { threshold, p_max } = self.config.rep {
            if t > threshold {
                self.dividend_matching_round(p_max);
            }
        }
        Ok(())
    }

    /// Semi-synchronous discipline: possibly the min-price heuristic, then
    /// every agent quotes every holding, then one clearing sweep.
    fn semisync_iteration(&mut self, t: i64, rho: f64) -> Result<()> {
        let draw = self.rng.unit();
        let gate = self.rng.unit() * rho;
        if let RepVariant::Three { threshold, .. } = self.config.rep {
            if t > threshold && draw > gate {
                let agent_idx = self.rng.index(self.population.num_agents());
                self.min_price_heuristic(agent_idx);
            }
        }

        for agent_idx in 0..self.population.num_agents() {
            for (_, holding) in self.population.agent(agent_idx).holdings_entries() {
                let price = self.rng.unit();
                let aspiration = self.population.holding(holding).aspiration();
                if price > aspiration {
                    self.table.quote_ask(price, holding, t, &self.population);
                } else {
                    self.table.quote_bid(price, holding, t, &self.population);
                }
            }
        }
        self.table
            .table_market_make(t, &mut self.population, &mut self.sink)
    }

    /// Dividend matching (variant 3): one probability cap for the round,
    /// one draw per agent against it.
    fn dividend_matching_round(&mut self, p_max: f64) {
        let probability = self.rng.uniform(0.0, p_max);
        for agent_idx in 0..self.population.num_agents() {
            let latest = self.table.latest_price();
            let draw = self.rng.unit();
            if draw < probability {
                if let Some(price) = latest {
                    self.population.apply_dividend_matching(agent_idx, price);
                }
            }
        }
    }

    /// Min-price heuristic for the semi-synchronous discipline: the chosen
    /// agent reads the price floors of its still-possible states; the
    /// states at the lowest floor are presumed unrealized (aspiration 0),
    /// the rest jump to their dividend.
    fn min_price_heuristic(&mut self, agent_idx: usize) {
        let entries = self.population.agent(agent_idx).holdings_entries();
        let mut lowest = 1.0f64;
        for (state, _) in &entries {
            if self.population.agent(agent_idx).knows_unrealized(*state) {
                continue;
            }
            lowest = lowest.min(self.table.market_min_price(*state));
        }
        for (state, holding) in entries {
            if self.population.agent(agent_idx).knows_unrealized(state) {
                continue;
            }
            let aspiration = if self.table.market_min_price(state) == lowest {
                0.0
            } else {
                self.population.holding(holding).dividend()
            };
            self.population.holding_mut(holding).set_aspiration(aspiration);
        }
    }

    /// Period end: log every position, credit dividends on realized
    /// states, update the aspiration backlog under the period's information
    /// context, and clear all amounts.
    fn realize_period(&mut self, period: u64, realized: &BTreeSet<StateId>) -> Result<()> {
        let beta = self.config.beta;
        let use_backlog = self.config.use_backlog;
        for agent_idx in 0..self.population.num_agents() {
            let agent_num = self.population.agent(agent_idx).num();
            let backlog_key = self.population.agent(agent_idx).backlog_key();
            for (state, id) in self.population.agent(agent_idx).holdings_entries() {
                let (amount, dividend, aspiration) = {
                    let h = self.population.holding(id);
                    (h.amount(), h.dividend(), h.aspiration())
                };
                let is_realized = realized.contains(&state);
                let payout = if is_realized {
                    amount as f64 * dividend
                } else {
                    0.0
                };
                self.sink.security_balance(&SecurityBalanceRow {
                    period,
                    agent: agent_num,
                    state,
                    amount,
                    dividend,
                    payout,
                    realized: is_realized,
                })?;
                if is_realized {
                    self.population.agent_mut(agent_idx).balance_add(payout);
                }
                if use_backlog {
                    let anchor_target = if is_realized { dividend } else { 0.0 };
                    let learned = dividend_anchor(aspiration, anchor_target, beta);
                    self.population
                        .holding_mut(id)
                        .backlog_update(backlog_key.clone(), learned);
                }
                self.population.holding_mut(id).amount_reset();
            }
        }
        Ok(())
    }

    fn snapshot_agents(&mut self, period: u64) -> Result<()> {
        for agent in self.population.agents() {
            self.sink.agent_snapshot(&AgentSnapshotRow {
                period,
                agent: agent.num(),
                num_states: agent.num_states(),
                balance: agent.balance(),
                states_csv: csv(agent.held_states()),
                not_info_csv: csv(agent.not_info().iter().copied()),
                uncertain_count: agent.uncertain_count(),
            })?;
        }
        Ok(())
    }
}

fn csv(ids: impl IntoIterator<Item = StateId>) -> String {
    ids.into_iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
