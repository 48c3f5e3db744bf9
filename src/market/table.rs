//! Market table: one double auction per traded state.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::persistence::RecordSink;
use crate::world::{HoldingId, Population, StateId};

use super::{Market, MarketParams};

/// Maps every traded state to its market and fans orders to the right one.
/// Iteration over markets is always in ascending state order, which fixes
/// the clearing order of the semi-synchronous discipline.
pub struct MarketTable {
    table: BTreeMap<StateId, Market>,
    latest_price: Option<f64>,
}

impl MarketTable {
    /// One market per state in `states`; every holding of that state joins
    /// its market's reserve.
    pub fn new(states: &[StateId], pop: &Population, params: &MarketParams) -> Self {
        let mut table = BTreeMap::new();
        for &state in states {
            table.insert(state, Market::new(state, params.clone()));
        }
        for (id, holding) in pop.iter_holdings() {
            if let Some(market) = table.get_mut(&holding.state()) {
                market.reserve_add(id);
            }
        }
        Self {
            table,
            latest_price: None,
        }
    }

    pub fn market(&self, state: StateId) -> Option<&Market> {
        self.table.get(&state)
    }

    /// Price of the most recent successful clear in the current period,
    /// across all markets.
    pub fn latest_price(&self) -> Option<f64> {
        self.latest_price
    }

    /// Min-price watermark of one market (1 when the state has no market or
    /// no transaction yet).
    pub fn market_min_price(&self, state: StateId) -> f64 {
        self.table.get(&state).map_or(1.0, Market::min_price)
    }

    /// Continuous-discipline bid: dispatch and clear if it crosses.
    pub fn update_bidder(
        &mut self,
        price: f64,
        bidder: HoldingId,
        t: i64,
        pop: &mut Population,
        sink: &mut dyn RecordSink,
    ) -> Result<Option<f64>> {
        let state = pop.holding(bidder).state();
        let Some(market) = self.table.get_mut(&state) else {
            return Ok(None);
        };
        let cleared = market.update_bidder(price, bidder, t, pop, sink)?;
        if cleared.is_some() {
            self.latest_price = cleared;
        }
        Ok(cleared)
    }

    /// Continuous-discipline ask: dispatch and clear if it crosses.
    pub fn update_asker(
        &mut self,
        price: f64,
        asker: HoldingId,
        t: i64,
        pop: &mut Population,
        sink: &mut dyn RecordSink,
    ) -> Result<Option<f64>> {
        let state = pop.holding(asker).state();
        let Some(market) = self.table.get_mut(&state) else {
            return Ok(None);
        };
        let cleared = market.update_asker(price, asker, t, pop, sink)?;
        if cleared.is_some() {
            self.latest_price = cleared;
        }
        Ok(cleared)
    }

    /// Semi-synchronous bid: book update only, no clearing.
    pub fn quote_bid(&mut self, price: f64, bidder: HoldingId, t: i64, pop: &Population) -> bool {
        let state = pop.holding(bidder).state();
        match self.table.get_mut(&state) {
            Some(market) => market.quote_bid(price, bidder, t),
            None => false,
        }
    }

    /// Semi-synchronous ask: book update only, no clearing.
    pub fn quote_ask(&mut self, price: f64, asker: HoldingId, t: i64, pop: &Population) -> bool {
        let state = pop.holding(asker).state();
        match self.table.get_mut(&state) {
            Some(market) => market.quote_ask(price, asker, t, pop),
            None => false,
        }
    }

    /// End-of-iteration clearing sweep: every market tries to clear once,
    /// in state order.
    pub fn table_market_make(
        &mut self,
        t: i64,
        pop: &mut Population,
        sink: &mut dyn RecordSink,
    ) -> Result<()> {
        for market in self.table.values_mut() {
            if let Some(price) = market.try_clear(t, pop, sink)? {
                self.latest_price = Some(price);
            }
        }
        Ok(())
    }

    /// Period-boundary reset of every market and of the latest price.
    pub fn table_reset(&mut self) {
        for market in self.table.values_mut() {
            market.period_reset();
        }
        self.latest_price = None;
    }
}
