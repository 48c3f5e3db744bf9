//! Per-Security Double Auction
//!
//! One market per state id. The book holds at most one best bid and one
//! best ask; a cross moves exactly one unit, logs the transaction, updates
//! every participant's aspiration, and resets the book. Period-scoped
//! records (price history, pattern signs, min-price watermark, transaction
//! counter) survive clears and reset only at the period boundary.

pub mod table;

use anyhow::Result;
use tracing::debug;

use crate::config::RepVariant;
use crate::intelligence::{detect_pattern, pattern_adjust, price_anchor, Pattern};
use crate::persistence::{RecordSink, TransactionRow};
use crate::world::{HoldingId, Population, StateId};

/// Clearing mechanics shared by every market in a table.
#[derive(Debug, Clone)]
pub struct MarketParams {
    /// Clear at the bid-ask midpoint; otherwise at the earlier order's
    /// price.
    pub by_midpoint: bool,
    /// Post-transaction price anchoring weight.
    pub alpha: f64,
    pub rep: RepVariant,
}

pub struct Market {
    state: StateId,
    params: MarketParams,
    /// Every holding of this state across the population; aspiration
    /// updates broadcast here after a clear.
    reserve: Vec<HoldingId>,

    bid: f64,
    ask: f64,
    bidder: Option<HoldingId>,
    asker: Option<HoldingId>,
    bidder_time: i64,
    asker_time: i64,

    num_transactions: u64,
    period_num: u64,
    price_history: Vec<f64>,
    price_pattern: Vec<i8>,
    min_price: f64,
}

impl Market {
    pub fn new(state: StateId, params: MarketParams) -> Self {
        Self {
            state,
            params,
            reserve: Vec::new(),
            bid: 0.0,
            ask: 1.0,
            bidder: None,
            asker: None,
            bidder_time: -1,
            asker_time: -1,
            num_transactions: 0,
            period_num: 0,
            price_history: Vec::new(),
            price_pattern: Vec::new(),
            min_price: 1.0,
        }
    }

    pub fn state(&self) -> StateId {
        self.state
    }

    pub fn reserve_add(&mut self, holding: HoldingId) {
        self.reserve.push(holding);
    }

    pub fn reserve(&self) -> &[HoldingId] {
        &self.reserve
    }

    pub fn best_bid(&self) -> f64 {
        self.bid
    }

    pub fn best_ask(&self) -> f64 {
        self.ask
    }

    pub fn bidder(&self) -> Option<HoldingId> {
        self.bidder
    }

    pub fn asker(&self) -> Option<HoldingId> {
        self.asker
    }

    pub fn num_transactions(&self) -> u64 {
        self.num_transactions
    }

    pub fn period_num(&self) -> u64 {
        self.period_num
    }

    pub fn price_history(&self) -> &[f64] {
        &self.price_history
    }

    pub fn price_pattern(&self) -> &[i8] {
        &self.price_pattern
    }

    /// Lowest transaction price seen this period (1 when none).
    pub fn min_price(&self) -> f64 {
        self.min_price
    }

    /// Record a bid without attempting to clear (semi-synchronous
    /// discipline). Accepted only when it beats the standing bid or none
    /// exists.
    pub fn quote_bid(&mut self, price: f64, bidder: HoldingId, t: i64) -> bool {
        if self.bidder.is_none() || price > self.bid {
            self.bid = price;
            self.bidder = Some(bidder);
            self.bidder_time = t;
            true
        } else {
            false
        }
    }

    /// Record an ask without attempting to clear. The asker must hold at
    /// least one unit; accepted only when it undercuts the standing ask or
    /// none exists.
    pub fn quote_ask(&mut self, price: f64, asker: HoldingId, t: i64, pop: &Population) -> bool {
        if pop.holding(asker).amount() <= 0 {
            return false;
        }
        if self.asker.is_none() || price < self.ask {
            self.ask = price;
            self.asker = Some(asker);
            self.asker_time = t;
            true
        } else {
            false
        }
    }

    /// Continuous-discipline entry point: place the bid and clear
    /// immediately if it crosses. Returns the clearing price, if any.
    pub fn update_bidder(
        &mut self,
        price: f64,
        bidder: HoldingId,
        t: i64,
        pop: &mut Population,
        sink: &mut dyn RecordSink,
    ) -> Result<Option<f64>> {
        if self.quote_bid(price, bidder, t) {
            self.try_clear(t, pop, sink)
        } else {
            Ok(None)
        }
    }

    /// Continuous-discipline entry point for asks.
    pub fn update_asker(
        &mut self,
        price: f64,
        asker: HoldingId,
        t: i64,
        pop: &mut Population,
        sink: &mut dyn RecordSink,
    ) -> Result<Option<f64>> {
        if self.quote_ask(price, asker, t, pop) {
            self.try_clear(t, pop, sink)
        } else {
            Ok(None)
        }
    }

    /// Clear one unit if a bid and an ask from different holdings cross.
    ///
    /// On a clear: transfer the unit and the cash, log the transaction,
    /// extend the price history and pattern signs, and re-anchor the
    /// aspiration of every reserve holding whose owner is not already sure
    /// this state is unrealized; a detected streak then applies the
    /// configured representativeness adjustment. The book resets, the
    /// period-scoped records do not.
    pub fn try_clear(
        &mut self,
        t: i64,
        pop: &mut Population,
        sink: &mut dyn RecordSink,
    ) -> Result<Option<f64>> {
        let (bidder, asker) = match (self.bidder, self.asker) {
            (Some(bidder), Some(asker)) => (bidder, asker),
            _ => return Ok(None),
        };
        if bidder == asker || self.bid < self.ask {
            return Ok(None);
        }

        let price = if self.params.by_midpoint {
            (self.bid + self.ask) / 2.0
        } else if self.bidder_time < self.asker_time {
            self.bid
        } else {
            self.ask
        };
        if price < self.min_price {
            self.min_price = price;
        }

        // One unit and its cash change hands.
        let buyer = pop.holding(bidder).agent();
        let seller = pop.holding(asker).agent();
        pop.agent_mut(seller).balance_add(price);
        pop.agent_mut(buyer).balance_add(-price);
        pop.holding_mut(asker).amount_add(-1);
        pop.holding_mut(bidder).amount_add(1);

        sink.transaction(&TransactionRow {
            period: self.period_num,
            iteration: t,
            state: self.state,
            tx_index: self.num_transactions,
            buyer: pop.agent(buyer).num(),
            seller: pop.agent(seller).num(),
            price,
            bid_arrived_later: self.bidder_time > self.asker_time,
            bid: self.bid,
            buyer_aspiration: pop.holding(bidder).aspiration(),
            ask: self.ask,
            seller_aspiration: pop.holding(asker).aspiration(),
            spread: self.bid - self.ask,
        })?;
        self.num_transactions += 1;

        if let Some(&previous) = self.price_history.last() {
            let sign = if previous < price {
                1
            } else if previous > price {
                -1
            } else {
                0
            };
            self.price_pattern.push(sign);
        }
        self.price_history.push(price);

        let pattern = match self.params.rep {
            RepVariant::One { phi, .. } | RepVariant::Two { phi, .. } => {
                detect_pattern(phi, &self.price_pattern)
            }
            // Variant 3 reacts to the latest price at the driver level, not
            // to per-market streaks.
            RepVariant::Three { .. } => Pattern::None,
        };

        for &holding in &self.reserve {
            let owner = pop.holding(holding).agent();
            if pop.agent(owner).knows_unrealized(self.state) {
                continue;
            }
            let anchored = price_anchor(pop.holding(holding).aspiration(), price, self.params.alpha);
            pop.holding_mut(holding).set_aspiration(anchored);
            match self.params.rep {
                RepVariant::One { epsilon, .. } => {
                    let dividend = pop.holding(holding).dividend();
                    let adjusted = pattern_adjust(anchored, dividend, epsilon, pattern);
                    pop.holding_mut(holding).set_aspiration(adjusted);
                }
                RepVariant::Two {
                    epsilon,
                    rescale_uses_prior_count,
                    ..
                } => {
                    if pattern == Pattern::Falling {
                        pop.eliminate_uncertain(owner, self.state, epsilon, rescale_uses_prior_count);
                    }
                }
                RepVariant::Three { .. } => {}
            }
        }

        self.book_reset(t);
        debug!(
            "market {} cleared one unit at {:.4} (t = {})",
            self.state, price, t
        );
        Ok(Some(price))
    }

    /// Reset the book after a clear. Period-scoped records are untouched.
    fn book_reset(&mut self, t: i64) {
        self.bid = 0.0;
        self.ask = 1.0;
        self.bidder = None;
        self.asker = None;
        self.bidder_time = t;
        self.asker_time = t;
    }

    /// Period-boundary reset: book, counter, history, pattern signs and the
    /// min-price watermark all clear; the period counter advances.
    pub fn period_reset(&mut self) {
        self.book_reset(-1);
        self.num_transactions = 0;
        self.price_history.clear();
        self.price_pattern.clear();
        self.min_price = 1.0;
        self.period_num += 1;
    }
}
