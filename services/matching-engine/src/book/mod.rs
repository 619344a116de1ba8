//! Order book — price-time-priority matching per asset pair
//!
//! The book is a pure state machine: the owner feeds it placements and
//! cancels, it returns executions and resulting statuses. Buckets (tick
//! aggregation) gate *whether* two orders cross; execution always settles
//! at the resting maker's individual price.

pub mod price_level;
pub mod side;

use crate::rules::TickSize;
use serde::{Deserialize, Serialize};
use side::BookSide;
use types::numeric::{prorated_fee, snap_to_step};
use types::order::{Order, OrderId, OrderSide, OrderStatus};
use types::trade::{ExchangeTransaction, LastTrade};
use types::AssetPair;

/// A resting order together with its unexecuted remainders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitOrder {
    pub order: Order,
    /// Monotonically non-increasing; never exceeds `order.amount`.
    pub amount_remaining: u64,
    pub fee_remaining: u64,
}

impl LimitOrder {
    pub fn new(order: Order) -> Self {
        let amount_remaining = order.amount;
        let fee_remaining = order.matcher_fee;
        Self {
            order,
            amount_remaining,
            fee_remaining,
        }
    }

    pub fn filled(&self) -> u64 {
        self.order.amount - self.amount_remaining
    }

    pub fn filled_fee(&self) -> u64 {
        self.order.matcher_fee - self.fee_remaining
    }

    /// Status of this order as it rests: never terminal.
    pub fn resting_status(&self) -> OrderStatus {
        if self.filled() > 0 {
            OrderStatus::PartiallyFilled {
                filled: self.filled(),
                filled_fee: self.filled_fee(),
            }
        } else {
            OrderStatus::Accepted
        }
    }

    fn closed_status(&self) -> OrderStatus {
        OrderStatus::Filled {
            filled: self.filled(),
            filled_fee: self.filled_fee(),
        }
    }

    fn cancelled_status(&self) -> OrderStatus {
        OrderStatus::Cancelled {
            filled: self.filled(),
            filled_fee: self.filled_fee(),
        }
    }
}

/// Aggregated amount at one price bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSummary {
    pub price: u64,
    pub amount: u64,
}

/// Published per-pair market view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MarketStatus {
    pub last_trade: Option<LastTrade>,
    pub best_bid: Option<LevelSummary>,
    pub best_ask: Option<LevelSummary>,
}

/// One side of a single crossing.
#[derive(Debug, Clone)]
pub struct FillSide {
    pub order: Order,
    /// Fee charged for this fill (prorated, clamped).
    pub fee: u64,
    /// Status of the order immediately after this fill.
    pub status: OrderStatus,
}

/// One crossing between the incoming taker and a resting maker.
#[derive(Debug, Clone)]
pub struct Execution {
    pub amount: u64,
    /// Execution price: the maker's individual price.
    pub price: u64,
    pub maker: FillSide,
    pub taker: FillSide,
}

impl Execution {
    /// Build the settlement transaction for this crossing.
    pub fn to_exchange_transaction(&self, timestamp: u64) -> ExchangeTransaction {
        let (buy, buy_fee, sell, sell_fee) = match self.taker.order.side {
            OrderSide::Buy => (
                self.taker.order.clone(),
                self.taker.fee,
                self.maker.order.clone(),
                self.maker.fee,
            ),
            OrderSide::Sell => (
                self.maker.order.clone(),
                self.maker.fee,
                self.taker.order.clone(),
                self.taker.fee,
            ),
        };
        ExchangeTransaction::new(buy, sell, self.amount, self.price, buy_fee, sell_fee, timestamp)
    }
}

/// Result of a placement.
#[derive(Debug, Clone)]
pub struct PlaceOutcome {
    pub executions: Vec<Execution>,
    /// Final status of the incoming order after matching.
    pub taker_status: OrderStatus,
    /// Whether a remainder rests on the book.
    pub rested: bool,
}

/// Result of a cancel.
#[derive(Debug, Clone)]
pub struct CancelOutcome {
    pub order: Order,
    pub status: OrderStatus,
}

/// Per-pair limit order book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBook {
    pair: AssetPair,
    bids: BookSide,
    asks: BookSide,
    last_trade: Option<LastTrade>,
    aggregation: TickSize,
}

impl OrderBook {
    pub fn new(pair: AssetPair) -> Self {
        Self {
            pair,
            bids: BookSide::new(OrderSide::Buy),
            asks: BookSide::new(OrderSide::Sell),
            last_trade: None,
            aggregation: TickSize::Disabled,
        }
    }

    pub fn pair(&self) -> &AssetPair {
        &self.pair
    }

    pub fn aggregation(&self) -> TickSize {
        self.aggregation
    }

    pub fn last_trade(&self) -> Option<LastTrade> {
        self.last_trade
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    pub fn contains(&self, id: &OrderId) -> bool {
        self.bids.contains(id) || self.asks.contains(id)
    }

    pub fn market_status(&self) -> MarketStatus {
        MarketStatus {
            last_trade: self.last_trade,
            best_bid: self.bids.best(),
            best_ask: self.asks.best(),
        }
    }

    /// Aggregated depth per side, best bucket first.
    pub fn depth(&self, limit: usize) -> (Vec<LevelSummary>, Vec<LevelSummary>) {
        (self.bids.depth(limit), self.asks.depth(limit))
    }

    /// Place an order, matching it against the opposite side.
    ///
    /// `min_amount` and `step_amount` are the pair's minimum fill and
    /// amount step. Executed amount per crossing is the smaller remainder
    /// snapped onto the step grid with round-half-to-even (stepped back
    /// down when a tie rounds past what both sides can trade), so
    /// step-aligned remainders stay on the grid across partial fills. A
    /// snap below `min_amount` instead closes the smaller order at its
    /// exact remainder, and a *surviving* remainder below `min_amount`
    /// closes that order at its exact filled total; either way no dust
    /// rests on the book. Fee per fill is
    /// `ceil(matcher_fee * executed / amount)`, clamped by the fee
    /// remainder, so fill fees sum to at most `matcher_fee`.
    pub fn place(&mut self, order: Order, min_amount: u64, step_amount: u64) -> PlaceOutcome {
        let min_amount = min_amount.max(1);
        let mut taker = LimitOrder::new(order);
        let tick = self.aggregation;
        let taker_side = taker.order.side;
        let taker_bucket = tick.bucket(taker_side, taker.order.price);
        let mut executions = Vec::new();

        let opposite = match taker_side {
            OrderSide::Buy => &mut self.asks,
            OrderSide::Sell => &mut self.bids,
        };

        while taker.amount_remaining > 0 {
            let Some(best) = opposite.best_bucket() else {
                break;
            };
            let crosses = match taker_side {
                OrderSide::Buy => best <= taker_bucket,
                OrderSide::Sell => best >= taker_bucket,
            };
            if !crosses {
                break;
            }

            let (bucket, level) = opposite
                .best_level_mut()
                .expect("a present best bucket has a level");
            let maker = level.front_mut().expect("levels are never empty");

            let raw = taker.amount_remaining.min(maker.amount_remaining);
            let mut amount = snap_to_step(raw, step_amount);
            if amount > raw {
                amount -= step_amount;
            }
            if amount < min_amount {
                // Snapping would leave dust; the smaller order closes at
                // its exact remainder and the other side absorbs the
                // difference.
                amount = raw;
            }
            let maker_fee = prorated_fee(maker.order.matcher_fee, amount, maker.order.amount)
                .min(maker.fee_remaining);
            let taker_fee = prorated_fee(taker.order.matcher_fee, amount, taker.order.amount)
                .min(taker.fee_remaining);

            maker.amount_remaining -= amount;
            maker.fee_remaining -= maker_fee;
            taker.amount_remaining -= amount;
            taker.fee_remaining -= taker_fee;

            let price = maker.order.price;
            let maker_closed = maker.amount_remaining < min_amount;
            let maker_status = if maker_closed {
                maker.closed_status()
            } else {
                maker.resting_status()
            };
            let taker_status = if taker.amount_remaining == 0 {
                taker.closed_status()
            } else {
                OrderStatus::PartiallyFilled {
                    filled: taker.filled(),
                    filled_fee: taker.filled_fee(),
                }
            };

            executions.push(Execution {
                amount,
                price,
                maker: FillSide {
                    order: maker.order.clone(),
                    fee: maker_fee,
                    status: maker_status,
                },
                taker: FillSide {
                    order: taker.order.clone(),
                    fee: taker_fee,
                    status: taker_status,
                },
            });

            if maker_closed {
                level.pop_front();
            }
            opposite.prune(bucket);

            self.last_trade = Some(LastTrade {
                amount,
                price,
                side: taker_side,
            });
        }

        let (taker_status, rested) = if taker.amount_remaining == 0 {
            (taker.closed_status(), false)
        } else if taker.amount_remaining >= min_amount {
            let status = taker.resting_status();
            let own = match taker_side {
                OrderSide::Buy => &mut self.bids,
                OrderSide::Sell => &mut self.asks,
            };
            own.insert(taker_bucket, taker);
            (status, true)
        } else if taker.filled() > 0 {
            // Sub-minimum remainder after matching: close out, release dust.
            (taker.closed_status(), false)
        } else {
            (taker.cancelled_status(), false)
        };

        PlaceOutcome {
            executions,
            taker_status,
            rested,
        }
    }

    /// Remove a resting order.
    pub fn cancel(&mut self, id: &OrderId) -> Option<CancelOutcome> {
        let removed = self
            .bids
            .remove_order(id)
            .or_else(|| self.asks.remove_order(id))?;
        Some(CancelOutcome {
            status: removed.cancelled_status(),
            order: removed.order,
        })
    }

    /// Switch the aggregation rule, re-projecting every resting order onto
    /// the new buckets. Order identity, remainders and time priority are
    /// untouched; nothing is cancelled.
    pub fn set_aggregation(&mut self, tick: TickSize) {
        let tick = tick.normalized();
        if tick == self.aggregation {
            return;
        }
        self.aggregation = tick;
        for order in self.bids.drain_all() {
            let bucket = tick.bucket(OrderSide::Buy, order.order.price);
            self.bids.insert(bucket, order);
        }
        for order in self.asks.drain_all() {
            let bucket = tick.bucket(OrderSide::Sell, order.order.price);
            self.asks.insert(bucket, order);
        }
    }

    /// Every resting order, bids first, in canonical order. Used to
    /// re-establish reservations after a restore and to cancel everything
    /// when a book is deleted.
    pub fn resting_orders(&self) -> Vec<LimitOrder> {
        self.bid_orders().chain(self.ask_orders()).cloned().collect()
    }

    // Canonical-order access for the snapshot codec.

    pub(crate) fn bid_orders(&self) -> impl Iterator<Item = &LimitOrder> {
        self.bids.iter_orders()
    }

    pub(crate) fn ask_orders(&self) -> impl Iterator<Item = &LimitOrder> {
        self.asks.iter_orders()
    }

    pub(crate) fn order_counts(&self) -> (usize, usize) {
        (self.bids.order_count(), self.asks.order_count())
    }

    /// Rebuild a book from restored parts. Orders are bucketed under
    /// `aggregation`.
    pub(crate) fn restore(
        pair: AssetPair,
        aggregation: TickSize,
        bids: Vec<LimitOrder>,
        asks: Vec<LimitOrder>,
        last_trade: Option<LastTrade>,
    ) -> Self {
        let mut book = Self::new(pair);
        book.aggregation = aggregation.normalized();
        for order in bids {
            let bucket = book.aggregation.bucket(OrderSide::Buy, order.order.price);
            book.bids.insert(bucket, order);
        }
        for order in asks {
            let bucket = book.aggregation.bucket(OrderSide::Sell, order.order.price);
            book.asks.insert(bucket, order);
        }
        book.last_trade = last_trade;
        book
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use types::asset::{Asset, AssetId};
    use types::PRICE_CONSTANT;

    fn pair() -> AssetPair {
        AssetPair::new(Asset::Issued(AssetId::new([0xaa; 32])), Asset::Native)
    }

    fn signed(seed: u8, side: OrderSide, amount: u64, price: u64, fee: u64, ts: u64) -> Order {
        let key = SigningKey::from_bytes(&[seed; 32]);
        Order::new_signed(
            &key,
            pair(),
            side,
            amount,
            price,
            fee,
            Asset::Native,
            ts,
            ts + 60_000,
            3,
        )
    }

    fn assert_not_crossed(book: &OrderBook) {
        let status = book.market_status();
        if let (Some(bid), Some(ask)) = (status.best_bid, status.best_ask) {
            assert!(bid.price < ask.price, "crossed book: {} >= {}", bid.price, ask.price);
        }
    }

    #[test]
    fn test_simple_cross_partial_maker() {
        let mut book = OrderBook::new(pair());

        let sell = signed(1, OrderSide::Sell, 100, 2 * PRICE_CONSTANT, 300_000, 1_000);
        let sell_id = sell.id;
        let outcome = book.place(sell, 1, 1);
        assert!(outcome.executions.is_empty());
        assert!(outcome.rested);
        assert_eq!(outcome.taker_status, OrderStatus::Accepted);

        let buy = signed(2, OrderSide::Buy, 60, 3 * PRICE_CONSTANT, 300_000, 2_000);
        let outcome = book.place(buy, 1, 1);

        assert_eq!(outcome.executions.len(), 1);
        let exec = &outcome.executions[0];
        assert_eq!(exec.amount, 60);
        assert_eq!(exec.price, 2 * PRICE_CONSTANT, "executes at maker price");
        assert_eq!(
            exec.maker.status,
            OrderStatus::PartiallyFilled {
                filled: 60,
                filled_fee: 180_000
            }
        );
        assert_eq!(
            exec.taker.status,
            OrderStatus::Filled {
                filled: 60,
                filled_fee: 300_000
            }
        );
        assert_eq!(
            outcome.taker_status,
            OrderStatus::Filled {
                filled: 60,
                filled_fee: 300_000
            }
        );
        assert!(!outcome.rested);

        // S1 rests with 40 remaining; no bids.
        let status = book.market_status();
        assert_eq!(
            status.best_ask,
            Some(LevelSummary {
                price: 2 * PRICE_CONSTANT,
                amount: 40
            })
        );
        assert_eq!(status.best_bid, None);
        assert_eq!(
            status.last_trade,
            Some(LastTrade {
                amount: 60,
                price: 2 * PRICE_CONSTANT,
                side: OrderSide::Buy
            })
        );
        assert!(book.contains(&sell_id));
        assert_not_crossed(&book);
    }

    #[test]
    fn test_tick_aggregation_crossing_at_maker_prices() {
        let mut book = OrderBook::new(pair());
        book.set_aggregation(TickSize::Enabled(100));

        book.place(signed(1, OrderSide::Sell, 10, 205, 1_000, 1_000), 1, 1);
        book.place(signed(2, OrderSide::Sell, 10, 250, 1_000, 2_000), 1, 1);

        // Both asks bucket to 300; the earlier order has priority.
        let status = book.market_status();
        assert_eq!(
            status.best_ask,
            Some(LevelSummary {
                price: 300,
                amount: 20
            })
        );

        let outcome = book.place(signed(3, OrderSide::Buy, 15, 300, 1_000, 3_000), 1, 1);
        assert_eq!(outcome.executions.len(), 2);
        assert_eq!(outcome.executions[0].amount, 10);
        assert_eq!(outcome.executions[0].price, 205);
        assert_eq!(outcome.executions[1].amount, 5);
        assert_eq!(outcome.executions[1].price, 250);

        assert!(matches!(
            outcome.executions[0].maker.status,
            OrderStatus::Filled { filled: 10, .. }
        ));
        assert!(matches!(
            outcome.executions[1].maker.status,
            OrderStatus::PartiallyFilled { filled: 5, .. }
        ));
        assert!(matches!(
            outcome.taker_status,
            OrderStatus::Filled { filled: 15, .. }
        ));

        // S2 remains with 5 in bucket 300.
        assert_eq!(
            book.market_status().best_ask,
            Some(LevelSummary {
                price: 300,
                amount: 5
            })
        );
    }

    #[test]
    fn test_cancel_after_partial_fill() {
        let mut book = OrderBook::new(pair());

        let sell = signed(1, OrderSide::Sell, 100, 2 * PRICE_CONSTANT, 300_000, 1_000);
        let sell_id = sell.id;
        book.place(sell, 1, 1);
        book.place(signed(2, OrderSide::Buy, 60, 3 * PRICE_CONSTANT, 300_000, 2_000), 1, 1);

        let cancelled = book.cancel(&sell_id).unwrap();
        assert_eq!(
            cancelled.status,
            OrderStatus::Cancelled {
                filled: 60,
                filled_fee: 180_000
            }
        );
        assert!(book.is_empty());
        assert!(book.cancel(&sell_id).is_none());
    }

    #[test]
    fn test_price_time_priority_within_level() {
        let mut book = OrderBook::new(pair());
        let first = signed(1, OrderSide::Sell, 10, 2 * PRICE_CONSTANT, 1_000, 1_000);
        let second = signed(2, OrderSide::Sell, 10, 2 * PRICE_CONSTANT, 1_000, 2_000);
        let first_id = first.id;
        book.place(second, 1, 1);
        book.place(first, 1, 1);

        let outcome = book.place(signed(3, OrderSide::Buy, 10, 2 * PRICE_CONSTANT, 1_000, 3_000), 1, 1);
        assert_eq!(outcome.executions.len(), 1);
        assert_eq!(outcome.executions[0].maker.order.id, first_id);
    }

    #[test]
    fn test_better_price_beats_time() {
        let mut book = OrderBook::new(pair());
        book.place(signed(1, OrderSide::Sell, 10, 3 * PRICE_CONSTANT, 1_000, 1_000), 1, 1);
        let cheap = signed(2, OrderSide::Sell, 10, 2 * PRICE_CONSTANT, 1_000, 2_000);
        let cheap_id = cheap.id;
        book.place(cheap, 1, 1);

        let outcome = book.place(signed(3, OrderSide::Buy, 10, 3 * PRICE_CONSTANT, 1_000, 3_000), 1, 1);
        assert_eq!(outcome.executions[0].maker.order.id, cheap_id);
        assert_eq!(outcome.executions[0].price, 2 * PRICE_CONSTANT);
    }

    #[test]
    fn test_no_cross_rests() {
        let mut book = OrderBook::new(pair());
        book.place(signed(1, OrderSide::Sell, 10, 3 * PRICE_CONSTANT, 1_000, 1_000), 1, 1);
        let outcome = book.place(signed(2, OrderSide::Buy, 10, 2 * PRICE_CONSTANT, 1_000, 2_000), 1, 1);

        assert!(outcome.executions.is_empty());
        assert!(outcome.rested);
        assert_not_crossed(&book);
    }

    #[test]
    fn test_taker_sweeps_multiple_levels() {
        let mut book = OrderBook::new(pair());
        book.place(signed(1, OrderSide::Sell, 10, 2 * PRICE_CONSTANT, 1_000, 1_000), 1, 1);
        book.place(signed(2, OrderSide::Sell, 10, 3 * PRICE_CONSTANT, 1_000, 2_000), 1, 1);

        let outcome = book.place(signed(3, OrderSide::Buy, 25, 3 * PRICE_CONSTANT, 1_000, 3_000), 1, 1);
        assert_eq!(outcome.executions.len(), 2);
        assert!(outcome.rested);
        assert!(matches!(
            outcome.taker_status,
            OrderStatus::PartiallyFilled { filled: 20, .. }
        ));
        // Remainder rests as the new best bid.
        let status = book.market_status();
        assert_eq!(
            status.best_bid,
            Some(LevelSummary {
                price: 3 * PRICE_CONSTANT,
                amount: 5
            })
        );
        assert_eq!(status.best_ask, None);
    }

    #[test]
    fn test_sub_minimum_maker_residual_closes_out() {
        let mut book = OrderBook::new(pair());
        let sell = signed(1, OrderSide::Sell, 100, 2 * PRICE_CONSTANT, 1_000, 1_000);
        let sell_id = sell.id;
        book.place(sell, 10, 1);

        // Leaves 5 on the maker, below the minimum of 10.
        let outcome = book.place(signed(2, OrderSide::Buy, 95, 2 * PRICE_CONSTANT, 1_000, 2_000), 10, 1);
        assert_eq!(outcome.executions.len(), 1);
        assert_eq!(outcome.executions[0].amount, 95);
        assert!(matches!(
            outcome.executions[0].maker.status,
            OrderStatus::Filled { filled: 95, .. }
        ));
        assert!(!book.contains(&sell_id));
        assert!(book.is_empty());
    }

    #[test]
    fn test_sub_minimum_taker_residual_closes_out() {
        let mut book = OrderBook::new(pair());
        book.place(signed(1, OrderSide::Sell, 95, 2 * PRICE_CONSTANT, 1_000, 1_000), 10, 1);

        let outcome = book.place(signed(2, OrderSide::Buy, 100, 2 * PRICE_CONSTANT, 1_000, 2_000), 10, 1);
        assert!(matches!(
            outcome.taker_status,
            OrderStatus::Filled { filled: 95, .. }
        ));
        assert!(!outcome.rested);
        assert!(book.is_empty());
    }

    #[test]
    fn test_fill_snaps_to_amount_step() {
        let mut book = OrderBook::new(pair());
        book.place(signed(1, OrderSide::Sell, 100, 2 * PRICE_CONSTANT, 1_000, 1_000), 10, 10);

        // raw fill would be 95; half-to-even lands on 100, which is stepped
        // back down to 90 so the maker's remainder stays on the grid.
        let outcome = book.place(
            signed(2, OrderSide::Buy, 95, 2 * PRICE_CONSTANT, 1_000, 2_000),
            10,
            10,
        );
        assert_eq!(outcome.executions.len(), 1);
        assert_eq!(outcome.executions[0].amount, 90);
        assert!(matches!(
            outcome.executions[0].maker.status,
            OrderStatus::PartiallyFilled { filled: 90, .. }
        ));
        // The taker's 5 left over is below the minimum and closes out.
        assert!(matches!(
            outcome.taker_status,
            OrderStatus::Filled { filled: 90, .. }
        ));
        assert!(!outcome.rested);
        assert_eq!(
            book.market_status().best_ask,
            Some(LevelSummary {
                price: 2 * PRICE_CONSTANT,
                amount: 10
            })
        );
    }

    #[test]
    fn test_sub_step_snap_closes_smaller_order_exactly() {
        let mut book = OrderBook::new(pair());
        book.place(signed(1, OrderSide::Sell, 4, 2 * PRICE_CONSTANT, 1_000, 1_000), 1, 10);

        // Snapping 4 onto a step of 10 gives 0; the maker closes at its
        // exact remainder and the taker absorbs the difference.
        let outcome = book.place(
            signed(2, OrderSide::Buy, 100, 2 * PRICE_CONSTANT, 1_000, 2_000),
            1,
            10,
        );
        assert_eq!(outcome.executions.len(), 1);
        assert_eq!(outcome.executions[0].amount, 4);
        assert!(matches!(
            outcome.executions[0].maker.status,
            OrderStatus::Filled { filled: 4, .. }
        ));
        assert!(outcome.rested);
        assert_eq!(
            book.market_status().best_bid,
            Some(LevelSummary {
                price: 2 * PRICE_CONSTANT,
                amount: 96
            })
        );
    }

    #[test]
    fn test_fee_proration_sums_to_total() {
        let mut book = OrderBook::new(pair());
        let sell = signed(1, OrderSide::Sell, 3, 2 * PRICE_CONSTANT, 100, 1_000);
        book.place(sell, 1, 1);

        let mut charged = 0;
        for (seed, ts) in [(2u8, 2_000u64), (3, 3_000), (4, 4_000)] {
            let outcome = book.place(signed(seed, OrderSide::Buy, 1, 2 * PRICE_CONSTANT, 100, ts), 1, 1);
            charged += outcome.executions[0].maker.fee;
        }
        assert_eq!(charged, 100);
        assert!(book.is_empty());
    }

    #[test]
    fn test_reaggregation_preserves_orders_and_priority() {
        let mut book = OrderBook::new(pair());
        book.place(signed(1, OrderSide::Sell, 10, 205, 1_000, 1_000), 1, 1);
        book.place(signed(2, OrderSide::Sell, 10, 250, 1_000, 2_000), 1, 1);
        assert_eq!(book.depth(10).1.len(), 2);

        book.set_aggregation(TickSize::Enabled(100));
        // Both project onto bucket 300; nothing was cancelled.
        let (_, asks) = book.depth(10);
        assert_eq!(asks, vec![LevelSummary { price: 300, amount: 20 }]);

        book.set_aggregation(TickSize::Disabled);
        let (_, asks) = book.depth(10);
        assert_eq!(asks.len(), 2);
        assert_eq!(asks[0].price, 205);
    }

    #[test]
    fn test_book_never_crossed_after_placements() {
        let mut book = OrderBook::new(pair());
        let mut ts = 1_000;
        for (seed, side, amount, price) in [
            (1u8, OrderSide::Sell, 10u64, 3 * PRICE_CONSTANT),
            (2, OrderSide::Buy, 5, 2 * PRICE_CONSTANT),
            (3, OrderSide::Buy, 20, 3 * PRICE_CONSTANT),
            (4, OrderSide::Sell, 7, 2 * PRICE_CONSTANT),
            (5, OrderSide::Buy, 3, 25 * PRICE_CONSTANT / 10),
        ] {
            ts += 1_000;
            book.place(signed(seed, side, amount, price, 1_000, ts), 1, 1);
            assert_not_crossed(&book);
        }
    }
}
