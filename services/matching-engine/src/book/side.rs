//! One side of a book
//!
//! Bucket-keyed price levels over a `BTreeMap` so iteration is
//! deterministic. The best bucket is the highest for bids and the lowest
//! for asks. One type serves both sides because tick-size re-aggregation
//! rebuilds them through the same path.

use crate::book::price_level::PriceLevel;
use crate::book::{LevelSummary, LimitOrder};
use std::collections::BTreeMap;
use types::order::{OrderId, OrderSide};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookSide {
    side: OrderSide,
    levels: BTreeMap<u64, PriceLevel>,
}

impl BookSide {
    pub fn new(side: OrderSide) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    pub fn side(&self) -> OrderSide {
        self.side
    }

    pub fn insert(&mut self, bucket: u64, order: LimitOrder) {
        self.levels.entry(bucket).or_default().insert(order);
    }

    /// Best bucket price: highest bid, lowest ask.
    pub fn best_bucket(&self) -> Option<u64> {
        match self.side {
            OrderSide::Buy => self.levels.keys().next_back().copied(),
            OrderSide::Sell => self.levels.keys().next().copied(),
        }
    }

    pub fn best_level_mut(&mut self) -> Option<(u64, &mut PriceLevel)> {
        match self.side {
            OrderSide::Buy => self.levels.iter_mut().next_back().map(|(k, v)| (*k, v)),
            OrderSide::Sell => self.levels.iter_mut().next().map(|(k, v)| (*k, v)),
        }
    }

    /// Total resting amount at the best bucket.
    pub fn best(&self) -> Option<LevelSummary> {
        let bucket = self.best_bucket()?;
        let level = self.levels.get(&bucket)?;
        Some(LevelSummary {
            price: bucket,
            amount: level.total_amount(),
        })
    }

    /// Drop the level at `bucket` if it holds no orders. Empty levels never
    /// persist between mutations.
    pub fn prune(&mut self, bucket: u64) {
        if self.levels.get(&bucket).is_some_and(|l| l.is_empty()) {
            self.levels.remove(&bucket);
        }
    }

    /// Remove an order wherever it rests.
    pub fn remove_order(&mut self, id: &OrderId) -> Option<LimitOrder> {
        let bucket = self
            .levels
            .iter()
            .find(|(_, level)| level.contains(id))
            .map(|(bucket, _)| *bucket)?;
        let removed = self.levels.get_mut(&bucket)?.remove(id);
        self.prune(bucket);
        removed
    }

    pub fn contains(&self, id: &OrderId) -> bool {
        self.levels.values().any(|level| level.contains(id))
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn order_count(&self) -> usize {
        self.levels.values().map(PriceLevel::len).sum()
    }

    /// Aggregated depth, best bucket first.
    pub fn depth(&self, limit: usize) -> Vec<LevelSummary> {
        let summarize = |(bucket, level): (&u64, &PriceLevel)| LevelSummary {
            price: *bucket,
            amount: level.total_amount(),
        };
        match self.side {
            OrderSide::Buy => self.levels.iter().rev().take(limit).map(summarize).collect(),
            OrderSide::Sell => self.levels.iter().take(limit).map(summarize).collect(),
        }
    }

    /// Orders in ascending bucket order, queue order within a bucket.
    /// This is the canonical serialization order.
    pub fn iter_orders(&self) -> impl Iterator<Item = &LimitOrder> {
        self.levels.values().flat_map(PriceLevel::iter)
    }

    /// Take every order off this side, in canonical order. Used for
    /// re-aggregation.
    pub fn drain_all(&mut self) -> Vec<LimitOrder> {
        let mut orders = Vec::with_capacity(self.order_count());
        for level in self.levels.values_mut() {
            orders.extend(level.drain());
        }
        self.levels.clear();
        orders
    }
}
