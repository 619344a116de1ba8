//! Price level — time-priority queue within one bucket
//!
//! Entries are kept sorted by `(timestamp, order id)`: earliest first, id
//! as the tiebreak. Under aggregation a bucket can hold orders with
//! different individual prices; time priority still governs consumption.

use crate::book::LimitOrder;
use std::collections::VecDeque;
use types::order::OrderId;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PriceLevel {
    orders: VecDeque<LimitOrder>,
}

impl PriceLevel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert preserving `(timestamp, id)` order. New orders usually carry
    /// the latest timestamp and land at the back.
    pub fn insert(&mut self, order: LimitOrder) {
        let key = (order.order.timestamp, order.order.id);
        let pos = self
            .orders
            .iter()
            .position(|e| (e.order.timestamp, e.order.id) > key);
        match pos {
            Some(i) => self.orders.insert(i, order),
            None => self.orders.push_back(order),
        }
    }

    pub fn front(&self) -> Option<&LimitOrder> {
        self.orders.front()
    }

    pub fn front_mut(&mut self) -> Option<&mut LimitOrder> {
        self.orders.front_mut()
    }

    pub fn pop_front(&mut self) -> Option<LimitOrder> {
        self.orders.pop_front()
    }

    /// Remove a specific order, returning it.
    pub fn remove(&mut self, id: &OrderId) -> Option<LimitOrder> {
        let pos = self.orders.iter().position(|e| e.order.id == *id)?;
        self.orders.remove(pos)
    }

    pub fn contains(&self, id: &OrderId) -> bool {
        self.orders.iter().any(|e| e.order.id == *id)
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// Total unexecuted amount queued at this level.
    pub fn total_amount(&self) -> u64 {
        self.orders.iter().map(|e| e.amount_remaining).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LimitOrder> {
        self.orders.iter()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = LimitOrder> + '_ {
        self.orders.drain(..)
    }
}
