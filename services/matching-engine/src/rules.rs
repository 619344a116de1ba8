//! Matching rules — tick-size aggregation gated by queue offset
//!
//! A pair's rules are an ordered list of `(start_offset, tick_size)`; the
//! rule in force for offset `o` is the one with the largest
//! `start_offset <= o`. Rule changes re-project resting orders onto new
//! buckets; they never cancel anything.

use serde::{Deserialize, Serialize};
use types::order::OrderSide;

/// Price-aggregation granularity.
///
/// When enabled, orders are bucketed for matching and display but keep
/// their individual prices for execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickSize {
    Disabled,
    Enabled(u64),
}

impl TickSize {
    /// Normalize degenerate tick values: a tick of 0 or 1 aggregates
    /// nothing.
    pub fn normalized(self) -> Self {
        match self {
            TickSize::Enabled(t) if t <= 1 => TickSize::Disabled,
            other => other,
        }
    }

    /// The bucket a resting order of `side` at `price` projects onto.
    /// Bids round down, asks round up, so a bucket never makes an order
    /// look more aggressive than its real price.
    pub fn bucket(&self, side: OrderSide, price: u64) -> u64 {
        match self {
            TickSize::Disabled => price,
            TickSize::Enabled(t) => match side {
                OrderSide::Buy => price / t * t,
                OrderSide::Sell => price.div_ceil(*t).saturating_mul(*t),
            },
        }
    }
}

/// One entry of a pair's matching-rule schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingRule {
    pub start_offset: u64,
    pub tick_size: TickSize,
}

/// Ordered, non-empty rule schedule for a pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchingRules {
    rules: Vec<MatchingRule>,
}

impl MatchingRules {
    /// Build a schedule. Rules are sorted by start offset; a head rule at
    /// offset 0 (aggregation disabled) is supplied when missing so lookups
    /// always resolve.
    pub fn new(mut rules: Vec<MatchingRule>) -> Self {
        for rule in &mut rules {
            rule.tick_size = rule.tick_size.normalized();
        }
        rules.sort_by_key(|r| r.start_offset);
        rules.dedup_by_key(|r| r.start_offset);
        if rules.first().map(|r| r.start_offset) != Some(0) {
            rules.insert(
                0,
                MatchingRule {
                    start_offset: 0,
                    tick_size: TickSize::Disabled,
                },
            );
        }
        Self { rules }
    }

    pub fn default_rules() -> Self {
        Self::new(Vec::new())
    }

    /// The rule in force at `offset`.
    pub fn rule_for(&self, offset: u64) -> &MatchingRule {
        let idx = self
            .rules
            .partition_point(|r| r.start_offset <= offset)
            .saturating_sub(1);
        &self.rules[idx]
    }
}
