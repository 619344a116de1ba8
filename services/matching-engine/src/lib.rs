//! Pure in-memory order books
//!
//! One `OrderBook` per asset pair: price-time-priority matching with
//! configurable tick-size aggregation, start-offset-gated matching rules,
//! market status, and a versioned deterministic snapshot codec. No I/O and
//! no clocks; everything is driven by the caller.

pub mod book;
pub mod codec;
pub mod rules;

pub use book::{
    CancelOutcome, Execution, FillSide, LevelSummary, LimitOrder, MarketStatus, OrderBook,
    PlaceOutcome,
};
pub use codec::CodecError;
pub use rules::{MatchingRule, MatchingRules, TickSize};
