//! Error taxonomy for the matcher
//!
//! One top-level error covers every client-visible and internal failure.
//! Service crates keep their own transport-level errors and convert at the
//! boundary.

use crate::asset::AssetPair;
use crate::order::OrderId;
use thiserror::Error;

/// Top-level matcher error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatcherError {
    /// Client-facing validation failure.
    #[error("invalid order: {0}")]
    Invalid(String),

    #[error("event queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("operation timed out")]
    Timeout,

    #[error("insufficient balance of {asset}: required {required}, spendable {spendable}")]
    InsufficientBalance {
        asset: String,
        required: u128,
        spendable: u128,
    },

    #[error("order {0} has already been submitted")]
    DuplicateOrder(OrderId),

    #[error("unknown asset pair {0}")]
    UnknownPair(AssetPair),

    #[error("script denied the order: {0}")]
    ScriptDenied(String),

    #[error("script evaluation failed: {0}")]
    ScriptError(String),

    /// Fatal: the matcher writes a crash marker and terminates.
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),

    /// The matcher has not finished restoring state.
    #[error("matcher is starting")]
    Starting,

    #[error("order {0} not found")]
    OrderNotFound(OrderId),
}

impl MatcherError {
    /// Stable machine-readable code for API payloads.
    pub fn code(&self) -> &'static str {
        match self {
            MatcherError::Invalid(_) => "INVALID_ORDER",
            MatcherError::QueueUnavailable(_) => "QUEUE_UNAVAILABLE",
            MatcherError::Timeout => "TIMEOUT",
            MatcherError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            MatcherError::DuplicateOrder(_) => "DUPLICATE_ORDER",
            MatcherError::UnknownPair(_) => "UNKNOWN_PAIR",
            MatcherError::ScriptDenied(_) => "SCRIPT_DENIED",
            MatcherError::ScriptError(_) => "SCRIPT_ERROR",
            MatcherError::InternalInvariant(_) => "INTERNAL",
            MatcherError::Starting => "STARTING",
            MatcherError::OrderNotFound(_) => "ORDER_NOT_FOUND",
        }
    }
}
