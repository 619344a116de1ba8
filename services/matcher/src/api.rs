//! Handler contracts for the HTTP surface
//!
//! The HTTP server itself lives outside this crate; these are the stable
//! JSON shapes it serves and the error-to-status mapping it applies.
//! Amounts and prices are integers in smallest units everywhere.

use matching_engine::LevelSummary;
use serde::Serialize;
use types::{AssetPair, MatcherError};

/// Aggregated order book for one pair.
#[derive(Debug, Clone, Serialize)]
pub struct OrderBookResponse {
    pub pair: AssetPair,
    pub amount_asset_decimals: u8,
    pub price_asset_decimals: u8,
    /// Best bucket first.
    pub bids: Vec<LevelSummary>,
    pub asks: Vec<LevelSummary>,
}

/// Uniform error payload.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}

impl ErrorResponse {
    pub fn from_error(err: &MatcherError) -> Self {
        Self {
            error: err.code(),
            message: err.to_string(),
        }
    }
}

/// HTTP status for a matcher error. Client requests during `Starting`
/// uniformly answer 503.
pub fn http_status(err: &MatcherError) -> u16 {
    match err {
        MatcherError::Invalid(_)
        | MatcherError::DuplicateOrder(_)
        | MatcherError::InsufficientBalance { .. }
        | MatcherError::ScriptDenied(_)
        | MatcherError::ScriptError(_) => 400,
        MatcherError::OrderNotFound(_) | MatcherError::UnknownPair(_) => 404,
        MatcherError::Timeout => 504,
        MatcherError::Starting | MatcherError::QueueUnavailable(_) => 503,
        MatcherError::InternalInvariant(_) => 500,
    }
}
