//! Trades and exchange transactions
//!
//! Every crossing produces an `ExchangeTransaction` pairing the two matched
//! orders; the book additionally remembers the most recent execution as a
//! `LastTrade` for market status.

use crate::order::{Order, OrderSide};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Identifier of an exchange transaction: digest of its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(#[serde(with = "crate::serde_hex")] pub [u8; 32]);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// The most recent execution on a book, from the taker's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastTrade {
    pub amount: u64,
    pub price: u64,
    pub side: OrderSide,
}

/// Transaction broadcast to the chain to settle one crossing.
///
/// The matcher's event log stays authoritative for order state even if the
/// chain later rejects the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeTransaction {
    pub id: TxId,
    pub buy_order: Order,
    pub sell_order: Order,
    pub amount: u64,
    pub price: u64,
    pub buy_matcher_fee: u64,
    pub sell_matcher_fee: u64,
    pub timestamp: u64,
}

impl ExchangeTransaction {
    pub fn new(
        buy_order: Order,
        sell_order: Order,
        amount: u64,
        price: u64,
        buy_matcher_fee: u64,
        sell_matcher_fee: u64,
        timestamp: u64,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(buy_order.id.as_bytes());
        hasher.update(sell_order.id.as_bytes());
        hasher.update(amount.to_le_bytes());
        hasher.update(price.to_le_bytes());
        hasher.update(buy_matcher_fee.to_le_bytes());
        hasher.update(sell_matcher_fee.to_le_bytes());
        hasher.update(timestamp.to_le_bytes());
        Self {
            id: TxId(hasher.finalize().into()),
            buy_order,
            sell_order,
            amount,
            price,
            buy_matcher_fee,
            sell_matcher_fee,
            timestamp,
        }
    }
}
