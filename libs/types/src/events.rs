//! Queue events
//!
//! Commands flowing through the matcher's event queue. Cancels carry the
//! pair so consumers can route them without consulting the order index,
//! which may trail the book during replay.

use crate::asset::AssetPair;
use crate::order::{Address, Order, OrderId};
use serde::{Deserialize, Serialize};

/// A matcher command as appended to the event queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueEvent {
    PlaceOrder {
        order: Order,
    },
    CancelOrder {
        pair: AssetPair,
        order_id: OrderId,
        owner: Address,
    },
    /// Administrative removal of a whole book.
    OrderBookDeleted {
        pair: AssetPair,
    },
}

impl QueueEvent {
    /// The pair this event targets.
    pub fn pair(&self) -> &AssetPair {
        match self {
            QueueEvent::PlaceOrder { order } => &order.pair,
            QueueEvent::CancelOrder { pair, .. } => pair,
            QueueEvent::OrderBookDeleted { pair } => pair,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            QueueEvent::PlaceOrder { .. } => "PlaceOrder",
            QueueEvent::CancelOrder { .. } => "CancelOrder",
            QueueEvent::OrderBookDeleted { .. } => "OrderBookDeleted",
        }
    }
}

/// A queue event together with its assigned position and server timestamp.
///
/// Offsets form a dense strictly increasing sequence starting at 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEventWithMeta {
    pub offset: u64,
    pub timestamp: u64,
    pub event: QueueEvent,
}
