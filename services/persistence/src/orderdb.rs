//! Order index
//!
//! Key-value record per order: its latest status, fill totals, and enough
//! of the order's shape to answer client queries. Doubles as the
//! idempotent-replay guard: a terminal record means a re-delivered
//! `PlaceOrder` must be ignored. An owner-keyed secondary index serves
//! per-address history.

use crate::kv::KvStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use types::order::{Address, OrderId, OrderSide, OrderStatus};
use types::AssetPair;

const ORDER_PREFIX: &[u8] = b"order:";
const OWNER_PREFIX: &[u8] = b"owner:";

/// Stored record for one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderInfo {
    pub status: OrderStatus,
    pub pair: AssetPair,
    pub side: OrderSide,
    pub amount: u64,
    pub price: u64,
    pub owner: Address,
    pub timestamp: u64,
}

#[derive(Clone)]
pub struct OrderDb {
    kv: Arc<dyn KvStore>,
}

impl OrderDb {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn save(&self, id: &OrderId, info: &OrderInfo) {
        let value = bincode::serialize(info).expect("order info serialization is infallible");
        self.kv.put(&Self::order_key(id), &value);
        self.kv.put(&Self::owner_key(&info.owner, id), id.as_bytes());
    }

    pub fn get(&self, id: &OrderId) -> Option<OrderInfo> {
        self.kv
            .get(&Self::order_key(id))
            .and_then(|v| bincode::deserialize(&v).ok())
    }

    /// Client-facing status; unknown orders answer `NotFound`.
    pub fn status(&self, id: &OrderId) -> OrderStatus {
        self.get(id).map(|info| info.status).unwrap_or(OrderStatus::NotFound)
    }

    pub fn contains(&self, id: &OrderId) -> bool {
        self.kv.get(&Self::order_key(id)).is_some()
    }

    /// Whether the order has reached a terminal status. Used to drop
    /// re-delivered placements during replay.
    pub fn has_terminal(&self, id: &OrderId) -> bool {
        self.get(id).map(|info| info.status.is_terminal()).unwrap_or(false)
    }

    /// All orders ever placed by `owner`, newest first.
    pub fn history(&self, owner: &Address) -> Vec<(OrderId, OrderInfo)> {
        let mut prefix = OWNER_PREFIX.to_vec();
        prefix.extend_from_slice(owner.0.as_slice());
        let mut orders: Vec<(OrderId, OrderInfo)> = self
            .kv
            .scan_prefix(&prefix)
            .into_iter()
            .filter_map(|(_, id_bytes)| {
                let id = OrderId(id_bytes.try_into().ok()?);
                let info = self.get(&id)?;
                Some((id, info))
            })
            .collect();
        orders.sort_by(|a, b| b.1.timestamp.cmp(&a.1.timestamp).then(a.0.cmp(&b.0)));
        orders
    }

    fn order_key(id: &OrderId) -> Vec<u8> {
        let mut key = ORDER_PREFIX.to_vec();
        key.extend_from_slice(id.as_bytes());
        key
    }

    fn owner_key(owner: &Address, id: &OrderId) -> Vec<u8> {
        let mut key = OWNER_PREFIX.to_vec();
        key.extend_from_slice(owner.0.as_slice());
        key.push(b':');
        key.extend_from_slice(id.as_bytes());
        key
    }
}
