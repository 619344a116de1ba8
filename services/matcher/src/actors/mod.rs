//! Partitioned single-writer actors
//!
//! Every order book and every address has exactly one owner task with a
//! FIFO mailbox; no state is shared by mutation across actors. The
//! coordinator routes queue events to book actors and gates consumption on
//! snapshot restoration. Published read views (market status) go through
//! atomic replacement in a shared map.

pub mod address;
pub mod coordinator;
pub mod orderbook;

use crate::blockchain::BlockchainContext;
use address::{AddressActor, AddressCommand};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use types::asset::Asset;
use types::order::{Address, Order, OrderId};
use types::MatcherError;

/// Handle to the per-address actors; spawns them on first touch.
///
/// Notification sends are non-blocking (unbounded mailboxes) so the book
/// actors' matching path never suspends on an address actor.
#[derive(Clone)]
pub struct AddressRegistry {
    chain: Arc<dyn BlockchainContext>,
    senders: Arc<DashMap<Address, mpsc::UnboundedSender<AddressCommand>>>,
}

impl AddressRegistry {
    pub fn new(chain: Arc<dyn BlockchainContext>) -> Self {
        Self {
            chain,
            senders: Arc::new(DashMap::new()),
        }
    }

    fn handle(&self, address: Address) -> mpsc::UnboundedSender<AddressCommand> {
        self.senders
            .entry(address)
            .or_insert_with(|| AddressActor::spawn(address, self.chain.clone()))
            .clone()
    }

    /// Check spendable-minus-reserved against the order's requirement and,
    /// on success, hold the reservation.
    pub async fn place_check(&self, order: Order) -> Result<(), MatcherError> {
        let (respond, result) = oneshot::channel();
        self.handle(order.owner.address())
            .send(AddressCommand::PlaceCheck { order, respond })
            .map_err(|_| MatcherError::InternalInvariant("address actor is gone".into()))?;
        result.await.map_err(|_| MatcherError::Timeout)?
    }

    /// Establish a reservation without a balance check (event application
    /// and replay). Idempotent per order id.
    pub fn reserve(&self, order: &Order, amount_remaining: u64, fee_remaining: u64) {
        let _ = self.handle(order.owner.address()).send(AddressCommand::Reserve {
            order: order.clone(),
            amount_remaining,
            fee_remaining,
        });
    }

    pub fn apply_fill(
        &self,
        owner: Address,
        order_id: OrderId,
        executed: u64,
        executed_fee: u64,
        terminal: bool,
    ) {
        let _ = self.handle(owner).send(AddressCommand::ApplyFill {
            order_id,
            executed,
            executed_fee,
            terminal,
        });
    }

    pub fn apply_cancel(&self, owner: Address, order_id: OrderId) {
        let _ = self
            .handle(owner)
            .send(AddressCommand::ApplyCancel { order_id });
    }

    /// Current per-asset reservations of an address. An address that never
    /// placed anything reserves nothing.
    pub async fn reserved_balances(&self, address: Address) -> BTreeMap<Asset, u128> {
        let Some(sender) = self.senders.get(&address).map(|s| s.clone()) else {
            return BTreeMap::new();
        };
        let (respond, result) = oneshot::channel();
        if sender.send(AddressCommand::GetReserved { respond }).is_err() {
            return BTreeMap::new();
        }
        result.await.unwrap_or_default()
    }

    /// Ids of the address's in-flight orders.
    pub async fn active_orders(&self, address: Address) -> Vec<OrderId> {
        let Some(sender) = self.senders.get(&address).map(|s| s.clone()) else {
            return Vec::new();
        };
        let (respond, result) = oneshot::channel();
        if sender.send(AddressCommand::GetActive { respond }).is_err() {
            return Vec::new();
        }
        result.await.unwrap_or_default()
    }
}
