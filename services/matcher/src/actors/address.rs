//! Address actor — reservation bookkeeping for one address
//!
//! The single writer for everything one address has in flight. Placement
//! checks, reservations and fill releases for the same address are
//! serialized through this actor's mailbox, which is what upholds the
//! invariant: per asset, the reserved total equals the sum of the per-order
//! reservations.

use crate::blockchain::BlockchainContext;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::error;
use types::asset::Asset;
use types::numeric::quote_amount;
use types::order::{Address, Order, OrderId, OrderSide};
use types::MatcherError;

pub enum AddressCommand {
    /// Check `spendable - reserved >= required` and reserve on success.
    PlaceCheck {
        order: Order,
        respond: oneshot::Sender<Result<(), MatcherError>>,
    },
    /// Reserve without checking (event application and snapshot restore).
    /// A no-op when the order is already active.
    Reserve {
        order: Order,
        amount_remaining: u64,
        fee_remaining: u64,
    },
    ApplyFill {
        order_id: OrderId,
        executed: u64,
        executed_fee: u64,
        /// Terminal fills release the whole remaining reservation.
        terminal: bool,
    },
    ApplyCancel {
        order_id: OrderId,
    },
    GetReserved {
        respond: oneshot::Sender<BTreeMap<Asset, u128>>,
    },
    GetActive {
        respond: oneshot::Sender<Vec<OrderId>>,
    },
}

/// What one active order holds.
struct Reservation {
    side: OrderSide,
    price: u64,
    spend_asset: Asset,
    spend_remaining: u128,
    fee_asset: Asset,
    fee_remaining: u64,
}

pub struct AddressActor {
    address: Address,
    chain: Arc<dyn BlockchainContext>,
    reserved: BTreeMap<Asset, u128>,
    active: HashMap<OrderId, Reservation>,
}

impl AddressActor {
    pub fn spawn(
        address: Address,
        chain: Arc<dyn BlockchainContext>,
    ) -> mpsc::UnboundedSender<AddressCommand> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let actor = Self {
            address,
            chain,
            reserved: BTreeMap::new(),
            active: HashMap::new(),
        };
        tokio::spawn(actor.run(receiver));
        sender
    }

    async fn run(mut self, mut mailbox: mpsc::UnboundedReceiver<AddressCommand>) {
        while let Some(command) = mailbox.recv().await {
            self.handle(command).await;
        }
    }

    async fn handle(&mut self, command: AddressCommand) {
        match command {
            AddressCommand::PlaceCheck { order, respond } => {
                let result = self.place_check(&order).await;
                if result.is_ok() {
                    self.reserve(&order, order.amount, order.matcher_fee);
                }
                let _ = respond.send(result);
            }
            AddressCommand::Reserve {
                order,
                amount_remaining,
                fee_remaining,
            } => self.reserve(&order, amount_remaining, fee_remaining),
            AddressCommand::ApplyFill {
                order_id,
                executed,
                executed_fee,
                terminal,
            } => self.apply_fill(order_id, executed, executed_fee, terminal),
            AddressCommand::ApplyCancel { order_id } => self.apply_cancel(&order_id),
            AddressCommand::GetReserved { respond } => {
                let _ = respond.send(self.reserved.clone());
            }
            AddressCommand::GetActive { respond } => {
                let mut ids: Vec<OrderId> = self.active.keys().copied().collect();
                ids.sort();
                let _ = respond.send(ids);
            }
        }
    }

    /// Spendable is read from the chain at decision time; the matcher's own
    /// reservations are subtracted on top.
    async fn place_check(&self, order: &Order) -> Result<(), MatcherError> {
        if self.active.contains_key(&order.id) {
            return Err(MatcherError::DuplicateOrder(order.id));
        }
        for (asset, required) in Self::required_for(order, order.amount, order.matcher_fee) {
            let spendable = self.chain.spendable_balance(&self.address, &asset).await;
            let reserved = self.reserved.get(&asset).copied().unwrap_or(0);
            let free = spendable.saturating_sub(reserved);
            if free < required {
                return Err(MatcherError::InsufficientBalance {
                    asset: asset.to_string(),
                    required,
                    spendable: free,
                });
            }
        }
        Ok(())
    }

    /// Per-asset requirement: spend leg (quote value for buys, amount for
    /// sells) plus the matcher fee, which may share the spend asset.
    fn required_for(order: &Order, amount: u64, fee: u64) -> BTreeMap<Asset, u128> {
        let mut required = BTreeMap::new();
        let spend = match order.side {
            OrderSide::Buy => quote_amount(amount, order.price),
            OrderSide::Sell => amount as u128,
        };
        *required.entry(order.spend_asset()).or_insert(0) += spend;
        *required.entry(order.fee_asset).or_insert(0) += fee as u128;
        required
    }

    fn reserve(&mut self, order: &Order, amount_remaining: u64, fee_remaining: u64) {
        if self.active.contains_key(&order.id) {
            return;
        }
        let spend_remaining = match order.side {
            OrderSide::Buy => quote_amount(amount_remaining, order.price),
            OrderSide::Sell => amount_remaining as u128,
        };
        *self.reserved.entry(order.spend_asset()).or_insert(0) += spend_remaining;
        *self.reserved.entry(order.fee_asset).or_insert(0) += fee_remaining as u128;
        self.active.insert(
            order.id,
            Reservation {
                side: order.side,
                price: order.price,
                spend_asset: order.spend_asset(),
                spend_remaining,
                fee_asset: order.fee_asset,
                fee_remaining,
            },
        );
    }

    /// Release proportionally at the order's limit price; rounding slack is
    /// swept by the terminal release.
    fn apply_fill(&mut self, order_id: OrderId, executed: u64, executed_fee: u64, terminal: bool) {
        let Some(reservation) = self.active.get_mut(&order_id) else {
            return;
        };
        let spend_delta = match reservation.side {
            OrderSide::Buy => quote_amount(executed, reservation.price),
            OrderSide::Sell => executed as u128,
        }
        .min(reservation.spend_remaining);
        let fee_delta = executed_fee.min(reservation.fee_remaining);
        reservation.spend_remaining -= spend_delta;
        reservation.fee_remaining -= fee_delta;
        let spend_asset = reservation.spend_asset;
        let fee_asset = reservation.fee_asset;

        self.release(spend_asset, spend_delta);
        self.release(fee_asset, fee_delta as u128);

        if terminal {
            self.apply_cancel(&order_id);
        }
    }

    fn apply_cancel(&mut self, order_id: &OrderId) {
        let Some(reservation) = self.active.remove(order_id) else {
            return;
        };
        self.release(reservation.spend_asset, reservation.spend_remaining);
        self.release(reservation.fee_asset, reservation.fee_remaining as u128);
    }

    fn release(&mut self, asset: Asset, amount: u128) {
        if amount == 0 {
            return;
        }
        match self.reserved.get_mut(&asset) {
            Some(total) if *total >= amount => {
                *total -= amount;
                if *total == 0 {
                    self.reserved.remove(&asset);
                }
            }
            _ => {
                error!(address = %self.address, asset = %asset, "reservation release exceeds the reserved total");
                self.reserved.remove(&asset);
            }
        }
    }
}
