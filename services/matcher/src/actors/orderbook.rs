//! Order-book actor — single writer for one pair
//!
//! Owns the book and everything derived from it: order-index updates,
//! address notifications, exchange transactions, market status, and the
//! per-pair snapshot. Events apply idempotently by offset; placements
//! additionally dedupe by order id against the live book and terminal
//! index records, which covers at-least-once delivery and replay.

use crate::actors::AddressRegistry;
use crate::broadcaster::ExchangeTransactionBroadcaster;
use dashmap::DashMap;
use matching_engine::{FillSide, LevelSummary, MarketStatus, MatchingRules, OrderBook};
use persistence::{OrderDb, OrderInfo, SnapshotStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use types::events::{QueueEvent, QueueEventWithMeta};
use types::order::{Address, Order, OrderId, OrderSide, OrderStatus};
use types::AssetPair;

const MAILBOX_CAPACITY: usize = 1_024;

/// Shared collaborators handed to every book actor.
#[derive(Clone)]
pub struct BookContext {
    pub orderdb: OrderDb,
    pub snapshots: Arc<SnapshotStore>,
    pub addresses: AddressRegistry,
    pub broadcaster: ExchangeTransactionBroadcaster,
    pub market: Arc<DashMap<AssetPair, MarketStatus>>,
    pub snapshots_interval: u64,
    pub broadcast_deadline: Duration,
    /// Where the crash marker lands when an invariant breaks.
    pub data_dir: PathBuf,
}

pub enum BookCommand {
    ApplyEvent(QueueEventWithMeta),
    GetDepth {
        limit: usize,
        respond: oneshot::Sender<(Vec<LevelSummary>, Vec<LevelSummary>)>,
    },
    /// Current snapshot payload, regardless of what is on disk.
    GetSnapshot {
        respond: oneshot::Sender<Vec<u8>>,
    },
    /// Barrier: answered once every earlier command has been applied.
    Ping {
        respond: oneshot::Sender<u64>,
    },
    /// Final snapshot, then stop.
    Shutdown {
        respond: oneshot::Sender<()>,
    },
}

pub struct OrderBookActor {
    pair: AssetPair,
    book: OrderBook,
    rules: MatchingRules,
    min_amount: u64,
    step_amount: u64,
    last_applied: u64,
    last_snapshot: u64,
    ctx: BookContext,
    deleted: bool,
}

impl OrderBookActor {
    /// Restore the book from its snapshot (a damaged snapshot falls back to
    /// an empty book and a full replay), re-establish reservations for the
    /// restored resting orders, and spawn the owner task.
    ///
    /// Returns the mailbox and the offset the snapshot was taken at.
    pub fn spawn(
        pair: AssetPair,
        rules: MatchingRules,
        min_amount: u64,
        step_amount: u64,
        ctx: BookContext,
    ) -> (mpsc::Sender<BookCommand>, u64) {
        let (book, offset) = match ctx.snapshots.get(&pair) {
            Ok(Some((offset, bytes))) => match OrderBook::from_snapshot_bytes(&bytes) {
                Ok(book) => {
                    info!(%pair, offset, "restored order book from snapshot");
                    (book, offset)
                }
                Err(err) => {
                    error!(%pair, "snapshot is unreadable, replaying from scratch: {}", err);
                    (OrderBook::new(pair), 0)
                }
            },
            Ok(None) => (OrderBook::new(pair), 0),
            Err(err) => {
                error!(%pair, "snapshot load failed, replaying from scratch: {}", err);
                (OrderBook::new(pair), 0)
            }
        };

        for resting in book.resting_orders() {
            ctx.addresses
                .reserve(&resting.order, resting.amount_remaining, resting.fee_remaining);
        }
        ctx.market.insert(pair, book.market_status());

        let actor = Self {
            pair,
            book,
            rules,
            min_amount,
            step_amount,
            last_applied: offset,
            last_snapshot: offset,
            ctx,
            deleted: false,
        };
        let (sender, receiver) = mpsc::channel(MAILBOX_CAPACITY);
        tokio::spawn(actor.run(receiver));
        (sender, offset)
    }

    async fn run(mut self, mut mailbox: mpsc::Receiver<BookCommand>) {
        while let Some(command) = mailbox.recv().await {
            match command {
                BookCommand::ApplyEvent(meta) => {
                    self.apply(meta);
                    if self.deleted {
                        break;
                    }
                }
                BookCommand::GetDepth { limit, respond } => {
                    let _ = respond.send(self.book.depth(limit));
                }
                BookCommand::GetSnapshot { respond } => {
                    let _ = respond.send(self.book.snapshot_bytes());
                }
                BookCommand::Ping { respond } => {
                    let _ = respond.send(self.last_applied);
                }
                BookCommand::Shutdown { respond } => {
                    if self.last_applied > self.last_snapshot {
                        self.save_snapshot();
                    }
                    let _ = respond.send(());
                    break;
                }
            }
        }
    }

    /// The non-suspending hot path: everything below is synchronous.
    fn apply(&mut self, meta: QueueEventWithMeta) {
        if meta.offset <= self.last_applied {
            debug!(pair = %self.pair, offset = meta.offset, "skipping already-applied event");
            return;
        }

        // Rule boundaries re-project the book before the event lands.
        let tick = self.rules.rule_for(meta.offset).tick_size;
        self.book.set_aggregation(tick);

        match meta.event {
            QueueEvent::PlaceOrder { order } => self.apply_place(order, meta.timestamp),
            QueueEvent::CancelOrder {
                order_id, owner, ..
            } => self.apply_cancel(order_id, owner),
            QueueEvent::OrderBookDeleted { .. } => self.apply_delete(),
        }

        self.last_applied = meta.offset;
        if !self.deleted {
            self.ctx.market.insert(self.pair, self.book.market_status());
            if meta.offset - self.last_snapshot >= self.ctx.snapshots_interval {
                self.save_snapshot();
            }
        }
    }

    /// A broken invariant is not recoverable in-process: log, leave a
    /// crash marker, and terminate so a restart replays from the last
    /// snapshot.
    fn fatal(&self, details: String) -> ! {
        error!(pair = %self.pair, "{}", details);
        let marker = self.ctx.data_dir.join("crash.marker");
        if let Err(err) = std::fs::write(&marker, &details) {
            error!("crash marker write failed: {}", err);
        }
        std::process::exit(1);
    }

    fn apply_place(&mut self, order: Order, event_timestamp: u64) {
        if order.pair != self.pair {
            warn!(pair = %self.pair, order = %order.id, "misrouted placement ignored");
            return;
        }
        if self.book.contains(&order.id) || self.ctx.orderdb.has_terminal(&order.id) {
            debug!(order = %order.id, "duplicate placement ignored");
            return;
        }

        let owner = order.owner.address();
        self.ctx
            .addresses
            .reserve(&order, order.amount, order.matcher_fee);

        let outcome = self
            .book
            .place(order.clone(), self.min_amount, self.step_amount);
        self.ctx
            .orderdb
            .save(&order.id, &order_info(&order, owner, outcome.taker_status));

        for execution in &outcome.executions {
            self.record_fill(&execution.maker, execution.amount);
            self.ctx.addresses.apply_fill(
                owner,
                order.id,
                execution.amount,
                execution.taker.fee,
                execution.taker.status.is_terminal(),
            );
            let tx = execution.to_exchange_transaction(event_timestamp);
            self.ctx.broadcaster.enqueue(tx, self.ctx.broadcast_deadline);
        }

        if outcome.executions.is_empty() && outcome.taker_status.is_terminal() {
            // Closed out unfilled (sub-minimum placement): release the hold.
            self.ctx.addresses.apply_cancel(owner, order.id);
        }

        if outcome.rested {
            // The matching loop must never leave a freshly rested order
            // across the touch. (Rule transitions may leave older bucket
            // crossings; those are legitimate and excluded here.)
            let bucket = self.book.aggregation().bucket(order.side, order.price);
            let status = self.book.market_status();
            let crossed = match order.side {
                OrderSide::Buy => status.best_ask.is_some_and(|a| a.price <= bucket),
                OrderSide::Sell => status.best_bid.is_some_and(|b| b.price >= bucket),
            };
            if crossed {
                self.fatal(format!(
                    "order {} rested across the touch at bucket {}",
                    order.id, bucket
                ));
            }
        }
    }

    fn record_fill(&self, fill: &FillSide, executed: u64) {
        let owner = fill.order.owner.address();
        self.ctx
            .orderdb
            .save(&fill.order.id, &order_info(&fill.order, owner, fill.status));
        self.ctx.addresses.apply_fill(
            owner,
            fill.order.id,
            executed,
            fill.fee,
            fill.status.is_terminal(),
        );
    }

    fn apply_cancel(&mut self, order_id: OrderId, owner: Address) {
        if let Some(info) = self.ctx.orderdb.get(&order_id) {
            if info.owner != owner {
                warn!(order = %order_id, "cancel from a different owner ignored");
                return;
            }
        }
        let Some(outcome) = self.book.cancel(&order_id) else {
            debug!(order = %order_id, "cancel of unknown or finished order ignored");
            return;
        };
        let owner = outcome.order.owner.address();
        self.ctx
            .orderdb
            .save(&order_id, &order_info(&outcome.order, owner, outcome.status));
        self.ctx.addresses.apply_cancel(owner, order_id);
    }

    /// Administrative removal: every resting order is cancelled, the
    /// snapshot is dropped, and the actor stops.
    fn apply_delete(&mut self) {
        for resting in self.book.resting_orders() {
            let owner = resting.order.owner.address();
            let status = OrderStatus::Cancelled {
                filled: resting.filled(),
                filled_fee: resting.filled_fee(),
            };
            self.ctx
                .orderdb
                .save(&resting.order.id, &order_info(&resting.order, owner, status));
            self.ctx.addresses.apply_cancel(owner, resting.order.id);
        }
        if let Err(err) = self.ctx.snapshots.drop_pair(&self.pair) {
            error!(pair = %self.pair, "failed to drop snapshot: {}", err);
        }
        self.ctx.market.remove(&self.pair);
        info!(pair = %self.pair, "order book deleted");
        self.deleted = true;
    }

    fn save_snapshot(&mut self) {
        let bytes = self.book.snapshot_bytes();
        match self.ctx.snapshots.put(&self.pair, self.last_applied, &bytes) {
            Ok(()) => {
                debug!(pair = %self.pair, offset = self.last_applied, "snapshot saved");
                self.last_snapshot = self.last_applied;
            }
            Err(err) => error!(pair = %self.pair, "snapshot write failed: {}", err),
        }
    }
}

fn order_info(order: &Order, owner: Address, status: OrderStatus) -> OrderInfo {
    OrderInfo {
        status,
        pair: order.pair,
        side: order.side,
        amount: order.amount,
        price: order.price,
        owner,
        timestamp: order.timestamp,
    }
}
