//! Matcher coordinator
//!
//! Root of the service. On startup it resurrects one book actor per
//! registered pair from snapshots, computes the replay position as the
//! minimum snapshot offset across pairs, and consumes the event queue from
//! there. Until restoration completes and consumption catches up with the
//! last offset observed at startup, the matcher reports `Starting` and
//! refuses every public operation.

use crate::actors::orderbook::{BookCommand, BookContext, OrderBookActor};
use crate::actors::AddressRegistry;
use crate::api::OrderBookResponse;
use crate::blockchain::BlockchainContext;
use crate::broadcaster::ExchangeTransactionBroadcaster;
use crate::caches::{AssetDecimalsCache, RateCache};
use crate::settings::MatcherSettings;
use crate::validation::OrderValidator;
use dashmap::DashMap;
use matching_engine::MarketStatus;
use parking_lot::{Mutex, RwLock};
use persistence::{AssetPairRegistry, EventQueue, KvStore, OrderDb, OrderInfo, SnapshotStore};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use types::asset::Asset;
use types::events::QueueEvent;
use types::order::{Address, Order, OrderId, OrderStatus};
use types::{AssetPair, MatcherError};

const CONSUME_BATCH: usize = 256;
const PING_TIMEOUT: Duration = Duration::from_secs(10);
const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Public lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatcherStatus {
    Starting,
    Working,
    Stopped,
}

struct Inner {
    settings: Arc<MatcherSettings>,
    queue: Arc<dyn EventQueue>,
    orderdb: OrderDb,
    registry: AssetPairRegistry,
    validator: OrderValidator,
    rates: RateCache,
    decimals: AssetDecimalsCache,
    addresses: AddressRegistry,
    market: Arc<DashMap<AssetPair, MarketStatus>>,
    books: DashMap<AssetPair, mpsc::Sender<BookCommand>>,
    book_ctx: BookContext,
    status: RwLock<MatcherStatus>,
    running: AtomicBool,
    consume_task: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct Matcher {
    inner: Arc<Inner>,
}

impl Matcher {
    /// Wire the service together. Must run inside a tokio runtime; the
    /// broadcaster task starts immediately, event consumption starts with
    /// [`Matcher::start`].
    pub fn new(
        settings: MatcherSettings,
        queue: Arc<dyn EventQueue>,
        kv: Arc<dyn KvStore>,
        chain: Arc<dyn BlockchainContext>,
    ) -> Result<Self, MatcherError> {
        let settings = Arc::new(settings);
        let snapshots = Arc::new(
            SnapshotStore::open(settings.snapshots_dir())
                .map_err(|e| MatcherError::InternalInvariant(format!("snapshot dir: {}", e)))?,
        );
        let orderdb = OrderDb::new(kv.clone());
        let registry = AssetPairRegistry::new(kv.clone());
        let rates = RateCache::load(kv);
        let validator = OrderValidator::new(settings.clone(), rates.clone(), chain.clone());
        let decimals = AssetDecimalsCache::new(chain.clone());
        let addresses = AddressRegistry::new(chain.clone());
        let broadcaster = ExchangeTransactionBroadcaster::start(chain);
        let market = Arc::new(DashMap::new());

        let book_ctx = BookContext {
            orderdb: orderdb.clone(),
            snapshots,
            addresses: addresses.clone(),
            broadcaster,
            market: market.clone(),
            snapshots_interval: settings.snapshots_interval,
            broadcast_deadline: settings.broadcast_deadline(),
            data_dir: settings.data_dir.clone(),
        };

        Ok(Self {
            inner: Arc::new(Inner {
                settings,
                queue,
                orderdb,
                registry,
                validator,
                rates,
                decimals,
                addresses,
                market,
                books: DashMap::new(),
                book_ctx,
                status: RwLock::new(MatcherStatus::Starting),
                running: AtomicBool::new(false),
                consume_task: Mutex::new(None),
            }),
        })
    }

    /// Restore books, start consumption, and wait until the matcher is
    /// caught up. `Timeout` here means the configured startup deadline was
    /// breached and the process should exit non-zero.
    pub async fn start(&self) -> Result<(), MatcherError> {
        let restore_started = Instant::now();
        let pairs = self.inner.registry.load();
        info!(pairs = pairs.len(), "restoring order books");

        let mut restore_offset = u64::MAX;
        if pairs.is_empty() {
            restore_offset = 0;
        }
        for pair in pairs {
            if restore_started.elapsed() > self.inner.settings.snapshots_loading_timeout() {
                error!("snapshot restoration exceeded its deadline");
                return Err(MatcherError::Timeout);
            }
            let (sender, offset) = self.spawn_book(pair);
            self.inner.books.insert(pair, sender);
            restore_offset = restore_offset.min(offset);
        }

        let startup_target = self
            .inner
            .queue
            .last_event_offset()
            .map_err(|e| MatcherError::QueueUnavailable(e.to_string()))?;
        self.inner.running.store(true, Ordering::SeqCst);

        let consumer = self.clone();
        let handle = tokio::spawn(async move {
            consumer.consume_loop(restore_offset + 1, startup_target).await;
        });
        *self.inner.consume_task.lock() = Some(handle);

        let caught_up = async {
            while self.status() != MatcherStatus::Working {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };
        tokio::time::timeout(self.inner.settings.start_events_processing_timeout(), caught_up)
            .await
            .map_err(|_| {
                error!("event consumption did not catch up before the startup deadline");
                MatcherError::Timeout
            })?;

        info!(from = restore_offset + 1, target = startup_target, "matcher is working");
        Ok(())
    }

    pub fn status(&self) -> MatcherStatus {
        *self.inner.status.read()
    }

    // ── Public operations ───────────────────────────────────────────

    /// Validate, reserve, and append a placement. `Ok` means the order is
    /// accepted into the queue; matching happens asynchronously and clients
    /// poll the order status. A `Timeout` does not guarantee the event was
    /// not appended.
    pub async fn place(&self, order: Order) -> Result<OrderId, MatcherError> {
        match tokio::time::timeout(
            self.inner.settings.placement_timeout(),
            self.place_inner(order),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(MatcherError::Timeout),
        }
    }

    async fn place_inner(&self, order: Order) -> Result<OrderId, MatcherError> {
        self.ensure_working()?;
        let market = self.inner.market.get(&order.pair).map(|m| *m.value());
        self.inner
            .validator
            .validate(&order, now_millis(), market)
            .await?;
        if self.inner.orderdb.contains(&order.id) {
            return Err(MatcherError::DuplicateOrder(order.id));
        }
        self.inner.addresses.place_check(order.clone()).await?;

        let request_id = order.id.to_string();
        match self
            .inner
            .queue
            .append(QueueEvent::PlaceOrder { order: order.clone() }, &request_id)
        {
            Ok((offset, _)) => {
                info!(order = %order.id, offset, "order accepted");
                Ok(order.id)
            }
            Err(err) => {
                // The hold was taken optimistically; give it back.
                self.inner
                    .addresses
                    .apply_cancel(order.owner.address(), order.id);
                Err(MatcherError::QueueUnavailable(err.to_string()))
            }
        }
    }

    /// Append a cancellation for an order owned by `owner`.
    pub async fn cancel(&self, order_id: OrderId, owner: Address) -> Result<(), MatcherError> {
        self.ensure_working()?;
        let info = self
            .inner
            .orderdb
            .get(&order_id)
            .ok_or(MatcherError::OrderNotFound(order_id))?;
        if info.owner != owner {
            return Err(MatcherError::Invalid(
                "order belongs to a different address".into(),
            ));
        }
        if info.status.is_terminal() {
            return Err(MatcherError::Invalid(format!(
                "order {} is already in a terminal status",
                order_id
            )));
        }
        let request_id = format!("cancel-{}", order_id);
        self.inner
            .queue
            .append(
                QueueEvent::CancelOrder {
                    pair: info.pair,
                    order_id,
                    owner,
                },
                &request_id,
            )
            .map_err(|e| MatcherError::QueueUnavailable(e.to_string()))?;
        Ok(())
    }

    /// Administrative: remove a whole order book, cancelling everything on
    /// it.
    pub async fn delete_order_book(&self, pair: AssetPair) -> Result<(), MatcherError> {
        self.ensure_working()?;
        if !self.inner.registry.contains(&pair) && !self.inner.books.contains_key(&pair) {
            return Err(MatcherError::UnknownPair(pair));
        }
        let request_id = format!("delete-{}", pair.key());
        self.inner
            .queue
            .append(QueueEvent::OrderBookDeleted { pair }, &request_id)
            .map_err(|e| MatcherError::QueueUnavailable(e.to_string()))?;
        Ok(())
    }

    // ── Queries (all refuse during Starting) ────────────────────────

    pub fn order_status(&self, order_id: &OrderId) -> Result<OrderStatus, MatcherError> {
        self.ensure_working()?;
        Ok(self.inner.orderdb.status(order_id))
    }

    pub async fn order_book(
        &self,
        pair: AssetPair,
        depth: usize,
    ) -> Result<OrderBookResponse, MatcherError> {
        self.ensure_working()?;
        let sender = self
            .inner
            .books
            .get(&pair)
            .map(|s| s.clone())
            .ok_or(MatcherError::UnknownPair(pair))?;

        let (respond, result) = oneshot::channel();
        sender
            .send(BookCommand::GetDepth {
                limit: depth,
                respond,
            })
            .await
            .map_err(|_| MatcherError::UnknownPair(pair))?;
        let (bids, asks) = tokio::time::timeout(QUERY_TIMEOUT, result)
            .await
            .map_err(|_| MatcherError::Timeout)?
            .map_err(|_| MatcherError::UnknownPair(pair))?;

        Ok(OrderBookResponse {
            pair,
            amount_asset_decimals: self.inner.decimals.decimals(&pair.amount_asset).await,
            price_asset_decimals: self.inner.decimals.decimals(&pair.price_asset).await,
            bids,
            asks,
        })
    }

    pub fn market_status(&self, pair: &AssetPair) -> Result<MarketStatus, MatcherError> {
        self.ensure_working()?;
        self.inner
            .market
            .get(pair)
            .map(|m| *m.value())
            .ok_or(MatcherError::UnknownPair(*pair))
    }

    pub async fn reserved_balances(
        &self,
        address: Address,
    ) -> Result<BTreeMap<Asset, u128>, MatcherError> {
        self.ensure_working()?;
        Ok(self.inner.addresses.reserved_balances(address).await)
    }

    pub fn order_history(
        &self,
        address: &Address,
    ) -> Result<Vec<(OrderId, OrderInfo)>, MatcherError> {
        self.ensure_working()?;
        Ok(self.inner.orderdb.history(address))
    }

    pub fn rates(&self) -> Result<BTreeMap<Asset, u64>, MatcherError> {
        self.ensure_working()?;
        Ok(self.inner.rates.all())
    }

    /// Administrative: set or replace a fee-asset rate.
    pub fn upsert_rate(&self, asset: Asset, rate: u64) -> Result<(), MatcherError> {
        self.ensure_working()?;
        self.inner.rates.upsert(asset, rate);
        Ok(())
    }

    pub fn delete_rate(&self, asset: &Asset) -> Result<(), MatcherError> {
        self.ensure_working()?;
        if asset.is_native() {
            return Err(MatcherError::Invalid(
                "the native coin rate cannot be removed".into(),
            ));
        }
        self.inner.rates.delete(asset);
        Ok(())
    }

    // ── Shutdown ────────────────────────────────────────────────────

    /// Stop consumption, snapshot every book, release the queue. Resources
    /// unwind in reverse acquisition order.
    pub async fn shutdown(&self) {
        *self.inner.status.write() = MatcherStatus::Stopped;
        self.inner.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.inner.consume_task.lock().take() {
            if let Err(err) = handle.await {
                warn!("consume task ended abnormally: {}", err);
            }
        }

        let senders: Vec<mpsc::Sender<BookCommand>> = self
            .inner
            .books
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for sender in senders {
            let (respond, done) = oneshot::channel();
            if sender.send(BookCommand::Shutdown { respond }).await.is_ok() {
                let _ = tokio::time::timeout(PING_TIMEOUT, done).await;
            }
        }

        if let Err(err) = self.inner.queue.close(Duration::from_secs(10)) {
            warn!("queue close failed: {}", err);
        }
        info!("matcher stopped");
    }

    // ── Internals ───────────────────────────────────────────────────

    fn ensure_working(&self) -> Result<(), MatcherError> {
        match self.status() {
            MatcherStatus::Working => Ok(()),
            _ => Err(MatcherError::Starting),
        }
    }

    fn spawn_book(&self, pair: AssetPair) -> (mpsc::Sender<BookCommand>, u64) {
        let restrictions = self.inner.settings.restrictions_for(&pair);
        OrderBookActor::spawn(
            pair,
            self.inner.settings.matching_rules_for(&pair),
            restrictions.min_amount,
            restrictions.step_amount,
            self.inner.book_ctx.clone(),
        )
    }

    /// Book mailbox for routing; creates the actor and registers the pair
    /// on first touch. Only the consume task and startup call this.
    fn book_sender(&self, pair: AssetPair) -> mpsc::Sender<BookCommand> {
        if let Some(sender) = self.inner.books.get(&pair) {
            return sender.clone();
        }
        let (sender, _) = self.spawn_book(pair);
        self.inner.registry.add(&pair);
        self.inner.books.insert(pair, sender.clone());
        sender
    }

    async fn consume_loop(self, mut from: u64, startup_target: u64) {
        let poll_interval =
            Duration::from_millis(self.inner.settings.events_queue.local.poll_interval_millis);
        if startup_target < from {
            *self.inner.status.write() = MatcherStatus::Working;
        }

        while self.inner.running.load(Ordering::SeqCst) {
            let batch = match self.inner.queue.poll(from, CONSUME_BATCH) {
                Ok(batch) => batch,
                Err(err) => {
                    error!("queue poll failed: {}", err);
                    tokio::time::sleep(poll_interval).await;
                    continue;
                }
            };
            if batch.is_empty() {
                tokio::time::sleep(poll_interval).await;
                continue;
            }

            let last = batch.last().map(|m| m.offset).unwrap_or(from);
            let mut touched: HashMap<AssetPair, mpsc::Sender<BookCommand>> = HashMap::new();

            for meta in batch {
                let pair = *meta.event.pair();
                let deleting = matches!(meta.event, QueueEvent::OrderBookDeleted { .. });
                let sender = self.book_sender(pair);
                if sender.send(BookCommand::ApplyEvent(meta)).await.is_err() {
                    warn!(%pair, "book actor is gone, event dropped");
                }
                if deleting {
                    // The actor stops after the delete; wait for its mailbox
                    // to close so its cleanup cannot race a re-creation of
                    // the same pair later in the log.
                    sender.closed().await;
                    touched.remove(&pair);
                    self.inner.books.remove(&pair);
                    self.inner.registry.remove(&pair);
                } else {
                    touched.insert(pair, sender);
                }
            }

            // Barrier: an offset is acknowledged only after every touched
            // actor has applied its part of the batch.
            for (pair, sender) in touched {
                let (respond, done) = oneshot::channel();
                if sender.send(BookCommand::Ping { respond }).await.is_err() {
                    continue;
                }
                match tokio::time::timeout(PING_TIMEOUT, done).await {
                    Ok(_) => {}
                    Err(_) => warn!(%pair, "barrier ping timed out"),
                }
            }

            if let Err(err) = self.inner.queue.commit(last) {
                error!("offset commit failed: {}", err);
            }
            from = last + 1;

            if self.status() == MatcherStatus::Starting && last >= startup_target {
                *self.inner.status.write() = MatcherStatus::Working;
            }
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
