//! End-to-end scenarios through the coordinator
//!
//! Each test drives the full stack: validation, reservations, the event
//! queue, book actors, the order index, and snapshots, against a static
//! chain stand-in.

use ed25519_dalek::SigningKey;
use matcher::blockchain::{BlockchainContext, StaticChain};
use matcher::settings::MatchingRuleSettings;
use matcher::{Matcher, MatcherSettings, MatcherStatus};
use persistence::{EventQueue, KvStore, LocalQueue, MemKv};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tempfile::TempDir;
use types::asset::{Asset, AssetId, AssetPair};
use types::events::QueueEvent;
use types::order::{Order, OrderId, OrderSide, OrderStatus};
use types::{MatcherError, PRICE_CONSTANT};

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

fn pair() -> AssetPair {
    AssetPair::new(Asset::Issued(AssetId::new([0xaa; 32])), Asset::Native)
}

fn amount_asset() -> Asset {
    Asset::Issued(AssetId::new([0xaa; 32]))
}

fn signed_at(seed: u8, side: OrderSide, amount: u64, price: u64, fee: u64, ts: u64) -> Order {
    let key = SigningKey::from_bytes(&[seed; 32]);
    Order::new_signed(
        &key,
        pair(),
        side,
        amount,
        price,
        fee,
        Asset::Native,
        ts,
        ts + 10 * 60_000,
        3,
    )
}

fn signed(seed: u8, side: OrderSide, amount: u64, price: u64, fee: u64) -> Order {
    signed_at(seed, side, amount, price, fee, now_millis())
}

async fn start_matcher(
    dir: &Path,
    kv: Arc<MemKv>,
    chain: Arc<StaticChain>,
    tweak: impl FnOnce(&mut MatcherSettings),
) -> Matcher {
    let mut settings = MatcherSettings {
        data_dir: dir.to_path_buf(),
        snapshots_interval: 1,
        ..MatcherSettings::default()
    };
    tweak(&mut settings);

    for sub in [settings.data_dir.clone(), settings.queue_dir(), settings.snapshots_dir()] {
        std::fs::create_dir_all(sub).unwrap();
    }
    let queue: Arc<dyn EventQueue> = Arc::new(LocalQueue::open(settings.queue_dir()).unwrap());
    let kv: Arc<dyn KvStore> = kv;
    let chain: Arc<dyn BlockchainContext> = chain;

    let matcher = Matcher::new(settings, queue, kv, chain).unwrap();
    matcher.start().await.unwrap();
    matcher
}

async fn wait_status(matcher: &Matcher, id: &OrderId, expected: OrderStatus) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if matcher.order_status(id).unwrap() == expected {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "order {} never reached {:?}, last seen {:?}",
            id,
            expected,
            matcher.order_status(id).unwrap()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_simple_cross() {
    let dir = TempDir::new().unwrap();
    let chain = Arc::new(StaticChain::permissive());
    let matcher = start_matcher(dir.path(), Arc::new(MemKv::new()), chain.clone(), |_| {}).await;

    let s1 = signed(1, OrderSide::Sell, 100, 2 * PRICE_CONSTANT, 300_000);
    let b1 = signed(2, OrderSide::Buy, 60, 3 * PRICE_CONSTANT, 300_000);

    matcher.place(s1.clone()).await.unwrap();
    wait_status(&matcher, &s1.id, OrderStatus::Accepted).await;

    matcher.place(b1.clone()).await.unwrap();
    wait_status(
        &matcher,
        &b1.id,
        OrderStatus::Filled {
            filled: 60,
            filled_fee: 300_000,
        },
    )
    .await;

    assert_eq!(
        matcher.order_status(&s1.id).unwrap(),
        OrderStatus::PartiallyFilled {
            filled: 60,
            filled_fee: 180_000
        }
    );

    let book = matcher.order_book(pair(), 10).await.unwrap();
    assert!(book.bids.is_empty());
    assert_eq!(book.asks.len(), 1);
    assert_eq!(book.asks[0].price, 2 * PRICE_CONSTANT);
    assert_eq!(book.asks[0].amount, 40);

    let market = matcher.market_status(&pair()).unwrap();
    let trade = market.last_trade.unwrap();
    assert_eq!(trade.amount, 60);
    assert_eq!(trade.price, 2 * PRICE_CONSTANT);
    assert_eq!(trade.side, OrderSide::Buy);

    // One crossing, one settlement transaction (delivered off the matching
    // path, so give the broadcaster a moment).
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while chain.broadcast_count() < 1 {
        assert!(tokio::time::Instant::now() < deadline, "transaction never broadcast");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(chain.broadcast_count(), 1);

    matcher.shutdown().await;
}

#[tokio::test]
async fn test_tick_size_aggregation() {
    let dir = TempDir::new().unwrap();
    let chain = Arc::new(StaticChain::permissive());
    let matcher = start_matcher(dir.path(), Arc::new(MemKv::new()), chain, |settings| {
        settings.matching_rules.insert(
            pair().key(),
            vec![MatchingRuleSettings {
                start_offset: 0,
                tick_size: 100,
            }],
        );
    })
    .await;

    let now = now_millis();
    let s1 = signed_at(1, OrderSide::Sell, 10, 205, 300_000, now - 2_000);
    let s2 = signed_at(2, OrderSide::Sell, 10, 250, 300_000, now - 1_000);
    let b1 = signed_at(3, OrderSide::Buy, 15, 300, 300_000, now);

    matcher.place(s1.clone()).await.unwrap();
    wait_status(&matcher, &s1.id, OrderStatus::Accepted).await;
    matcher.place(s2.clone()).await.unwrap();
    wait_status(&matcher, &s2.id, OrderStatus::Accepted).await;

    // Both asks project onto bucket 300.
    let book = matcher.order_book(pair(), 10).await.unwrap();
    assert_eq!(book.asks.len(), 1);
    assert_eq!(book.asks[0].price, 300);
    assert_eq!(book.asks[0].amount, 20);

    matcher.place(b1.clone()).await.unwrap();
    wait_status(
        &matcher,
        &b1.id,
        OrderStatus::Filled {
            filled: 15,
            filled_fee: 300_000,
        },
    )
    .await;

    // Time priority inside the bucket: S1 fills first and completely.
    assert_eq!(
        matcher.order_status(&s1.id).unwrap(),
        OrderStatus::Filled {
            filled: 10,
            filled_fee: 300_000
        }
    );
    assert_eq!(
        matcher.order_status(&s2.id).unwrap(),
        OrderStatus::PartiallyFilled {
            filled: 5,
            filled_fee: 150_000
        }
    );

    // Executions settled at the makers' own prices.
    let market = matcher.market_status(&pair()).unwrap();
    assert_eq!(market.last_trade.unwrap().price, 250);

    matcher.shutdown().await;
}

#[tokio::test]
async fn test_cancel_during_partial_fill() {
    let dir = TempDir::new().unwrap();
    let chain = Arc::new(StaticChain::permissive());
    let matcher = start_matcher(dir.path(), Arc::new(MemKv::new()), chain, |_| {}).await;

    let s1 = signed(1, OrderSide::Sell, 100, 2 * PRICE_CONSTANT, 300_000);
    let b1 = signed(2, OrderSide::Buy, 60, 3 * PRICE_CONSTANT, 300_000);
    let owner = s1.owner.address();

    matcher.place(s1.clone()).await.unwrap();
    wait_status(&matcher, &s1.id, OrderStatus::Accepted).await;
    matcher.place(b1.clone()).await.unwrap();
    wait_status(
        &matcher,
        &b1.id,
        OrderStatus::Filled {
            filled: 60,
            filled_fee: 300_000,
        },
    )
    .await;

    matcher.cancel(s1.id, owner).await.unwrap();
    wait_status(
        &matcher,
        &s1.id,
        OrderStatus::Cancelled {
            filled: 60,
            filled_fee: 180_000,
        },
    )
    .await;

    let book = matcher.order_book(pair(), 10).await.unwrap();
    assert!(book.bids.is_empty());
    assert!(book.asks.is_empty());

    // The reservation for the cancelled remainder is fully released.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if matcher.reserved_balances(owner).await.unwrap().is_empty() {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "reservation not released");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Cancelling again is a client error.
    assert!(matches!(
        matcher.cancel(s1.id, owner).await,
        Err(MatcherError::Invalid(_))
    ));

    matcher.shutdown().await;
}

#[tokio::test]
async fn test_restart_replays_to_identical_state() {
    let dir = TempDir::new().unwrap();
    let kv = Arc::new(MemKv::new());
    let chain = Arc::new(StaticChain::permissive());

    let s1 = signed(1, OrderSide::Sell, 100, 2 * PRICE_CONSTANT, 300_000);
    let b1 = signed(2, OrderSide::Buy, 60, 3 * PRICE_CONSTANT, 300_000);
    let owner = s1.owner.address();

    {
        let matcher = start_matcher(dir.path(), kv.clone(), chain.clone(), |_| {}).await;
        matcher.place(s1.clone()).await.unwrap();
        wait_status(&matcher, &s1.id, OrderStatus::Accepted).await;
        matcher.place(b1.clone()).await.unwrap();
        wait_status(
            &matcher,
            &b1.id,
            OrderStatus::Filled {
                filled: 60,
                filled_fee: 300_000,
            },
        )
        .await;
        // Stops consumption and snapshots at offset 2.
        matcher.shutdown().await;
    }

    // The cancel lands in the log while the matcher is down; the "crash"
    // never saw it.
    {
        let queue = LocalQueue::open(dir.path().join("queue")).unwrap();
        queue
            .append(
                QueueEvent::CancelOrder {
                    pair: pair(),
                    order_id: s1.id,
                    owner,
                },
                "late-cancel",
            )
            .unwrap();
    }

    let restarted = start_matcher(dir.path(), kv, chain, |_| {}).await;
    wait_status(
        &restarted,
        &s1.id,
        OrderStatus::Cancelled {
            filled: 60,
            filled_fee: 180_000,
        },
    )
    .await;
    assert_eq!(
        restarted.order_status(&b1.id).unwrap(),
        OrderStatus::Filled {
            filled: 60,
            filled_fee: 300_000
        }
    );

    let book = restarted.order_book(pair(), 10).await.unwrap();
    assert!(book.bids.is_empty());
    assert!(book.asks.is_empty());
    assert!(restarted.reserved_balances(owner).await.unwrap().is_empty());

    restarted.shutdown().await;
}

#[tokio::test]
async fn test_reservation_refusal_appends_nothing() {
    let dir = TempDir::new().unwrap();
    let chain = Arc::new(StaticChain::new());
    let b1 = signed(3, OrderSide::Buy, 1, 100 * PRICE_CONSTANT, 50);
    // Spendable 100 of the price asset; the order needs 1 * 100 + 50 = 150.
    chain.set_balance(b1.owner.address(), Asset::Native, 100);

    let matcher = start_matcher(
        dir.path(),
        Arc::new(MemKv::new()),
        chain,
        |settings| settings.order_fee.base_fee = 0,
    )
    .await;

    let err = matcher.place(b1.clone()).await.unwrap_err();
    match err {
        MatcherError::InsufficientBalance {
            required, spendable, ..
        } => {
            assert_eq!(required, 150);
            assert_eq!(spendable, 100);
        }
        other => panic!("expected InsufficientBalance, got {:?}", other),
    }

    assert_eq!(matcher.order_status(&b1.id).unwrap(), OrderStatus::NotFound);

    matcher.shutdown().await;
}

#[tokio::test]
async fn test_queries_refused_while_starting() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("queue")).unwrap();
    let settings = MatcherSettings {
        data_dir: dir.path().to_path_buf(),
        ..MatcherSettings::default()
    };
    let queue: Arc<dyn EventQueue> =
        Arc::new(LocalQueue::open(settings.queue_dir()).unwrap());
    let matcher = Matcher::new(
        settings,
        queue,
        Arc::new(MemKv::new()),
        Arc::new(StaticChain::permissive()),
    )
    .unwrap();

    // Not started: everything refuses uniformly.
    assert_eq!(matcher.status(), MatcherStatus::Starting);
    assert!(matches!(
        matcher.place(signed(1, OrderSide::Sell, 10, PRICE_CONSTANT, 300_000)).await,
        Err(MatcherError::Starting)
    ));
    assert!(matches!(
        matcher.order_status(&OrderId([1; 32])),
        Err(MatcherError::Starting)
    ));
    assert!(matches!(
        matcher.market_status(&pair()),
        Err(MatcherError::Starting)
    ));
}

#[tokio::test]
async fn test_duplicate_submission_is_rejected() {
    let dir = TempDir::new().unwrap();
    let matcher = start_matcher(
        dir.path(),
        Arc::new(MemKv::new()),
        Arc::new(StaticChain::permissive()),
        |_| {},
    )
    .await;

    let s1 = signed(1, OrderSide::Sell, 100, 2 * PRICE_CONSTANT, 300_000);
    matcher.place(s1.clone()).await.unwrap();
    wait_status(&matcher, &s1.id, OrderStatus::Accepted).await;

    assert!(matches!(
        matcher.place(s1.clone()).await,
        Err(MatcherError::DuplicateOrder(_))
    ));

    matcher.shutdown().await;
}

#[tokio::test]
async fn test_order_history_per_address() {
    let dir = TempDir::new().unwrap();
    let matcher = start_matcher(
        dir.path(),
        Arc::new(MemKv::new()),
        Arc::new(StaticChain::permissive()),
        |_| {},
    )
    .await;

    let now = now_millis();
    let key = SigningKey::from_bytes(&[5; 32]);
    let older = Order::new_signed(
        &key,
        pair(),
        OrderSide::Sell,
        10,
        5 * PRICE_CONSTANT,
        300_000,
        Asset::Native,
        now - 1_000,
        now + 10 * 60_000,
        3,
    );
    let newer = Order::new_signed(
        &key,
        pair(),
        OrderSide::Sell,
        20,
        6 * PRICE_CONSTANT,
        300_000,
        Asset::Native,
        now,
        now + 10 * 60_000,
        3,
    );
    let owner = older.owner.address();

    matcher.place(older.clone()).await.unwrap();
    wait_status(&matcher, &older.id, OrderStatus::Accepted).await;
    matcher.place(newer.clone()).await.unwrap();
    wait_status(&matcher, &newer.id, OrderStatus::Accepted).await;

    let history = matcher.order_history(&owner).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].0, newer.id);
    assert_eq!(history[1].0, older.id);

    // The amount-asset reservation covers both resting sells.
    let reserved = matcher.reserved_balances(owner).await.unwrap();
    assert_eq!(reserved.get(&amount_asset()), Some(&30));

    matcher.shutdown().await;
}

#[tokio::test]
async fn test_order_book_deletion_cancels_resting_orders() {
    let dir = TempDir::new().unwrap();
    let matcher = start_matcher(
        dir.path(),
        Arc::new(MemKv::new()),
        Arc::new(StaticChain::permissive()),
        |_| {},
    )
    .await;

    let s1 = signed(1, OrderSide::Sell, 100, 2 * PRICE_CONSTANT, 300_000);
    matcher.place(s1.clone()).await.unwrap();
    wait_status(&matcher, &s1.id, OrderStatus::Accepted).await;

    matcher.delete_order_book(pair()).await.unwrap();
    wait_status(
        &matcher,
        &s1.id,
        OrderStatus::Cancelled {
            filled: 0,
            filled_fee: 0,
        },
    )
    .await;

    // The pair is gone until someone places on it again.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if matches!(
            matcher.market_status(&pair()),
            Err(MatcherError::UnknownPair(_))
        ) {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "market view not removed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    matcher.shutdown().await;
}
