//! Versioned binary codec for order-book snapshots
//!
//! The layout is explicit and little-endian so it is deterministic across
//! implementations:
//!
//! ```text
//! version: u8
//! pair:    amount leg (u8 len + bytes), price leg (u8 len + bytes)
//! aggregation: u8 tag, then ticks: u64 when enabled
//! bid_count: u32, bid entries
//! ask_count: u32, ask entries
//! last_trade: u8 tag, then amount: u64, price: u64, side: u8
//! ```
//!
//! Each entry carries the full order (the signed document fields) plus the
//! unexecuted remainders. Entries are written in ascending bucket order,
//! queue order within a bucket; encoding the same book twice yields
//! identical bytes.

use crate::book::{LimitOrder, OrderBook};
use crate::rules::TickSize;
use thiserror::Error;
use types::asset::{Asset, AssetId, AssetPair};
use types::order::{Order, OrderId, OrderSide, OrderSignature, PublicKey};
use types::trade::LastTrade;

/// Current snapshot payload version.
pub const SNAPSHOT_VERSION: u8 = 1;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("snapshot payload truncated at byte {0}")]
    Truncated(usize),

    #[error("unsupported snapshot payload version: {0}")]
    UnsupportedVersion(u8),

    #[error("malformed snapshot payload: {0}")]
    Malformed(String),
}

// ── Writing ─────────────────────────────────────────────────────────

fn write_asset(buf: &mut Vec<u8>, asset: Asset) {
    match asset {
        Asset::Native => buf.push(0),
        Asset::Issued(id) => {
            buf.push(32);
            buf.extend_from_slice(id.as_bytes());
        }
    }
}

fn write_entry(buf: &mut Vec<u8>, entry: &LimitOrder) {
    let order = &entry.order;
    buf.extend_from_slice(order.id.as_bytes());
    buf.push(order.version);
    buf.push(side_tag(order.side));
    buf.extend_from_slice(&order.owner.0);
    write_asset(buf, order.fee_asset);
    buf.extend_from_slice(&order.price.to_le_bytes());
    buf.extend_from_slice(&order.amount.to_le_bytes());
    buf.extend_from_slice(&order.matcher_fee.to_le_bytes());
    buf.extend_from_slice(&order.timestamp.to_le_bytes());
    buf.extend_from_slice(&order.expiration.to_le_bytes());
    buf.extend_from_slice(&order.signature.0);
    buf.extend_from_slice(&entry.amount_remaining.to_le_bytes());
    buf.extend_from_slice(&entry.fee_remaining.to_le_bytes());
}

fn side_tag(side: OrderSide) -> u8 {
    match side {
        OrderSide::Buy => 0,
        OrderSide::Sell => 1,
    }
}

// ── Reading ─────────────────────────────────────────────────────────

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(n).ok_or(CodecError::Truncated(self.pos))?;
        if end > self.data.len() {
            return Err(CodecError::Truncated(self.pos));
        }
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.bytes(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.bytes(4)?.try_into().expect("4 bytes")))
    }

    fn u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.bytes(8)?.try_into().expect("8 bytes")))
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        Ok(self.bytes(N)?.try_into().expect("exact length"))
    }

    fn asset(&mut self) -> Result<Asset, CodecError> {
        match self.u8()? {
            0 => Ok(Asset::Native),
            32 => Ok(Asset::Issued(AssetId::new(self.array::<32>()?))),
            n => Err(CodecError::Malformed(format!("asset length tag {}", n))),
        }
    }

    fn side(&mut self) -> Result<OrderSide, CodecError> {
        match self.u8()? {
            0 => Ok(OrderSide::Buy),
            1 => Ok(OrderSide::Sell),
            n => Err(CodecError::Malformed(format!("side tag {}", n))),
        }
    }

    fn entry(&mut self, pair: AssetPair) -> Result<LimitOrder, CodecError> {
        let id = OrderId(self.array::<32>()?);
        let version = self.u8()?;
        let side = self.side()?;
        let owner = PublicKey(self.array::<32>()?);
        let fee_asset = self.asset()?;
        let price = self.u64()?;
        let amount = self.u64()?;
        let matcher_fee = self.u64()?;
        let timestamp = self.u64()?;
        let expiration = self.u64()?;
        let signature = OrderSignature(self.array::<64>()?);
        let amount_remaining = self.u64()?;
        let fee_remaining = self.u64()?;

        if amount_remaining > amount {
            return Err(CodecError::Malformed(format!(
                "entry {} remainder {} exceeds amount {}",
                id, amount_remaining, amount
            )));
        }

        Ok(LimitOrder {
            order: Order {
                id,
                owner,
                pair,
                side,
                amount,
                price,
                matcher_fee,
                fee_asset,
                timestamp,
                expiration,
                version,
                signature,
            },
            amount_remaining,
            fee_remaining,
        })
    }
}

// ── Book methods ────────────────────────────────────────────────────

impl OrderBook {
    /// Serialize this book into the versioned snapshot payload.
    pub fn snapshot_bytes(&self) -> Vec<u8> {
        let (bid_count, ask_count) = self.order_counts();
        let mut buf = Vec::with_capacity(64 + (bid_count + ask_count) * 200);

        buf.push(SNAPSHOT_VERSION);
        write_asset(&mut buf, self.pair().amount_asset);
        write_asset(&mut buf, self.pair().price_asset);

        match self.aggregation() {
            TickSize::Disabled => buf.push(0),
            TickSize::Enabled(t) => {
                buf.push(1);
                buf.extend_from_slice(&t.to_le_bytes());
            }
        }

        buf.extend_from_slice(&(bid_count as u32).to_le_bytes());
        for entry in self.bid_orders() {
            write_entry(&mut buf, entry);
        }
        buf.extend_from_slice(&(ask_count as u32).to_le_bytes());
        for entry in self.ask_orders() {
            write_entry(&mut buf, entry);
        }

        match self.last_trade() {
            None => buf.push(0),
            Some(trade) => {
                buf.push(1);
                buf.extend_from_slice(&trade.amount.to_le_bytes());
                buf.extend_from_slice(&trade.price.to_le_bytes());
                buf.push(side_tag(trade.side));
            }
        }

        buf
    }

    /// Rebuild a book from a snapshot payload.
    pub fn from_snapshot_bytes(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);

        let version = r.u8()?;
        if version != SNAPSHOT_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }

        let amount_asset = r.asset()?;
        let price_asset = r.asset()?;
        let pair = AssetPair::new(amount_asset, price_asset);

        let aggregation = match r.u8()? {
            0 => TickSize::Disabled,
            1 => TickSize::Enabled(r.u64()?),
            n => return Err(CodecError::Malformed(format!("aggregation tag {}", n))),
        };

        let bid_count = r.u32()? as usize;
        let mut bids = Vec::with_capacity(bid_count);
        for _ in 0..bid_count {
            bids.push(r.entry(pair)?);
        }
        let ask_count = r.u32()? as usize;
        let mut asks = Vec::with_capacity(ask_count);
        for _ in 0..ask_count {
            asks.push(r.entry(pair)?);
        }

        let last_trade = match r.u8()? {
            0 => None,
            1 => Some(LastTrade {
                amount: r.u64()?,
                price: r.u64()?,
                side: r.side()?,
            }),
            n => return Err(CodecError::Malformed(format!("last-trade tag {}", n))),
        };

        Ok(OrderBook::restore(pair, aggregation, bids, asks, last_trade))
    }
}

// ── Tests ───────────────────────────────────────────────────────────
