//! Shared domain types for the matcher
//!
//! Assets and asset pairs, orders and their lifecycle, trades and exchange
//! transactions, queue events, numeric constants, and the error taxonomy.
//! This crate is I/O-free; everything here is plain data.

pub mod asset;
pub mod errors;
pub mod events;
pub mod numeric;
pub mod order;
pub mod trade;

pub use asset::{Asset, AssetId, AssetPair};
pub use errors::MatcherError;
pub use events::{QueueEvent, QueueEventWithMeta};
pub use numeric::{PRICE_CONSTANT, RATE_CONSTANT};
pub use order::{Address, Order, OrderId, OrderSide, OrderSignature, OrderStatus, PublicKey};
pub use trade::{ExchangeTransaction, LastTrade, TxId};

/// Serde helpers for fixed-size byte arrays rendered as lowercase hex.
///
/// Binary ids (asset ids, order ids, addresses, public keys, signatures) are
/// strings on every serialized surface so JSON stays readable and bincode
/// stays deterministic.
pub(crate) mod serde_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, const N: usize>(bytes: &[u8; N], s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D, const N: usize>(d: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(d)?;
        let raw = hex::decode(&text).map_err(serde::de::Error::custom)?;
        raw.try_into()
            .map_err(|_| serde::de::Error::custom(format!("expected {} hex-encoded bytes", N)))
    }
}
