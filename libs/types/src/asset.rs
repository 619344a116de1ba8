//! Assets and asset pairs
//!
//! An asset is either the chain's native coin or an issued asset identified
//! by a 32-byte digest. A market is an ordered pair of assets: the left
//! (amount) asset is traded in units of the right (price) asset.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-byte identifier of an issued asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(#[serde(with = "crate::serde_hex")] pub [u8; 32]);

impl AssetId {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Either the native coin or an issued asset.
///
/// Serializes as `Option<AssetId>`: the native coin is `null` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "Option<AssetId>", into = "Option<AssetId>")]
pub enum Asset {
    Native,
    Issued(AssetId),
}

impl Asset {
    pub fn is_native(&self) -> bool {
        matches!(self, Asset::Native)
    }

    /// Append the canonical byte encoding: tag byte, then the id for issued
    /// assets. Used for order ids and signatures.
    pub fn write_bytes(&self, buf: &mut Vec<u8>) {
        match self {
            Asset::Native => buf.push(0),
            Asset::Issued(id) => {
                buf.push(1);
                buf.extend_from_slice(id.as_bytes());
            }
        }
    }
}

impl From<Option<AssetId>> for Asset {
    fn from(value: Option<AssetId>) -> Self {
        match value {
            None => Asset::Native,
            Some(id) => Asset::Issued(id),
        }
    }
}

impl From<Asset> for Option<AssetId> {
    fn from(value: Asset) -> Self {
        match value {
            Asset::Native => None,
            Asset::Issued(id) => Some(id),
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::Native => write!(f, "native"),
            Asset::Issued(id) => write!(f, "{}", id),
        }
    }
}

/// Ordered pair of assets defining a market.
///
/// Equality is structural; `(A, B)` and `(B, A)` are distinct markets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetPair {
    pub amount_asset: Asset,
    pub price_asset: Asset,
}

impl AssetPair {
    pub fn new(amount_asset: Asset, price_asset: Asset) -> Self {
        Self {
            amount_asset,
            price_asset,
        }
    }

    /// Whether the given asset is one of the pair's legs.
    pub fn contains(&self, asset: &Asset) -> bool {
        self.amount_asset == *asset || self.price_asset == *asset
    }

    /// Canonical byte encoding, amount leg first.
    pub fn write_bytes(&self, buf: &mut Vec<u8>) {
        self.amount_asset.write_bytes(buf);
        self.price_asset.write_bytes(buf);
    }

    /// Stable textual key, usable as a store key or file-name stem.
    pub fn key(&self) -> String {
        format!("{}-{}", self.amount_asset, self.price_asset)
    }
}

impl fmt::Display for AssetPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}
