//! Order lifecycle types
//!
//! Orders are immutable client-signed documents. The order id is the SHA-256
//! digest of the canonical byte encoding, and the signature is ed25519 over
//! those same bytes under the owner's public key. Statuses move forward only:
//! `Filled` and `Cancelled` are absorbing.

use crate::asset::{Asset, AssetPair};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Order side (buyer or seller).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    fn tag(&self) -> u8 {
        match self {
            OrderSide::Buy => 0,
            OrderSide::Sell => 1,
        }
    }
}

/// Unique identifier of an order: SHA-256 of the canonical bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(#[serde(with = "crate::serde_hex")] pub [u8; 32]);

impl OrderId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Ed25519 public key of the order owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicKey(#[serde(with = "crate::serde_hex")] pub [u8; 32]);

impl PublicKey {
    /// Address derived from the key: SHA-256 of the key bytes.
    pub fn address(&self) -> Address {
        let digest = Sha256::digest(self.0);
        Address(digest.into())
    }

    /// Verify an ed25519 signature over `message`. A malformed key verifies
    /// nothing.
    pub fn verify(&self, message: &[u8], signature: &OrderSignature) -> bool {
        match VerifyingKey::from_bytes(&self.0) {
            Ok(key) => key
                .verify(message, &Signature::from_bytes(&signature.0))
                .is_ok(),
            Err(_) => false,
        }
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Account address, derived from the owner public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(#[serde(with = "crate::serde_hex")] pub [u8; 32]);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Detached ed25519 signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderSignature(#[serde(with = "crate::serde_hex")] pub [u8; 64]);

/// A limit order as submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub owner: PublicKey,
    pub pair: AssetPair,
    pub side: OrderSide,
    /// Amount in the amount asset's smallest unit. Always positive.
    pub amount: u64,
    /// Price asset units per `PRICE_CONSTANT` amount-asset units. Positive.
    pub price: u64,
    /// Fee paid to the matcher, in `fee_asset` units; prorated across fills.
    pub matcher_fee: u64,
    pub fee_asset: Asset,
    pub timestamp: u64,
    pub expiration: u64,
    pub version: u8,
    pub signature: OrderSignature,
}

impl Order {
    /// Canonical byte encoding: the signed document and the id preimage.
    ///
    /// Layout (little-endian integers):
    /// `version, side tag, owner, pair, price, amount, matcher_fee,
    /// fee_asset, timestamp, expiration`.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(128);
        buf.push(self.version);
        buf.push(self.side.tag());
        buf.extend_from_slice(&self.owner.0);
        self.pair.write_bytes(&mut buf);
        buf.extend_from_slice(&self.price.to_le_bytes());
        buf.extend_from_slice(&self.amount.to_le_bytes());
        buf.extend_from_slice(&self.matcher_fee.to_le_bytes());
        self.fee_asset.write_bytes(&mut buf);
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(&self.expiration.to_le_bytes());
        buf
    }

    /// Recompute the id from the canonical bytes.
    pub fn compute_id(&self) -> OrderId {
        OrderId(Sha256::digest(self.canonical_bytes()).into())
    }

    /// Verify the signature under the owner key, over the canonical bytes.
    pub fn verify_signature(&self) -> bool {
        self.owner.verify(&self.canonical_bytes(), &self.signature)
    }

    /// Structural invariants every order must satisfy regardless of matcher
    /// settings. Returns the first violation.
    pub fn check_shape(&self) -> Result<(), String> {
        if self.amount == 0 {
            return Err("amount must be positive".into());
        }
        if self.price == 0 {
            return Err("price must be positive".into());
        }
        if self.expiration <= self.timestamp {
            return Err("expiration must be after the order timestamp".into());
        }
        if self.pair.amount_asset == self.pair.price_asset {
            return Err("amount and price assets must differ".into());
        }
        if self.id != self.compute_id() {
            return Err("order id does not match the order contents".into());
        }
        if !self.verify_signature() {
            return Err("signature verification failed".into());
        }
        Ok(())
    }

    /// The asset this order spends when it trades.
    pub fn spend_asset(&self) -> Asset {
        match self.side {
            OrderSide::Buy => self.pair.price_asset,
            OrderSide::Sell => self.pair.amount_asset,
        }
    }

    /// The asset this order receives when it trades.
    pub fn receive_asset(&self) -> Asset {
        match self.side {
            OrderSide::Buy => self.pair.amount_asset,
            OrderSide::Sell => self.pair.price_asset,
        }
    }

    /// Build and sign an order with the given key, filling in the id.
    #[allow(clippy::too_many_arguments)]
    pub fn new_signed(
        key: &SigningKey,
        pair: AssetPair,
        side: OrderSide,
        amount: u64,
        price: u64,
        matcher_fee: u64,
        fee_asset: Asset,
        timestamp: u64,
        expiration: u64,
        version: u8,
    ) -> Self {
        let mut order = Self {
            id: OrderId([0; 32]),
            owner: PublicKey(key.verifying_key().to_bytes()),
            pair,
            side,
            amount,
            price,
            matcher_fee,
            fee_asset,
            timestamp,
            expiration,
            version,
            signature: OrderSignature([0; 64]),
        };
        let bytes = order.canonical_bytes();
        order.signature = OrderSignature(key.sign(&bytes).to_bytes());
        order.id = OrderId(Sha256::digest(&bytes).into());
        order
    }
}

/// Lifecycle status of an order.
///
/// `filled` and `filled_fee` accumulate across partial executions.
/// `NotFound` exists only at the query surface; it is never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Accepted,
    PartiallyFilled { filled: u64, filled_fee: u64 },
    Filled { filled: u64, filled_fee: u64 },
    Cancelled { filled: u64, filled_fee: u64 },
    NotFound,
}

impl OrderStatus {
    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled { .. } | OrderStatus::Cancelled { .. } | OrderStatus::NotFound
        )
    }

    /// Total executed amount recorded in this status.
    pub fn filled(&self) -> u64 {
        match self {
            OrderStatus::Accepted | OrderStatus::NotFound => 0,
            OrderStatus::PartiallyFilled { filled, .. }
            | OrderStatus::Filled { filled, .. }
            | OrderStatus::Cancelled { filled, .. } => *filled,
        }
    }

    /// Total fee charged so far.
    pub fn filled_fee(&self) -> u64 {
        match self {
            OrderStatus::Accepted | OrderStatus::NotFound => 0,
            OrderStatus::PartiallyFilled { filled_fee, .. }
            | OrderStatus::Filled { filled_fee, .. }
            | OrderStatus::Cancelled { filled_fee, .. } => *filled_fee,
        }
    }
}
