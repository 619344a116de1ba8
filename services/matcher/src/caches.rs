//! Fee-rate and asset-decimals caches
//!
//! `RateCache` maps fee assets to their rate in millionths of the reference
//! fee, with durable backing under the `rate:` key prefix; an asset without
//! a rate is not accepted as a fee asset. `AssetDecimalsCache` lazily pulls
//! decimals from the blockchain context and falls back to 8 when the chain
//! cannot answer.

use crate::blockchain::BlockchainContext;
use dashmap::DashMap;
use persistence::KvStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;
use types::asset::{Asset, AssetId};
use types::RATE_CONSTANT;

const RATE_PREFIX: &[u8] = b"rate:";

/// Fallback decimals when an asset description cannot be fetched.
pub const DEFAULT_ASSET_DECIMALS: u8 = 8;

#[derive(Clone)]
pub struct RateCache {
    kv: Arc<dyn KvStore>,
    rates: Arc<DashMap<Asset, u64>>,
}

impl RateCache {
    /// Load persisted rates. The native coin always rates 1.0.
    pub fn load(kv: Arc<dyn KvStore>) -> Self {
        let rates = Arc::new(DashMap::new());
        rates.insert(Asset::Native, RATE_CONSTANT);
        for (key, value) in kv.scan_prefix(RATE_PREFIX) {
            let Ok(raw) = <[u8; 8]>::try_from(value.as_slice()) else {
                continue;
            };
            let Some(asset) = Self::asset_from_key(&key) else {
                continue;
            };
            rates.insert(asset, u64::from_le_bytes(raw));
        }
        Self { kv, rates }
    }

    pub fn rate_of(&self, asset: &Asset) -> Option<u64> {
        self.rates.get(asset).map(|r| *r)
    }

    /// Insert or replace a rate; the store and the view change together
    /// under the map shard lock.
    pub fn upsert(&self, asset: Asset, rate: u64) {
        self.kv.put(&Self::key(&asset), &rate.to_le_bytes());
        self.rates.insert(asset, rate);
    }

    pub fn delete(&self, asset: &Asset) {
        if asset.is_native() {
            return;
        }
        self.kv.delete(&Self::key(asset));
        self.rates.remove(asset);
    }

    pub fn all(&self) -> BTreeMap<Asset, u64> {
        self.rates.iter().map(|e| (*e.key(), *e.value())).collect()
    }

    fn key(asset: &Asset) -> Vec<u8> {
        let mut key = RATE_PREFIX.to_vec();
        key.extend_from_slice(asset.to_string().as_bytes());
        key
    }

    fn asset_from_key(key: &[u8]) -> Option<Asset> {
        let text = std::str::from_utf8(key.strip_prefix(RATE_PREFIX)?).ok()?;
        if text == "native" {
            return Some(Asset::Native);
        }
        let raw = hex::decode(text).ok()?;
        Some(Asset::Issued(AssetId::new(raw.try_into().ok()?)))
    }
}

#[derive(Clone)]
pub struct AssetDecimalsCache {
    chain: Arc<dyn BlockchainContext>,
    decimals: Arc<DashMap<AssetId, u8>>,
}

impl AssetDecimalsCache {
    pub fn new(chain: Arc<dyn BlockchainContext>) -> Self {
        Self {
            chain,
            decimals: Arc::new(DashMap::new()),
        }
    }

    /// Decimals for an asset; the native coin is fixed at 8. Lookup
    /// failures fall back to 8 and are logged, not cached.
    pub async fn decimals(&self, asset: &Asset) -> u8 {
        let Asset::Issued(id) = asset else {
            return DEFAULT_ASSET_DECIMALS;
        };
        if let Some(cached) = self.decimals.get(id) {
            return *cached;
        }
        match self.chain.asset_description(id).await {
            Some(description) => {
                self.decimals.insert(*id, description.decimals);
                description.decimals
            }
            None => {
                warn!(asset = %id, "no asset description, assuming {} decimals", DEFAULT_ASSET_DECIMALS);
                DEFAULT_ASSET_DECIMALS
            }
        }
    }
}
