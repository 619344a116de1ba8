//! Asset-pair registry
//!
//! Persistent set of known pairs, recovered on startup to decide which
//! order-book state machines to resurrect. Stored under the `pair:` prefix
//! of the process-wide key-value store.

use crate::kv::KvStore;
use std::sync::Arc;
use types::AssetPair;

const PREFIX: &[u8] = b"pair:";

#[derive(Clone)]
pub struct AssetPairRegistry {
    kv: Arc<dyn KvStore>,
}

impl AssetPairRegistry {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn add(&self, pair: &AssetPair) {
        let value = bincode::serialize(pair).expect("pair serialization is infallible");
        self.kv.put(&Self::key(pair), &value);
    }

    pub fn remove(&self, pair: &AssetPair) {
        self.kv.delete(&Self::key(pair));
    }

    pub fn contains(&self, pair: &AssetPair) -> bool {
        self.kv.get(&Self::key(pair)).is_some()
    }

    /// All registered pairs, in stable key order.
    pub fn load(&self) -> Vec<AssetPair> {
        self.kv
            .scan_prefix(PREFIX)
            .into_iter()
            .filter_map(|(_, v)| bincode::deserialize(&v).ok())
            .collect()
    }

    fn key(pair: &AssetPair) -> Vec<u8> {
        let mut key = PREFIX.to_vec();
        key.extend_from_slice(pair.key().as_bytes());
        key
    }
}
