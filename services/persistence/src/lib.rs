//! Durable substrate for the matcher
//!
//! Append-only event queue with a local single-file transport, crash-safe
//! per-pair snapshot storage, the persistent asset-pair registry, and the
//! order index used for idempotent replay and client queries.

pub mod kv;
pub mod orderdb;
pub mod queue;
pub mod registry;
pub mod snapshot;

pub use kv::{KvStore, MemKv};
pub use orderdb::{OrderDb, OrderInfo};
pub use queue::{EventQueue, LocalQueue, QueueError};
pub use registry::AssetPairRegistry;
pub use snapshot::{SnapshotError, SnapshotStore};
