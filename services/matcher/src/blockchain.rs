//! Blockchain context — the boundary to the external chain
//!
//! The matcher consumes the chain through this trait only: balance lookup,
//! asset metadata, script presence and evaluation, and transaction
//! broadcast. Calls may suspend; they are awaited only inside address
//! actors and the broadcaster, never on the matching path.

use async_trait::async_trait;
use types::asset::{Asset, AssetId};
use types::order::{Address, Order, OrderId};
use types::trade::{ExchangeTransaction, TxId};

/// Minimal asset metadata the matcher cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BriefAssetDescription {
    pub name: String,
    pub decimals: u8,
    pub has_script: bool,
}

/// Outcome of evaluating an account or asset script against an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptResult {
    Allowed,
    Denied(String),
    ScriptError(String),
}

/// What a script is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptSubject {
    Address(Address),
    Asset(AssetId),
}

#[async_trait]
pub trait BlockchainContext: Send + Sync {
    /// Whether a transaction with this id is confirmed on chain.
    async fn was_forged(&self, tx_id: &TxId) -> bool;

    /// Submit a transaction to the chain's unconfirmed pool. `true` means
    /// accepted into the pool, not confirmed.
    async fn broadcast_tx(&self, tx: &ExchangeTransaction) -> bool;

    async fn is_feature_activated(&self, id: u16) -> bool;

    async fn asset_description(&self, asset: &AssetId) -> Option<BriefAssetDescription>;

    async fn has_asset_script(&self, asset: &AssetId) -> bool;

    async fn has_account_script(&self, address: &Address) -> bool;

    async fn run_script(&self, subject: ScriptSubject, order: &Order) -> ScriptResult;

    /// Confirmed balance minus on-chain locks; the matcher subtracts its
    /// own reservations on top of this.
    async fn spendable_balance(&self, address: &Address, asset: &Asset) -> u128;

    /// Whether any exchange transaction containing this order is confirmed.
    async fn forged_order(&self, order_id: &OrderId) -> bool;
}

// ── Stand-ins ───────────────────────────────────────────────────────

/// Chain stand-in for deployments without a node connection and for tests:
/// balances and scripts are configured explicitly, broadcasts are recorded.
#[derive(Default)]
pub struct StaticChain {
    balances: dashmap::DashMap<(Address, Asset), u128>,
    account_scripts: dashmap::DashMap<Address, ScriptResult>,
    asset_scripts: dashmap::DashMap<AssetId, ScriptResult>,
    descriptions: dashmap::DashMap<AssetId, BriefAssetDescription>,
    broadcasts: parking_lot::Mutex<Vec<TxId>>,
    forged: dashmap::DashMap<TxId, ()>,
    /// When set, unknown (address, asset) pairs report this balance instead
    /// of zero.
    default_balance: Option<u128>,
}

impl StaticChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// A chain where everyone is rich and nothing is scripted.
    pub fn permissive() -> Self {
        Self {
            default_balance: Some(u128::MAX / 2),
            ..Self::default()
        }
    }

    pub fn set_balance(&self, address: Address, asset: Asset, amount: u128) {
        self.balances.insert((address, asset), amount);
    }

    pub fn set_account_script(&self, address: Address, result: ScriptResult) {
        self.account_scripts.insert(address, result);
    }

    pub fn set_asset_script(&self, asset: AssetId, result: ScriptResult) {
        self.asset_scripts.insert(asset, result);
    }

    pub fn set_description(&self, asset: AssetId, description: BriefAssetDescription) {
        self.descriptions.insert(asset, description);
    }

    pub fn mark_forged(&self, tx_id: TxId) {
        self.forged.insert(tx_id, ());
    }

    pub fn broadcast_count(&self) -> usize {
        self.broadcasts.lock().len()
    }

    pub fn broadcasts(&self) -> Vec<TxId> {
        self.broadcasts.lock().clone()
    }
}

#[async_trait]
impl BlockchainContext for StaticChain {
    async fn was_forged(&self, tx_id: &TxId) -> bool {
        self.forged.contains_key(tx_id)
    }

    async fn broadcast_tx(&self, tx: &ExchangeTransaction) -> bool {
        self.broadcasts.lock().push(tx.id);
        true
    }

    async fn is_feature_activated(&self, _id: u16) -> bool {
        true
    }

    async fn asset_description(&self, asset: &AssetId) -> Option<BriefAssetDescription> {
        self.descriptions.get(asset).map(|d| d.clone())
    }

    async fn has_asset_script(&self, asset: &AssetId) -> bool {
        self.asset_scripts.contains_key(asset)
    }

    async fn has_account_script(&self, address: &Address) -> bool {
        self.account_scripts.contains_key(address)
    }

    async fn run_script(&self, subject: ScriptSubject, _order: &Order) -> ScriptResult {
        match subject {
            ScriptSubject::Address(address) => self
                .account_scripts
                .get(&address)
                .map(|r| r.clone())
                .unwrap_or(ScriptResult::Allowed),
            ScriptSubject::Asset(asset) => self
                .asset_scripts
                .get(&asset)
                .map(|r| r.clone())
                .unwrap_or(ScriptResult::Allowed),
        }
    }

    async fn spendable_balance(&self, address: &Address, asset: &Asset) -> u128 {
        self.balances
            .get(&(*address, *asset))
            .map(|b| *b)
            .or(self.default_balance)
            .unwrap_or(0)
    }

    async fn forged_order(&self, _order_id: &OrderId) -> bool {
        false
    }
}
