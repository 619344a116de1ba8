//! Order validation pipeline
//!
//! Stages run in order and report the first failure: structural shape,
//! matcher settings (blacklists, versions, fees), time bounds, market
//! bounds (restrictions, price deviation), and finally the blockchain-aware
//! checks (account and asset scripts). The reservable-balance check is not
//! here; it belongs to the owning address actor.

use crate::blockchain::{BlockchainContext, ScriptResult, ScriptSubject};
use crate::caches::RateCache;
use crate::settings::MatcherSettings;
use matching_engine::MarketStatus;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;
use types::asset::{Asset, AssetId};
use types::numeric::min_fee_for_rate;
use types::order::{Address, Order, OrderSide};
use types::MatcherError;

pub struct OrderValidator {
    settings: Arc<MatcherSettings>,
    rates: RateCache,
    chain: Arc<dyn BlockchainContext>,
    blacklisted_assets: HashSet<AssetId>,
    blacklisted_addresses: HashSet<Address>,
}

impl OrderValidator {
    pub fn new(
        settings: Arc<MatcherSettings>,
        rates: RateCache,
        chain: Arc<dyn BlockchainContext>,
    ) -> Self {
        let blacklisted_assets = settings
            .blacklisted_assets
            .iter()
            .filter_map(|text| match parse_32(text) {
                Some(raw) => Some(AssetId::new(raw)),
                None => {
                    warn!(value = %text, "ignoring malformed blacklisted asset id");
                    None
                }
            })
            .collect();
        let blacklisted_addresses = settings
            .blacklisted_addresses
            .iter()
            .filter_map(|text| match parse_32(text) {
                Some(raw) => Some(Address(raw)),
                None => {
                    warn!(value = %text, "ignoring malformed blacklisted address");
                    None
                }
            })
            .collect();
        Self {
            settings,
            rates,
            chain,
            blacklisted_assets,
            blacklisted_addresses,
        }
    }

    /// Run the full pipeline against one order.
    pub async fn validate(
        &self,
        order: &Order,
        now_millis: u64,
        market: Option<MarketStatus>,
    ) -> Result<(), MatcherError> {
        order.check_shape().map_err(MatcherError::Invalid)?;
        self.check_settings(order)?;
        self.check_time(order, now_millis)?;
        self.check_market(order, market)?;
        self.check_scripts(order).await
    }

    fn check_settings(&self, order: &Order) -> Result<(), MatcherError> {
        if !self.settings.allowed_order_versions.contains(&order.version) {
            return Err(MatcherError::Invalid(format!(
                "order version {} is not accepted",
                order.version
            )));
        }

        for asset in [order.pair.amount_asset, order.pair.price_asset, order.fee_asset] {
            if let Asset::Issued(id) = asset {
                if self.blacklisted_assets.contains(&id) {
                    return Err(MatcherError::Invalid(format!("asset {} is blacklisted", id)));
                }
            }
        }

        let address = order.owner.address();
        if self.blacklisted_addresses.contains(&address) {
            return Err(MatcherError::Invalid(format!(
                "address {} is blacklisted",
                address
            )));
        }

        let rate = self
            .rates
            .rate_of(&order.fee_asset)
            .ok_or_else(|| MatcherError::Invalid(format!(
                "asset {} is not accepted as matcher fee",
                order.fee_asset
            )))?;
        let min_fee = min_fee_for_rate(self.settings.order_fee.base_fee, rate);
        if order.matcher_fee < min_fee {
            return Err(MatcherError::Invalid(format!(
                "matcher fee {} is below the minimum {}",
                order.matcher_fee, min_fee
            )));
        }
        Ok(())
    }

    fn check_time(&self, order: &Order, now: u64) -> Result<(), MatcherError> {
        let drift = now.abs_diff(order.timestamp);
        if drift > self.settings.max_timestamp_drift_millis {
            return Err(MatcherError::Invalid(format!(
                "order timestamp is {} ms away from matcher time",
                drift
            )));
        }
        if order.expiration < now.saturating_add(self.settings.min_order_lifetime_millis) {
            return Err(MatcherError::Invalid("order expires too soon".into()));
        }
        if order.expiration > now.saturating_add(self.settings.max_order_lifetime_millis) {
            return Err(MatcherError::Invalid("order expiration is too far away".into()));
        }
        Ok(())
    }

    fn check_market(&self, order: &Order, market: Option<MarketStatus>) -> Result<(), MatcherError> {
        let r = self.settings.restrictions_for(&order.pair);

        if order.amount < r.min_amount || order.amount > r.max_amount {
            return Err(MatcherError::Invalid(format!(
                "amount {} is outside [{}, {}]",
                order.amount, r.min_amount, r.max_amount
            )));
        }
        if r.step_amount > 1 && order.amount % r.step_amount != 0 {
            return Err(MatcherError::Invalid(format!(
                "amount {} is not aligned to step {}",
                order.amount, r.step_amount
            )));
        }
        if order.price < r.min_price || order.price > r.max_price {
            return Err(MatcherError::Invalid(format!(
                "price {} is outside [{}, {}]",
                order.price, r.min_price, r.max_price
            )));
        }
        if r.step_price > 1 && order.price % r.step_price != 0 {
            return Err(MatcherError::Invalid(format!(
                "price {} is not aligned to tick {}",
                order.price, r.step_price
            )));
        }

        if self.settings.deviation.enabled {
            let opposite = market.and_then(|m| match order.side {
                OrderSide::Buy => m.best_ask,
                OrderSide::Sell => m.best_bid,
            });
            if let Some(best) = opposite {
                let diff = order.price.abs_diff(best.price) as u128;
                let allowed =
                    best.price as u128 * self.settings.deviation.max_price_deviation_pct as u128;
                if diff * 100 > allowed {
                    return Err(MatcherError::Invalid(format!(
                        "price {} deviates more than {}% from the best opposite price {}",
                        order.price, self.settings.deviation.max_price_deviation_pct, best.price
                    )));
                }
            }
        }
        Ok(())
    }

    async fn check_scripts(&self, order: &Order) -> Result<(), MatcherError> {
        let address = order.owner.address();
        if self.chain.has_account_script(&address).await {
            map_script(
                self.chain
                    .run_script(ScriptSubject::Address(address), order)
                    .await,
            )?;
        }

        let mut checked: HashSet<AssetId> = HashSet::new();
        for asset in [order.pair.amount_asset, order.pair.price_asset, order.fee_asset] {
            let Asset::Issued(id) = asset else { continue };
            if !checked.insert(id) {
                continue;
            }
            if self.chain.has_asset_script(&id).await {
                map_script(self.chain.run_script(ScriptSubject::Asset(id), order).await)?;
            }
        }
        Ok(())
    }
}

fn map_script(result: ScriptResult) -> Result<(), MatcherError> {
    match result {
        ScriptResult::Allowed => Ok(()),
        ScriptResult::Denied(reason) => Err(MatcherError::ScriptDenied(reason)),
        ScriptResult::ScriptError(reason) => Err(MatcherError::ScriptError(reason)),
    }
}

fn parse_32(text: &str) -> Option<[u8; 32]> {
    hex::decode(text).ok()?.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::StaticChain;
    use ed25519_dalek::SigningKey;
    use matching_engine::LevelSummary;
    use persistence::MemKv;
    use types::asset::AssetPair;
    use types::{PRICE_CONSTANT, RATE_CONSTANT};

    const NOW: u64 = 1_700_000_000_000;

    fn pair() -> AssetPair {
        AssetPair::new(Asset::Issued(AssetId::new([1; 32])), Asset::Native)
    }

    fn order_with(side: OrderSide, amount: u64, price: u64, fee: u64) -> Order {
        let key = SigningKey::from_bytes(&[9; 32]);
        Order::new_signed(
            &key,
            pair(),
            side,
            amount,
            price,
            fee,
            Asset::Native,
            NOW,
            NOW + 120_000,
            3,
        )
    }

    fn validator(settings: MatcherSettings, chain: Arc<StaticChain>) -> OrderValidator {
        let rates = RateCache::load(Arc::new(MemKv::new()));
        OrderValidator::new(Arc::new(settings), rates, chain)
    }

    #[tokio::test]
    async fn test_valid_order_passes() {
        let v = validator(MatcherSettings::default(), Arc::new(StaticChain::new()));
        let order = order_with(OrderSide::Buy, 100, 2 * PRICE_CONSTANT, 300_000);
        assert!(v.validate(&order, NOW, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_disallowed_version_is_rejected() {
        let settings = MatcherSettings {
            allowed_order_versions: vec![1, 2],
            ..MatcherSettings::default()
        };
        let v = validator(settings, Arc::new(StaticChain::new()));
        let order = order_with(OrderSide::Buy, 100, 2 * PRICE_CONSTANT, 300_000);
        assert!(matches!(
            v.validate(&order, NOW, None).await,
            Err(MatcherError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_blacklisted_asset_is_rejected() {
        let settings = MatcherSettings {
            blacklisted_assets: vec!["01".repeat(32)],
            ..MatcherSettings::default()
        };
        let v = validator(settings, Arc::new(StaticChain::new()));
        let order = order_with(OrderSide::Buy, 100, 2 * PRICE_CONSTANT, 300_000);
        assert!(matches!(
            v.validate(&order, NOW, None).await,
            Err(MatcherError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_fee_below_minimum_is_rejected() {
        let v = validator(MatcherSettings::default(), Arc::new(StaticChain::new()));
        let order = order_with(OrderSide::Buy, 100, 2 * PRICE_CONSTANT, 299_999);
        let err = v.validate(&order, NOW, None).await.unwrap_err();
        assert!(matches!(err, MatcherError::Invalid(ref m) if m.contains("fee")));
    }

    #[tokio::test]
    async fn test_fee_asset_without_rate_is_rejected() {
        let key = SigningKey::from_bytes(&[9; 32]);
        let order = Order::new_signed(
            &key,
            pair(),
            OrderSide::Buy,
            100,
            2 * PRICE_CONSTANT,
            300_000,
            Asset::Issued(AssetId::new([5; 32])),
            NOW,
            NOW + 120_000,
            3,
        );
        let v = validator(MatcherSettings::default(), Arc::new(StaticChain::new()));
        assert!(matches!(
            v.validate(&order, NOW, None).await,
            Err(MatcherError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_rated_fee_asset_scales_minimum() {
        let rates = RateCache::load(Arc::new(MemKv::new()));
        let fee_asset = Asset::Issued(AssetId::new([5; 32]));
        rates.upsert(fee_asset, RATE_CONSTANT / 2);
        let v = OrderValidator::new(
            Arc::new(MatcherSettings::default()),
            rates,
            Arc::new(StaticChain::new()),
        );

        let key = SigningKey::from_bytes(&[9; 32]);
        let order = Order::new_signed(
            &key,
            pair(),
            OrderSide::Buy,
            100,
            2 * PRICE_CONSTANT,
            150_000,
            fee_asset,
            NOW,
            NOW + 120_000,
            3,
        );
        assert!(v.validate(&order, NOW, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_stale_timestamp_is_rejected() {
        let v = validator(MatcherSettings::default(), Arc::new(StaticChain::new()));
        let order = order_with(OrderSide::Buy, 100, 2 * PRICE_CONSTANT, 300_000);
        let far_future = NOW + 10 * 60_000;
        assert!(matches!(
            v.validate(&order, far_future, None).await,
            Err(MatcherError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_expiration_bounds() {
        let key = SigningKey::from_bytes(&[9; 32]);
        let short_lived = Order::new_signed(
            &key,
            pair(),
            OrderSide::Buy,
            100,
            2 * PRICE_CONSTANT,
            300_000,
            Asset::Native,
            NOW,
            NOW + 10_000,
            3,
        );
        let v = validator(MatcherSettings::default(), Arc::new(StaticChain::new()));
        assert!(matches!(
            v.validate(&short_lived, NOW, None).await,
            Err(MatcherError::Invalid(ref m)) if m.contains("expires")
        ));
    }

    #[tokio::test]
    async fn test_amount_step_alignment() {
        let mut settings = MatcherSettings::default();
        settings.order_restrictions.insert(
            pair().key(),
            crate::settings::OrderRestrictions {
                step_amount: 10,
                ..Default::default()
            },
        );
        let v = validator(settings, Arc::new(StaticChain::new()));

        let misaligned = order_with(OrderSide::Buy, 105, 2 * PRICE_CONSTANT, 300_000);
        assert!(v.validate(&misaligned, NOW, None).await.is_err());

        let aligned = order_with(OrderSide::Buy, 100, 2 * PRICE_CONSTANT, 300_000);
        assert!(v.validate(&aligned, NOW, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_price_deviation_band() {
        let settings = MatcherSettings {
            deviation: crate::settings::DeviationSettings {
                enabled: true,
                max_price_deviation_pct: 10,
            },
            ..MatcherSettings::default()
        };
        let v = validator(settings, Arc::new(StaticChain::new()));
        let market = MarketStatus {
            last_trade: None,
            best_bid: None,
            best_ask: Some(LevelSummary {
                price: 100 * PRICE_CONSTANT,
                amount: 10,
            }),
        };

        let too_high = order_with(OrderSide::Buy, 10, 120 * PRICE_CONSTANT, 300_000);
        assert!(v.validate(&too_high, NOW, Some(market)).await.is_err());

        let in_band = order_with(OrderSide::Buy, 10, 105 * PRICE_CONSTANT, 300_000);
        assert!(v.validate(&in_band, NOW, Some(market)).await.is_ok());
    }

    #[tokio::test]
    async fn test_account_script_denial() {
        let chain = Arc::new(StaticChain::new());
        let order = order_with(OrderSide::Buy, 100, 2 * PRICE_CONSTANT, 300_000);
        chain.set_account_script(order.owner.address(), ScriptResult::Denied("nope".into()));

        let v = validator(MatcherSettings::default(), chain);
        assert!(matches!(
            v.validate(&order, NOW, None).await,
            Err(MatcherError::ScriptDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_asset_script_error() {
        let chain = Arc::new(StaticChain::new());
        chain.set_asset_script(
            AssetId::new([1; 32]),
            ScriptResult::ScriptError("boom".into()),
        );
        let v = validator(MatcherSettings::default(), chain);
        let order = order_with(OrderSide::Buy, 100, 2 * PRICE_CONSTANT, 300_000);
        assert!(matches!(
            v.validate(&order, NOW, None).await,
            Err(MatcherError::ScriptError(_))
        ));
    }

    #[tokio::test]
    async fn test_tampered_signature_is_rejected() {
        let v = validator(MatcherSettings::default(), Arc::new(StaticChain::new()));
        let mut order = order_with(OrderSide::Buy, 100, 2 * PRICE_CONSTANT, 300_000);
        order.signature.0[0] ^= 0xff;
        assert!(matches!(
            v.validate(&order, NOW, None).await,
            Err(MatcherError::Invalid(_))
        ));
    }
}
