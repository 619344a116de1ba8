//! Matcher configuration
//!
//! Settings load from defaults, then an optional TOML file, then
//! `MATCHER_`-prefixed environment variables (nested fields separated with
//! `__`, e.g. `MATCHER_EVENTS_QUEUE__KIND=local`).

use matching_engine::{MatchingRule, MatchingRules, TickSize};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use types::AssetPair;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatcherSettings {
    /// Matcher account label, used only for logging and diagnostics.
    pub account: String,
    pub data_dir: PathBuf,
    pub events_queue: EventsQueueSettings,
    /// Offsets between per-pair snapshots.
    pub snapshots_interval: u64,
    pub snapshots_loading_timeout_secs: u64,
    pub start_events_processing_timeout_secs: u64,
    /// Soft timeout on order submission, milliseconds.
    pub placement_timeout_millis: u64,
    /// Hex-encoded asset ids that may not be traded or used as fee.
    pub blacklisted_assets: Vec<String>,
    /// Hex-encoded addresses that may not place orders.
    pub blacklisted_addresses: Vec<String>,
    pub order_fee: OrderFeeSettings,
    pub deviation: DeviationSettings,
    /// Per-pair bounds keyed by the pair's textual key.
    pub order_restrictions: HashMap<String, OrderRestrictions>,
    /// Per-pair matching-rule schedules keyed by the pair's textual key.
    pub matching_rules: HashMap<String, Vec<MatchingRuleSettings>>,
    pub allowed_order_versions: Vec<u8>,
    /// Allowed clock skew between client and matcher, milliseconds.
    pub max_timestamp_drift_millis: u64,
    pub min_order_lifetime_millis: u64,
    pub max_order_lifetime_millis: u64,
    /// Deadline for broadcasting one exchange transaction, milliseconds.
    pub broadcast_deadline_millis: u64,
    /// Recognized for the order-history export sink; unused by the core.
    pub postgres_connection: Option<String>,
}

impl Default for MatcherSettings {
    fn default() -> Self {
        Self {
            account: "matcher".to_string(),
            data_dir: PathBuf::from("./matcher-data"),
            events_queue: EventsQueueSettings::default(),
            snapshots_interval: 1_000,
            snapshots_loading_timeout_secs: 60,
            start_events_processing_timeout_secs: 300,
            placement_timeout_millis: 5_000,
            blacklisted_assets: Vec::new(),
            blacklisted_addresses: Vec::new(),
            order_fee: OrderFeeSettings::default(),
            deviation: DeviationSettings::default(),
            order_restrictions: HashMap::new(),
            matching_rules: HashMap::new(),
            allowed_order_versions: vec![1, 2, 3],
            max_timestamp_drift_millis: 60_000,
            min_order_lifetime_millis: 60_000,
            max_order_lifetime_millis: 30 * 24 * 60 * 60 * 1_000,
            broadcast_deadline_millis: 10 * 60 * 1_000,
            postgres_connection: None,
        }
    }
}

impl MatcherSettings {
    /// Load configuration: defaults, then `path` (if given), then
    /// environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        let loaded = builder
            .add_source(
                config::Environment::with_prefix("MATCHER")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;
        loaded.try_deserialize()
    }

    pub fn snapshots_loading_timeout(&self) -> Duration {
        Duration::from_secs(self.snapshots_loading_timeout_secs)
    }

    pub fn start_events_processing_timeout(&self) -> Duration {
        Duration::from_secs(self.start_events_processing_timeout_secs)
    }

    pub fn placement_timeout(&self) -> Duration {
        Duration::from_millis(self.placement_timeout_millis)
    }

    pub fn broadcast_deadline(&self) -> Duration {
        Duration::from_millis(self.broadcast_deadline_millis)
    }

    /// Restrictions for a pair; defaults apply when none are configured.
    pub fn restrictions_for(&self, pair: &AssetPair) -> OrderRestrictions {
        self.order_restrictions
            .get(&pair.key())
            .cloned()
            .unwrap_or_default()
    }

    /// Matching-rule schedule for a pair; aggregation stays disabled when
    /// none is configured.
    pub fn matching_rules_for(&self, pair: &AssetPair) -> MatchingRules {
        match self.matching_rules.get(&pair.key()) {
            None => MatchingRules::default_rules(),
            Some(entries) => MatchingRules::new(
                entries
                    .iter()
                    .map(|e| MatchingRule {
                        start_offset: e.start_offset,
                        tick_size: if e.tick_size <= 1 {
                            TickSize::Disabled
                        } else {
                            TickSize::Enabled(e.tick_size)
                        },
                    })
                    .collect(),
            ),
        }
    }

    pub fn queue_dir(&self) -> PathBuf {
        self.events_queue
            .local
            .dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("queue"))
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.data_dir.join("snapshots")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    Local,
    Remote,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventsQueueSettings {
    pub kind: QueueKind,
    pub local: LocalQueueSettings,
    pub remote: RemoteQueueSettings,
}

impl Default for EventsQueueSettings {
    fn default() -> Self {
        Self {
            kind: QueueKind::Local,
            local: LocalQueueSettings::default(),
            remote: RemoteQueueSettings::default(),
        }
    }
}

/// Embedded single-file transport settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocalQueueSettings {
    /// Log directory; defaults to `<data_dir>/queue`.
    pub dir: Option<PathBuf>,
    pub poll_interval_millis: u64,
}

impl Default for LocalQueueSettings {
    fn default() -> Self {
        Self {
            dir: None,
            poll_interval_millis: 50,
        }
    }
}

/// Remote partitioned-log transport settings. The client itself is an
/// external collaborator; these are parsed and handed to it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RemoteQueueSettings {
    pub bootstrap: String,
    pub topic: String,
    pub client_id: String,
    pub group_id: String,
    pub producer_acks: String,
    pub consumer_max_poll: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrderFeeSettings {
    /// Minimum fee in the reference fee asset; fee assets with a rate scale
    /// this through the rate cache.
    pub base_fee: u64,
}

impl Default for OrderFeeSettings {
    fn default() -> Self {
        Self { base_fee: 300_000 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviationSettings {
    pub enabled: bool,
    /// Maximum relative deviation from the best opposite price, percent.
    pub max_price_deviation_pct: u64,
}

impl Default for DeviationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_price_deviation_pct: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrderRestrictions {
    pub min_amount: u64,
    pub max_amount: u64,
    pub step_amount: u64,
    pub min_price: u64,
    pub max_price: u64,
    pub step_price: u64,
}

impl Default for OrderRestrictions {
    fn default() -> Self {
        Self {
            min_amount: 1,
            max_amount: u64::MAX,
            step_amount: 1,
            min_price: 1,
            max_price: u64::MAX,
            step_price: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MatchingRuleSettings {
    pub start_offset: u64,
    /// Tick size in price units; 0 or 1 disables aggregation.
    pub tick_size: u64,
}
