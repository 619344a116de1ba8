//! Matcher service
//!
//! Ties the pure order books to the durable substrate: one single-writer
//! actor per book and per address, a coordinator that routes queue events
//! and gates consumption on snapshot restoration, the order validation
//! pipeline, fee-rate and decimals caches, and the exchange-transaction
//! broadcaster.

pub mod actors;
pub mod api;
pub mod blockchain;
pub mod broadcaster;
pub mod caches;
pub mod settings;
pub mod validation;

pub use actors::coordinator::{Matcher, MatcherStatus};
pub use blockchain::{BlockchainContext, BriefAssetDescription, ScriptResult, ScriptSubject};
pub use settings::MatcherSettings;
