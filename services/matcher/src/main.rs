//! Matcher entry point
//!
//! Exit codes: 0 clean shutdown, 1 directory or configuration preparation
//! failure, 2 startup timeout, 3 event queue unavailable.

use matcher::blockchain::StaticChain;
use matcher::{Matcher, MatcherSettings};
use persistence::{EventQueue, LocalQueue, MemKv};
use std::process::exit;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use types::MatcherError;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args().nth(1);
    let settings = match MatcherSettings::load(config_path.as_deref()) {
        Ok(settings) => settings,
        Err(err) => {
            error!("configuration is unusable: {}", err);
            exit(1);
        }
    };
    info!(account = %settings.account, data_dir = %settings.data_dir.display(), "starting matcher");
    if settings.postgres_connection.is_some() {
        info!("order-history export sink is configured; the export runs outside this process");
    }

    for dir in [
        settings.data_dir.clone(),
        settings.queue_dir(),
        settings.snapshots_dir(),
    ] {
        if let Err(err) = std::fs::create_dir_all(&dir) {
            error!("cannot prepare {}: {}", dir.display(), err);
            exit(1);
        }
    }

    let queue: Arc<dyn EventQueue> = match settings.events_queue.kind {
        matcher::settings::QueueKind::Local => match LocalQueue::open(settings.queue_dir()) {
            Ok(queue) => Arc::new(queue),
            Err(err) => {
                error!("event queue unavailable: {}", err);
                exit(3);
            }
        },
        matcher::settings::QueueKind::Remote => {
            error!(
                bootstrap = %settings.events_queue.remote.bootstrap,
                "remote queue transport requires an external client binding"
            );
            exit(3);
        }
    };

    // The embedded store and the chain connection are deployment wiring;
    // without them the matcher runs self-contained on an in-memory store
    // and a static chain.
    let kv = Arc::new(MemKv::new());
    let chain = Arc::new(StaticChain::permissive());

    let matcher = match Matcher::new(settings, queue, kv, chain) {
        Ok(matcher) => matcher,
        Err(err) => {
            error!("matcher wiring failed: {}", err);
            exit(1);
        }
    };

    match matcher.start().await {
        Ok(()) => info!("matcher started"),
        Err(MatcherError::Timeout) => {
            error!("startup timed out");
            exit(2);
        }
        Err(MatcherError::QueueUnavailable(reason)) => {
            error!("event queue unavailable: {}", reason);
            exit(3);
        }
        Err(err) => {
            error!("startup failed: {}", err);
            exit(1);
        }
    }

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("signal handling failed: {}", err);
    }
    info!("shutting down");
    matcher.shutdown().await;
}
