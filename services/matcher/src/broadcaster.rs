//! Exchange-transaction broadcaster
//!
//! Produced transactions are handed off through a channel and retried off
//! the matching path: try the unconfirmed pool, poll for on-chain
//! inclusion, back off exponentially, give up at the deadline. Chain
//! rejection never unwinds matcher state; the event log stays
//! authoritative.

use crate::blockchain::BlockchainContext;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};
use types::trade::ExchangeTransaction;

const QUEUE_CAPACITY: usize = 4_096;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

struct Job {
    tx: ExchangeTransaction,
    deadline: Instant,
}

/// Cheap-to-clone handle; the dispatch task owns the receiving end.
#[derive(Clone)]
pub struct ExchangeTransactionBroadcaster {
    sender: mpsc::Sender<Job>,
}

impl ExchangeTransactionBroadcaster {
    /// Spawn the dispatch task.
    pub fn start(chain: Arc<dyn BlockchainContext>) -> Self {
        let (sender, mut receiver) = mpsc::channel::<Job>(QUEUE_CAPACITY);
        tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                let chain = chain.clone();
                tokio::spawn(async move {
                    broadcast_until_done(chain, job).await;
                });
            }
        });
        Self { sender }
    }

    /// Enqueue without blocking. A full queue drops the transaction with a
    /// warning; the chain can still settle it from a later rebroadcast of
    /// the same order pair, and matcher state is unaffected either way.
    pub fn enqueue(&self, tx: ExchangeTransaction, deadline: Duration) {
        let job = Job {
            tx,
            deadline: Instant::now() + deadline,
        };
        if let Err(err) = self.sender.try_send(job) {
            warn!("broadcast queue full, dropping transaction: {}", err);
        }
    }
}

async fn broadcast_until_done(chain: Arc<dyn BlockchainContext>, job: Job) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        if chain.broadcast_tx(&job.tx).await {
            debug!(tx = %job.tx.id, "exchange transaction accepted by the pool");
            return;
        }
        if chain.was_forged(&job.tx.id).await {
            debug!(tx = %job.tx.id, "exchange transaction already confirmed");
            return;
        }
        if Instant::now() + backoff >= job.deadline {
            warn!(tx = %job.tx.id, "giving up on broadcast at deadline");
            return;
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}
