//! Price-update fan-out to live WebSocket subscribers.
//!
//! `broadcast` serializes each update once and pushes it onto a bounded
//! queue with `try_send`: a full queue drops the message rather than ever
//! blocking trade execution. A dedicated worker drains the queue and writes
//! to each subscriber's own bounded channel; a subscriber whose channel is
//! gone is removed. Delivery follows submission order and there is no replay
//! — clients resynchronize through the regular query endpoints.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::metrics;

/// Hub queue depth. Beyond this, broadcasts are dropped.
const QUEUE_CAPACITY: usize = 256;

/// Per-subscriber channel depth; a slow consumer loses frames, not the hub.
const SUBSCRIBER_CAPACITY: usize = 64;

/// JSON message pushed to live subscribers after a trade executes.
#[derive(Debug, Clone, Serialize)]
pub struct PriceUpdate {
    #[serde(rename = "type")]
    pub event: &'static str,
    pub market_id: String,
    pub contract_id: String,
    pub h3_cell_id: String,
    pub price_yes: String,
    pub price_no: String,
    pub side: String,
    pub quantity: String,
}

impl PriceUpdate {
    pub const TRADE_EXECUTED: &'static str = "trade_executed";
}

/// Fan-out hub. Subscribers register through [`PriceFeedHub::subscribe`] and
/// are identified by plain integer ids, so nothing holds a back-pointer to
/// the connection.
pub struct PriceFeedHub {
    queue_tx: mpsc::Sender<String>,
    subscribers: Arc<Mutex<HashMap<u64, mpsc::Sender<String>>>>,
    next_id: AtomicU64,
}

impl PriceFeedHub {
    /// Create the hub and spawn its drain worker.
    pub fn spawn() -> Arc<Self> {
        let (hub, queue_rx) = Self::new();
        let worker_subs = hub.subscribers.clone();
        tokio::spawn(run_worker(queue_rx, worker_subs));
        hub
    }

    /// Construct without a worker. Exposed for tests that need to observe
    /// queue behavior directly.
    fn new() -> (Arc<Self>, mpsc::Receiver<String>) {
        let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);
        let hub = Arc::new(Self {
            queue_tx,
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        });
        (hub, queue_rx)
    }

    /// Submit an update to all subscribers. Never blocks: if the queue is
    /// full the message is dropped silently.
    pub fn broadcast(&self, update: &PriceUpdate) {
        let Ok(payload) = serde_json::to_string(update) else {
            return;
        };
        if self.queue_tx.try_send(payload).is_err() {
            debug!("broadcast queue full, dropping price update");
        }
    }

    /// Register a live subscriber. Returns its id and the frame stream.
    pub fn subscribe(&self) -> (u64, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let total = {
            let mut subs = self.subscribers.lock();
            subs.insert(id, tx);
            subs.len()
        };
        metrics::WEBSOCKET_CLIENTS.set(total as i64);
        info!(total, "ws client connected");
        (id, rx)
    }

    /// Drop a subscriber. Safe to call for an id already removed.
    pub fn unsubscribe(&self, id: u64) {
        let total = {
            let mut subs = self.subscribers.lock();
            subs.remove(&id);
            subs.len()
        };
        metrics::WEBSOCKET_CLIENTS.set(total as i64);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

async fn run_worker(
    mut queue_rx: mpsc::Receiver<String>,
    subscribers: Arc<Mutex<HashMap<u64, mpsc::Sender<String>>>>,
) {
    while let Some(message) = queue_rx.recv().await {
        // Snapshot the senders so the lock is never held across a send.
        let targets: Vec<(u64, mpsc::Sender<String>)> = subscribers
            .lock()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut closed = Vec::new();
        for (id, tx) in targets {
            match tx.try_send(message.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // Slow consumer: this frame is lost for them only.
                    debug!(subscriber = id, "subscriber buffer full, dropping frame");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(id),
            }
        }

        if !closed.is_empty() {
            let mut subs = subscribers.lock();
            for id in closed {
                subs.remove(&id);
            }
            metrics::WEBSOCKET_CLIENTS.set(subs.len() as i64);
        }
    }
}
