//! Advisory seller notifications
//!
//! In-process pub/sub keyed by seller pubkey, backing the long-poll
//! heartbeat. A waiter is a one-shot rendezvous: a notify resolves every
//! waiter currently registered for that seller, and notifications with no
//! registered waiter are dropped. Sellers reconcile through the
//! `updated_after` cursor, so a dropped wake-up costs latency, never
//! correctness.
//!
//! The waiter set doubles as the seller-presence signal for the
//! `online_only` offer filter: a seller with a parked heartbeat is online.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

#[derive(Clone, Default)]
pub struct Notifier {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    waiters: HashMap<String, HashMap<u64, oneshot::Sender<()>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a one-shot waiter for a seller. Dropping the returned guard
    /// (timeout, client disconnect) unregisters it.
    pub fn subscribe(&self, seller_pubkey: &str) -> Waiter {
        let (tx, rx) = oneshot::channel();
        let id = {
            let mut inner = self.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner
                .waiters
                .entry(seller_pubkey.to_string())
                .or_default()
                .insert(id, tx);
            id
        };

        Waiter {
            notifier: self.clone(),
            seller_pubkey: seller_pubkey.to_string(),
            id,
            rx: Some(rx),
        }
    }

    /// Wake every waiter registered for a seller. Returns the number woken;
    /// zero means the notification was dropped.
    pub fn notify(&self, seller_pubkey: &str) -> usize {
        let drained = self.lock().waiters.remove(seller_pubkey);
        let Some(drained) = drained else {
            return 0;
        };

        let woken = drained.len();
        for (_, tx) in drained {
            // A receiver dropped mid-flight is indistinguishable from a
            // disconnected client; ignore it.
            let _ = tx.send(());
        }
        debug!(seller = seller_pubkey, woken, "Seller notified");
        woken
    }

    /// Whether the seller currently has a parked heartbeat.
    pub fn is_online(&self, seller_pubkey: &str) -> bool {
        self.lock()
            .waiters
            .get(seller_pubkey)
            .is_some_and(|set| !set.is_empty())
    }

    /// The set of sellers with at least one parked heartbeat.
    pub fn online_sellers(&self) -> Vec<String> {
        self.lock()
            .waiters
            .iter()
            .filter(|(_, set)| !set.is_empty())
            .map(|(seller, _)| seller.clone())
            .collect()
    }
}

/// A registered heartbeat waiter. One-shot: consumed by [`Waiter::wait`].
pub struct Waiter {
    notifier: Notifier,
    seller_pubkey: String,
    id: u64,
    rx: Option<oneshot::Receiver<()>>,
}

impl Waiter {
    /// Block until a notification arrives or the timeout lapses. Returns
    /// `true` when woken by a notification.
    pub async fn wait(mut self, timeout: Duration) -> bool {
        let Some(rx) = self.rx.take() else {
            return false;
        };
        matches!(tokio::time::timeout(timeout, rx).await, Ok(Ok(())))
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        let mut inner = self.notifier.lock();
        if let Some(set) = inner.waiters.get_mut(&self.seller_pubkey) {
            set.remove(&self.id);
            if set.is_empty() {
                inner.waiters.remove(&self.seller_pubkey);
            }
        }
    }
}
