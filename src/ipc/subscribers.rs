/*!
 * Subscriber Fan-out
 * Broadcast to every live subscriber, pruning the ones that went away
 */

use ahash::HashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Subscriber handle
pub type SubscriberId = u64;

/// Fan-out list of unbounded flume senders
///
/// Every subscriber sees every message published after it subscribed, in
/// publish order. A subscriber whose receiver was dropped is removed on the
/// next publish.
#[derive(Debug)]
pub struct Subscribers<T> {
    next_id: AtomicU64,
    senders: Mutex<HashMap<SubscriberId, flume::Sender<T>>>,
}

impl<T: Clone> Subscribers<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            senders: Mutex::new(HashMap::default()),
        }
    }

    pub fn subscribe(&self) -> (SubscriberId, flume::Receiver<T>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = flume::unbounded();
        self.senders.lock().insert(id, tx);
        debug!(subscriber = id, "subscribed");
        (id, rx)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.senders.lock().remove(&id).is_some()
    }

    /// Send to everyone; returns how many received it
    pub fn publish(&self, message: &T) -> usize {
        let mut senders = self.senders.lock();
        let mut sent = 0;
        senders.retain(|id, tx| match tx.send(message.clone()) {
            Ok(()) => {
                sent += 1;
                true
            }
            Err(_) => {
                debug!(subscriber = *id, "subscriber disconnected");
                false
            }
        });
        sent
    }

    pub fn len(&self) -> usize {
        self.senders.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.lock().is_empty()
    }

    /// Drop every sender, ending all subscriber streams
    pub fn close(&self) {
        self.senders.lock().clear();
    }
}

impl<T: Clone> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}
