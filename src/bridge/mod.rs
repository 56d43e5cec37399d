/*!
 * Synchronous Bridge
 *
 * Lets code on a guest thread make a blocking call that is served by async
 * code on the controller. One call is in flight per bridge; requests and
 * responses that do not fit the payload area are errors, never split.
 */

pub mod client;
pub mod controller;
pub mod mailbox;
pub mod types;

pub use client::BridgeClient;
pub use controller::{BridgeController, BridgeHandler, EchoHandler};
pub use mailbox::Mailbox;
pub use types::{BridgeError, BridgeResult, RequestKind, LOCK_IDLE, LOCK_PENDING};

use crate::core::limits::{BRIDGE_PAYLOAD_CAPACITY, BRIDGE_POLL_INTERVAL};
use std::sync::Arc;
use std::time::Duration;

/// Both ends of a fresh bridge
pub struct Bridge;

impl Bridge {
    /// Create a bridge with the given payload capacity and poll interval
    pub fn new(capacity: usize, poll_interval: Duration) -> (BridgeClient, BridgeController) {
        let mailbox = Arc::new(Mailbox::new(capacity));
        (
            BridgeClient::new(Arc::clone(&mailbox)),
            BridgeController::new(mailbox, poll_interval),
        )
    }

    /// Bridge with the default capacity and poll interval
    pub fn with_defaults() -> (BridgeClient, BridgeController) {
        Self::new(BRIDGE_PAYLOAD_CAPACITY, BRIDGE_POLL_INTERVAL)
    }
}
