/*!
 * Bridge Client
 * Guest-side handle that turns an async host call into a blocking one
 */

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::mailbox::Mailbox;
use super::types::*;

/// Guest-side end of a bridge
///
/// Cloneable so several imports can share it, but only one call may be in
/// flight at a time; a concurrent second call fails with
/// [`BridgeError::Busy`] instead of blocking.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    mailbox: Arc<Mailbox>,
}

impl BridgeClient {
    pub(super) fn new(mailbox: Arc<Mailbox>) -> Self {
        Self { mailbox }
    }

    /// Issue a request and block until the controller answers
    ///
    /// An empty response means the host side failed; interpreting that is
    /// up to the caller.
    pub fn request_sync(&self, kind: RequestKind, payload: &[u8]) -> BridgeResult<Vec<u8>> {
        self.call(kind, payload, None)
    }

    /// [`request_sync`](Self::request_sync) with an upper bound on the wait
    pub fn request_sync_timeout(
        &self,
        kind: RequestKind,
        payload: &[u8],
        timeout: Duration,
    ) -> BridgeResult<Vec<u8>> {
        self.call(kind, payload, Some(timeout))
    }

    fn call(
        &self,
        kind: RequestKind,
        payload: &[u8],
        timeout: Option<Duration>,
    ) -> BridgeResult<Vec<u8>> {
        if payload.len() > self.mailbox.capacity() {
            return Err(BridgeError::PayloadTooLarge {
                size: payload.len(),
                capacity: self.mailbox.capacity(),
            });
        }
        self.mailbox.acquire()?;

        let result = self.round_trip(kind, payload, timeout);
        self.mailbox.release();
        result
    }

    fn round_trip(
        &self,
        kind: RequestKind,
        payload: &[u8],
        timeout: Option<Duration>,
    ) -> BridgeResult<Vec<u8>> {
        self.mailbox.post(kind.raw(), payload)?;
        debug!(?kind, len = payload.len(), "bridge request posted");

        let deadline = timeout.map(|t| Instant::now() + t);
        if !self.mailbox.wait_idle(deadline)? {
            let waited = timeout.unwrap_or_default();
            warn!(?kind, ?waited, "bridge request timed out");
            return Err(BridgeError::Timeout(waited));
        }

        Ok(self.mailbox.take_response())
    }

    pub fn is_closed(&self) -> bool {
        self.mailbox.is_closed()
    }

    /// Close the bridge from the guest side
    pub fn close(&self) {
        self.mailbox.close();
    }
}
